/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definition of the [`Vertex`] type, the unit of proposal in consensus.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    certificates::{BFTHeader, QuorumCertificate},
    data_types::{Command, CryptoHash, ViewNumber},
    ledger::LedgerHeader,
};

/// A proposed vertex in the consensus DAG.
///
/// A vertex refers to its parent by id only: [`parent_id`](Self::parent_id) is the vertex that its
/// `justify` QC certifies.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct Vertex {
    pub id: CryptoHash,
    pub view: ViewNumber,
    pub justify: QuorumCertificate,
    pub commands: Vec<Command>,
}

impl Vertex {
    /// Create a new vertex, computing its id from its contents.
    pub fn new(view: ViewNumber, justify: QuorumCertificate, commands: Vec<Command>) -> Vertex {
        let id = Vertex::hash(view, &justify, &commands);
        Vertex {
            id,
            view,
            justify,
            commands,
        }
    }

    /// Create the genesis vertex of a chain whose ledger starts at `ledger_header`.
    ///
    /// The genesis vertex is justified by a genesis QC over the all-zeroes vertex id. The QC that
    /// certifies the genesis vertex itself is [`Vertex::genesis_qc`].
    pub fn genesis(ledger_header: LedgerHeader) -> Vertex {
        let justify = QuorumCertificate::genesis_qc(BFTHeader::new(
            ViewNumber::genesis(),
            CryptoHash::new([0u8; 32]),
            ledger_header,
        ));
        Vertex::new(ViewNumber::genesis(), justify, Vec::new())
    }

    /// Get the genesis QC certifying this vertex, which should be a [genesis](Vertex::genesis) vertex.
    pub fn genesis_qc(&self) -> QuorumCertificate {
        QuorumCertificate::genesis_qc(BFTHeader::new(
            self.view,
            self.id,
            self.justify.proposed().ledger_header.clone(),
        ))
    }

    /// Compute the id of a vertex with the given contents.
    pub fn hash(view: ViewNumber, justify: &QuorumCertificate, commands: &Vec<Command>) -> CryptoHash {
        // Writing into a `Vec` is infallible.
        let bytes = (view, justify, commands).try_to_vec().unwrap_or_default();
        CryptoHash::digest(&bytes)
    }

    pub fn parent_id(&self) -> CryptoHash {
        self.justify.proposed().vertex_id
    }

    /// Check whether the vertex's id matches its contents.
    pub fn is_correct(&self) -> bool {
        self.id == Vertex::hash(self.view, &self.justify, &self.commands)
    }
}
