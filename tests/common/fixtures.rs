use rand_core::OsRng;

use hotstuff_sync::{
    ledger_sync::accumulator::LedgerAccumulator,
    types::{
        certificates::{BFTHeader, HighQC, LedgerProof, QuorumCertificate, VoteData},
        crypto_primitives::{Keypair, SigningKey, VerifyingKey},
        data_types::{Command, Epoch, Power, SignatureSet, ViewNumber},
        ledger::LedgerHeader,
        validator_set::ValidatorSet,
        vertex::Vertex,
    },
};

/// A set of validators with power 1 each, and their keypairs.
pub(crate) struct Validators {
    pub(crate) keypairs: Vec<Keypair>,
    pub(crate) validator_set: ValidatorSet,
}

impl Validators {
    pub(crate) fn new(n: usize) -> Validators {
        let mut csprg = OsRng {};
        let keypairs: Vec<Keypair> = (0..n)
            .map(|_| Keypair::new(SigningKey::generate(&mut csprg)))
            .collect();

        let mut validator_set = ValidatorSet::new();
        for keypair in &keypairs {
            validator_set.put(&keypair.public(), Power::new(1));
        }

        Validators {
            keypairs,
            validator_set,
        }
    }

    pub(crate) fn public(&self, i: usize) -> VerifyingKey {
        self.keypairs[i].public()
    }

    pub(crate) fn publics(&self) -> Vec<VerifyingKey> {
        self.keypairs.iter().map(|keypair| keypair.public()).collect()
    }

    /// Sign `vote_data` with the first `signers` validators.
    pub(crate) fn sign(&self, vote_data: &VoteData, signers: usize) -> SignatureSet {
        let message = vote_data.message_bytes();
        let mut signatures = SignatureSet::new();
        for keypair in self.keypairs.iter().take(signers) {
            signatures.insert(&keypair.public(), keypair.sign(&message));
        }
        signatures
    }
}

/// A straight chain of vertices on top of a genesis vertex, with one command per vertex and one view per
/// vertex.
///
/// `vertices[i]` is at view `i`, `qcs[i]` certifies it, and `headers[i]` is the header `qcs[i]` proposes.
/// The QC of every vertex at view 2 or later commits its grandparent, so the ledger header of
/// `vertices[j]` is committed by `qcs[j + 2]` and has state version `j`.
pub(crate) struct Chain {
    pub(crate) vertices: Vec<Vertex>,
    pub(crate) headers: Vec<BFTHeader>,
    pub(crate) qcs: Vec<QuorumCertificate>,
}

impl Chain {
    pub(crate) fn new(validators: &Validators, length: usize) -> Chain {
        let genesis = Vertex::genesis(LedgerHeader::genesis());
        let genesis_qc = genesis.genesis_qc();
        let mut headers = vec![genesis_qc.proposed().clone()];
        let mut vertices = vec![genesis];
        let mut qcs = vec![genesis_qc];

        for i in 1..=length {
            let command = Command::new(vec![i as u8]);
            let parent_header = headers[i - 1].clone();
            let accumulator_state = LedgerAccumulator::accumulate(
                &parent_header.ledger_header.accumulator_state,
                &command.hash(),
            );

            let vertex = Vertex::new(ViewNumber::new(i as u64), qcs[i - 1].clone(), vec![command]);
            let header = BFTHeader::new(
                vertex.view,
                vertex.id,
                LedgerHeader::new(Epoch::new(0), vertex.view, accumulator_state, i as u64),
            );
            let committed = if i >= 2 {
                Some(headers[i - 2].clone())
            } else {
                None
            };
            let vote_data = VoteData::new(header.clone(), parent_header, committed);
            let signatures = validators.sign(&vote_data, validators.keypairs.len());

            qcs.push(QuorumCertificate::new(vote_data, signatures));
            headers.push(header);
            vertices.push(vertex);
        }

        Chain {
            vertices,
            headers,
            qcs,
        }
    }

    pub(crate) fn genesis(&self) -> &Vertex {
        &self.vertices[0]
    }

    /// Get a `HighQC` whose highest QC certifies `vertices[highest]` and whose highest committed QC
    /// certifies `vertices[committed]`.
    pub(crate) fn high_qc(&self, highest: usize, committed: usize) -> HighQC {
        HighQC::new(self.qcs[highest].clone(), self.qcs[committed].clone(), None)
    }

    /// Get the proof that the ledger header of `vertices[j]` is committed.
    pub(crate) fn ledger_proof(&self, j: usize) -> LedgerProof {
        if j == 0 {
            return LedgerProof::genesis(self.headers[0].clone());
        }
        self.qcs[j + 2]
            .committed_and_ledger_proof()
            .map(|(_, proof)| proof)
            .unwrap()
    }

    /// Get the commands of `vertices[from + 1..=to]`, in order.
    pub(crate) fn commands(&self, from: usize, to: usize) -> Vec<Command> {
        self.vertices[from + 1..=to]
            .iter()
            .flat_map(|vertex| vertex.commands.iter().cloned())
            .collect()
    }
}
