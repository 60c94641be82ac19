/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Quorum certificates, timeout certificates, and the proofs of committed ledger state derived from them.
//!
//! ## Vote data
//!
//! Validators vote for a [`VoteData`]: the header of the vertex being proposed, the header of its parent,
//! and, if voting for the proposed vertex closes a 3-chain, the header of the vertex that thereby becomes
//! committed. A [`QuorumCertificate`] is a `VoteData` together with the signatures of a quorum of
//! validators over its [`message_bytes`](VoteData::message_bytes).
//!
//! ## Ledger proofs
//!
//! A quorum certificate that commits a vertex is simultaneously a proof that the committed vertex's
//! [`LedgerHeader`] is final. [`LedgerProof`] packages the committed header together with everything
//! needed to re-verify the signatures over it.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    crypto_primitives::{verify_signature, VerifyingKey},
    data_types::{CryptoHash, SignatureSet, StateVersion, ViewNumber},
    ledger::{AccumulatorState, LedgerHeader},
    validator_set::{ValidationState, ValidatorSet},
};

/// The consensus-level header of a vertex.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct BFTHeader {
    pub view: ViewNumber,
    pub vertex_id: CryptoHash,
    pub ledger_header: LedgerHeader,
}

impl BFTHeader {
    pub fn new(view: ViewNumber, vertex_id: CryptoHash, ledger_header: LedgerHeader) -> Self {
        Self {
            view,
            vertex_id,
            ledger_header,
        }
    }
}

/// What validators sign when they vote.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct VoteData {
    pub proposed: BFTHeader,
    pub parent: BFTHeader,
    pub committed: Option<BFTHeader>,
}

impl VoteData {
    pub fn new(proposed: BFTHeader, parent: BFTHeader, committed: Option<BFTHeader>) -> Self {
        Self {
            proposed,
            parent,
            committed,
        }
    }

    /// Get the bytes that validators sign when voting for this `VoteData`.
    pub fn message_bytes(&self) -> Vec<u8> {
        // Writing into a `Vec` is infallible.
        self.try_to_vec().unwrap_or_default()
    }
}

/// Evidence that a quorum of validators voted for a [`VoteData`].
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct QuorumCertificate {
    pub vote_data: VoteData,
    pub signatures: SignatureSet,
}

impl QuorumCertificate {
    pub fn new(vote_data: VoteData, signatures: SignatureSet) -> Self {
        Self {
            vote_data,
            signatures,
        }
    }

    /// Create the QC that certifies the genesis vertex.
    ///
    /// The genesis QC proposes, extends, and commits the genesis vertex, and carries no signatures.
    pub fn genesis_qc(genesis_header: BFTHeader) -> Self {
        Self {
            vote_data: VoteData::new(
                genesis_header.clone(),
                genesis_header.clone(),
                Some(genesis_header),
            ),
            signatures: SignatureSet::genesis(),
        }
    }

    /// Get the header of the vertex this QC certifies.
    pub fn proposed(&self) -> &BFTHeader {
        &self.vote_data.proposed
    }

    /// Get the header of the parent of the vertex this QC certifies.
    pub fn parent(&self) -> &BFTHeader {
        &self.vote_data.parent
    }

    /// Get the view of the vertex this QC certifies.
    pub fn view(&self) -> ViewNumber {
        self.vote_data.proposed.view
    }

    pub fn is_genesis_qc(&self) -> bool {
        self.view().is_genesis()
    }

    /// Get the verifying keys of the validators that signed this QC, in ascending order.
    ///
    /// Signature set entries whose keys are not valid Ed25519 verifying keys are skipped.
    pub fn signers(&self) -> impl Iterator<Item = VerifyingKey> + '_ {
        self.signatures
            .iter()
            .filter_map(|(signer, _)| VerifyingKey::from_bytes(signer).ok())
    }

    /// If this QC commits a vertex, get the header of the committed vertex together with the proof that
    /// its ledger header is committed.
    pub fn committed_and_ledger_proof(&self) -> Option<(BFTHeader, LedgerProof)> {
        self.vote_data.committed.as_ref().map(|committed| {
            (
                committed.clone(),
                LedgerProof {
                    proposed: self.vote_data.proposed.clone(),
                    parent: self.vote_data.parent.clone(),
                    committed: committed.clone(),
                    signatures: self.signatures.clone(),
                },
            )
        })
    }
}

/// Evidence that a quorum of validators timed out in `view`.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct TimeoutCertificate {
    pub view: ViewNumber,
    pub signatures: SignatureSet,
}

/// The highest QC a replica has seen, the highest QC it has seen commit a vertex, and optionally the
/// highest timeout certificate it has seen.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct HighQC {
    pub highest_qc: QuorumCertificate,
    pub highest_committed_qc: QuorumCertificate,
    pub highest_tc: Option<TimeoutCertificate>,
}

impl HighQC {
    pub fn new(
        highest_qc: QuorumCertificate,
        highest_committed_qc: QuorumCertificate,
        highest_tc: Option<TimeoutCertificate>,
    ) -> Self {
        Self {
            highest_qc,
            highest_committed_qc,
            highest_tc,
        }
    }

    /// Create a `HighQC` where `qc` is both the highest QC and the highest committed QC.
    pub fn from_qc(qc: QuorumCertificate) -> Self {
        Self::new(qc.clone(), qc, None)
    }

    pub fn highest_qc(&self) -> &QuorumCertificate {
        &self.highest_qc
    }

    pub fn highest_committed_qc(&self) -> &QuorumCertificate {
        &self.highest_committed_qc
    }
}

/// A committed [`LedgerHeader`] together with the vote data and signatures of the QC that committed it.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct LedgerProof {
    pub proposed: BFTHeader,
    pub parent: BFTHeader,
    pub committed: BFTHeader,
    pub signatures: SignatureSet,
}

impl LedgerProof {
    /// Create the proof of the genesis ledger header, as committed by the genesis QC.
    pub fn genesis(genesis_header: BFTHeader) -> Self {
        Self {
            proposed: genesis_header.clone(),
            parent: genesis_header.clone(),
            committed: genesis_header,
            signatures: SignatureSet::genesis(),
        }
    }

    pub fn ledger_header(&self) -> &LedgerHeader {
        &self.committed.ledger_header
    }

    pub fn accumulator_state(&self) -> &AccumulatorState {
        &self.committed.ledger_header.accumulator_state
    }

    pub fn state_version(&self) -> StateVersion {
        self.accumulator_state().state_version
    }

    /// Reconstruct the vote data that the signatures in this proof sign over.
    pub fn vote_data(&self) -> VoteData {
        VoteData::new(
            self.proposed.clone(),
            self.parent.clone(),
            Some(self.committed.clone()),
        )
    }

    /// Check that every signature in this proof is a correct signature over its
    /// [vote data](Self::vote_data) by a member of `validator_set`, and that the signers together form a
    /// quorum.
    pub fn verify_signatures(&self, validator_set: &ValidatorSet) -> Result<(), LedgerProofError> {
        let message = self.vote_data().message_bytes();
        let mut validation_state = ValidationState::new(validator_set);
        for (signer_bytes, signature) in self.signatures.iter() {
            let signer = VerifyingKey::from_bytes(signer_bytes).map_err(|_| LedgerProofError::InvalidSignature {
                signer: *signer_bytes,
            })?;
            if !verify_signature(&signer, &message, signature) || !validation_state.add_signer(&signer) {
                return Err(LedgerProofError::InvalidSignature {
                    signer: *signer_bytes,
                });
            }
        }

        if validation_state.is_complete() {
            Ok(())
        } else {
            Err(LedgerProofError::QuorumNotReached)
        }
    }
}

/// Reasons the signatures of a [`LedgerProof`] fail to prove its committed header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerProofError {
    /// A signature does not verify, or was made by a key that is not a validator.
    InvalidSignature { signer: [u8; 32] },
    /// The signatures are valid but their signers do not make up a quorum.
    QuorumNotReached,
}
