/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Verification of [`SyncResponse`]s.
//!
//! A response is only ever turned into a [`LedgerUpdate`] if it passes both of the following checks:
//! 1. **Accumulator continuity**: replaying the response's commands on top of the accumulator state of
//!    `start` yields exactly the accumulator state of `end`.
//! 2. **Validator quorum**: the signatures in `end` are correct signatures over the vote data that
//!    committed `end`'s ledger header, by members of the expected validator set whose powers add up to
//!    a quorum.

use crate::types::{certificates::LedgerProofError, data_types::CryptoHash, validator_set::ValidatorSet};

use super::{
    accumulator::LedgerAccumulator,
    messages::{LedgerUpdate, SyncResponse},
};

/// Reasons a [`SyncResponse`] is rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncResponseError {
    /// The response carries no commands.
    EmptyResponse,
    /// Replaying the commands on top of `start` does not yield `end`.
    AccumulatorMismatch,
    /// A signature in `end` does not verify, or was made by a key that is not a validator.
    InvalidSignature { signer: [u8; 32] },
    /// The signers of `end` are valid but do not make up a quorum.
    QuorumNotReached,
}

impl From<LedgerProofError> for SyncResponseError {
    fn from(value: LedgerProofError) -> Self {
        match value {
            LedgerProofError::InvalidSignature { signer } => SyncResponseError::InvalidSignature { signer },
            LedgerProofError::QuorumNotReached => SyncResponseError::QuorumNotReached,
        }
    }
}

/// Verify `response` against `validator_set`, and turn it into a [`LedgerUpdate`] if it is correct.
pub fn verify_sync_response(
    response: SyncResponse,
    validator_set: &ValidatorSet,
) -> Result<LedgerUpdate, SyncResponseError> {
    if response.commands.is_empty() {
        return Err(SyncResponseError::EmptyResponse);
    }

    let command_hashes: Vec<CryptoHash> = response.commands.iter().map(|command| command.hash()).collect();
    if !LedgerAccumulator::verify(
        response.start.accumulator_state(),
        &command_hashes,
        response.end.accumulator_state(),
    ) {
        return Err(SyncResponseError::AccumulatorMismatch);
    }

    response.end.verify_signatures(validator_set)?;

    Ok(LedgerUpdate {
        commands: response.commands,
        tail: response.end,
    })
}
