/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The hash-chain accumulator that summarizes the committed ledger.
//!
//! Committing a command moves the accumulator from state `(v, h)` to `(v + 1, SHA256(h || c))`, where
//! `c` is the SHA256 hash of the command. Two ledgers that agree on an [`AccumulatorState`] therefore
//! agree on every command committed up to its state version.

use crate::types::{
    crypto_primitives::{CryptoHasher, Digest},
    data_types::CryptoHash,
    ledger::AccumulatorState,
};

pub struct LedgerAccumulator;

impl LedgerAccumulator {
    /// Get the accumulator state after committing the command hashing to `command_hash` on top of
    /// `parent`.
    pub fn accumulate(parent: &AccumulatorState, command_hash: &CryptoHash) -> AccumulatorState {
        let mut hasher = CryptoHasher::new();
        hasher.update(parent.accumulator_hash.bytes());
        hasher.update(command_hash.bytes());
        AccumulatorState::new(
            parent.state_version + 1,
            CryptoHash::new(hasher.finalize().into()),
        )
    }

    /// Get the accumulator state after committing every command in `command_hashes`, in order, on top
    /// of `start`.
    pub fn accumulate_all<'a>(
        start: &AccumulatorState,
        command_hashes: impl IntoIterator<Item = &'a CryptoHash>,
    ) -> AccumulatorState {
        command_hashes
            .into_iter()
            .fold(*start, |state, command_hash| Self::accumulate(&state, command_hash))
    }

    /// Check whether committing `command_hashes` on top of `start` yields exactly `end`.
    pub fn verify<'a>(
        start: &AccumulatorState,
        command_hashes: impl IntoIterator<Item = &'a CryptoHash>,
        end: &AccumulatorState,
    ) -> bool {
        let replayed = Self::accumulate_all(start, command_hashes);
        replayed.state_version == end.state_version && replayed.accumulator_hash == end.accumulator_hash
    }
}
