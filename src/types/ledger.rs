/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Summaries of committed ledger progress.

use std::cmp::Ordering;

use borsh::{BorshDeserialize, BorshSerialize};

use super::data_types::{CryptoHash, Epoch, StateVersion, ViewNumber};

/// The running digest of the ledger accumulator after `state_version` commands have been committed.
///
/// `AccumulatorState`s are ordered by their state version alone. Two states with the same version
/// but different hashes compare as equal under `Ord` even though they are not `==`; callers that care
/// about forks must compare the hashes separately.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct AccumulatorState {
    pub state_version: StateVersion,
    pub accumulator_hash: CryptoHash,
}

impl AccumulatorState {
    pub fn new(state_version: StateVersion, accumulator_hash: CryptoHash) -> Self {
        Self {
            state_version,
            accumulator_hash,
        }
    }

    /// The accumulator state of an empty ledger.
    pub const fn genesis() -> Self {
        Self {
            state_version: StateVersion::new(0),
            accumulator_hash: CryptoHash::new([0u8; 32]),
        }
    }
}

impl PartialOrd for AccumulatorState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AccumulatorState {
    fn cmp(&self, other: &Self) -> Ordering {
        self.state_version.cmp(&other.state_version)
    }
}

/// A verifiable summary of committed ledger progress.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct LedgerHeader {
    pub epoch: Epoch,
    pub view: ViewNumber,
    pub accumulator_state: AccumulatorState,
    /// Milliseconds since the Unix Epoch at which the header was proposed.
    pub timestamp: u64,
}

impl LedgerHeader {
    pub fn new(
        epoch: Epoch,
        view: ViewNumber,
        accumulator_state: AccumulatorState,
        timestamp: u64,
    ) -> Self {
        Self {
            epoch,
            view,
            accumulator_state,
            timestamp,
        }
    }

    /// The header of the empty ledger at epoch 0, view 0.
    pub const fn genesis() -> Self {
        Self {
            epoch: Epoch::new(0),
            view: ViewNumber::genesis(),
            accumulator_state: AccumulatorState::genesis(),
            timestamp: 0,
        }
    }

    pub fn state_version(&self) -> StateVersion {
        self.accumulator_state.state_version
    }
}
