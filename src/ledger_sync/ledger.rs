/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable storage for the committed ledger.

use crate::types::{
    certificates::LedgerProof,
    data_types::{Command, StateVersion},
};

use super::messages::LedgerUpdate;

pub trait Ledger {
    /// Get the proof of the latest committed ledger header.
    fn current_proof(&self) -> LedgerProof;

    /// Get the commands committed strictly after `state_version`, up to the furthest stored proof that
    /// is at most `limit` commands away, together with that proof.
    ///
    /// Returns `None` if nothing has been committed after `state_version`, or if no stored proof lies
    /// within `limit` commands of it.
    fn commands_after(
        &self,
        state_version: StateVersion,
        limit: usize,
    ) -> Option<(Vec<Command>, LedgerProof)>;

    /// Commit a verified ledger update. Updates that do not extend the current ledger are ignored.
    fn commit(&mut self, update: &LedgerUpdate);
}
