/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A queue of scheduled timeouts, fired by the sync loop.
//!
//! Components that need to "resume later" (the BFT sync engine when a vertex request goes unanswered,
//! and the ledger sync client when a sync request goes unanswered) do not block or spawn timer threads.
//! Instead they schedule a timeout value in a `TimeoutQueue`, and the sync loop periodically asks each
//! component to handle the timeouts whose deadlines have passed.

use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

pub(crate) struct TimeoutQueue<T> {
    // The sequence number keeps timeouts with identical deadlines in scheduling order.
    entries: BTreeMap<(Instant, u64), T>,
    next_seq: u64,
}

impl<T> TimeoutQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Schedule `timeout` to fire `delay` from now.
    pub(crate) fn schedule(&mut self, timeout: T, delay: Duration) {
        self.schedule_at(timeout, Instant::now() + delay)
    }

    pub(crate) fn schedule_at(&mut self, timeout: T, deadline: Instant) {
        self.entries.insert((deadline, self.next_seq), timeout);
        self.next_seq += 1;
    }

    /// Remove and return every timeout whose deadline is at or before `now`, earliest first.
    pub(crate) fn pop_expired(&mut self, now: Instant) -> Vec<T> {
        let mut expired = Vec::new();
        while let Some(entry) = self.entries.first_entry() {
            if entry.key().0 > now {
                break;
            }
            expired.push(entry.remove());
        }
        expired
    }

    /// Get the earliest deadline among the scheduled timeouts, if any.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.entries.keys().next().map(|(deadline, _)| *deadline)
    }
}
