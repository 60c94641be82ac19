/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Implements the [`LedgerSyncClient`], which brings the committed ledger up to a target ledger header,
//! either on behalf of the [BFT sync engine](crate::bft_sync) or after finding out through a sync check
//! that its peers are ahead.
//!
//! ## Sync process
//!
//! The client holds the proof of the current committed ledger header and a target header. Whenever the
//! current header is behind the target and no request is outstanding, the client sends a
//! [`SyncRequest`] carrying its current header to a peer chosen uniformly at random among the target's
//! candidate nodes, and waits up to the configured patience for a response.
//!
//! A [`SyncResponse`] is only considered if it comes from the peer that was asked and starts exactly
//! at the current header. It is then [verified](super::verification), and if it passes, returned to
//! the caller as a [`LedgerUpdate`] to be committed. Once the update is committed and fed back through
//! [`on_ledger_update`](LedgerSyncClient::on_ledger_update), the client requests the next batch if it
//! is still behind. If the update is not fed back within [`LEDGER_UPDATE_PATIENCE`], the client asks
//! again from its current header.
//!
//! A response that fails verification is dropped. The outstanding request then simply times out, and
//! the client retries with another randomly chosen peer.
//!
//! ## Sync checks
//!
//! A client that is not syncing, or that is syncing with nobody left to ask, can be asked to run a sync
//! check. It sends a [`StatusRequest`] to up to `sync_check_max_peers` randomly chosen validators, and
//! collects their [`StatusResponse`]s until every asked peer has answered or the patience runs out. If any correctly signed header it received is ahead
//! of the current header, the client starts syncing towards the highest one, using the peers that
//! reported it as candidates.
//!
//! A client that finds itself behind its target with no candidate to ask falls back to a sync check.

use std::{
    sync::mpsc::Sender,
    time::{Duration, Instant, SystemTime},
};

use rand::{rngs::StdRng, seq::SliceRandom};

use crate::events::*;
use crate::networking::{network::Network, sending::SenderHandle};
use crate::timeouts::TimeoutQueue;
use crate::types::{
    certificates::LedgerProof,
    crypto_primitives::VerifyingKey,
    data_types::ChainID,
    validator_set::ValidatorSet,
};

use super::{
    messages::{LedgerUpdate, LocalSyncRequest, StatusRequest, StatusResponse, SyncRequest, SyncResponse},
    verification::verify_sync_response,
};

/// How long to wait for a verified [`LedgerUpdate`] to be fed back before requesting it again.
pub const LEDGER_UPDATE_PATIENCE: Duration = Duration::from_millis(500);

pub struct LedgerSyncClient<N: Network> {
    config: LedgerSyncClientConfiguration,
    sender: SenderHandle<N>,
    event_publisher: Option<Sender<Event>>,
    rng: StdRng,
    current_header: LedgerProof,
    target: LedgerProof,
    candidates: Vec<VerifyingKey>,
    outstanding: Option<OutstandingRequest>,
    sync_check: Option<SyncCheck>,
    timeouts: TimeoutQueue<ClientTimeout>,
    next_seq: u64,
}

struct OutstandingRequest {
    peer: VerifyingKey,
    seq: u64,
}

struct SyncCheck {
    asked: Vec<VerifyingKey>,
    // Headers that are not ahead of the current header are kept too: they count as answers.
    responses: Vec<(VerifyingKey, LedgerProof)>,
    seq: u64,
}

enum ClientTimeout {
    SyncRequest(u64),
    SyncCheck(u64),
    LedgerUpdate,
}

impl<N: Network> LedgerSyncClient<N> {
    pub fn new(
        config: LedgerSyncClientConfiguration,
        network: N,
        current_header: LedgerProof,
        rng: StdRng,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            config,
            sender: SenderHandle::new(network),
            event_publisher,
            rng,
            target: current_header.clone(),
            current_header,
            candidates: Vec::new(),
            outstanding: None,
            sync_check: None,
            timeouts: TimeoutQueue::new(),
            next_seq: 0,
        }
    }

    /// Start syncing towards `request.target`, unless the client is already syncing towards a target at
    /// least as high. Abandons any sync check in progress.
    pub fn on_local_sync_request(&mut self, request: LocalSyncRequest) {
        if request.target.state_version() <= self.target.state_version() {
            log::debug!(
                "Ignoring local sync request to {}: already targeting {}.",
                request.target.state_version(),
                self.target.state_version()
            );
            return;
        }

        self.sync_check = None;
        self.target = request.target;
        for node in request.target_nodes {
            if node != self.config.me && !self.candidates.contains(&node) {
                self.candidates.push(node);
            }
        }

        self.start_sync();
    }

    /// Verify a response to the outstanding [`SyncRequest`]. Returns the resulting [`LedgerUpdate`] if
    /// the response is correct.
    ///
    /// The update is not applied here: the caller must commit it and then pass it back through
    /// [`on_ledger_update`](Self::on_ledger_update).
    pub fn on_sync_response(&mut self, origin: &VerifyingKey, response: SyncResponse) -> Option<LedgerUpdate> {
        match &self.outstanding {
            Some(outstanding) if outstanding.peer == *origin => (),
            _ => {
                log::debug!("Ignoring unexpected sync response from {:?}.", origin);
                return None;
            }
        }

        if response.start.accumulator_state() != self.current_header.accumulator_state() {
            log::debug!(
                "Ignoring stale sync response from {:?}: starts at {}, current is {}.",
                origin,
                response.start.state_version(),
                self.current_header.state_version()
            );
            return None;
        }

        Event::ReceiveSyncResponse(ReceiveSyncResponseEvent {
            timestamp: SystemTime::now(),
            origin: *origin,
            start_version: response.start.state_version(),
            end_version: response.end.state_version(),
        })
        .publish(&self.event_publisher);

        match verify_sync_response(response, &self.config.validator_set) {
            Ok(update) => {
                self.outstanding = None;
                self.timeouts
                    .schedule(ClientTimeout::LedgerUpdate, LEDGER_UPDATE_PATIENCE);
                Some(update)
            }
            Err(reason) => {
                log::warn!("Rejecting sync response from {:?}: {:?}.", origin, reason);
                Event::RejectSyncResponse(RejectSyncResponseEvent {
                    timestamp: SystemTime::now(),
                    origin: *origin,
                    reason,
                })
                .publish(&self.event_publisher);
                None
            }
        }
    }

    /// Advance the current header to `update.tail` if it is higher, and request the next batch if the
    /// client is still behind its target.
    pub fn on_ledger_update(&mut self, update: &LedgerUpdate) {
        if update.tail.state_version() > self.current_header.state_version() {
            self.current_header = update.tail.clone();
        }

        if self.is_syncing() {
            if self.outstanding.is_none() {
                self.send_request();
            }
        } else {
            self.candidates.clear();
        }
    }

    /// Start a sync check, unless the client is already checking, or is syncing and has a candidate to
    /// sync from.
    pub fn on_sync_check_trigger(&mut self) {
        if self.sync_check.is_some() || (self.is_syncing() && !self.candidates.is_empty()) {
            return;
        }
        self.start_sync_check();
    }

    /// Record a peer's answer to the sync check in progress. Once every asked peer has answered, start
    /// syncing towards the highest header among the answers, if it is ahead.
    pub fn on_status_response(&mut self, origin: &VerifyingKey, response: StatusResponse) {
        let current_version = self.current_header.state_version();
        let sync_check = match &mut self.sync_check {
            Some(sync_check) => sync_check,
            None => {
                log::debug!("Ignoring status response from {:?}: no sync check in progress.", origin);
                return;
            }
        };

        if !sync_check.asked.contains(origin)
            || sync_check.responses.iter().any(|(peer, _)| peer == origin)
        {
            log::debug!("Ignoring unexpected status response from {:?}.", origin);
            return;
        }

        if response.header.state_version() > current_version {
            if let Err(err) = response.header.verify_signatures(&self.config.validator_set) {
                log::warn!("Ignoring status response from {:?}: {:?}.", origin, err);
                return;
            }
        }

        sync_check.responses.push((*origin, response.header));
        if sync_check.responses.len() == sync_check.asked.len() {
            self.finish_sync_check();
        }
    }

    /// Handle every timeout that expired at or before `now`.
    pub fn tick(&mut self, now: Instant) {
        for timeout in self.timeouts.pop_expired(now) {
            match timeout {
                ClientTimeout::SyncRequest(seq) => self.on_request_timeout(seq),
                ClientTimeout::SyncCheck(seq) => self.on_sync_check_timeout(seq),
                ClientTimeout::LedgerUpdate => self.on_ledger_update_timeout(),
            }
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timeouts.next_deadline()
    }

    pub fn current_header(&self) -> &LedgerProof {
        &self.current_header
    }

    pub fn target(&self) -> &LedgerProof {
        &self.target
    }

    /// Check whether the current header is behind the target.
    pub fn is_syncing(&self) -> bool {
        self.current_header.state_version() < self.target.state_version()
    }

    pub fn is_checking(&self) -> bool {
        self.sync_check.is_some()
    }

    fn on_request_timeout(&mut self, seq: u64) {
        let outstanding = match self.outstanding.take() {
            Some(outstanding) if outstanding.seq == seq => outstanding,
            other => {
                // Stale timeout of a request that was already answered.
                self.outstanding = other;
                return;
            }
        };
        log::debug!("Sync request to {:?} timed out.", outstanding.peer);

        if self.is_syncing() {
            self.send_request();
        }
    }

    fn on_sync_check_timeout(&mut self, seq: u64) {
        match &self.sync_check {
            Some(sync_check) if sync_check.seq == seq => (),
            _ => return,
        }
        self.finish_sync_check();
    }

    // Ask again from the current header if a verified update was never fed back.
    fn on_ledger_update_timeout(&mut self) {
        if self.is_syncing() && self.outstanding.is_none() {
            log::debug!("No ledger update since the last verified response, asking again.");
            self.send_request();
        }
    }

    fn start_sync(&mut self) {
        Event::StartLedgerSync(StartLedgerSyncEvent {
            timestamp: SystemTime::now(),
            current_version: self.current_header.state_version(),
            target_version: self.target.state_version(),
        })
        .publish(&self.event_publisher);

        if self.outstanding.is_none() {
            self.send_request();
        }
    }

    fn start_sync_check(&mut self) {
        let mut peers: Vec<VerifyingKey> = self
            .config
            .validator_set
            .validators()
            .filter(|validator| **validator != self.config.me)
            .copied()
            .collect();
        peers.shuffle(&mut self.rng);
        peers.truncate(self.config.sync_check_max_peers);

        if peers.is_empty() {
            log::warn!("No peer to run a sync check with.");
            return;
        }

        for peer in &peers {
            self.sender.send(
                *peer,
                StatusRequest {
                    chain_id: self.config.chain_id,
                },
            );
        }

        let seq = self.next_seq();
        self.timeouts
            .schedule(ClientTimeout::SyncCheck(seq), self.config.patience);

        Event::StartSyncCheck(StartSyncCheckEvent {
            timestamp: SystemTime::now(),
            current_version: self.current_header.state_version(),
            peers: peers.len(),
        })
        .publish(&self.event_publisher);

        self.sync_check = Some(SyncCheck {
            asked: peers,
            responses: Vec::new(),
            seq,
        });
    }

    // Close the sync check in progress, and sync with the peers at the highest header if it is ahead.
    fn finish_sync_check(&mut self) {
        let sync_check = match self.sync_check.take() {
            Some(sync_check) => sync_check,
            None => return,
        };

        let highest = match sync_check
            .responses
            .iter()
            .map(|(_, header)| header)
            .max_by_key(|header| header.state_version())
        {
            Some(highest) if highest.state_version() > self.current_header.state_version() => {
                highest.clone()
            }
            _ => {
                log::debug!(
                    "Sync check found no peer ahead of {} among {} answers.",
                    self.current_header.state_version(),
                    sync_check.responses.len()
                );
                return;
            }
        };

        self.candidates = sync_check
            .responses
            .into_iter()
            .filter(|(_, header)| header.accumulator_state() == highest.accumulator_state())
            .map(|(peer, _)| peer)
            .collect();
        if highest.state_version() > self.target.state_version() {
            self.target = highest;
        }

        self.start_sync();
    }

    fn send_request(&mut self) {
        let peer = match self.candidates.choose(&mut self.rng) {
            Some(peer) => *peer,
            None => {
                log::info!(
                    "No candidate to sync the ledger from at {}, checking peers' status.",
                    self.current_header.state_version()
                );
                if self.sync_check.is_none() {
                    self.start_sync_check();
                }
                return;
            }
        };

        let seq = self.next_seq();
        self.outstanding = Some(OutstandingRequest { peer, seq });
        self.timeouts
            .schedule(ClientTimeout::SyncRequest(seq), self.config.patience);

        self.sender.send(
            peer,
            SyncRequest {
                chain_id: self.config.chain_id,
                current_header: self.current_header.clone(),
            },
        );

        Event::SendSyncRequest(SendSyncRequestEvent {
            timestamp: SystemTime::now(),
            peer,
            current_version: self.current_header.state_version(),
        })
        .publish(&self.event_publisher);
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

/// Immutable parameters that define the behaviour of the [`LedgerSyncClient`].
pub struct LedgerSyncClientConfiguration {
    pub chain_id: ChainID,
    /// The replica's own verifying key. Never asked for ledger batches or status.
    pub me: VerifyingKey,
    /// The validator set expected to have signed the ledger proofs in sync and status responses. Sync
    /// checks ask its members.
    pub validator_set: ValidatorSet,
    /// How long to wait for a response to a [`SyncRequest`] before asking another peer, and for the
    /// answers to a sync check.
    pub patience: Duration,
    /// The maximum number of peers asked for their status in one sync check.
    pub sync_check_max_peers: usize,
}
