/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Events that the sync loop emits while synchronizing a replica.
//!
//! An event for a given action indicates that the action has been completed. Users can register
//! handlers for each event type through the [`ReplicaSpec`](crate::replica::ReplicaSpec) builder. If
//! [`log_events`](crate::replica::Configuration::log_events) is set, each event is also logged in the
//! format described in [`logging`](crate::logging).

use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::bft_sync::{messages::GetVerticesRequest, types::SyncStage};
use crate::ledger_sync::verification::SyncResponseError;
use crate::types::{
    crypto_primitives::VerifyingKey,
    data_types::{CryptoHash, StateVersion, ViewNumber},
};

/// Enumerates all events defined for the sync loop.
pub enum Event {
    // BFT sync events.
    StartBFTSync(StartBFTSyncEvent),
    SyncedToQC(SyncedToQCEvent),
    SendGetVertices(SendGetVerticesEvent),
    ReceiveGetVertices(ReceiveGetVerticesEvent),
    VertexRequestTimeout(VertexRequestTimeoutEvent),
    RebuildVertexStore(RebuildVertexStoreEvent),
    // Ledger sync client events.
    StartLedgerSync(StartLedgerSyncEvent),
    StartSyncCheck(StartSyncCheckEvent),
    SendSyncRequest(SendSyncRequestEvent),
    ReceiveSyncResponse(ReceiveSyncResponseEvent),
    RejectSyncResponse(RejectSyncResponseEvent),
    CommitLedgerUpdate(CommitLedgerUpdateEvent),
    // Ledger sync server events.
    ReceiveSyncRequest(ReceiveSyncRequestEvent),
    SendSyncResponse(SendSyncResponseEvent),
}

impl Event {
    /// Send the event to the event bus, if there is one.
    pub(crate) fn publish(self, event_publisher: &Option<Sender<Event>>) {
        if let Some(event_publisher) = event_publisher {
            // The event bus only hangs up while the replica is being dropped.
            let _ = event_publisher.send(self);
        }
    }
}

/// The BFT sync engine started syncing towards the vertex `target`, asking `author` first.
pub struct StartBFTSyncEvent {
    pub timestamp: SystemTime,
    pub target: CryptoHash,
    pub view: ViewNumber,
    pub author: VerifyingKey,
    pub stage: SyncStage,
}

/// A QC for `vertex` was installed into the vertex store by the BFT sync engine.
pub struct SyncedToQCEvent {
    pub timestamp: SystemTime,
    pub vertex: CryptoHash,
    pub view: ViewNumber,
}

pub struct SendGetVerticesEvent {
    pub timestamp: SystemTime,
    pub peer: VerifyingKey,
    pub request: GetVerticesRequest,
}

/// A response to an outstanding vertex request was received.
pub struct ReceiveGetVerticesEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub vertex: CryptoHash,
    pub count: u32,
}

pub struct VertexRequestTimeoutEvent {
    pub timestamp: SystemTime,
    pub request: GetVerticesRequest,
}

/// The vertex store was rebuilt from a new committed `root`.
pub struct RebuildVertexStoreEvent {
    pub timestamp: SystemTime,
    pub root: CryptoHash,
    pub root_view: ViewNumber,
}

/// The ledger sync client accepted a new target.
pub struct StartLedgerSyncEvent {
    pub timestamp: SystemTime,
    pub current_version: StateVersion,
    pub target_version: StateVersion,
}

/// The ledger sync client asked `peers` validators for their current committed ledger header.
pub struct StartSyncCheckEvent {
    pub timestamp: SystemTime,
    pub current_version: StateVersion,
    pub peers: usize,
}

pub struct SendSyncRequestEvent {
    pub timestamp: SystemTime,
    pub peer: VerifyingKey,
    pub current_version: StateVersion,
}

pub struct ReceiveSyncResponseEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub start_version: StateVersion,
    pub end_version: StateVersion,
}

/// A sync response failed verification and was discarded.
pub struct RejectSyncResponseEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub reason: SyncResponseError,
}

/// A verified ledger update was committed into the ledger.
pub struct CommitLedgerUpdateEvent {
    pub timestamp: SystemTime,
    pub tail_version: StateVersion,
    pub commands: usize,
}

pub struct ReceiveSyncRequestEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub current_version: StateVersion,
}

pub struct SendSyncResponseEvent {
    pub timestamp: SystemTime,
    pub peer: VerifyingKey,
    pub start_version: StateVersion,
    pub end_version: StateVersion,
}
