/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Messages of the ledger sync protocol.
//!
//! [`StatusRequest`], [`StatusResponse`], [`SyncRequest`] and [`SyncResponse`] are sent between
//! replicas. [`LocalSyncRequest`] and
//! [`LedgerUpdate`] never leave the replica: they are how the BFT sync engine, the ledger sync client,
//! and the ledger talk to each other inside the sync loop.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::networking::messages::Message;
use crate::types::{
    certificates::LedgerProof,
    crypto_primitives::VerifyingKey,
    data_types::{ChainID, Command},
};

#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub enum LedgerSyncMessage {
    StatusRequest(StatusRequest),
    StatusResponse(StatusResponse),
    SyncRequest(SyncRequest),
    SyncResponse(SyncResponse),
}

/// Request for a peer's current committed ledger header, sent during a sync check.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct StatusRequest {
    pub chain_id: ChainID,
}

/// The proof of the sender's current committed ledger header.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct StatusResponse {
    pub header: LedgerProof,
}

/// Request for the committed commands that come after `current_header`.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct SyncRequest {
    pub chain_id: ChainID,
    pub current_header: LedgerProof,
}

/// A batch of committed commands, which starts right after `start` and ends exactly at `end`.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct SyncResponse {
    pub commands: Vec<Command>,
    pub start: LedgerProof,
    pub end: LedgerProof,
}

impl From<StatusRequest> for Message {
    fn from(value: StatusRequest) -> Self {
        Message::LedgerSyncMessage(LedgerSyncMessage::StatusRequest(value))
    }
}

impl From<StatusResponse> for Message {
    fn from(value: StatusResponse) -> Self {
        Message::LedgerSyncMessage(LedgerSyncMessage::StatusResponse(value))
    }
}

impl From<SyncRequest> for Message {
    fn from(value: SyncRequest) -> Self {
        Message::LedgerSyncMessage(LedgerSyncMessage::SyncRequest(value))
    }
}

impl From<SyncResponse> for Message {
    fn from(value: SyncResponse) -> Self {
        Message::LedgerSyncMessage(LedgerSyncMessage::SyncResponse(value))
    }
}

/// Request from the BFT sync engine to bring the committed ledger up to at least `target`, by syncing
/// from one of `target_nodes`.
#[derive(Clone, Debug)]
pub struct LocalSyncRequest {
    pub target: LedgerProof,
    pub target_nodes: Vec<VerifyingKey>,
}

/// A verified extension of the committed ledger: `commands` are committed, and `tail` proves the ledger
/// header that results from committing them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerUpdate {
    pub commands: Vec<Command>,
    pub tail: LedgerProof,
}
