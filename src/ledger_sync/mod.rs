/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Subprotocol that catches the committed ledger up to a ledger header that a quorum of validators has
//! committed.
//!
//! The [BFT sync engine](crate::bft_sync) starts ledger sync by sending a
//! [`LocalSyncRequest`](messages::LocalSyncRequest) whenever it needs to rebuild the vertex store from a
//! committed vertex that is ahead of the local ledger. The [`LedgerSyncClient`] fetches verified
//! batches of commands from peers, each of which runs a [`LedgerSyncServer`], until the ledger reaches
//! the requested header.
//!
//! The client can also find out on its own that it is behind: a periodic sync check asks a random
//! subset of the validators for their current committed header, and syncs towards the highest one.

pub mod accumulator;

pub mod ledger;

pub mod messages;

pub mod verification;

mod client;
pub use client::{LedgerSyncClient, LedgerSyncClientConfiguration, LEDGER_UPDATE_PATIENCE};

mod server;
pub use server::{LedgerSyncServer, LedgerSyncServerConfiguration};
