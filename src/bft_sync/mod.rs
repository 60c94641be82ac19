/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Subprotocol that brings the local vertex store up to a quorum certificate formed elsewhere.
//!
//! ## Syncing to a QC
//!
//! Whenever a replica learns of a [`HighQC`](crate::types::certificates::HighQC) (from a proposal, a
//! vote, or a timeout message), it calls [`BFTSync::sync_to_qc`]. If the vertex that the highest QC
//! certifies is already in the vertex store, the QC is installed right away. Otherwise the engine
//! starts a sync towards that vertex, in one of two ways:
//! 1. **QC sync**: if the highest committed vertex is known locally (or the store's root is already past
//!    it), the engine walks backwards from the target, fetching one vertex at a time until it reaches a
//!    vertex whose parent is in the store, then inserts the fetched chain in ancestor-to-descendant
//!    order.
//! 2. **Committed sync**: otherwise the store is too far behind to be extended. The engine fetches the
//!    three vertices that end at the highest committed QC's vertex, waits for the
//!    [ledger sync](crate::ledger_sync) subprotocol to bring the committed ledger up to the committed
//!    header, rebuilds the store from the committed vertex, and then performs a QC sync.
//!
//! ## Requests and retries
//!
//! Vertex requests are sent to one peer at a time: the author of the QC first, then the QC's other
//! signers. Concurrent syncs that need the same vertices share a single outstanding request. A request
//! that is not answered within the configured patience is dropped, and every sync that was waiting on
//! it restarts with a randomly chosen peer from the request's candidates.
//!
//! The server side of the protocol is the [`VertexSyncServer`].

pub mod messages;

pub mod types;

mod implementation;
pub use implementation::{BFTSync, BFTSyncConfiguration};

mod server;
pub use server::VertexSyncServer;
