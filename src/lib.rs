/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Vertex and ledger synchronization for HotStuff-style BFT replicas.
//!
//! A replica that misses messages, restarts, or is partitioned away from the rest of the network falls
//! behind in two ways: its vertex store lacks the vertices that newer QCs certify, and its committed
//! ledger lacks the commands that the rest of the network has since committed. This crate implements
//! the protocols that catch a replica up on both, without ever applying data that a quorum of
//! validators has not vouched for:
//! - [BFT sync](bft_sync) fetches missing vertices from peers and installs them into the
//!   [vertex store](vertex_store) in an order that respects the store's invariants.
//! - [Ledger sync](ledger_sync) fetches committed commands from peers and verifies them against the
//!   [accumulator](ledger_sync::accumulator) and the signatures of the validator set before they are
//!   committed to the [ledger](ledger_sync::ledger).
//!
//! Both protocols run on a single [sync loop](sync_loop) thread, started through a
//! [replica](replica) together with a network poller and an [event bus](events).

pub mod bft_sync;

pub mod ledger_sync;

pub mod events;

pub mod logging;

pub mod networking;

pub mod pacemaker;

pub mod replica;

pub mod sync_loop;

pub mod types;

pub mod vertex_store;

pub(crate) mod event_bus;

pub(crate) mod timeouts;
