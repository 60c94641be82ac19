/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Implements the [`LedgerSyncServer`], which answers other replicas' [`SyncRequest`]s with batches of
//! committed commands, and their [`StatusRequest`]s with the proof of the current committed header.
//!
//! The server never answers with an empty batch: a requester that is already up to date with the
//! server's ledger gets no response, and its own patience timeout moves it on to another peer.

use std::{sync::mpsc::Sender, time::SystemTime};

use crate::events::{Event, ReceiveSyncRequestEvent, SendSyncResponseEvent};
use crate::networking::{network::Network, sending::SenderHandle};
use crate::types::{crypto_primitives::VerifyingKey, data_types::ChainID};

use super::{
    ledger::Ledger,
    messages::{StatusRequest, StatusResponse, SyncRequest, SyncResponse},
};

pub struct LedgerSyncServer<N: Network> {
    config: LedgerSyncServerConfiguration,
    sender: SenderHandle<N>,
    event_publisher: Option<Sender<Event>>,
}

impl<N: Network> LedgerSyncServer<N> {
    pub fn new(
        config: LedgerSyncServerConfiguration,
        network: N,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            config,
            sender: SenderHandle::new(network),
            event_publisher,
        }
    }

    /// Respond to `request` from `origin` with the proof of `ledger`'s current header.
    pub fn on_status_request<L: Ledger>(&mut self, origin: VerifyingKey, request: StatusRequest, ledger: &L) {
        if request.chain_id != self.config.chain_id {
            return;
        }

        let header = ledger.current_proof();
        log::debug!("Answering status request from {:?} with {}.", origin, header.state_version());
        self.sender.send(origin, StatusResponse { header });
    }

    /// Respond to `request` from `origin` with up to `batch_size` commands from `ledger`.
    pub fn on_sync_request<L: Ledger>(&mut self, origin: VerifyingKey, request: SyncRequest, ledger: &L) {
        if request.chain_id != self.config.chain_id {
            return;
        }

        let current_version = request.current_header.state_version();
        Event::ReceiveSyncRequest(ReceiveSyncRequestEvent {
            timestamp: SystemTime::now(),
            origin,
            current_version,
        })
        .publish(&self.event_publisher);

        let (commands, end) = match ledger.commands_after(current_version, self.config.batch_size) {
            Some((commands, end)) if !commands.is_empty() => (commands, end),
            _ => return,
        };

        let end_version = end.state_version();
        self.sender.send(
            origin,
            SyncResponse {
                commands,
                start: request.current_header,
                end,
            },
        );

        Event::SendSyncResponse(SendSyncResponseEvent {
            timestamp: SystemTime::now(),
            peer: origin,
            start_version: current_version,
            end_version,
        })
        .publish(&self.event_publisher);
    }
}

/// Immutable parameters that define the behaviour of the [`LedgerSyncServer`].
pub struct LedgerSyncServerConfiguration {
    pub chain_id: ChainID,
    /// The maximum number of commands sent in one [`SyncResponse`].
    pub batch_size: usize,
}
