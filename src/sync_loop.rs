/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The sync loop: the single thread that owns all sync state of a replica.
//!
//! Every input that can change sync state arrives on one channel of [`SyncInput`]s:
//! - Messages from peers, forwarded by the poller thread.
//! - QCs formed or received by the local consensus engine, which may trigger a BFT sync.
//! - Ledger updates committed by the local consensus engine.
//!
//! Between inputs, the loop sleeps until the earliest pending timeout of either the BFT sync engine or
//! the ledger sync client, or until the next periodic ledger sync check, and fires whatever is due when
//! it wakes up. Because
//! the loop is the only code that touches the [`VertexStore`] and the [`Ledger`], and handles one input
//! at a time, none of the components it drives need any locking.
//!
//! Verified ledger updates obtained through ledger sync are committed to the ledger, fed back into the
//! ledger sync client and the BFT sync engine, and finally forwarded to the optional downstream
//! subscriber, in that order.

use std::{
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError},
    thread::{self, JoinHandle},
    time::{Duration, Instant, SystemTime},
};

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    bft_sync::{messages::BFTSyncMessage, BFTSync, BFTSyncConfiguration, VertexSyncServer},
    events::{CommitLedgerUpdateEvent, Event},
    ledger_sync::{
        ledger::Ledger,
        messages::{LedgerSyncMessage, LedgerUpdate, LocalSyncRequest},
        LedgerSyncClient, LedgerSyncClientConfiguration, LedgerSyncServer,
        LedgerSyncServerConfiguration,
    },
    networking::{messages::Message, network::Network},
    pacemaker::Pacemaker,
    types::{certificates::HighQC, crypto_primitives::VerifyingKey},
    vertex_store::VertexStore,
};

/// The longest the sync loop waits for an input before checking for shutdown.
const MAX_WAIT: Duration = Duration::from_millis(50);

/// An input to the sync loop.
pub enum SyncInput {
    /// A message received from the peer identified by the verifying key.
    Message(VerifyingKey, Message),
    /// A `HighQC` seen by the local consensus engine, together with the replica that sent it, if any.
    FormedQC {
        high_qc: HighQC,
        author: Option<VerifyingKey>,
    },
    /// A ledger update committed by the local consensus engine.
    LedgerUpdate(LedgerUpdate),
}

#[derive(Debug)]
pub enum SyncLoopError {
    /// Every sender of the input channel has been dropped.
    InputsDisconnected,
}

/// Immutable parameters that define the behaviour of the [`SyncLoop`] and the components it drives.
pub struct SyncLoopConfiguration {
    pub bft_sync: BFTSyncConfiguration,
    pub ledger_sync_client: LedgerSyncClientConfiguration,
    pub ledger_sync_server: LedgerSyncServerConfiguration,
    /// How often to ask the ledger sync client to check whether peers have committed further. Never if
    /// `None`.
    pub sync_check_interval: Option<Duration>,
    /// Seed for the random choice of retry peers. Seeded from OS entropy if `None`.
    pub rng_seed: Option<u64>,
}

pub struct SyncLoop<N: Network, P: Pacemaker, V: VertexStore, L: Ledger> {
    bft_sync: BFTSync<N, P>,
    vertex_sync_server: VertexSyncServer<N>,
    ledger_sync_client: LedgerSyncClient<N>,
    ledger_sync_server: LedgerSyncServer<N>,
    vertex_store: V,
    ledger: L,
    local_sync_requests: Receiver<LocalSyncRequest>,
    ledger_update_subscriber: Option<Sender<LedgerUpdate>>,
    event_publisher: Option<Sender<Event>>,
    sync_check_interval: Option<Duration>,
    next_sync_check: Option<Instant>,
}

impl<N: Network, P: Pacemaker, V: VertexStore, L: Ledger> SyncLoop<N, P, V, L> {
    pub fn new(
        config: SyncLoopConfiguration,
        network: N,
        pacemaker: P,
        vertex_store: V,
        ledger: L,
        ledger_update_subscriber: Option<Sender<LedgerUpdate>>,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        let mut rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let ledger_sync_rng = StdRng::seed_from_u64(rng.gen());

        let sync_check_interval = config.sync_check_interval;
        let current_proof = ledger.current_proof();
        let (local_sync_request_sender, local_sync_requests) = mpsc::channel();
        let vertex_sync_server = VertexSyncServer::new(config.bft_sync.chain_id, network.clone());
        let ledger_sync_client = LedgerSyncClient::new(
            config.ledger_sync_client,
            network.clone(),
            current_proof.clone(),
            ledger_sync_rng,
            event_publisher.clone(),
        );
        let ledger_sync_server =
            LedgerSyncServer::new(config.ledger_sync_server, network.clone(), event_publisher.clone());
        let bft_sync = BFTSync::new(
            config.bft_sync,
            network,
            pacemaker,
            current_proof,
            local_sync_request_sender,
            rng,
            event_publisher.clone(),
        );

        Self {
            bft_sync,
            vertex_sync_server,
            ledger_sync_client,
            ledger_sync_server,
            vertex_store,
            ledger,
            local_sync_requests,
            ledger_update_subscriber,
            event_publisher,
            sync_check_interval,
            next_sync_check: sync_check_interval.map(|interval| Instant::now() + interval),
        }
    }

    /// Handle a single input, then hand every ledger sync request it caused over to the ledger sync
    /// client.
    pub fn handle_input(&mut self, input: SyncInput) {
        match input {
            SyncInput::Message(origin, Message::BFTSyncMessage(msg)) => match msg {
                BFTSyncMessage::GetVerticesRequest(request) => self
                    .vertex_sync_server
                    .on_get_vertices_request(origin, request, &self.vertex_store),
                BFTSyncMessage::GetVerticesResponse(response) => self
                    .bft_sync
                    .on_get_vertices_response(&origin, response, &mut self.vertex_store),
                BFTSyncMessage::GetVerticesErrorResponse(response) => self
                    .bft_sync
                    .on_get_vertices_error_response(&origin, response, &mut self.vertex_store),
            },
            SyncInput::Message(origin, Message::LedgerSyncMessage(msg)) => match msg {
                LedgerSyncMessage::StatusRequest(request) => {
                    self.ledger_sync_server
                        .on_status_request(origin, request, &self.ledger)
                }
                LedgerSyncMessage::StatusResponse(response) => {
                    self.ledger_sync_client.on_status_response(&origin, response)
                }
                LedgerSyncMessage::SyncRequest(request) => {
                    self.ledger_sync_server
                        .on_sync_request(origin, request, &self.ledger)
                }
                LedgerSyncMessage::SyncResponse(response) => {
                    if let Some(update) = self.ledger_sync_client.on_sync_response(&origin, response) {
                        self.commit_ledger_update(update)
                    }
                }
            },
            SyncInput::FormedQC { high_qc, author } => {
                let view = high_qc.highest_qc().view();
                let result = self
                    .bft_sync
                    .sync_to_qc(high_qc, author, &mut self.vertex_store);
                log::debug!("Sync to QC at view {}: {:?}", view, result);
            }
            SyncInput::LedgerUpdate(update) => self.on_ledger_update(&update),
        }

        self.drain_local_sync_requests();
    }

    /// Fire every timeout that expired at or before `now`, and trigger a ledger sync check if one is due.
    pub fn tick(&mut self, now: Instant) {
        self.bft_sync.tick(now, &mut self.vertex_store);
        self.ledger_sync_client.tick(now);

        if let (Some(next_sync_check), Some(interval)) = (self.next_sync_check, self.sync_check_interval) {
            if next_sync_check <= now {
                self.ledger_sync_client.on_sync_check_trigger();
                self.next_sync_check = Some(now + interval);
            }
        }

        self.drain_local_sync_requests();
    }

    /// Get the earliest instant at which [`tick`](Self::tick) has something to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.bft_sync.next_deadline(),
            self.ledger_sync_client.next_deadline(),
            self.next_sync_check,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Wait for one input or until the next deadline, whichever comes first, then handle the input and
    /// fire expired timeouts.
    pub fn step(&mut self, inputs: &Receiver<SyncInput>) -> Result<(), SyncLoopError> {
        let now = Instant::now();
        let wait = self
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
            .unwrap_or(MAX_WAIT)
            .min(MAX_WAIT);

        match inputs.recv_timeout(wait) {
            Ok(input) => self.handle_input(input),
            Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => return Err(SyncLoopError::InputsDisconnected),
        }

        self.tick(Instant::now());
        Ok(())
    }

    pub fn bft_sync(&self) -> &BFTSync<N, P> {
        &self.bft_sync
    }

    pub fn ledger_sync_client(&self) -> &LedgerSyncClient<N> {
        &self.ledger_sync_client
    }

    pub fn vertex_store(&self) -> &V {
        &self.vertex_store
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    fn drain_local_sync_requests(&mut self) {
        while let Ok(request) = self.local_sync_requests.try_recv() {
            self.ledger_sync_client.on_local_sync_request(request);
        }
    }

    fn commit_ledger_update(&mut self, update: LedgerUpdate) {
        self.ledger.commit(&update);

        Event::CommitLedgerUpdate(CommitLedgerUpdateEvent {
            timestamp: SystemTime::now(),
            tail_version: update.tail.state_version(),
            commands: update.commands.len(),
        })
        .publish(&self.event_publisher);

        self.on_ledger_update(&update);

        if let Some(subscriber) = &self.ledger_update_subscriber {
            if subscriber.send(update).is_err() {
                log::debug!("Ledger update subscriber hung up.");
            }
        }
    }

    fn on_ledger_update(&mut self, update: &LedgerUpdate) {
        self.ledger_sync_client.on_ledger_update(update);
        self.bft_sync.on_ledger_update(update, &mut self.vertex_store);
    }
}

impl<N, P, V, L> SyncLoop<N, P, V, L>
where
    N: Network + 'static,
    P: Pacemaker + Send + 'static,
    V: VertexStore + Send + 'static,
    L: Ledger + Send + 'static,
{
    /// Spawn the sync loop thread, which runs until `shutdown_signal` fires or every input sender is
    /// dropped.
    pub(crate) fn start(
        mut self,
        inputs: Receiver<SyncInput>,
        shutdown_signal: Receiver<()>,
    ) -> JoinHandle<()> {
        thread::spawn(move || loop {
            match shutdown_signal.try_recv() {
                Ok(()) => return,
                Err(TryRecvError::Empty) => (),
                Err(TryRecvError::Disconnected) => {
                    panic!("Sync loop thread disconnected from main thread")
                }
            }

            if let Err(err) = self.step(&inputs) {
                log::info!("Sync loop stopping: {:?}", err);
                return;
            }
        })
    }
}
