/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build and run the sync subsystem of a replica.
//!
//! The key components of this module are:
//! - The builder-pattern interface to construct a [specification of the replica](ReplicaSpec) with:
//!   1. `ReplicaSpec::builder` to construct a `ReplicaSpecBuilder`,
//!   2. The setters of the `ReplicaSpecBuilder`, and
//!   3. The `ReplicaSpecBuilder::build` method to construct a [ReplicaSpec],
//! - The function to [start](ReplicaSpec::start) a [Replica] given its specification,
//! - [The type](Replica) which keeps the replica's sync threads alive, and through which the local
//!   consensus engine feeds QCs and ledger updates into the [sync loop](crate::sync_loop).
//!
//! ## Starting a replica
//!
//! Here is an example that demonstrates how to build and start running a replica using the builder pattern:
//!
//! ```ignore
//! let replica =
//!     ReplicaSpec::builder()
//!     .vertex_store(vertex_store)
//!     .ledger(ledger)
//!     .pacemaker(pacemaker)
//!     .network(network)
//!     .configuration(configuration)
//!     .on_synced_to_qc(synced_to_qc_handler)
//!     .build()
//!     .start();
//!
//! replica.formed_qc(high_qc, Some(proposer));
//! ```
//!
//! ### Required setters
//!
//! The required setters are for providing the trait implementations required to run a replica:
//! - `.vertex_store(...)`
//! - `.ledger(...)`
//! - `.pacemaker(...)`
//! - `.network(...)`
//! - `.configuration(...)`
//!
//! ### Optional setters
//!
//! - `.ledger_update_subscriber(...)`, to receive every ledger update committed through ledger sync.
//! - Handlers for the events in [crate::events]: `.on_start_bft_sync(...)`, `.on_synced_to_qc(...)`,
//!   `.on_send_get_vertices(...)`, `.on_receive_get_vertices(...)`, `.on_vertex_request_timeout(...)`,
//!   `.on_rebuild_vertex_store(...)`, `.on_start_ledger_sync(...)`, `.on_start_sync_check(...)`,
//!   `.on_send_sync_request(...)`, `.on_receive_sync_response(...)`, `.on_reject_sync_response(...)`, `.on_commit_ledger_update(...)`,
//!   `.on_receive_sync_request(...)`, `.on_send_sync_response(...)`.
//!
//! The replica's [configuration](Configuration) can also be defined using the builder pattern, for example:
//!
//! ```ignore
//! let configuration =
//!     Configuration::builder()
//!     .me(verifying_key)
//!     .chain_id(ChainID::new(0))
//!     .validator_set(validator_set)
//!     .bft_sync_patience(Duration::from_millis(500))
//!     .ledger_sync_patience(Duration::from_secs(2))
//!     .ledger_sync_batch_size(100)
//!     .sync_check_interval(Duration::from_secs(10))
//!     .log_events(true)
//!     .build()
//! ```

use std::sync::mpsc::{self, SendError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

use typed_builder::TypedBuilder;

use crate::bft_sync::BFTSyncConfiguration;
use crate::event_bus::*;
use crate::events::*;
use crate::ledger_sync::{
    ledger::Ledger, messages::LedgerUpdate, LedgerSyncClientConfiguration,
    LedgerSyncServerConfiguration,
};
use crate::networking::{network::Network, receiving::start_polling};
use crate::pacemaker::Pacemaker;
use crate::sync_loop::{SyncInput, SyncLoop, SyncLoopConfiguration};
use crate::types::{
    certificates::HighQC, crypto_primitives::VerifyingKey, data_types::ChainID,
    validator_set::ValidatorSet,
};
use crate::vertex_store::VertexStore;

const DEFAULT_SYNC_CHECK_MAX_PEERS: usize = 10;

/// Stores the user-defined parameters required to start the replica, that is:
/// 1. The replica's own verifying key, which is never asked for vertices or ledger batches.
/// 2. The [chain ID](crate::types::data_types::ChainID) of the target blockchain.
/// 3. The validator set expected to have signed the ledger proofs received through ledger sync.
/// 4. The BFT sync patience: how long to wait for a vertex response before retrying with another peer.
/// 5. The ledger sync patience: how long to wait for a ledger sync response before retrying.
/// 6. The ledger sync batch size: the maximum number of commands sent in one ledger sync response.
/// 7. How often to check whether peers have committed further than this replica, if at all.
/// 8. The maximum number of peers asked for their status in one sync check.
/// 9. An optional seed for the random choice of retry peers.
/// 10. The "Log Events" flag, if set to "true" then logs should be printed.
///
/// ## Patience
///
/// Durations stored in [Configuration::bft_sync_patience] and [Configuration::ledger_sync_patience]
/// must be "well below" [u64::MAX] seconds, since they are added to [`Instant`](std::time::Instant)s.
#[derive(TypedBuilder)]
#[builder(builder_method(doc =
    "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.me(...)`
    - `.chain_id(...)`
    - `.validator_set(...)`
    - `.bft_sync_patience(...)`
    - `.ledger_sync_patience(...)`
    - `.ledger_sync_batch_size(...)`
    - `.log_events(...)`

    Optional:
    - `.sync_check_interval(...)`
    - `.sync_check_max_peers(...)`
    - `.rng_seed(...)`
"
))]
pub struct Configuration {
    #[builder(setter(doc = "Set the replica's verifying key. Required."))]
    pub me: VerifyingKey,
    #[builder(setter(doc = "Set the chain ID of the blockchain. Required."))]
    pub chain_id: ChainID,
    #[builder(setter(doc = "Set the validator set that is expected to sign ledger proofs. Required."))]
    pub validator_set: ValidatorSet,
    #[builder(setter(doc = "Set how long to wait for a response to a vertex request before retrying. Required."))]
    pub bft_sync_patience: Duration,
    #[builder(setter(doc = "Set how long to wait for a response to a ledger sync request before retrying. Required."))]
    pub ledger_sync_patience: Duration,
    #[builder(setter(doc = "Set the maximum number of commands sent in one ledger sync response. Required."))]
    pub ledger_sync_batch_size: usize,
    #[builder(default, setter(strip_option, doc = "Set how often to run a ledger sync check. Optional: no periodic sync checks by default."))]
    pub sync_check_interval: Option<Duration>,
    #[builder(default = DEFAULT_SYNC_CHECK_MAX_PEERS, setter(doc = "Set the maximum number of peers asked in one sync check. Optional."))]
    pub sync_check_max_peers: usize,
    #[builder(default, setter(strip_option, doc = "Set the seed for choosing retry peers. Optional: seeded from OS entropy by default."))]
    pub rng_seed: Option<u64>,
    #[builder(setter(doc = "Enable logging? Required."))]
    pub log_events: bool,
}

impl Into<SyncLoopConfiguration> for Configuration {
    fn into(self) -> SyncLoopConfiguration {
        let bft_sync = BFTSyncConfiguration {
            chain_id: self.chain_id,
            me: self.me,
            patience: self.bft_sync_patience,
        };
        let ledger_sync_client = LedgerSyncClientConfiguration {
            chain_id: self.chain_id,
            me: self.me,
            validator_set: self.validator_set,
            patience: self.ledger_sync_patience,
            sync_check_max_peers: self.sync_check_max_peers,
        };
        let ledger_sync_server = LedgerSyncServerConfiguration {
            chain_id: self.chain_id,
            batch_size: self.ledger_sync_batch_size,
        };
        SyncLoopConfiguration {
            bft_sync,
            ledger_sync_client,
            ledger_sync_server,
            sync_check_interval: self.sync_check_interval,
            rng_seed: self.rng_seed,
        }
    }
}

/// Stores all necessary parameters and trait implementations required to run the [Replica].
#[derive(TypedBuilder)]
#[builder(builder_method(doc =
    "
    Create a builder for building a [ReplicaSpec]. On the builder call the following methods to construct a valid [ReplicaSpec].

    Required:
    - `.vertex_store(...)`
    - `.ledger(...)`
    - `.pacemaker(...)`
    - `.network(...)`
    - `.configuration(...)`

    Optional:
    - `.ledger_update_subscriber(...)`
    - `.on_start_bft_sync(...)`
    - `.on_synced_to_qc(...)`
    - `.on_send_get_vertices(...)`
    - `.on_receive_get_vertices(...)`
    - `.on_vertex_request_timeout(...)`
    - `.on_rebuild_vertex_store(...)`
    - `.on_start_ledger_sync(...)`
    - `.on_start_sync_check(...)`
    - `.on_send_sync_request(...)`
    - `.on_receive_sync_response(...)`
    - `.on_reject_sync_response(...)`
    - `.on_commit_ledger_update(...)`
    - `.on_receive_sync_request(...)`
    - `.on_send_sync_response(...)`
"
))]
pub struct ReplicaSpec<V: VertexStore, L: Ledger, P: Pacemaker, N: Network + 'static> {
    // Required parameters
    #[builder(setter(doc = "Set the vertex store that the sync loop brings up to date. The argument must implement the [VertexStore](crate::vertex_store::VertexStore) trait. Required."))]
    vertex_store: V,
    #[builder(setter(doc = "Set the committed ledger. The argument must implement the [Ledger](crate::ledger_sync::ledger::Ledger) trait. Required."))]
    ledger: L,
    #[builder(setter(doc = "Set the pacemaker to notify when a new highest QC is installed. The argument must implement the [Pacemaker](crate::pacemaker::Pacemaker) trait. Required."))]
    pacemaker: P,
    #[builder(setter(doc = "Set the implementation of peer-to-peer networking. The argument must implement the [Network](crate::networking::network::Network) trait. Required."))]
    network: N,
    #[builder(setter(doc = "Set the [configuration](Configuration), which contains the necessary parameters to run a replica. Required."))]
    configuration: Configuration,
    // Optional parameters
    #[builder(default, setter(strip_option, doc = "Set a channel to receive every ledger update committed through ledger sync. Optional."))]
    ledger_update_subscriber: Option<Sender<LedgerUpdate>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartBFTSyncEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartBFTSyncEvent>),
    doc = "Register a handler closure to be invoked after the replica starts syncing towards a vertex. Optional."))]
    on_start_bft_sync: Option<HandlerPtr<StartBFTSyncEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SyncedToQCEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SyncedToQCEvent>),
    doc = "Register a handler closure to be invoked after a QC is installed into the vertex store. Optional."))]
    on_synced_to_qc: Option<HandlerPtr<SyncedToQCEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SendGetVerticesEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SendGetVerticesEvent>),
    doc = "Register a handler closure to be invoked after the replica sends a vertex request. Optional."))]
    on_send_get_vertices: Option<HandlerPtr<SendGetVerticesEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveGetVerticesEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveGetVerticesEvent>),
    doc = "Register a handler closure to be invoked after the replica receives the response to a vertex request. Optional."))]
    on_receive_get_vertices: Option<HandlerPtr<ReceiveGetVerticesEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&VertexRequestTimeoutEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<VertexRequestTimeoutEvent>),
    doc = "Register a handler closure to be invoked after a vertex request times out. Optional."))]
    on_vertex_request_timeout: Option<HandlerPtr<VertexRequestTimeoutEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RebuildVertexStoreEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RebuildVertexStoreEvent>),
    doc = "Register a handler closure to be invoked after the vertex store is rebuilt from a new root. Optional."))]
    on_rebuild_vertex_store: Option<HandlerPtr<RebuildVertexStoreEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartLedgerSyncEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartLedgerSyncEvent>),
    doc = "Register a handler closure to be invoked after the ledger sync client accepts a new target. Optional."))]
    on_start_ledger_sync: Option<HandlerPtr<StartLedgerSyncEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartSyncCheckEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartSyncCheckEvent>),
    doc = "Register a handler closure to be invoked after the ledger sync client asks its peers for their status. Optional."))]
    on_start_sync_check: Option<HandlerPtr<StartSyncCheckEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SendSyncRequestEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SendSyncRequestEvent>),
    doc = "Register a handler closure to be invoked after the replica sends a ledger sync request. Optional."))]
    on_send_sync_request: Option<HandlerPtr<SendSyncRequestEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveSyncResponseEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveSyncResponseEvent>),
    doc = "Register a handler closure to be invoked after the replica receives an expected ledger sync response. Optional."))]
    on_receive_sync_response: Option<HandlerPtr<ReceiveSyncResponseEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RejectSyncResponseEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RejectSyncResponseEvent>),
    doc = "Register a handler closure to be invoked after a ledger sync response fails verification. Optional."))]
    on_reject_sync_response: Option<HandlerPtr<RejectSyncResponseEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CommitLedgerUpdateEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CommitLedgerUpdateEvent>),
    doc = "Register a handler closure to be invoked after a verified ledger update is committed. Optional."))]
    on_commit_ledger_update: Option<HandlerPtr<CommitLedgerUpdateEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveSyncRequestEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveSyncRequestEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a ledger sync request from a peer. Optional."))]
    on_receive_sync_request: Option<HandlerPtr<ReceiveSyncRequestEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SendSyncResponseEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SendSyncResponseEvent>),
    doc = "Register a handler closure to be invoked after the replica sends a ledger sync response to a peer. Optional."))]
    on_send_sync_response: Option<HandlerPtr<SendSyncResponseEvent>>,
}

impl<V, L, P, N> ReplicaSpec<V, L, P, N>
where
    V: VertexStore + Send + 'static,
    L: Ledger + Send + 'static,
    P: Pacemaker + Send + 'static,
    N: Network + 'static,
{
    /// Starts all threads and channels associated with running a replica, and returns the handles to them in a [Replica] struct.
    pub fn start(mut self) -> Replica {
        self.network
            .init_validator_set(self.configuration.validator_set.clone());

        let log_events = self.configuration.log_events;
        let sync_loop_config: SyncLoopConfiguration = self.configuration.into();

        let mut event_handlers = EventHandlers {
            start_bft_sync_handlers: self.on_start_bft_sync.into_iter().collect(),
            synced_to_qc_handlers: self.on_synced_to_qc.into_iter().collect(),
            send_get_vertices_handlers: self.on_send_get_vertices.into_iter().collect(),
            receive_get_vertices_handlers: self.on_receive_get_vertices.into_iter().collect(),
            vertex_request_timeout_handlers: self.on_vertex_request_timeout.into_iter().collect(),
            rebuild_vertex_store_handlers: self.on_rebuild_vertex_store.into_iter().collect(),
            start_ledger_sync_handlers: self.on_start_ledger_sync.into_iter().collect(),
            start_sync_check_handlers: self.on_start_sync_check.into_iter().collect(),
            send_sync_request_handlers: self.on_send_sync_request.into_iter().collect(),
            receive_sync_response_handlers: self.on_receive_sync_response.into_iter().collect(),
            reject_sync_response_handlers: self.on_reject_sync_response.into_iter().collect(),
            commit_ledger_update_handlers: self.on_commit_ledger_update.into_iter().collect(),
            receive_sync_request_handlers: self.on_receive_sync_request.into_iter().collect(),
            send_sync_response_handlers: self.on_send_sync_response.into_iter().collect(),
        };
        if log_events {
            event_handlers.add_loggers();
        }

        let (event_publisher, event_subscriber) = if !event_handlers.is_empty() {
            let (publisher, subscriber) = mpsc::channel();
            (Some(publisher), Some(subscriber))
        } else {
            (None, None)
        };

        let (sync_inputs, sync_inputs_receiver) = mpsc::channel();

        let (poller_shutdown, poller_shutdown_receiver) = mpsc::channel();
        let poller = start_polling(
            self.network.clone(),
            sync_inputs.clone(),
            poller_shutdown_receiver,
        );

        let (sync_loop_shutdown, sync_loop_shutdown_receiver) = mpsc::channel();
        let sync_loop = SyncLoop::new(
            sync_loop_config,
            self.network,
            self.pacemaker,
            self.vertex_store,
            self.ledger,
            self.ledger_update_subscriber,
            event_publisher,
        )
        .start(sync_inputs_receiver, sync_loop_shutdown_receiver);

        let (event_bus, event_bus_shutdown) = match event_subscriber {
            Some(event_subscriber) => {
                let (shutdown, shutdown_receiver) = mpsc::channel();
                (
                    Some(start_event_bus(event_handlers, event_subscriber, shutdown_receiver)),
                    Some(shutdown),
                )
            }
            None => (None, None),
        };

        Replica {
            sync_inputs,
            poller: Some(poller),
            poller_shutdown,
            sync_loop: Some(sync_loop),
            sync_loop_shutdown,
            event_bus,
            event_bus_shutdown,
        }
    }
}

/// A handle to the background threads of a replica's sync subsystem. When this value is dropped, all
/// background threads are gracefully shut down.
pub struct Replica {
    sync_inputs: Sender<SyncInput>,
    poller: Option<JoinHandle<()>>,
    poller_shutdown: Sender<()>,
    sync_loop: Option<JoinHandle<()>>,
    sync_loop_shutdown: Sender<()>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl Replica {
    /// Inform the sync loop of a `HighQC` seen by the local consensus engine, sent by `author` if it
    /// came from a peer. The sync loop installs it, or syncs towards it.
    pub fn formed_qc(
        &self,
        high_qc: HighQC,
        author: Option<VerifyingKey>,
    ) -> Result<(), SendError<SyncInput>> {
        self.sync_inputs.send(SyncInput::FormedQC { high_qc, author })
    }

    /// Inform the sync loop of a ledger update committed by the local consensus engine.
    pub fn ledger_update(&self, update: LedgerUpdate) -> Result<(), SendError<SyncInput>> {
        self.sync_inputs.send(SyncInput::LedgerUpdate(update))
    }
}

impl Drop for Replica {
    fn drop(&mut self) {
        // The order of thread shutdown in this function is important: the sync loop receives inputs from the
        // poller, so the poller must outlive it.

        if let Some(shutdown) = &self.event_bus_shutdown {
            let _ = shutdown.send(());
        }
        if let Some(event_bus) = self.event_bus.take() {
            let _ = event_bus.join();
        }

        let _ = self.sync_loop_shutdown.send(());
        if let Some(sync_loop) = self.sync_loop.take() {
            let _ = sync_loop.join();
        }

        let _ = self.poller_shutdown.send(());
        if let Some(poller) = self.poller.take() {
            let _ = poller.join();
        }
    }
}
