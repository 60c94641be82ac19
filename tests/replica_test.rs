//! Tests a lagging replica catching up with 4 validators, each running its own sync threads behind a
//! [`Replica`] handle.

use std::{
    sync::mpsc::{self, Receiver},
    time::Duration,
};

use log::LevelFilter;
use rand_core::OsRng;

use hotstuff_sync::{
    events::SyncedToQCEvent,
    ledger_sync::messages::LedgerUpdate,
    replica::{Configuration, Replica, ReplicaSpec},
    types::{
        crypto_primitives::{SigningKey, VerifyingKey},
        data_types::{ChainID, CryptoHash, StateVersion, ViewNumber},
    },
};

mod common;

use common::{
    fixtures::{Chain, Validators},
    ledger::MemLedger,
    logging::setup_logger,
    network::{mock_network, NetworkStub},
    pacemaker::RecordingPacemaker,
    vertex_store::MemVertexStore,
};

fn start_replica(
    validators: &Validators,
    network: NetworkStub,
    vertex_store: MemVertexStore,
    ledger: MemLedger,
    synced_to_qc: Option<mpsc::Sender<(CryptoHash, ViewNumber)>>,
    ledger_updates: Option<mpsc::Sender<LedgerUpdate>>,
) -> Replica {
    let configuration = Configuration::builder()
        .me(network.verifying_key())
        .chain_id(ChainID::new(0))
        .validator_set(validators.validator_set.clone())
        .bft_sync_patience(Duration::from_millis(500))
        .ledger_sync_patience(Duration::from_millis(500))
        .ledger_sync_batch_size(2)
        .log_events(true)
        .build();

    match (synced_to_qc, ledger_updates) {
        (Some(synced_to_qc), Some(ledger_updates)) => ReplicaSpec::builder()
            .vertex_store(vertex_store)
            .ledger(ledger)
            .pacemaker(RecordingPacemaker::new())
            .network(network)
            .configuration(configuration)
            .ledger_update_subscriber(ledger_updates)
            .on_synced_to_qc(move |event: &SyncedToQCEvent| {
                let _ = synced_to_qc.send((event.vertex, event.view));
            })
            .build()
            .start(),
        _ => ReplicaSpec::builder()
            .vertex_store(vertex_store)
            .ledger(ledger)
            .pacemaker(RecordingPacemaker::new())
            .network(network)
            .configuration(configuration)
            .build()
            .start(),
    }
}

#[test]
fn lagging_replica_catches_up_with_running_validators() {
    setup_logger(LevelFilter::Info);

    // 1. Start 4 validators which have all seen vertex 10 and committed up to vertex 8.
    let validators = Validators::new(4);
    let chain = Chain::new(&validators, 12);
    let listener: VerifyingKey = SigningKey::generate(&mut OsRng {}).verifying_key();
    let mut network_stubs = mock_network(validators.publics().into_iter().chain([listener]));
    let listener_network = network_stubs.pop().unwrap();

    let _validator_replicas: Vec<Replica> = network_stubs
        .into_iter()
        .map(|network| {
            start_replica(
                &validators,
                network,
                MemVertexStore::from_chain(&chain, 10),
                MemLedger::from_chain(&chain, 8),
                None,
                None,
            )
        })
        .collect();

    // 2. Start a listener which has only seen the genesis vertex.
    let (synced_to_qc_sender, synced_to_qc): (_, Receiver<(CryptoHash, ViewNumber)>) = mpsc::channel();
    let (ledger_update_sender, ledger_updates): (_, Receiver<LedgerUpdate>) = mpsc::channel();
    let listener_replica = start_replica(
        &validators,
        listener_network,
        MemVertexStore::genesis(&chain),
        MemLedger::genesis(&chain),
        Some(synced_to_qc_sender),
        Some(ledger_update_sender),
    );

    // 3. Tell the listener about the QC for vertex 10, formed by validator 2.
    listener_replica
        .formed_qc(chain.high_qc(10, 10), Some(validators.public(2)))
        .unwrap();

    // 4. Wait for the listener to install the QC.
    let (vertex, view) = synced_to_qc.recv_timeout(Duration::from_secs(30)).unwrap();
    assert_eq!(vertex, chain.vertices[10].id);
    assert_eq!(view, ViewNumber::new(10));

    // 5. The ledger reached vertex 8 in batches of 2 commands.
    let tails: Vec<StateVersion> = (0..4)
        .map(|_| {
            ledger_updates
                .recv_timeout(Duration::from_secs(5))
                .unwrap()
                .tail
                .state_version()
        })
        .collect();
    assert_eq!(
        tails,
        vec![
            StateVersion::new(2),
            StateVersion::new(4),
            StateVersion::new(6),
            StateVersion::new(8)
        ]
    );
}
