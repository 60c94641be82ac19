//! Tests for the BFT sync engine, driven directly against an in-memory vertex store and a network that
//! only records what is sent through it.

use std::{
    sync::mpsc::{self, Receiver},
    time::{Duration, Instant},
};

use rand::{rngs::StdRng, SeedableRng};
use rand_core::OsRng;

use hotstuff_sync::{
    bft_sync::{
        messages::{BFTSyncMessage, GetVerticesErrorResponse, GetVerticesRequest, GetVerticesResponse},
        types::{SyncResult, SyncStage},
        BFTSync, BFTSyncConfiguration,
    },
    ledger_sync::messages::{LedgerUpdate, LocalSyncRequest},
    networking::messages::Message,
    types::{
        certificates::{BFTHeader, HighQC, LedgerProof, QuorumCertificate, TimeoutCertificate},
        crypto_primitives::{SigningKey, VerifyingKey},
        data_types::{ChainID, Command, CryptoHash, SignatureSet, StateVersion, ViewNumber},
        ledger::LedgerHeader,
    },
    vertex_store::VertexStore,
};

mod common;

use common::{
    fixtures::{Chain, Validators},
    network::RecordingNetwork,
    pacemaker::RecordingPacemaker,
    vertex_store::{MemVertexStore, StoreOp},
};

const PATIENCE: Duration = Duration::from_secs(1);

struct TestEngine {
    engine: BFTSync<RecordingNetwork, RecordingPacemaker>,
    network: RecordingNetwork,
    pacemaker: RecordingPacemaker,
    local_sync_requests: Receiver<LocalSyncRequest>,
}

impl TestEngine {
    fn new(me: VerifyingKey, current_ledger_header: LedgerProof) -> TestEngine {
        let network = RecordingNetwork::new();
        let pacemaker = RecordingPacemaker::new();
        let (local_sync_request_sender, local_sync_requests) = mpsc::channel();
        let engine = BFTSync::new(
            BFTSyncConfiguration {
                chain_id: ChainID::new(0),
                me,
                patience: PATIENCE,
            },
            network.clone(),
            pacemaker.clone(),
            current_ledger_header,
            local_sync_request_sender,
            StdRng::seed_from_u64(0),
            None,
        );
        TestEngine {
            engine,
            network,
            pacemaker,
            local_sync_requests,
        }
    }

    // Get the vertex requests sent since the last call, with the peers they were sent to.
    fn sent_requests(&self) -> Vec<(VerifyingKey, GetVerticesRequest)> {
        self.network
            .take_sent()
            .into_iter()
            .filter_map(|(peer, msg)| match msg {
                Message::BFTSyncMessage(BFTSyncMessage::GetVerticesRequest(request)) => Some((peer, request)),
                _ => None,
            })
            .collect()
    }

    // Answer `request` from `origin` with the vertices `serving` has.
    fn respond(
        &mut self,
        origin: VerifyingKey,
        request: &GetVerticesRequest,
        serving: &MemVertexStore,
        store: &mut MemVertexStore,
    ) {
        let response = GetVerticesResponse {
            vertices: serving.get_vertices(&request.vertex_id, request.count as usize),
        };
        self.engine.on_get_vertices_response(&origin, response, store);
    }
}

fn listener_key() -> VerifyingKey {
    SigningKey::generate(&mut OsRng {}).verifying_key()
}

#[test]
fn present_vertex_is_synced_directly() {
    let validators = Validators::new(4);
    let chain = Chain::new(&validators, 5);
    let mut store = MemVertexStore::from_chain(&chain, 4);
    let mut test = TestEngine::new(listener_key(), chain.ledger_proof(0));

    let tc = TimeoutCertificate {
        view: ViewNumber::new(5),
        signatures: SignatureSet::new(),
    };
    let high_qc = HighQC::new(chain.qcs[4].clone(), chain.qcs[4].clone(), Some(tc.clone()));

    let result = test.engine.sync_to_qc(high_qc, None, &mut store);

    assert_eq!(result, SyncResult::Synced);
    assert_eq!(test.pacemaker.processed(), vec![ViewNumber::new(4)]);
    assert_eq!(store.high_qc().highest_tc, Some(tc));
    assert!(test.sent_requests().is_empty());
}

#[test]
fn qc_below_root_is_invalid() {
    let validators = Validators::new(4);
    let chain = Chain::new(&validators, 6);
    let mut store = MemVertexStore::new(chain.vertices[5].clone(), chain.qcs[5].clone());
    let mut test = TestEngine::new(listener_key(), chain.ledger_proof(3));

    let result = test
        .engine
        .sync_to_qc(chain.high_qc(3, 3), Some(validators.public(0)), &mut store);

    assert_eq!(result, SyncResult::Invalid);
    assert!(test.sent_requests().is_empty());
    assert!(test.pacemaker.processed().is_empty());
}

#[test]
fn unsyncable_qcs_are_invalid() {
    let validators = Validators::new(4);
    let chain = Chain::new(&validators, 8);
    let mut store = MemVertexStore::genesis(&chain);
    let mut test = TestEngine::new(listener_key(), chain.ledger_proof(0));

    // 1. A sync is required, but there is nobody to ask.
    assert_eq!(
        test.engine.sync_to_qc(chain.high_qc(8, 8), None, &mut store),
        SyncResult::Invalid
    );

    // 2. The highest committed QC does not commit anything.
    assert_eq!(
        test.engine
            .sync_to_qc(chain.high_qc(8, 1), Some(validators.public(0)), &mut store),
        SyncResult::Invalid
    );

    // 3. A genesis QC over a vertex the store has never seen.
    let foreign_genesis_qc = QuorumCertificate::genesis_qc(BFTHeader::new(
        ViewNumber::genesis(),
        CryptoHash::new([7u8; 32]),
        LedgerHeader::genesis(),
    ));
    assert_eq!(
        test.engine.sync_to_qc(
            HighQC::from_qc(foreign_genesis_qc),
            Some(validators.public(0)),
            &mut store
        ),
        SyncResult::Invalid
    );

    assert!(test.sent_requests().is_empty());
    assert!(store.ops().is_empty());
}

#[test]
fn repeated_trigger_for_same_target_is_in_progress() {
    let validators = Validators::new(4);
    let chain = Chain::new(&validators, 8);
    let mut store = MemVertexStore::from_chain(&chain, 5);
    let mut test = TestEngine::new(listener_key(), chain.ledger_proof(3));
    let author = validators.public(2);

    for _ in 0..2 {
        let result = test.engine.sync_to_qc(chain.high_qc(8, 5), Some(author), &mut store);
        assert_eq!(result, SyncResult::InProgress);
    }

    let sent = test.sent_requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, author);
    assert_eq!(sent[0].1.vertex_id, chain.vertices[8].id);
    assert_eq!(sent[0].1.count, 1);
    assert_eq!(
        test.engine.sync_stage(&chain.vertices[8].id),
        Some(SyncStage::GetQCVertices)
    );
}

#[test]
fn qc_sync_walks_back_to_known_ancestor() {
    // 1. Initialize a replica that knows vertices up to view 5, and a peer that knows all 8.
    let validators = Validators::new(4);
    let chain = Chain::new(&validators, 8);
    let serving = MemVertexStore::from_chain(&chain, 8);
    let mut store = MemVertexStore::from_chain(&chain, 5);
    let mut test = TestEngine::new(listener_key(), chain.ledger_proof(3));
    let author = validators.public(1);

    // 2. Trigger a sync to view 8. The committed vertex (view 3) is known, so this is a QC sync.
    assert_eq!(
        test.engine.sync_to_qc(chain.high_qc(8, 5), Some(author), &mut store),
        SyncResult::InProgress
    );

    // 3. Answer requests one at a time until the engine stops asking.
    let mut requested = Vec::new();
    loop {
        let sent = test.sent_requests();
        if sent.is_empty() {
            break;
        }
        for (peer, request) in sent {
            assert_eq!(peer, author);
            requested.push(request.vertex_id);
            test.respond(peer, &request, &serving, &mut store);
        }
    }

    // 4. Vertices were requested from the target backwards, and inserted from the oldest forwards, each
    //    after the QC of its parent.
    assert_eq!(
        requested,
        vec![chain.vertices[8].id, chain.vertices[7].id, chain.vertices[6].id]
    );
    assert_eq!(
        store.ops(),
        &vec![
            StoreOp::AddQC(chain.vertices[5].id),
            StoreOp::InsertVertex(chain.vertices[6].id),
            StoreOp::AddQC(chain.vertices[6].id),
            StoreOp::InsertVertex(chain.vertices[7].id),
            StoreOp::AddQC(chain.vertices[7].id),
            StoreOp::InsertVertex(chain.vertices[8].id),
            StoreOp::AddQC(chain.vertices[8].id),
        ]
    );
    assert_eq!(test.pacemaker.processed(), vec![ViewNumber::new(8)]);
    assert_eq!(test.engine.sync_stage(&chain.vertices[8].id), None);
    assert!(test.engine.outstanding_requests().is_empty());
}

#[test]
fn unanswered_request_is_retried_with_a_candidate() {
    let validators = Validators::new(4);
    let chain = Chain::new(&validators, 6);
    let serving = MemVertexStore::from_chain(&chain, 6);
    let mut store = MemVertexStore::from_chain(&chain, 5);
    let mut test = TestEngine::new(listener_key(), chain.ledger_proof(3));

    // 1. The author never answers.
    test.engine
        .sync_to_qc(chain.high_qc(6, 5), Some(validators.public(0)), &mut store);
    let first = test.sent_requests();
    assert_eq!(first.len(), 1);
    assert!(test.engine.next_deadline().is_some());

    // 2. Once the patience expires, the same request goes out again to one of the QC's signers.
    test.engine
        .tick(Instant::now() + PATIENCE * 10, &mut store);
    let retry = test.sent_requests();
    assert_eq!(retry.len(), 1);
    assert_eq!(retry[0].1, first[0].1);
    assert!(validators.publics().contains(&retry[0].0));

    // 3. The retry is answered, and the sync completes.
    test.respond(retry[0].0, &retry[0].1, &serving, &mut store);
    assert!(store.contains_vertex(&chain.vertices[6].id));
    assert_eq!(test.pacemaker.processed(), vec![ViewNumber::new(6)]);

    // 4. The timeout of the answered request fires into nothing.
    test.engine
        .tick(Instant::now() + PATIENCE * 100, &mut store);
    assert!(test.sent_requests().is_empty());
}

#[test]
fn qc_below_committed_ledger_header_is_invalid() {
    // The ledger has committed vertex 8, but the vertex store has only seen up to vertex 2.
    let validators = Validators::new(4);
    let chain = Chain::new(&validators, 10);
    let mut store = MemVertexStore::from_chain(&chain, 2);
    let mut test = TestEngine::new(listener_key(), chain.ledger_proof(8));

    let result = test
        .engine
        .sync_to_qc(chain.high_qc(5, 5), Some(validators.public(0)), &mut store);

    assert_eq!(result, SyncResult::Invalid);
    assert!(test.sent_requests().is_empty());
    assert!(test.local_sync_requests.try_recv().is_err());
    assert!(store.ops().is_empty());
}

#[test]
fn error_response_from_peer_ahead_is_chased() {
    let validators = Validators::new(4);
    let chain = Chain::new(&validators, 9);
    let mut store = MemVertexStore::from_chain(&chain, 5);
    let mut test = TestEngine::new(listener_key(), chain.ledger_proof(3));
    let peer = validators.public(3);

    // 1. Ask the peer for vertex 7.
    test.engine.sync_to_qc(chain.high_qc(7, 5), Some(peer), &mut store);
    let sent = test.sent_requests();
    assert_eq!(sent.len(), 1);
    let request = sent[0].1;

    // 2. An error response for a request that was never sent is ignored, even from a peer that is ahead.
    test.engine.on_get_vertices_error_response(
        &peer,
        GetVerticesErrorResponse {
            high_qc: chain.high_qc(9, 5),
            request: GetVerticesRequest::new(ChainID::new(0), chain.vertices[6].id, 1),
        },
        &mut store,
    );
    assert!(test.sent_requests().is_empty());

    // 3. A peer that is behind is ignored.
    test.engine.on_get_vertices_error_response(
        &peer,
        GetVerticesErrorResponse {
            high_qc: chain.high_qc(4, 4),
            request,
        },
        &mut store,
    );
    assert!(test.sent_requests().is_empty());

    // 4. A peer that is ahead becomes the author of a sync towards its highest QC.
    test.engine.on_get_vertices_error_response(
        &peer,
        GetVerticesErrorResponse {
            high_qc: chain.high_qc(9, 5),
            request,
        },
        &mut store,
    );
    let sent = test.sent_requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, peer);
    assert_eq!(sent[0].1.vertex_id, chain.vertices[9].id);
    assert_eq!(
        test.engine.sync_stage(&chain.vertices[9].id),
        Some(SyncStage::GetQCVertices)
    );
}

#[test]
fn concurrent_syncs_share_outstanding_requests() {
    let validators = Validators::new(4);
    let chain = Chain::new(&validators, 8);
    let serving = MemVertexStore::from_chain(&chain, 8);
    let mut store = MemVertexStore::from_chain(&chain, 5);
    let mut test = TestEngine::new(listener_key(), chain.ledger_proof(3));
    let author = validators.public(0);

    // 1. Sync to view 7 starts first, then sync to view 8.
    test.engine
        .sync_to_qc(chain.high_qc(7, 5), Some(author), &mut store);
    test.engine
        .sync_to_qc(chain.high_qc(8, 5), Some(author), &mut store);
    let sent = test.sent_requests();
    assert_eq!(sent.len(), 2);
    let (request_7, request_8) = (sent[0].1, sent[1].1);

    // 2. Once the sync to view 8 fetches vertex 8, it needs vertex 7, which is already being requested.
    test.respond(author, &request_8, &serving, &mut store);
    assert!(test.sent_requests().is_empty());
    assert_eq!(test.engine.outstanding_requests(), vec![request_7]);

    // 3. Vertex 7 resumes both syncs, which in turn share the request for vertex 6.
    test.respond(author, &request_7, &serving, &mut store);
    let sent = test.sent_requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.vertex_id, chain.vertices[6].id);

    // 4. Vertex 6 completes both.
    test.respond(author, &sent[0].1, &serving, &mut store);
    assert_eq!(
        test.pacemaker.processed(),
        vec![ViewNumber::new(7), ViewNumber::new(8)]
    );
    assert!(store.contains_vertex(&chain.vertices[8].id));
    assert!(test.engine.outstanding_requests().is_empty());
}

#[test]
fn rejected_qc_aborts_replay_of_fetched_vertices() {
    // 1. Initialize a replica that knows vertices up to view 5, whose store refuses the QC for vertex 6.
    let validators = Validators::new(4);
    let chain = Chain::new(&validators, 8);
    let serving = MemVertexStore::from_chain(&chain, 8);
    let mut store = MemVertexStore::from_chain(&chain, 5);
    store.reject_qcs_for(chain.vertices[6].id);
    let mut test = TestEngine::new(listener_key(), chain.ledger_proof(3));
    let author = validators.public(2);

    // 2. Fetch vertices 8, 7 and 6.
    test.engine
        .sync_to_qc(chain.high_qc(8, 5), Some(author), &mut store);
    loop {
        let sent = test.sent_requests();
        if sent.is_empty() {
            break;
        }
        for (peer, request) in sent {
            test.respond(peer, &request, &serving, &mut store);
        }
    }

    // 3. Vertex 6 was inserted, but the QC carried by vertex 7 was refused, so the replay stopped there.
    assert_eq!(
        store.ops(),
        &vec![
            StoreOp::AddQC(chain.vertices[5].id),
            StoreOp::InsertVertex(chain.vertices[6].id),
        ]
    );
    assert!(!store.contains_vertex(&chain.vertices[7].id));
    assert!(!store.contains_vertex(&chain.vertices[8].id));
    assert_eq!(test.engine.sync_stage(&chain.vertices[8].id), None);
    assert!(test.engine.outstanding_requests().is_empty());
    assert!(test.pacemaker.processed().is_empty());

    // 4. The sync was dropped, so triggering it again starts a new one.
    assert_eq!(
        test.engine.sync_to_qc(chain.high_qc(8, 5), Some(author), &mut store),
        SyncResult::InProgress
    );
    let sent = test.sent_requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.vertex_id, chain.vertices[8].id);
}

#[test]
fn malformed_responses_are_never_applied() {
    let validators = Validators::new(4);
    let chain = Chain::new(&validators, 7);
    let serving = MemVertexStore::from_chain(&chain, 7);
    let mut store = MemVertexStore::from_chain(&chain, 5);
    let mut test = TestEngine::new(listener_key(), chain.ledger_proof(3));
    let author = validators.public(0);

    test.engine
        .sync_to_qc(chain.high_qc(6, 5), Some(author), &mut store);
    let request = test.sent_requests()[0].1;

    // 1. A vertex whose contents do not match its id.
    let mut tampered = chain.vertices[6].clone();
    tampered.commands = vec![Command::new(vec![66])];
    test.engine.on_get_vertices_response(
        &author,
        GetVerticesResponse {
            vertices: vec![tampered],
        },
        &mut store,
    );

    // 2. Vertices that are not parent-linked.
    test.engine.on_get_vertices_response(
        &author,
        GetVerticesResponse {
            vertices: vec![chain.vertices[6].clone(), chain.vertices[4].clone()],
        },
        &mut store,
    );

    // 3. A vertex that nobody asked for.
    test.engine.on_get_vertices_response(
        &author,
        GetVerticesResponse {
            vertices: vec![chain.vertices[7].clone()],
        },
        &mut store,
    );

    // 4. An empty response.
    test.engine
        .on_get_vertices_response(&author, GetVerticesResponse { vertices: vec![] }, &mut store);

    assert!(store.ops().is_empty());
    assert_eq!(test.engine.outstanding_requests(), vec![request]);
    assert!(test.pacemaker.processed().is_empty());

    // 5. The correct response still completes the sync.
    test.respond(author, &request, &serving, &mut store);
    assert_eq!(test.pacemaker.processed(), vec![ViewNumber::new(6)]);
}

#[test]
fn own_key_is_never_asked() {
    let validators = Validators::new(4);
    let chain = Chain::new(&validators, 8);
    let mut store = MemVertexStore::from_chain(&chain, 5);
    let me = validators.public(0);
    let mut test = TestEngine::new(me, chain.ledger_proof(3));

    test.engine.sync_to_qc(chain.high_qc(8, 5), Some(me), &mut store);
    let sent = test.sent_requests();
    assert_eq!(sent.len(), 1);
    assert_ne!(sent[0].0, me);

    for _ in 0..10 {
        test.engine.tick(Instant::now() + PATIENCE * 10, &mut store);
        for (peer, _) in test.sent_requests() {
            assert_ne!(peer, me);
        }
    }
}

#[test]
fn committed_sync_waits_for_ledger_then_rebuilds() {
    // 1. Initialize a replica that only knows the genesis vertex.
    let validators = Validators::new(4);
    let chain = Chain::new(&validators, 10);
    let serving = MemVertexStore::from_chain(&chain, 10);
    let mut store = MemVertexStore::genesis(&chain);
    let mut test = TestEngine::new(listener_key(), chain.ledger_proof(0));
    let author = validators.public(0);

    // 2. The highest committed QC commits vertex 8, which is unknown: fetch the three vertices ending at
    //    vertex 10.
    assert_eq!(
        test.engine.sync_to_qc(chain.high_qc(10, 10), Some(author), &mut store),
        SyncResult::InProgress
    );
    let sent = test.sent_requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.vertex_id, chain.vertices[10].id);
    assert_eq!(sent[0].1.count, 3);

    // 3. The ledger is behind vertex 8, so the engine asks ledger sync to catch up.
    test.respond(author, &sent[0].1, &serving, &mut store);
    assert_eq!(
        test.engine.sync_stage(&chain.vertices[10].id),
        Some(SyncStage::SyncToCommit)
    );
    let local_sync_request = test.local_sync_requests.try_recv().unwrap();
    assert_eq!(local_sync_request.target, chain.ledger_proof(8));
    assert_eq!(local_sync_request.target_nodes[0], author);
    assert_eq!(local_sync_request.target_nodes.len(), 4);
    assert!(store.ops().is_empty());

    // 4. A partial ledger update does not resume the sync.
    test.engine.on_ledger_update(
        &LedgerUpdate {
            commands: chain.commands(0, 5),
            tail: chain.ledger_proof(5),
        },
        &mut store,
    );
    assert_eq!(
        test.engine.sync_stage(&chain.vertices[10].id),
        Some(SyncStage::SyncToCommit)
    );

    // 5. Reaching vertex 8 rebuilds the store from it and installs the target QC.
    test.engine.on_ledger_update(
        &LedgerUpdate {
            commands: chain.commands(5, 8),
            tail: chain.ledger_proof(8),
        },
        &mut store,
    );
    assert_eq!(store.ops()[0], StoreOp::Rebuild(chain.vertices[8].id));
    assert_eq!(store.root().id, chain.vertices[8].id);
    assert!(store.contains_vertex(&chain.vertices[10].id));
    assert_eq!(test.pacemaker.processed(), vec![ViewNumber::new(10)]);
    assert_eq!(
        test.engine.current_ledger_header().state_version(),
        StateVersion::new(8)
    );
    assert_eq!(test.engine.sync_stage(&chain.vertices[10].id), None);
}

#[test]
fn committed_sync_skips_ledger_sync_when_ledger_is_ahead() {
    let validators = Validators::new(4);
    let chain = Chain::new(&validators, 10);
    let serving = MemVertexStore::from_chain(&chain, 10);
    let mut store = MemVertexStore::genesis(&chain);
    let mut test = TestEngine::new(listener_key(), chain.ledger_proof(8));
    let author = validators.public(0);

    test.engine
        .sync_to_qc(chain.high_qc(10, 10), Some(author), &mut store);
    let sent = test.sent_requests();
    test.respond(author, &sent[0].1, &serving, &mut store);

    assert!(test.local_sync_requests.try_recv().is_err());
    assert_eq!(store.root().id, chain.vertices[8].id);
    assert_eq!(test.pacemaker.processed(), vec![ViewNumber::new(10)]);
}
