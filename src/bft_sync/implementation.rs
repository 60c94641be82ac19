/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The BFT sync engine.

use std::{
    collections::{hash_map::Entry, BTreeMap, HashMap},
    sync::mpsc::Sender,
    time::{Duration, Instant, SystemTime},
};

use rand::{rngs::StdRng, seq::SliceRandom};

use crate::{
    events::*,
    ledger_sync::messages::{LedgerUpdate, LocalSyncRequest},
    networking::{network::Network, sending::SenderHandle},
    pacemaker::Pacemaker,
    timeouts::TimeoutQueue,
    types::{
        certificates::{HighQC, LedgerProof, QuorumCertificate},
        crypto_primitives::VerifyingKey,
        data_types::{ChainID, CryptoHash, StateVersion},
        vertex::Vertex,
    },
    vertex_store::VertexStore,
};

use super::{
    messages::{GetVerticesErrorResponse, GetVerticesRequest, GetVerticesResponse},
    types::{SyncRequestState, SyncResult, SyncStage, SyncState, VertexRequestTimeout},
};

/// Number of vertices needed to rebuild the vertex store from a committed root: the committed vertex,
/// its child, and its grandchild, whose QC commits it.
const COMMITTED_VERTICES_COUNT: u32 = 3;

pub struct BFTSyncConfiguration {
    pub chain_id: ChainID,
    /// The replica's own verifying key. Never asked for vertices.
    pub me: VerifyingKey,
    /// How long to wait for a response to a `GetVerticesRequest` before retrying.
    pub patience: Duration,
}

/// Drives every in-flight sync of this replica towards its target QC.
///
/// `BFTSync` is meant to be owned by a single thread (the [sync loop](crate::sync_loop)), which calls
/// its methods one at a time and passes in the vertex store on every call.
pub struct BFTSync<N: Network, P: Pacemaker> {
    config: BFTSyncConfiguration,
    pacemaker: P,
    sender: SenderHandle<N>,
    local_sync_requests: Sender<LocalSyncRequest>,
    event_publisher: Option<Sender<Event>>,
    rng: StdRng,

    // Syncs in progress, keyed by the id of their target vertex.
    syncing: HashMap<CryptoHash, SyncState>,
    // Outstanding vertex requests.
    bft_syncing: HashMap<GetVerticesRequest, SyncRequestState>,
    // Syncs blocked on the committed ledger reaching a state version.
    ledger_syncing: BTreeMap<StateVersion, Vec<CryptoHash>>,
    current_ledger_header: LedgerProof,
    timeouts: TimeoutQueue<VertexRequestTimeout>,
    next_request_seq: u64,
}

impl<N: Network, P: Pacemaker> BFTSync<N, P> {
    pub fn new(
        config: BFTSyncConfiguration,
        network: N,
        pacemaker: P,
        current_ledger_header: LedgerProof,
        local_sync_requests: Sender<LocalSyncRequest>,
        rng: StdRng,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            config,
            pacemaker,
            sender: SenderHandle::new(network),
            local_sync_requests,
            event_publisher,
            rng,
            syncing: HashMap::new(),
            bft_syncing: HashMap::new(),
            ledger_syncing: BTreeMap::new(),
            current_ledger_header,
            timeouts: TimeoutQueue::new(),
            next_request_seq: 0,
        }
    }

    /// Try to bring the vertex store up to `high_qc`, fetching missing vertices from `author` (and the
    /// signers of `high_qc`'s highest QC) if needed.
    ///
    /// Returns:
    /// - `Invalid` if the highest QC is below the vertex store's root or below the committed ledger
    ///   header, if it is a genesis QC that the store rejects, or if a sync is needed but cannot be
    ///   started.
    /// - `Synced` if the highest QC was installed directly.
    /// - `InProgress` if a sync towards the highest QC's vertex has been started, or already was.
    pub fn sync_to_qc<V: VertexStore>(
        &mut self,
        high_qc: HighQC,
        author: Option<VerifyingKey>,
        vertex_store: &mut V,
    ) -> SyncResult {
        let qc = high_qc.highest_qc();
        if qc.view() < vertex_store.root().view || qc.view() < self.current_ledger_header.committed.view {
            return SyncResult::Invalid;
        }

        if vertex_store.add_qc(qc) {
            if let Some(tc) = &high_qc.highest_tc {
                vertex_store.insert_timeout_certificate(tc);
            }
            self.pacemaker.process_qc(&high_qc);

            Event::SyncedToQC(SyncedToQCEvent {
                timestamp: SystemTime::now(),
                vertex: qc.proposed().vertex_id,
                view: qc.view(),
            })
            .publish(&self.event_publisher);

            return SyncResult::Synced;
        }

        if qc.is_genesis_qc() {
            log::warn!("Bad genesis QC: vertex store rejected the genesis QC for {:?}", qc.proposed().vertex_id);
            return SyncResult::Invalid;
        }

        let vertex_id = qc.proposed().vertex_id;
        if self.syncing.contains_key(&vertex_id) {
            return SyncResult::InProgress;
        }

        let author = match author {
            Some(author) => author,
            None => {
                log::warn!("Sync to {:?} required, but no author was provided.", vertex_id);
                return SyncResult::Invalid;
            }
        };

        let sync_state = match SyncState::new(high_qc, author) {
            Some(sync_state) => sync_state,
            None => {
                log::warn!("Highest committed QC for {:?} does not commit a vertex.", vertex_id);
                return SyncResult::Invalid;
            }
        };

        self.start_sync(sync_state, vertex_store);
        SyncResult::InProgress
    }

    /// Handle a response to one of this replica's `GetVerticesRequest`s.
    pub fn on_get_vertices_response<V: VertexStore>(
        &mut self,
        origin: &VerifyingKey,
        response: GetVerticesResponse,
        vertex_store: &mut V,
    ) {
        if let Err(err) = response.validate() {
            log::warn!("Discarding GetVerticesResponse from {:?}: {:?}", origin, err);
            return;
        }

        let request = match response.request_key() {
            Some((vertex_id, count)) => GetVerticesRequest::new(self.config.chain_id, vertex_id, count),
            None => return,
        };

        let request_state = match self.bft_syncing.remove(&request) {
            Some(request_state) => request_state,
            None => {
                log::debug!("Ignoring unexpected GetVerticesResponse for {:?}.", request.vertex_id);
                return;
            }
        };

        Event::ReceiveGetVertices(ReceiveGetVerticesEvent {
            timestamp: SystemTime::now(),
            origin: *origin,
            vertex: request.vertex_id,
            count: request.count,
        })
        .publish(&self.event_publisher);

        for sync_id in request_state.sync_ids {
            // The sync may have finished or been dropped since it started waiting.
            let stage = match self.syncing.get(&sync_id) {
                Some(sync_state) => sync_state.stage,
                None => continue,
            };

            match stage {
                SyncStage::GetQCVertices => {
                    self.process_vertices_for_qc_sync(sync_id, &response, vertex_store)
                }
                SyncStage::GetCommittedVertices => {
                    self.process_vertices_for_committed_sync(sync_id, &response, vertex_store)
                }
                SyncStage::Preparing | SyncStage::SyncToCommit => {
                    log::debug!("Sync {:?} is in stage {:?}, ignoring vertices.", sync_id, stage)
                }
            }
        }
    }

    /// Handle a peer's report that it could not serve a `GetVerticesRequest`.
    ///
    /// If the request is still outstanding and the peer's highest QC is higher than this replica's, sync
    /// towards the peer's instead.
    pub fn on_get_vertices_error_response<V: VertexStore>(
        &mut self,
        origin: &VerifyingKey,
        response: GetVerticesErrorResponse,
        vertex_store: &mut V,
    ) {
        if !self.bft_syncing.contains_key(&response.request) {
            log::debug!(
                "Ignoring GetVertices error from {:?} for {:?}: no such request outstanding.",
                origin,
                response.request.vertex_id
            );
            return;
        }

        let local_view = vertex_store.high_qc().highest_qc().view();
        let remote_view = response.high_qc.highest_qc().view();
        log::debug!(
            "GetVertices error from {:?} for {:?}: remote view {}, local view {}.",
            origin,
            response.request.vertex_id,
            remote_view,
            local_view
        );

        if remote_view > local_view {
            self.sync_to_qc(response.high_qc, Some(*origin), vertex_store);
        }
    }

    /// Handle a committed ledger update: resume every sync that was waiting on the ledger to reach a state
    /// version at or below the update's tail.
    pub fn on_ledger_update<V: VertexStore>(&mut self, update: &LedgerUpdate, vertex_store: &mut V) {
        let tail_version = update.tail.state_version();
        if tail_version > self.current_ledger_header.state_version() {
            self.current_ledger_header = update.tail.clone();
        }

        let still_waiting = self.ledger_syncing.split_off(&(tail_version + 1));
        let resolved = std::mem::replace(&mut self.ledger_syncing, still_waiting);
        for sync_id in resolved.into_values().flatten() {
            if self.syncing.contains_key(&sync_id) {
                self.rebuild_and_sync_qc(sync_id, vertex_store);
            }
        }
    }

    /// Handle every vertex request whose patience expired at or before `now`.
    pub fn tick<V: VertexStore>(&mut self, now: Instant, vertex_store: &mut V) {
        for timeout in self.timeouts.pop_expired(now) {
            self.on_vertex_request_timeout(timeout, vertex_store);
        }
    }

    /// Get the earliest instant at which [`tick`](Self::tick) has something to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timeouts.next_deadline()
    }

    /// Get the stage of the sync towards `local_sync_id`, if one is in progress.
    pub fn sync_stage(&self, local_sync_id: &CryptoHash) -> Option<SyncStage> {
        self.syncing.get(local_sync_id).map(|sync_state| sync_state.stage)
    }

    /// Get the vertex requests that have been sent and are still waiting for a response.
    pub fn outstanding_requests(&self) -> Vec<GetVerticesRequest> {
        self.bft_syncing.keys().copied().collect()
    }

    pub fn current_ledger_header(&self) -> &LedgerProof {
        &self.current_ledger_header
    }

    fn on_vertex_request_timeout<V: VertexStore>(
        &mut self,
        timeout: VertexRequestTimeout,
        vertex_store: &mut V,
    ) {
        let request_state = match self.bft_syncing.entry(timeout.request) {
            Entry::Occupied(entry) if entry.get().seq == timeout.seq => entry.remove(),
            // Answered, or re-sent since this timeout was scheduled.
            _ => return,
        };

        Event::VertexRequestTimeout(VertexRequestTimeoutEvent {
            timestamp: SystemTime::now(),
            request: timeout.request,
        })
        .publish(&self.event_publisher);

        for sync_id in request_state.sync_ids {
            if let Some(sync_state) = self.syncing.remove(&sync_id) {
                let author = request_state.authors.choose(&mut self.rng).copied();
                self.sync_to_qc(sync_state.high_qc, author, vertex_store);
            }
        }
    }

    fn start_sync<V: VertexStore>(&mut self, sync_state: SyncState, vertex_store: &mut V) {
        let sync_id = sync_state.local_sync_id;
        let requires_ledger_sync = Self::requires_ledger_sync(&sync_state, vertex_store);
        self.syncing.insert(sync_id, sync_state);

        if requires_ledger_sync {
            self.do_committed_sync(sync_id);
        } else {
            self.do_qc_sync(sync_id);
        }
    }

    // Check whether the vertex store is so far behind that it must be rebuilt from the committed vertex.
    fn requires_ledger_sync<V: VertexStore>(sync_state: &SyncState, vertex_store: &V) -> bool {
        let committed_header = &sync_state.committed_header;
        !vertex_store.contains_vertex(&committed_header.vertex_id)
            && vertex_store.root().view < committed_header.view
    }

    fn do_qc_sync(&mut self, sync_id: CryptoHash) {
        let (vertex_id, authors) = match self.syncing.get_mut(&sync_id) {
            Some(sync_state) => {
                sync_state.stage = SyncStage::GetQCVertices;
                let qc = sync_state.high_qc.highest_qc();
                (
                    qc.proposed().vertex_id,
                    candidate_authors(&sync_state.author, qc, &self.config.me),
                )
            }
            None => return,
        };
        self.publish_start_sync(sync_id);
        self.send_bft_sync_request(sync_id, vertex_id, 1, authors);
    }

    fn do_committed_sync(&mut self, sync_id: CryptoHash) {
        let (vertex_id, authors) = match self.syncing.get_mut(&sync_id) {
            Some(sync_state) => {
                sync_state.stage = SyncStage::GetCommittedVertices;
                let high_qc = &sync_state.high_qc;
                (
                    high_qc.highest_committed_qc().proposed().vertex_id,
                    candidate_authors(&sync_state.author, high_qc.highest_committed_qc(), &self.config.me),
                )
            }
            None => return,
        };
        self.publish_start_sync(sync_id);
        self.send_bft_sync_request(sync_id, vertex_id, COMMITTED_VERTICES_COUNT, authors);
    }

    fn send_bft_sync_request(
        &mut self,
        sync_id: CryptoHash,
        vertex_id: CryptoHash,
        count: u32,
        authors: Vec<VerifyingKey>,
    ) {
        let request = GetVerticesRequest::new(self.config.chain_id, vertex_id, count);
        match self.bft_syncing.entry(request) {
            Entry::Occupied(mut request_state) => {
                // An identical request is already in flight.
                request_state.get_mut().sync_ids.push(sync_id);
            }
            Entry::Vacant(entry) => {
                let peer = match authors.first() {
                    Some(peer) => *peer,
                    None => {
                        log::warn!("No peer to request {:?} from, dropping sync {:?}.", vertex_id, sync_id);
                        self.syncing.remove(&sync_id);
                        return;
                    }
                };

                let seq = self.next_request_seq;
                self.next_request_seq += 1;
                entry.insert(SyncRequestState {
                    authors,
                    sync_ids: vec![sync_id],
                    seq,
                });

                self.sender.send(peer, request);
                self.timeouts
                    .schedule(VertexRequestTimeout { request, seq }, self.config.patience);

                Event::SendGetVertices(SendGetVerticesEvent {
                    timestamp: SystemTime::now(),
                    peer,
                    request,
                })
                .publish(&self.event_publisher);
            }
        }
    }

    fn process_vertices_for_qc_sync<V: VertexStore>(
        &mut self,
        sync_id: CryptoHash,
        response: &GetVerticesResponse,
        vertex_store: &mut V,
    ) {
        let vertex = match response.vertices.first() {
            Some(vertex) => vertex.clone(),
            None => return,
        };
        let parent_id = vertex.parent_id();

        if !vertex_store.contains_vertex(&parent_id) {
            // Keep walking backwards.
            let authors = match self.syncing.get_mut(&sync_id) {
                Some(sync_state) => {
                    let authors = candidate_authors(&sync_state.author, &vertex.justify, &self.config.me);
                    sync_state.fetched.push_front(vertex);
                    authors
                }
                None => return,
            };
            self.send_bft_sync_request(sync_id, parent_id, 1, authors);
            return;
        }

        let mut sync_state = match self.syncing.remove(&sync_id) {
            Some(sync_state) => sync_state,
            None => return,
        };
        sync_state.fetched.push_front(vertex);

        for vertex in sync_state.fetched.drain(..) {
            if !vertex_store.add_qc(&vertex.justify) {
                log::info!(
                    "GetVertices failed: could not add the QC of {:?} while syncing to {:?}.",
                    vertex.id,
                    sync_id
                );
                return;
            }
            vertex_store.insert_vertex(vertex);
        }

        self.sync_to_qc(sync_state.high_qc, Some(sync_state.author), vertex_store);
    }

    fn process_vertices_for_committed_sync<V: VertexStore>(
        &mut self,
        sync_id: CryptoHash,
        response: &GetVerticesResponse,
        vertex_store: &mut V,
    ) {
        let current_version = self.current_ledger_header.state_version();
        let (committed_version, local_sync_request) = match self.syncing.get_mut(&sync_id) {
            Some(sync_state) => {
                sync_state.fetched.extend(response.vertices.iter().cloned());
                let committed_version = sync_state.committed_proof.state_version();
                if committed_version <= current_version {
                    (committed_version, None)
                } else {
                    sync_state.stage = SyncStage::SyncToCommit;
                    let target_nodes = candidate_authors(
                        &sync_state.author,
                        sync_state.high_qc.highest_committed_qc(),
                        &self.config.me,
                    );
                    (
                        committed_version,
                        Some(LocalSyncRequest {
                            target: sync_state.committed_proof.clone(),
                            target_nodes,
                        }),
                    )
                }
            }
            None => return,
        };

        match local_sync_request {
            None => self.rebuild_and_sync_qc(sync_id, vertex_store),
            Some(local_sync_request) => {
                self.ledger_syncing
                    .entry(committed_version)
                    .or_default()
                    .push(sync_id);
                if self.local_sync_requests.send(local_sync_request).is_err() {
                    log::warn!("Ledger sync is not running, sync {:?} cannot make progress.", sync_id);
                }
            }
        }
    }

    fn rebuild_and_sync_qc<V: VertexStore>(&mut self, sync_id: CryptoHash, vertex_store: &mut V) {
        let sync_state = match self.syncing.remove(&sync_id) {
            Some(sync_state) => sync_state,
            None => return,
        };

        if Self::requires_ledger_sync(&sync_state, vertex_store) {
            let mut fetched: Vec<Vertex> = sync_state.fetched.into_iter().collect();
            if fetched.len() < 2 {
                log::warn!("Cannot rebuild from {} vertices, dropping sync {:?}.", fetched.len(), sync_id);
                return;
            }
            fetched.sort_by_key(|vertex| vertex.view);
            let root = fetched.remove(0);
            let root_qc = fetched[0].justify.clone();
            let (root_id, root_view) = (root.id, root.view);

            vertex_store.rebuild(
                root,
                root_qc,
                sync_state.high_qc.highest_committed_qc().clone(),
                fetched,
            );

            Event::RebuildVertexStore(RebuildVertexStoreEvent {
                timestamp: SystemTime::now(),
                root: root_id,
                root_view,
            })
            .publish(&self.event_publisher);
        } else {
            log::info!("Skipping rebuild for sync {:?}: vertex store is already past it.", sync_id);
        }

        self.sync_to_qc(sync_state.high_qc, Some(sync_state.author), vertex_store);
    }

    fn publish_start_sync(&self, sync_id: CryptoHash) {
        if let Some(sync_state) = self.syncing.get(&sync_id) {
            Event::StartBFTSync(StartBFTSyncEvent {
                timestamp: SystemTime::now(),
                target: sync_id,
                view: sync_state.high_qc.highest_qc().view(),
                author: sync_state.author,
                stage: sync_state.stage,
            })
            .publish(&self.event_publisher);
        }
    }
}

/// Get the peers that can be asked for the vertices certified by `qc`: `author` first, then the other
/// signers of `qc` in order, never including `me`.
fn candidate_authors(
    author: &VerifyingKey,
    qc: &QuorumCertificate,
    me: &VerifyingKey,
) -> Vec<VerifyingKey> {
    std::iter::once(*author)
        .chain(qc.signers().filter(|signer| signer != author))
        .filter(|peer| peer != me)
        .collect()
}
