/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types specific to the BFT sync protocol.

use std::collections::VecDeque;

use crate::types::{
    certificates::{BFTHeader, HighQC, LedgerProof},
    crypto_primitives::VerifyingKey,
    data_types::CryptoHash,
    vertex::Vertex,
};

use super::messages::GetVerticesRequest;

/// Outcome of a call to [`sync_to_qc`](super::BFTSync::sync_to_qc).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncResult {
    /// The QC cannot be synced to, and will not be retried.
    Invalid,
    /// The QC is installed in the vertex store.
    Synced,
    /// The vertices needed to install the QC are being fetched.
    InProgress,
}

/// Stage of an in-flight sync.
///
/// ```text
/// Preparing ──┬──> GetCommittedVertices ──> SyncToCommit
///             └──> GetQCVertices
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStage {
    Preparing,
    /// Fetching the three vertices that end at the highest committed QC's vertex, to rebuild the
    /// vertex store from a new committed root.
    GetCommittedVertices,
    /// Waiting for the committed ledger to reach the committed header.
    SyncToCommit,
    /// Fetching the missing ancestors of the highest QC's vertex, one at a time.
    GetQCVertices,
}

/// The state of syncing to one target vertex.
pub(crate) struct SyncState {
    /// The id of the target vertex.
    pub(crate) local_sync_id: CryptoHash,
    pub(crate) high_qc: HighQC,
    pub(crate) committed_header: BFTHeader,
    pub(crate) committed_proof: LedgerProof,
    pub(crate) author: VerifyingKey,
    pub(crate) stage: SyncStage,
    /// Vertices fetched so far. In `GetQCVertices` these are in ascending order of view, each vertex
    /// the parent of the next.
    pub(crate) fetched: VecDeque<Vertex>,
}

impl SyncState {
    /// Create a `SyncState` in the `Preparing` stage. Returns `None` if the highest committed QC in
    /// `high_qc` does not commit any vertex.
    pub(crate) fn new(high_qc: HighQC, author: VerifyingKey) -> Option<SyncState> {
        let (committed_header, committed_proof) =
            high_qc.highest_committed_qc().committed_and_ledger_proof()?;
        Some(SyncState {
            local_sync_id: high_qc.highest_qc().proposed().vertex_id,
            high_qc,
            committed_header,
            committed_proof,
            author,
            stage: SyncStage::Preparing,
            fetched: VecDeque::new(),
        })
    }
}

/// The state of one outstanding [`GetVerticesRequest`].
pub(crate) struct SyncRequestState {
    /// Peers that can serve the request, in order of priority.
    pub(crate) authors: Vec<VerifyingKey>,
    /// The syncs waiting on the request, in the order they started waiting.
    pub(crate) sync_ids: Vec<CryptoHash>,
    pub(crate) seq: u64,
}

/// Scheduled when a [`GetVerticesRequest`] is sent. Fires if no response arrives in time.
pub(crate) struct VertexRequestTimeout {
    pub(crate) request: GetVerticesRequest,
    /// Identifies the particular sending of `request`, since an identical request may be sent again
    /// after the first one is answered.
    pub(crate) seq: u64,
}

/// Reasons a [`GetVerticesResponse`](super::messages::GetVerticesResponse) is discarded before it
/// is matched against any outstanding request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VertexResponseError {
    Empty,
    /// A vertex's id does not match its contents.
    IncorrectVertexId { vertex: CryptoHash },
    /// A vertex is not the parent of the vertex before it.
    NotParentLinked { vertex: CryptoHash },
}
