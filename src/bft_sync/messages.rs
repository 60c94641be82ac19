/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Structured messages that are sent between replicas as part of the BFT sync protocol.

use borsh::{BorshDeserialize, BorshSerialize};

use super::types::VertexResponseError;
use crate::networking::messages::Message;
use crate::types::{
    certificates::HighQC,
    data_types::{ChainID, CryptoHash},
    vertex::Vertex,
};

/// Messages exchanged as part of the BFT sync protocol.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub enum BFTSyncMessage {
    GetVerticesRequest(GetVerticesRequest),
    GetVerticesResponse(GetVerticesResponse),
    GetVerticesErrorResponse(GetVerticesErrorResponse),
}

/// Request for the vertex identified by `vertex_id` and its `count - 1` nearest ancestors.
///
/// Outstanding requests are identified by their `(vertex_id, count)` pair: a replica never has two
/// identical `GetVerticesRequest`s in flight at the same time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct GetVerticesRequest {
    pub chain_id: ChainID,
    pub vertex_id: CryptoHash,
    pub count: u32,
}

impl GetVerticesRequest {
    pub fn new(chain_id: ChainID, vertex_id: CryptoHash, count: u32) -> Self {
        Self {
            chain_id,
            vertex_id,
            count,
        }
    }
}

/// The vertices requested by a [`GetVerticesRequest`], from the highest view to the lowest.
///
/// The sender of the response is the origin reported by the [network](crate::networking::network::Network).
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct GetVerticesResponse {
    pub vertices: Vec<Vertex>,
}

impl GetVerticesResponse {
    /// Get the `(vertex_id, count)` key of the request that this response answers, if it is not empty.
    pub fn request_key(&self) -> Option<(CryptoHash, u32)> {
        self.vertices
            .first()
            .map(|vertex| (vertex.id, self.vertices.len() as u32))
    }

    /// Check that the response is not empty, that every vertex's id matches its contents, and that every
    /// vertex is the parent of the vertex before it.
    pub fn validate(&self) -> Result<(), VertexResponseError> {
        if self.vertices.is_empty() {
            return Err(VertexResponseError::Empty);
        }

        if let Some(vertex) = self.vertices.iter().find(|vertex| !vertex.is_correct()) {
            return Err(VertexResponseError::IncorrectVertexId { vertex: vertex.id });
        }

        for pair in self.vertices.windows(2) {
            if pair[0].parent_id() != pair[1].id {
                return Err(VertexResponseError::NotParentLinked {
                    vertex: pair[1].id,
                });
            }
        }

        Ok(())
    }
}

/// Sent instead of a [`GetVerticesResponse`] by a replica that cannot serve `request`. Carries the
/// sender's [`HighQC`] so the requester can tell whether the sender has moved on.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct GetVerticesErrorResponse {
    pub high_qc: HighQC,
    pub request: GetVerticesRequest,
}

impl From<GetVerticesRequest> for Message {
    fn from(value: GetVerticesRequest) -> Self {
        Message::BFTSyncMessage(BFTSyncMessage::GetVerticesRequest(value))
    }
}

impl From<GetVerticesResponse> for Message {
    fn from(value: GetVerticesResponse) -> Self {
        Message::BFTSyncMessage(BFTSyncMessage::GetVerticesResponse(value))
    }
}

impl From<GetVerticesErrorResponse> for Message {
    fn from(value: GetVerticesErrorResponse) -> Self {
        Message::BFTSyncMessage(BFTSyncMessage::GetVerticesErrorResponse(value))
    }
}
