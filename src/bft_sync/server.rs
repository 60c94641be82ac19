/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Implements the [`VertexSyncServer`], which answers other replicas' [`GetVerticesRequest`]s from the
//! local vertex store.
//!
//! A request for `count` vertices ending at `vertex_id` is answered with a [`GetVerticesResponse`] only
//! if the store can provide all `count` of them. Otherwise the server answers with a
//! [`GetVerticesErrorResponse`] carrying its [`HighQC`](crate::types::certificates::HighQC), so that a
//! requester that is chasing a stale QC can learn about a higher one.

use crate::networking::{network::Network, sending::SenderHandle};
use crate::types::{crypto_primitives::VerifyingKey, data_types::ChainID};
use crate::vertex_store::VertexStore;

use super::messages::{GetVerticesErrorResponse, GetVerticesRequest, GetVerticesResponse};

pub struct VertexSyncServer<N: Network> {
    chain_id: ChainID,
    sender: SenderHandle<N>,
}

impl<N: Network> VertexSyncServer<N> {
    pub fn new(chain_id: ChainID, network: N) -> Self {
        Self {
            chain_id,
            sender: SenderHandle::new(network),
        }
    }

    /// Answer `request` from `origin` with vertices from `vertex_store`. Requests for another chain are
    /// ignored.
    pub fn on_get_vertices_request<V: VertexStore>(
        &mut self,
        origin: VerifyingKey,
        request: GetVerticesRequest,
        vertex_store: &V,
    ) {
        if request.chain_id != self.chain_id {
            return;
        }

        let vertices = vertex_store.get_vertices(&request.vertex_id, request.count as usize);
        if request.count > 0 && vertices.len() == request.count as usize {
            self.sender.send(origin, GetVerticesResponse { vertices });
        } else {
            log::debug!(
                "Cannot serve {} vertices ending at {:?} to {:?}.",
                request.count,
                request.vertex_id,
                origin
            );
            self.sender.send(
                origin,
                GetVerticesErrorResponse {
                    high_qc: vertex_store.high_qc(),
                    request,
                },
            );
        }
    }
}
