/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable storage for the consensus DAG.
//!
//! The [`VertexStore`] owns the vertices that have been proposed but not yet pruned, the QCs that
//! certify them, and the commit rule that decides which vertices are committed. This crate never
//! implements consensus storage itself. It only writes into the store from the sync loop, and only in
//! the order the store's invariants require:
//! 1. A vertex's justify QC is added with [`add_qc`](VertexStore::add_qc) before the vertex is
//!    inserted with [`insert_vertex`](VertexStore::insert_vertex).
//! 2. Vertices are inserted in ancestor-to-descendant order, so that a vertex's parent is always
//!    present when the vertex is inserted.

use crate::types::{
    certificates::{HighQC, QuorumCertificate, TimeoutCertificate},
    data_types::CryptoHash,
    vertex::Vertex,
};

pub trait VertexStore {
    /// Try to install `qc`. Returns `false` if the vertex that `qc` certifies is not in the store, or if
    /// `qc` is otherwise unacceptable, in which case the store must be left unchanged.
    fn add_qc(&mut self, qc: &QuorumCertificate) -> bool;

    /// Install `tc` if it is higher than the store's current highest timeout certificate.
    fn insert_timeout_certificate(&mut self, tc: &TimeoutCertificate);

    /// Insert `vertex`. Callers must have already added `vertex.justify` with `add_qc`.
    fn insert_vertex(&mut self, vertex: Vertex);

    fn contains_vertex(&self, vertex_id: &CryptoHash) -> bool;

    /// Get the vertex identified by `vertex_id` followed by its `count - 1` nearest ancestors, from the
    /// highest view to the lowest. Returns an empty `Vec` if the vertex or any of the ancestors is not
    /// available.
    fn get_vertices(&self, vertex_id: &CryptoHash, count: usize) -> Vec<Vertex>;

    /// Discard the current DAG and rebuild it from a new committed `root`.
    ///
    /// `root_qc` certifies `root`, `root_commit_qc` is the QC that committed `root`, and `vertices` are
    /// the descendants of `root` sorted in ascending order of view.
    fn rebuild(
        &mut self,
        root: Vertex,
        root_qc: QuorumCertificate,
        root_commit_qc: QuorumCertificate,
        vertices: Vec<Vertex>,
    );

    /// Get the current root of the DAG, i.e., the most recently committed vertex.
    fn root(&self) -> Vertex;

    fn high_qc(&self) -> HighQC;
}
