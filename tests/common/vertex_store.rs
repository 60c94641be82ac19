use std::collections::{HashMap, HashSet};

use hotstuff_sync::{
    types::{
        certificates::{HighQC, QuorumCertificate, TimeoutCertificate},
        data_types::CryptoHash,
        vertex::Vertex,
    },
    vertex_store::VertexStore,
};

use super::fixtures::Chain;

/// A write made to a [`MemVertexStore`], in the order it was made.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum StoreOp {
    AddQC(CryptoHash),
    InsertVertex(CryptoHash),
    Rebuild(CryptoHash),
}

/// An in-memory vertex store that never prunes, and panics if a vertex is inserted before its justify QC
/// or before its parent.
pub(crate) struct MemVertexStore {
    root: Vertex,
    vertices: HashMap<CryptoHash, Vertex>,
    // Keyed by the id of the certified vertex.
    qcs: HashMap<CryptoHash, QuorumCertificate>,
    high_qc: HighQC,
    ops: Vec<StoreOp>,
    // Ids of vertices whose QCs `add_qc` refuses.
    rejected_qcs: HashSet<CryptoHash>,
}

impl MemVertexStore {
    /// Create a vertex store rooted at `root`, which `root_qc` certifies.
    pub(crate) fn new(root: Vertex, root_qc: QuorumCertificate) -> MemVertexStore {
        let mut vertices = HashMap::new();
        vertices.insert(root.id, root.clone());
        let mut qcs = HashMap::new();
        qcs.insert(root.id, root_qc.clone());
        MemVertexStore {
            root,
            vertices,
            qcs,
            high_qc: HighQC::from_qc(root_qc),
            ops: Vec::new(),
            rejected_qcs: HashSet::new(),
        }
    }

    /// Create a vertex store that only contains the genesis vertex of `chain`.
    pub(crate) fn genesis(chain: &Chain) -> MemVertexStore {
        MemVertexStore::new(chain.genesis().clone(), chain.qcs[0].clone())
    }

    /// Create a vertex store that contains `chain.vertices[0..=up_to]` and their QCs.
    pub(crate) fn from_chain(chain: &Chain, up_to: usize) -> MemVertexStore {
        let mut store = MemVertexStore::genesis(chain);
        for vertex in &chain.vertices[1..=up_to] {
            assert!(store.add_qc(&vertex.justify));
            store.insert_vertex(vertex.clone());
        }
        assert!(store.add_qc(&chain.qcs[up_to]));
        store.ops.clear();
        store
    }

    pub(crate) fn ops(&self) -> &Vec<StoreOp> {
        &self.ops
    }

    /// Make `add_qc` refuse every QC that certifies `vertex_id`, as a store that judges it invalid would.
    pub(crate) fn reject_qcs_for(&mut self, vertex_id: CryptoHash) {
        self.rejected_qcs.insert(vertex_id);
    }
}

impl VertexStore for MemVertexStore {
    fn add_qc(&mut self, qc: &QuorumCertificate) -> bool {
        let vertex_id = qc.proposed().vertex_id;
        if !self.vertices.contains_key(&vertex_id) || self.rejected_qcs.contains(&vertex_id) {
            return false;
        }

        self.qcs.insert(vertex_id, qc.clone());
        if qc.view() > self.high_qc.highest_qc().view() {
            self.high_qc.highest_qc = qc.clone();
        }
        if qc.vote_data.committed.is_some()
            && qc.view() > self.high_qc.highest_committed_qc().view()
        {
            self.high_qc.highest_committed_qc = qc.clone();
        }
        self.ops.push(StoreOp::AddQC(vertex_id));
        true
    }

    fn insert_timeout_certificate(&mut self, tc: &TimeoutCertificate) {
        let higher = match &self.high_qc.highest_tc {
            Some(highest_tc) => tc.view > highest_tc.view,
            None => true,
        };
        if higher {
            self.high_qc.highest_tc = Some(tc.clone());
        }
    }

    fn insert_vertex(&mut self, vertex: Vertex) {
        let parent_id = vertex.parent_id();
        assert!(
            self.qcs.contains_key(&parent_id),
            "vertex inserted before its justify QC"
        );
        assert!(
            self.vertices.contains_key(&parent_id),
            "vertex inserted before its parent"
        );
        self.ops.push(StoreOp::InsertVertex(vertex.id));
        self.vertices.insert(vertex.id, vertex);
    }

    fn contains_vertex(&self, vertex_id: &CryptoHash) -> bool {
        self.vertices.contains_key(vertex_id)
    }

    fn get_vertices(&self, vertex_id: &CryptoHash, count: usize) -> Vec<Vertex> {
        let mut vertices = Vec::with_capacity(count);
        let mut next = *vertex_id;
        while vertices.len() < count {
            match self.vertices.get(&next) {
                Some(vertex) => {
                    next = vertex.parent_id();
                    vertices.push(vertex.clone());
                }
                None => return Vec::new(),
            }
        }
        vertices
    }

    fn rebuild(
        &mut self,
        root: Vertex,
        root_qc: QuorumCertificate,
        root_commit_qc: QuorumCertificate,
        vertices: Vec<Vertex>,
    ) {
        assert_eq!(root_qc.proposed().vertex_id, root.id);

        self.vertices.clear();
        self.qcs.clear();
        self.ops.push(StoreOp::Rebuild(root.id));
        self.vertices.insert(root.id, root.clone());
        self.qcs.insert(root.id, root_qc.clone());
        self.root = root;
        self.high_qc = HighQC::from_qc(root_qc);

        for vertex in vertices {
            assert!(self.add_qc(&vertex.justify), "rebuilt vertex is not linked to its parent");
            self.insert_vertex(vertex);
        }
        assert!(self.add_qc(&root_commit_qc), "root commit QC certifies an unknown vertex");
    }

    fn root(&self) -> Vertex {
        self.root.clone()
    }

    fn high_qc(&self) -> HighQC {
        self.high_qc.clone()
    }
}
