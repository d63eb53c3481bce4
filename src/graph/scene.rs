//! Per-scene input types: actor trajectories, lane graphs, relation edges.

use serde::{Deserialize, Serialize};

/// Number of input channels per trajectory step: x/y displacement plus an
/// observation flag.
pub const TRAJ_CHANNELS: usize = 3;

/// One directed edge list: `u` holds target indices, `v` source indices.
///
/// Aggregation scatter-adds a projection of node `v[k]` into node `u[k]`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EdgeList {
    /// Target node indices
    pub u: Vec<usize>,
    /// Source node indices
    pub v: Vec<usize>,
}

impl EdgeList {
    /// Create an empty edge list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of edges.
    pub fn len(&self) -> usize {
        self.u.len()
    }

    /// Whether the list holds no edges.
    pub fn is_empty(&self) -> bool {
        self.u.is_empty()
    }

    /// Append one edge.
    pub fn push(&mut self, u: usize, v: usize) {
        self.u.push(u);
        self.v.push(v);
    }
}

/// Structural relation between lane nodes.
///
/// Predecessor and successor carry a hop scale; left and right connect
/// laterally neighboring lanes. Each kind maps to its own weight slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationKind {
    /// Predecessor at the given hop scale
    Pre(usize),
    /// Successor at the given hop scale
    Suc(usize),
    /// Left neighbor lane
    Left,
    /// Right neighbor lane
    Right,
}

impl RelationKind {
    /// Total number of relation slots for `num_scales` hop scales.
    pub fn count(num_scales: usize) -> usize {
        2 * num_scales + 2
    }

    /// Flat weight-slot index for this relation.
    pub fn slot(&self, num_scales: usize) -> usize {
        match *self {
            RelationKind::Pre(s) => s,
            RelationKind::Suc(s) => num_scales + s,
            RelationKind::Left => 2 * num_scales,
            RelationKind::Right => 2 * num_scales + 1,
        }
    }

    /// All relation kinds for `num_scales` hop scales, in slot order.
    pub fn all(num_scales: usize) -> Vec<RelationKind> {
        let mut kinds = Vec::with_capacity(Self::count(num_scales));
        for s in 0..num_scales {
            kinds.push(RelationKind::Pre(s));
        }
        for s in 0..num_scales {
            kinds.push(RelationKind::Suc(s));
        }
        kinds.push(RelationKind::Left);
        kinds.push(RelationKind::Right);
        kinds
    }

    /// Human-readable name used in error reporting.
    pub fn name(&self) -> String {
        match *self {
            RelationKind::Pre(s) => format!("predecessor@{}", s),
            RelationKind::Suc(s) => format!("successor@{}", s),
            RelationKind::Left => "left".to_string(),
            RelationKind::Right => "right".to_string(),
        }
    }
}

/// One scene's vectorized lane graph with local node indices.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LaneGraph {
    /// Lane node center positions
    pub ctrs: Vec<[f32; 2]>,
    /// Lane segment direction features
    pub feats: Vec<[f32; 2]>,
    /// Turn one-hot per node (width = `turn_width`)
    pub turn: Vec<Vec<f32>>,
    /// Traffic-control flag per node
    pub control: Vec<f32>,
    /// Intersection flag per node
    pub intersect: Vec<f32>,
    /// Predecessor edges, one list per hop scale
    pub pre: Vec<EdgeList>,
    /// Successor edges, one list per hop scale
    pub suc: Vec<EdgeList>,
    /// Left neighbor edges
    pub left: EdgeList,
    /// Right neighbor edges
    pub right: EdgeList,
}

impl LaneGraph {
    /// Create an empty lane graph with `num_scales` relation scales.
    pub fn empty(num_scales: usize) -> Self {
        Self {
            pre: vec![EdgeList::new(); num_scales],
            suc: vec![EdgeList::new(); num_scales],
            ..Default::default()
        }
    }

    /// Number of lane nodes in this scene.
    pub fn num_nodes(&self) -> usize {
        self.ctrs.len()
    }
}

/// One independent traffic scene: actor trajectories plus a lane graph.
#[derive(Clone, Debug, Default)]
pub struct SceneInput {
    /// Per-actor time-ordered input steps (`TRAJ_CHANNELS` channels each)
    pub actor_trajs: Vec<Vec<[f32; TRAJ_CHANNELS]>>,
    /// Each actor's last observed position
    pub actor_ctrs: Vec<[f32; 2]>,
    /// The scene's lane graph
    pub graph: LaneGraph,
}

/// Seam for the external trajectory feature extractor.
///
/// The 1D convolutional encoder lives outside this crate; it consumes the
/// batched, time-ordered trajectories and returns one fixed-width embedding
/// per actor.
pub trait ActorEncoder {
    /// Encode each trajectory into an embedding vector.
    fn encode(&self, trajs: &[Vec<[f32; TRAJ_CHANNELS]>]) -> Vec<Vec<f32>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_slots_unique_and_dense() {
        let num_scales = 3;
        let kinds = RelationKind::all(num_scales);
        assert_eq!(kinds.len(), RelationKind::count(num_scales));
        let mut seen = vec![false; kinds.len()];
        for kind in &kinds {
            let slot = kind.slot(num_scales);
            assert!(slot < kinds.len());
            assert!(!seen[slot]);
            seen[slot] = true;
        }
    }

    #[test]
    fn test_empty_lane_graph() {
        let graph = LaneGraph::empty(6);
        assert_eq!(graph.num_nodes(), 0);
        assert_eq!(graph.pre.len(), 6);
        assert_eq!(graph.suc.len(), 6);
        assert!(graph.left.is_empty());
    }

    #[test]
    fn test_edge_list_push() {
        let mut edges = EdgeList::new();
        edges.push(0, 1);
        edges.push(2, 0);
        assert_eq!(edges.len(), 2);
        assert_eq!(edges.u, vec![0, 2]);
        assert_eq!(edges.v, vec![1, 0]);
    }
}
