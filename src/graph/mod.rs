//! Scene inputs and batch assembly.
//!
//! Per-scene actor sets and lane graphs come in with local node indices; the
//! assembler merges them into single batched arrays with offset-corrected
//! edges and a per-scene index partition so no edge ever crosses a scene
//! boundary.

pub mod batch;
pub mod scene;

pub use batch::{gather_actors, gather_graphs, ActorBatch, GraphBatch};
pub use scene::{ActorEncoder, EdgeList, LaneGraph, RelationKind, SceneInput};
