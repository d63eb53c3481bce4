//! Batch assembly: merging per-scene inputs into single batched arrays.
//!
//! Node arrays are concatenated in scene order and every edge endpoint from
//! scene `i` is shifted by the cumulative node count of earlier scenes, so
//! edges never cross scene boundaries. Malformed inputs are rejected here;
//! silent misrouting of edges cannot be detected downstream.

use crate::core::config::ModelConfig;
use crate::core::error::{Error, Result};
use crate::graph::scene::{EdgeList, RelationKind, SceneInput, TRAJ_CHANNELS};
use std::ops::Range;
use tracing::debug;

/// Batched actor inputs with a per-scene index partition.
#[derive(Clone, Debug)]
pub struct ActorBatch {
    /// Concatenated actor trajectories in scene order
    pub trajs: Vec<Vec<[f32; TRAJ_CHANNELS]>>,
    /// Concatenated actor centers
    pub ctrs: Vec<[f32; 2]>,
    /// Contiguous global index range per scene
    pub scenes: Vec<Range<usize>>,
}

/// Batched lane graph with offset-corrected global edges.
#[derive(Clone, Debug)]
pub struct GraphBatch {
    /// Concatenated lane node centers
    pub ctrs: Vec<[f32; 2]>,
    /// Concatenated lane segment features
    pub feats: Vec<[f32; 2]>,
    /// Concatenated turn one-hots
    pub turn: Vec<Vec<f32>>,
    /// Concatenated control flags
    pub control: Vec<f32>,
    /// Concatenated intersection flags
    pub intersect: Vec<f32>,
    /// Contiguous global index range per scene
    pub scenes: Vec<Range<usize>>,
    /// Global predecessor edges per hop scale
    pub pre: Vec<EdgeList>,
    /// Global successor edges per hop scale
    pub suc: Vec<EdgeList>,
    /// Global left neighbor edges
    pub left: EdgeList,
    /// Global right neighbor edges
    pub right: EdgeList,
}

impl GraphBatch {
    /// Total lane node count across scenes.
    pub fn num_nodes(&self) -> usize {
        self.ctrs.len()
    }

    /// The global edge list for one relation kind.
    pub fn edges(&self, kind: &RelationKind) -> &EdgeList {
        match *kind {
            RelationKind::Pre(s) => &self.pre[s],
            RelationKind::Suc(s) => &self.suc[s],
            RelationKind::Left => &self.left,
            RelationKind::Right => &self.right,
        }
    }

    /// True when the batch cannot support lane convolution: no lane nodes at
    /// all, or no predecessor/successor edges at the coarsest hop scale.
    pub fn is_degenerate(&self) -> bool {
        self.ctrs.is_empty()
            || self.pre.last().map_or(true, |e| e.is_empty())
            || self.suc.last().map_or(true, |e| e.is_empty())
    }
}

/// Concatenate per-scene actor inputs and record the scene partition.
pub fn gather_actors(scenes: &[SceneInput]) -> Result<ActorBatch> {
    let mut trajs = Vec::new();
    let mut ctrs = Vec::new();
    let mut ranges = Vec::with_capacity(scenes.len());
    let mut count = 0;

    for (i, scene) in scenes.iter().enumerate() {
        if scene.actor_trajs.len() != scene.actor_ctrs.len() {
            return Err(Error::SceneShapeMismatch {
                scene: i,
                detail: format!(
                    "{} actor trajectories but {} actor centers",
                    scene.actor_trajs.len(),
                    scene.actor_ctrs.len()
                ),
            });
        }
        let n = scene.actor_trajs.len();
        trajs.extend(scene.actor_trajs.iter().cloned());
        ctrs.extend(scene.actor_ctrs.iter().copied());
        ranges.push(count..count + n);
        count += n;
    }

    debug!(scenes = scenes.len(), actors = count, "assembled actor batch");
    Ok(ActorBatch {
        trajs,
        ctrs,
        scenes: ranges,
    })
}

fn check_edges(
    scene: usize,
    kind: &RelationKind,
    edges: &EdgeList,
    num_nodes: usize,
) -> Result<()> {
    if edges.u.len() != edges.v.len() {
        return Err(Error::SceneShapeMismatch {
            scene,
            detail: format!(
                "{} edge list has {} targets but {} sources",
                kind.name(),
                edges.u.len(),
                edges.v.len()
            ),
        });
    }
    for &idx in edges.u.iter().chain(edges.v.iter()) {
        if idx >= num_nodes {
            return Err(Error::EdgeIndexOutOfRange {
                scene,
                relation: kind.name(),
                index: idx,
                num_nodes,
            });
        }
    }
    Ok(())
}

fn append_edges(global: &mut EdgeList, local: &EdgeList, offset: usize) {
    for (&u, &v) in local.u.iter().zip(local.v.iter()) {
        global.push(u + offset, v + offset);
    }
}

/// Merge per-scene lane graphs into one batch with global edge indices.
///
/// Empty relation lists are valid and contribute nothing; mixed empty and
/// non-empty scenes concatenate without shape errors.
pub fn gather_graphs(scenes: &[SceneInput], config: &ModelConfig) -> Result<GraphBatch> {
    let num_scales = config.num_scales;
    let mut batch = GraphBatch {
        ctrs: Vec::new(),
        feats: Vec::new(),
        turn: Vec::new(),
        control: Vec::new(),
        intersect: Vec::new(),
        scenes: Vec::with_capacity(scenes.len()),
        pre: vec![EdgeList::new(); num_scales],
        suc: vec![EdgeList::new(); num_scales],
        left: EdgeList::new(),
        right: EdgeList::new(),
    };
    let mut count = 0;

    for (i, scene) in scenes.iter().enumerate() {
        let graph = &scene.graph;
        let n = graph.num_nodes();

        for (what, len) in [
            ("segment features", graph.feats.len()),
            ("turn one-hots", graph.turn.len()),
            ("control flags", graph.control.len()),
            ("intersection flags", graph.intersect.len()),
        ] {
            if len != n {
                return Err(Error::SceneShapeMismatch {
                    scene: i,
                    detail: format!("{} lane nodes but {} {}", n, len, what),
                });
            }
        }
        if let Some(t) = graph.turn.iter().find(|t| t.len() != config.turn_width) {
            return Err(Error::SceneShapeMismatch {
                scene: i,
                detail: format!(
                    "turn one-hot width {} does not match configured {}",
                    t.len(),
                    config.turn_width
                ),
            });
        }
        if graph.pre.len() != num_scales || graph.suc.len() != num_scales {
            return Err(Error::ScaleCountMismatch {
                scene: i,
                expected: num_scales,
                actual: graph.pre.len().min(graph.suc.len()),
            });
        }
        for kind in RelationKind::all(num_scales) {
            let edges = match kind {
                RelationKind::Pre(s) => &graph.pre[s],
                RelationKind::Suc(s) => &graph.suc[s],
                RelationKind::Left => &graph.left,
                RelationKind::Right => &graph.right,
            };
            check_edges(i, &kind, edges, n)?;
        }

        batch.ctrs.extend(graph.ctrs.iter().copied());
        batch.feats.extend(graph.feats.iter().copied());
        batch.turn.extend(graph.turn.iter().cloned());
        batch.control.extend(graph.control.iter().copied());
        batch.intersect.extend(graph.intersect.iter().copied());
        for s in 0..num_scales {
            append_edges(&mut batch.pre[s], &graph.pre[s], count);
            append_edges(&mut batch.suc[s], &graph.suc[s], count);
        }
        append_edges(&mut batch.left, &graph.left, count);
        append_edges(&mut batch.right, &graph.right, count);

        batch.scenes.push(count..count + n);
        count += n;
    }

    debug!(
        scenes = scenes.len(),
        lane_nodes = count,
        degenerate = batch.is_degenerate(),
        "assembled lane graph batch"
    );
    Ok(batch)
}
