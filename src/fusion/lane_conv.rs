//! Multi-scale lane graph convolution and the lane-graph encoder.
//!
//! Propagation here is purely topological: each relation kind scatter-adds a
//! learned projection of its source nodes into its target nodes, over several
//! residual rounds. Weights are independent per round and per relation.

use crate::graph::batch::GraphBatch;
use crate::graph::scene::RelationKind;
use crate::nn::{relu_inplace, GroupNorm, Linear, NormedLinear};
use tracing::debug;

/// One residual round of multi-relation convolution.
#[derive(Clone, Debug)]
struct ConvRound {
    /// Base projection of the current embeddings
    base: Linear,
    /// Per-relation source projections, indexed by relation slot
    rel: Vec<Linear>,
    /// Post-aggregation normalization
    norm: GroupNorm,
    /// Output transform inside the residual
    out: NormedLinear,
}

impl ConvRound {
    fn new(n_map: usize, num_scales: usize) -> Self {
        Self {
            base: Linear::new_no_bias(n_map, n_map),
            rel: (0..RelationKind::count(num_scales))
                .map(|_| Linear::new_no_bias(n_map, n_map))
                .collect(),
            norm: GroupNorm::new(1, n_map),
            out: NormedLinear::new(n_map, n_map, false),
        }
    }
}

/// Residual multi-relation convolution over the batched lane graph.
#[derive(Clone, Debug)]
pub struct LaneGraphConv {
    rounds: Vec<ConvRound>,
    num_scales: usize,
}

impl LaneGraphConv {
    /// Create a convolution block with `num_rounds` residual rounds.
    pub fn new(n_map: usize, num_scales: usize, num_rounds: usize) -> Self {
        Self {
            rounds: (0..num_rounds)
                .map(|_| ConvRound::new(n_map, num_scales))
                .collect(),
            num_scales,
        }
    }

    /// Run all rounds and return updated lane embeddings.
    ///
    /// Empty relation edge lists contribute nothing. Scatter-add order over
    /// edges landing on the same target does not affect the result.
    pub fn forward(&self, feats: &[Vec<f32>], graph: &GraphBatch) -> Vec<Vec<f32>> {
        let mut feat = feats.to_vec();
        for round in &self.rounds {
            let res = feat.clone();

            // Accumulate-then-commit: all relations reduce into one buffer.
            let mut acc: Vec<Vec<f32>> =
                feat.iter().map(|f| round.base.forward(f)).collect();
            for kind in RelationKind::all(self.num_scales) {
                let edges = graph.edges(&kind);
                let w = &round.rel[kind.slot(self.num_scales)];
                for (&u, &v) in edges.u.iter().zip(edges.v.iter()) {
                    let msg = w.forward(&feat[v]);
                    for (o, m) in acc[u].iter_mut().zip(msg.iter()) {
                        *o += m;
                    }
                }
            }

            feat = acc
                .iter()
                .zip(res.iter())
                .map(|(buf, r)| {
                    let mut h = round.norm.forward(buf);
                    relu_inplace(&mut h);
                    let mut out = round.out.forward(&h);
                    for (o, v) in out.iter_mut().zip(r.iter()) {
                        *o += v;
                    }
                    relu_inplace(&mut out);
                    out
                })
                .collect();
        }
        feat
    }
}

/// Lane-graph encoder: embeds node centers and segment features, then runs
/// one structural convolution pass.
#[derive(Clone, Debug)]
pub struct MapEncoder {
    /// Center position embedding, first stage
    pub ctr_in: Linear,
    /// Center position embedding, second stage
    pub ctr_out: NormedLinear,
    /// Segment feature embedding, first stage
    pub seg_in: Linear,
    /// Segment feature embedding, second stage
    pub seg_out: NormedLinear,
    /// Structural convolution over the lane graph
    conv: LaneGraphConv,
}

impl MapEncoder {
    /// Create a lane-graph encoder.
    pub fn new(n_map: usize, num_scales: usize, num_rounds: usize) -> Self {
        Self {
            ctr_in: Linear::new(2, n_map),
            ctr_out: NormedLinear::new(n_map, n_map, false),
            seg_in: Linear::new(2, n_map),
            seg_out: NormedLinear::new(n_map, n_map, false),
            conv: LaneGraphConv::new(n_map, num_scales, num_rounds),
        }
    }

    /// Encode the batched lane graph into node embeddings.
    ///
    /// A degenerate batch (no nodes, or no coarsest-scale edges) short
    /// circuits to an empty, shape-consistent output.
    pub fn forward(&self, graph: &GraphBatch) -> Vec<Vec<f32>> {
        if graph.is_degenerate() {
            debug!("degenerate lane graph batch; skipping lane encoding");
            return Vec::new();
        }

        let feats: Vec<Vec<f32>> = graph
            .ctrs
            .iter()
            .zip(graph.feats.iter())
            .map(|(ctr, seg)| {
                let mut c = self.ctr_in.forward(ctr);
                relu_inplace(&mut c);
                let c = self.ctr_out.forward(&c);

                let mut s = self.seg_in.forward(seg);
                relu_inplace(&mut s);
                let s = self.seg_out.forward(&s);

                let mut out: Vec<f32> = c.iter().zip(s.iter()).map(|(a, b)| a + b).collect();
                relu_inplace(&mut out);
                out
            })
            .collect();

        self.conv.forward(&feats, graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ModelConfig;
    use crate::graph::batch::gather_graphs;
    use crate::graph::scene::{LaneGraph, SceneInput};

    fn chain_scene(n: usize) -> SceneInput {
        let mut graph = LaneGraph::empty(2);
        graph.ctrs = (0..n).map(|i| [i as f32, 0.0]).collect();
        graph.feats = vec![[1.0, 0.0]; n];
        graph.turn = vec![vec![0.0, 0.0]; n];
        graph.control = vec![0.0; n];
        graph.intersect = vec![0.0; n];
        for k in 1..n {
            for s in 0..2 {
                graph.suc[s].push(k - 1, k);
                graph.pre[s].push(k, k - 1);
            }
        }
        SceneInput {
            actor_trajs: Vec::new(),
            actor_ctrs: Vec::new(),
            graph,
        }
    }

    fn small_config() -> ModelConfig {
        ModelConfig {
            num_scales: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_conv_empty_left_right_ok() {
        let config = small_config();
        let batch = gather_graphs(&[chain_scene(4)], &config).unwrap();
        assert!(batch.left.is_empty());
        let conv = LaneGraphConv::new(8, 2, 2);
        let feats = vec![vec![0.3; 8]; 4];
        let out = conv.forward(&feats, &batch);
        assert_eq!(out.len(), 4);
        assert!(out.iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn test_conv_edge_order_invariance() {
        let config = small_config();
        let mut batch = gather_graphs(&[chain_scene(5)], &config).unwrap();
        let conv = LaneGraphConv::new(8, 2, 2);
        let feats = vec![vec![0.3; 8]; 5];

        let out = conv.forward(&feats, &batch);

        for s in 0..2 {
            batch.pre[s].u.reverse();
            batch.pre[s].v.reverse();
            batch.suc[s].u.reverse();
            batch.suc[s].v.reverse();
        }
        let out_rev = conv.forward(&feats, &batch);

        for (a, b) in out.iter().flatten().zip(out_rev.iter().flatten()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_map_encoder_shapes() {
        let config = small_config();
        let batch = gather_graphs(&[chain_scene(3)], &config).unwrap();
        let encoder = MapEncoder::new(8, 2, 2);
        let nodes = encoder.forward(&batch);
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].len(), 8);
    }

    #[test]
    fn test_map_encoder_degenerate_returns_empty() {
        let config = small_config();
        let batch = gather_graphs(&[], &config).unwrap();
        let encoder = MapEncoder::new(8, 2, 2);
        assert!(encoder.forward(&batch).is_empty());

        // Nodes present but no structural edges: also empty.
        let mut scene = chain_scene(3);
        for s in 0..2 {
            scene.graph.pre[s] = Default::default();
            scene.graph.suc[s] = Default::default();
        }
        let batch = gather_graphs(&[scene], &config).unwrap();
        assert!(encoder.forward(&batch).is_empty());
    }
}
