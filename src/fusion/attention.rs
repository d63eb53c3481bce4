//! Sparse distance-gated attention between two batched node sets.
//!
//! A target node aggregates messages from context nodes of the same scene
//! whose Euclidean distance is within a threshold. Messages are summed, not
//! averaged: degree scales update magnitude, so dense neighborhoods push
//! harder.

use crate::nn::{relu_inplace, GroupNorm, Linear, NormedLinear};
use std::ops::Range;

/// Distance-gated cross-set attention pass.
///
/// `n_agt` is the target embedding width, `n_ctx` the context width. The
/// same block serves actor-to-map, map-to-actor and actor-to-actor passes.
#[derive(Clone, Debug)]
pub struct DistAttention {
    /// Relative displacement embedding, first stage
    pub dist_in: Linear,
    /// Relative displacement embedding, second stage
    pub dist_out: NormedLinear,
    /// Target-side query projection
    pub query: NormedLinear,
    /// Fusion of displacement, query and raw context per edge
    pub ctx_fuse: NormedLinear,
    /// Final per-edge message projection
    pub ctx_out: Linear,
    /// Target self projection feeding the aggregation buffer
    pub agt: Linear,
    /// Post-aggregation normalization
    pub norm: GroupNorm,
    /// Output transform inside the residual
    pub linear: NormedLinear,
}

impl DistAttention {
    /// Create an attention pass for `n_agt`-wide targets and `n_ctx`-wide
    /// context nodes.
    pub fn new(n_agt: usize, n_ctx: usize) -> Self {
        Self {
            dist_in: Linear::new(2, n_ctx),
            dist_out: NormedLinear::new(n_ctx, n_ctx, true),
            query: NormedLinear::new(n_agt, n_ctx, true),
            ctx_fuse: NormedLinear::new(3 * n_ctx, n_agt, true),
            ctx_out: Linear::new_no_bias(n_agt, n_agt),
            agt: Linear::new_no_bias(n_agt, n_agt),
            norm: GroupNorm::new(1, n_agt),
            linear: NormedLinear::new(n_agt, n_agt, false),
        }
    }

    /// Build the sparse edge set: all same-scene (target, context) pairs
    /// within `dist_th`, in global batch indices. The boundary distance is
    /// included.
    pub fn gate_edges(
        agt_scenes: &[Range<usize>],
        agt_ctrs: &[[f32; 2]],
        ctx_scenes: &[Range<usize>],
        ctx_ctrs: &[[f32; 2]],
        dist_th: f32,
    ) -> (Vec<usize>, Vec<usize>) {
        debug_assert_eq!(agt_scenes.len(), ctx_scenes.len());
        let mut hi = Vec::new();
        let mut wi = Vec::new();
        for (agt_range, ctx_range) in agt_scenes.iter().zip(ctx_scenes.iter()) {
            for a in agt_range.clone() {
                for c in ctx_range.clone() {
                    let dx = agt_ctrs[a][0] - ctx_ctrs[c][0];
                    let dy = agt_ctrs[a][1] - ctx_ctrs[c][1];
                    if (dx * dx + dy * dy).sqrt() <= dist_th {
                        hi.push(a);
                        wi.push(c);
                    }
                }
            }
        }
        (hi, wi)
    }

    /// Residual self-transform used when the context set is globally empty.
    fn self_update(&self, agts: &[Vec<f32>]) -> Vec<Vec<f32>> {
        agts.iter()
            .map(|a| {
                let mut h = self.agt.forward(a);
                relu_inplace(&mut h);
                let mut out = self.linear.forward(&h);
                for (o, v) in out.iter_mut().zip(a.iter()) {
                    *o += v;
                }
                relu_inplace(&mut out);
                out
            })
            .collect()
    }

    /// Run one attention pass and return updated target embeddings.
    ///
    /// Scenes with no in-threshold pair simply aggregate nothing; a globally
    /// empty context set falls back to the residual self-transform.
    #[allow(clippy::too_many_arguments)]
    pub fn forward(
        &self,
        agts: &[Vec<f32>],
        agt_scenes: &[Range<usize>],
        agt_ctrs: &[[f32; 2]],
        ctx: &[Vec<f32>],
        ctx_scenes: &[Range<usize>],
        ctx_ctrs: &[[f32; 2]],
        dist_th: f32,
    ) -> Vec<Vec<f32>> {
        if ctx.is_empty() {
            return self.self_update(agts);
        }

        let (hi, wi) = Self::gate_edges(agt_scenes, agt_ctrs, ctx_scenes, ctx_ctrs, dist_th);

        // Accumulate-then-commit: reduce every edge message into a fresh
        // buffer before the normalization stage reads it.
        let mut acc: Vec<Vec<f32>> = agts.iter().map(|a| self.agt.forward(a)).collect();
        for (&a, &c) in hi.iter().zip(wi.iter()) {
            let d = [
                agt_ctrs[a][0] - ctx_ctrs[c][0],
                agt_ctrs[a][1] - ctx_ctrs[c][1],
            ];
            let mut dist = self.dist_in.forward(&d);
            relu_inplace(&mut dist);
            let dist = self.dist_out.forward(&dist);

            let q = self.query.forward(&agts[a]);

            let mut fused_in = Vec::with_capacity(dist.len() + q.len() + ctx[c].len());
            fused_in.extend_from_slice(&dist);
            fused_in.extend_from_slice(&q);
            fused_in.extend_from_slice(&ctx[c]);
            let msg = self.ctx_out.forward(&self.ctx_fuse.forward(&fused_in));

            for (o, m) in acc[a].iter_mut().zip(msg.iter()) {
                *o += m;
            }
        }

        acc.iter()
            .zip(agts.iter())
            .map(|(buf, res)| {
                let mut h = self.norm.forward(buf);
                relu_inplace(&mut h);
                let mut out = self.linear.forward(&h);
                for (o, v) in out.iter_mut().zip(res.iter()) {
                    *o += v;
                }
                relu_inplace(&mut out);
                out
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embeddings(n: usize, dim: usize, base: f32) -> Vec<Vec<f32>> {
        (0..n).map(|i| vec![base + 0.1 * i as f32; dim]).collect()
    }

    #[test]
    fn test_gating_exact_with_boundary() {
        let agt_ctrs = vec![[0.0, 0.0], [10.0, 0.0]];
        let ctx_ctrs = vec![[3.0, 0.0], [5.0, 0.0], [20.0, 0.0]];
        let (hi, wi) = DistAttention::gate_edges(
            &[0..2],
            &agt_ctrs,
            &[0..3],
            &ctx_ctrs,
            5.0,
        );
        // Target 0 reaches ctx 0 (3.0) and ctx 1 (exactly 5.0, inclusive);
        // target 1 reaches ctx 1 (5.0).
        let pairs: Vec<(usize, usize)> = hi.into_iter().zip(wi).collect();
        assert_eq!(pairs, vec![(0, 0), (0, 1), (1, 1)]);
    }

    #[test]
    fn test_cross_scene_pairs_never_gated() {
        let agt_ctrs = vec![[0.0, 0.0], [0.0, 0.0]];
        let ctx_ctrs = vec![[0.0, 0.0], [0.0, 0.0]];
        let (hi, wi) = DistAttention::gate_edges(
            &[0..1, 1..2],
            &agt_ctrs,
            &[0..1, 1..2],
            &ctx_ctrs,
            100.0,
        );
        let pairs: Vec<(usize, usize)> = hi.into_iter().zip(wi).collect();
        assert_eq!(pairs, vec![(0, 0), (1, 1)]);
    }

    #[test]
    fn test_empty_context_falls_back_to_self_update() {
        let att = DistAttention::new(8, 8);
        let agts = embeddings(3, 8, 0.2);
        let ctrs = vec![[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]];
        let out = att.forward(&agts, &[0..3], &ctrs, &[], &[0..0], &[], 6.0);
        let expected = att.self_update(&agts);
        assert_eq!(out.len(), 3);
        for (o, e) in out.iter().zip(expected.iter()) {
            for (a, b) in o.iter().zip(e.iter()) {
                assert!((a - b).abs() < 1e-6);
                assert!(a.is_finite());
            }
        }
    }

    #[test]
    fn test_no_pairs_in_threshold_still_finite() {
        let att = DistAttention::new(8, 8);
        let agts = embeddings(2, 8, 0.2);
        let ctx = embeddings(2, 8, 0.5);
        let agt_ctrs = vec![[0.0, 0.0], [1.0, 0.0]];
        let ctx_ctrs = vec![[100.0, 0.0], [101.0, 0.0]];
        let out = att.forward(&agts, &[0..2], &agt_ctrs, &ctx, &[0..2], &ctx_ctrs, 5.0);
        assert_eq!(out.len(), 2);
        assert!(out.iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn test_context_order_invariance() {
        let att = DistAttention::new(8, 8);
        let agts = embeddings(2, 8, 0.2);
        let ctx = embeddings(3, 8, 0.4);
        let agt_ctrs = vec![[0.0, 0.0], [1.0, 0.0]];
        let ctx_ctrs = vec![[0.5, 0.0], [1.5, 0.0], [0.0, 1.0]];

        let out = att.forward(&agts, &[0..2], &agt_ctrs, &ctx, &[0..3], &ctx_ctrs, 10.0);

        // Present the same context set in reverse order; message sums over a
        // permuted edge set must agree.
        let ctx_rev: Vec<Vec<f32>> = ctx.iter().rev().cloned().collect();
        let ctrs_rev: Vec<[f32; 2]> = ctx_ctrs.iter().rev().copied().collect();
        let out_rev =
            att.forward(&agts, &[0..2], &agt_ctrs, &ctx_rev, &[0..3], &ctrs_rev, 10.0);

        for (a, b) in out.iter().flatten().zip(out_rev.iter().flatten()) {
            assert!((a - b).abs() < 1e-4);
        }
    }
}
