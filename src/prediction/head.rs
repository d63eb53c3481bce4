//! Multi-modal prediction head.
//!
//! Decodes fused actor embeddings into K trajectory modes, each with per-step
//! 2D positions, a positive per-step confidence vector and a bounded per-step
//! uncertainty vector. Modes are sorted per actor by ascending ranking score;
//! mode identity is only "rank within this actor".

use crate::core::config::ModelConfig;
use crate::core::error::Result;
use crate::nn::{relu_inplace, Linear, LinearRes, NormedLinear};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// One decoded trajectory hypothesis.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModeForecast {
    /// Absolute predicted positions, one per future step
    pub traj: Vec<[f32; 2]>,
    /// Positive per-step confidence values
    pub scores: Vec<f32>,
    /// Per-step uncertainty vectors of width `f_d`, bounded to `(0, un_cap]`
    pub uncertainty: Vec<Vec<f32>>,
}

impl ModeForecast {
    /// The ranking score: confidence at the final future step.
    pub fn score(&self) -> f32 {
        *self.scores.last().unwrap_or(&0.0)
    }
}

/// All modes for one actor, sorted ascending by ranking score.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActorForecast {
    /// Ranked trajectory hypotheses
    pub modes: Vec<ModeForecast>,
}

/// Destination attention: combines an actor embedding with its displacement
/// to a mode's predicted endpoint.
#[derive(Clone, Debug)]
struct DestAttention {
    dist_in: Linear,
    dist_out: NormedLinear,
    fuse: NormedLinear,
}

impl DestAttention {
    fn new(n_actor: usize) -> Self {
        Self {
            dist_in: Linear::new(2, n_actor),
            dist_out: NormedLinear::new(n_actor, n_actor, true),
            fuse: NormedLinear::new(2 * n_actor, n_actor, true),
        }
    }

    fn forward(&self, actor: &[f32], ctr: [f32; 2], dest: [f32; 2]) -> Vec<f32> {
        let d = [ctr[0] - dest[0], ctr[1] - dest[1]];
        let mut dist = self.dist_in.forward(&d);
        relu_inplace(&mut dist);
        let dist = self.dist_out.forward(&dist);

        let mut fused_in = Vec::with_capacity(dist.len() + actor.len());
        fused_in.extend_from_slice(&dist);
        fused_in.extend_from_slice(actor);
        self.fuse.forward(&fused_in)
    }
}

/// Score attention: combines an actor embedding with the mode's confidence
/// vector (taken as a plain input) for the uncertainty decoder.
#[derive(Clone, Debug)]
struct ScoreAttention {
    score_in: Linear,
    score_out: NormedLinear,
    fuse: NormedLinear,
}

impl ScoreAttention {
    fn new(n_actor: usize, num_preds: usize) -> Self {
        Self {
            score_in: Linear::new(num_preds, n_actor),
            score_out: NormedLinear::new(n_actor, n_actor, true),
            fuse: NormedLinear::new(2 * n_actor, n_actor, true),
        }
    }

    fn forward(&self, scores: &[f32], actor: &[f32]) -> Vec<f32> {
        let mut s = self.score_in.forward(scores);
        relu_inplace(&mut s);
        let s = self.score_out.forward(&s);

        let mut fused_in = Vec::with_capacity(s.len() + actor.len());
        fused_in.extend_from_slice(&s);
        fused_in.extend_from_slice(actor);
        self.fuse.forward(&fused_in)
    }
}

/// Per-mode trajectory decoder: a deep residual stack plus an offset head.
#[derive(Clone, Debug)]
struct TrajDecoder {
    res: Vec<LinearRes>,
    out: Linear,
}

impl TrajDecoder {
    fn new(n_actor: usize, num_preds: usize) -> Self {
        Self {
            res: (0..7).map(|_| LinearRes::new(n_actor, n_actor)).collect(),
            out: Linear::new(n_actor, 2 * num_preds),
        }
    }

    fn forward(&self, actor: &[f32]) -> Vec<f32> {
        let mut h = actor.to_vec();
        for block in &self.res {
            h = block.forward(&h);
        }
        self.out.forward(&h)
    }
}

/// Multi-modal prediction head.
pub struct PredictionHead {
    modes: Vec<TrajDecoder>,
    dest_att: DestAttention,
    score_res: LinearRes,
    score_out: Linear,
    score_att: ScoreAttention,
    un_res: Vec<LinearRes>,
    un_out: Linear,
    num_preds: usize,
    f_d: usize,
    un_cap: f32,
}

impl PredictionHead {
    /// Create a head decoding `num_mods` trajectory modes.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        config.validate()?;
        let n = config.n_actor;
        Ok(Self {
            modes: (0..config.num_mods)
                .map(|_| TrajDecoder::new(n, config.num_preds))
                .collect(),
            dest_att: DestAttention::new(n),
            score_res: LinearRes::new(n, n),
            score_out: Linear::new(n, config.num_preds),
            score_att: ScoreAttention::new(n, config.num_preds),
            un_res: (0..4).map(|_| LinearRes::new(n, n)).collect(),
            un_out: Linear::new(n, config.f_d * config.num_preds),
            num_preds: config.num_preds,
            f_d: config.f_d,
            un_cap: config.un_cap,
        })
    }

    fn decode_actor(&self, actor: &[f32], ctr: [f32; 2]) -> ActorForecast {
        let mut modes = Vec::with_capacity(self.modes.len());
        for decoder in &self.modes {
            let offsets = decoder.forward(actor);
            let traj: Vec<[f32; 2]> = (0..self.num_preds)
                .map(|p| [ctr[0] + offsets[2 * p], ctr[1] + offsets[2 * p + 1]])
                .collect();

            // The endpoint is a plain value here; scoring does not feed back
            // into offset generation.
            let dest = traj[self.num_preds - 1];
            let feat = self.dest_att.forward(actor, ctr, dest);
            let scores: Vec<f32> = self
                .score_out
                .forward(&self.score_res.forward(&feat))
                .iter()
                .map(|z| z.exp())
                .collect();

            let feat = self.score_att.forward(&scores, actor);
            let mut h = feat;
            for block in &self.un_res {
                h = block.forward(&h);
            }
            let raw = self.un_out.forward(&h);
            let uncertainty: Vec<Vec<f32>> = (0..self.num_preds)
                .map(|p| {
                    raw[p * self.f_d..(p + 1) * self.f_d]
                        .iter()
                        .map(|u| (-u.abs()).exp() * self.un_cap)
                        .collect()
                })
                .collect();

            modes.push(ModeForecast {
                traj,
                scores,
                uncertainty,
            });
        }

        modes.sort_by(|a, b| {
            a.score()
                .partial_cmp(&b.score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ActorForecast { modes }
    }

    /// Decode all actors and group forecasts per scene.
    pub fn forward(
        &self,
        actors: &[Vec<f32>],
        actor_scenes: &[Range<usize>],
        actor_ctrs: &[[f32; 2]],
    ) -> Vec<Vec<ActorForecast>> {
        actor_scenes
            .iter()
            .map(|range| {
                range
                    .clone()
                    .map(|i| self.decode_actor(&actors[i], actor_ctrs[i]))
                    .collect()
            })
            .collect()
    }
}

/// Rotate and translate every forecast position into world coordinates.
///
/// `rot` is applied as a row-vector product: `p' = p * rot + orig`.
pub fn transform_to_world(
    forecasts: &mut [ActorForecast],
    rot: [[f32; 2]; 2],
    orig: [f32; 2],
) {
    for forecast in forecasts.iter_mut() {
        for mode in forecast.modes.iter_mut() {
            for p in mode.traj.iter_mut() {
                let x = p[0] * rot[0][0] + p[1] * rot[1][0] + orig[0];
                let y = p[0] * rot[0][1] + p[1] * rot[1][1] + orig[1];
                *p = [x, y];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> ModelConfig {
        ModelConfig {
            n_actor: 8,
            f_d: 4,
            num_mods: 3,
            num_preds: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_forecast_shapes() {
        let config = small_config();
        let head = PredictionHead::new(&config).unwrap();
        let actors = vec![vec![0.4; 8], vec![0.6; 8]];
        let out = head.forward(&actors, &[0..2], &[[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 2);
        let forecast = &out[0][0];
        assert_eq!(forecast.modes.len(), 3);
        for mode in &forecast.modes {
            assert_eq!(mode.traj.len(), 5);
            assert_eq!(mode.scores.len(), 5);
            assert_eq!(mode.uncertainty.len(), 5);
            assert_eq!(mode.uncertainty[0].len(), 4);
        }
    }

    #[test]
    fn test_mode_ranking_ascending_per_actor() {
        let config = small_config();
        let head = PredictionHead::new(&config).unwrap();
        let actors: Vec<Vec<f32>> = (0..4).map(|i| vec![0.1 * (i + 1) as f32; 8]).collect();
        let ctrs = vec![[0.0, 0.0]; 4];
        let out = head.forward(&actors, &[0..4], &ctrs);
        for forecast in &out[0] {
            for pair in forecast.modes.windows(2) {
                assert!(pair[0].score() <= pair[1].score());
            }
        }
    }

    #[test]
    fn test_scores_positive_and_uncertainty_bounded() {
        let config = small_config();
        let head = PredictionHead::new(&config).unwrap();
        let out = head.forward(&[vec![0.7; 8]], &[0..1], &[[0.0, 0.0]]);
        for mode in &out[0][0].modes {
            assert!(mode.scores.iter().all(|&z| z > 0.0));
            assert!(mode
                .uncertainty
                .iter()
                .flatten()
                .all(|&u| u > 0.0 && u <= config.un_cap));
        }
    }

    #[test]
    fn test_world_transform() {
        let mut forecasts = vec![ActorForecast {
            modes: vec![ModeForecast {
                traj: vec![[1.0, 0.0]],
                scores: vec![1.0],
                uncertainty: vec![vec![0.1]],
            }],
        }];
        // 90 degree rotation plus translation.
        transform_to_world(&mut forecasts, [[0.0, 1.0], [-1.0, 0.0]], [10.0, 20.0]);
        let p = forecasts[0].modes[0].traj[0];
        assert!((p[0] - 10.0).abs() < 1e-6);
        assert!((p[1] - 21.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_horizon_config_rejected() {
        let config = ModelConfig {
            num_preds: 0,
            ..small_config()
        };
        assert!(PredictionHead::new(&config).is_err());
    }
}
