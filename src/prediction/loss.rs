//! Uncertainty-weighted trajectory loss.
//!
//! For each scored actor the best mode is chosen by endpoint distance alone;
//! the confidence ("z") values participate only in the likelihood term. The
//! per-step covariance structure is built from the chosen mode's uncertainty
//! vectors and regularized with a small multiple of the identity, so the
//! quadratic form stays finite for any input.

use crate::core::config::ModelConfig;
use crate::core::error::{Error, Result};
use crate::prediction::head::ActorForecast;
use tracing::debug;

/// Accumulated loss terms for one batch.
///
/// Values are reported pre-division; [`LossOutput::total`] performs the
/// normalization by the valid-actor-step counts.
#[derive(Clone, Debug, Default)]
pub struct LossOutput {
    /// Classification term (structurally present, zero-coefficient)
    pub cls_loss: f32,
    /// Visible actor-step count backing the classification term
    pub num_cls: f32,
    /// Regression (likelihood) term
    pub reg_loss: f32,
    /// Visible actor-step count backing the regression term
    pub num_reg: f32,
}

impl LossOutput {
    /// Normalized total loss.
    pub fn total(&self) -> f32 {
        self.cls_loss / (self.num_cls + 1e-10) + self.reg_loss / (self.num_reg + 1e-10)
    }
}

/// Uncertainty-weighted negative-log-likelihood loss.
pub struct PredictionLoss {
    num_preds: usize,
    f_d: usize,
    f_weight: f32,
    cov_reg: f32,
    cls_coef: f32,
    reg_coef: f32,
}

impl PredictionLoss {
    /// Create a loss from a validated model configuration.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            num_preds: config.num_preds,
            f_d: config.f_d,
            f_weight: config.f_weight,
            cov_reg: config.cov_reg,
            cls_coef: config.cls_coef,
            reg_coef: config.reg_coef,
        })
    }

    /// Accumulate the loss for one batch of per-scene forecasts against
    /// ground truth and visibility masks indexed identically.
    pub fn forward(
        &self,
        forecasts: &[Vec<ActorForecast>],
        gt: &[Vec<Vec<[f32; 2]>>],
        has: &[Vec<Vec<bool>>],
    ) -> Result<LossOutput> {
        if forecasts.len() != gt.len() || forecasts.len() != has.len() {
            return Err(Error::LossInputMismatch(format!(
                "{} forecast scenes, {} ground-truth scenes, {} mask scenes",
                forecasts.len(),
                gt.len(),
                has.len()
            )));
        }

        let mut out = LossOutput::default();
        for (i, scene) in forecasts.iter().enumerate() {
            self.accumulate_scene(i, scene, &gt[i], &has[i], &mut out)?;
        }
        debug!(
            reg_loss = out.reg_loss,
            num_reg = out.num_reg,
            "accumulated batch loss"
        );
        Ok(out)
    }

    fn accumulate_scene(
        &self,
        scene: usize,
        forecasts: &[ActorForecast],
        gt: &[Vec<[f32; 2]>],
        has: &[Vec<bool>],
        out: &mut LossOutput,
    ) -> Result<()> {
        let num_preds = self.num_preds;
        if forecasts.len() != gt.len() || forecasts.len() != has.len() {
            return Err(Error::LossInputMismatch(format!(
                "scene {}: {} forecasts, {} ground truths, {} masks",
                scene,
                forecasts.len(),
                gt.len(),
                has.len()
            )));
        }
        for (a, mask) in has.iter().enumerate() {
            if mask.len() != num_preds || gt[a].len() != num_preds {
                return Err(Error::LossInputMismatch(format!(
                    "scene {}: actor {} ground truth/mask length != {}",
                    scene, a, num_preds
                )));
            }
            if forecasts[a].modes.is_empty() {
                return Err(Error::LossInputMismatch(format!(
                    "scene {}: actor {} has no forecast modes",
                    scene, a
                )));
            }
            if forecasts[a].modes.iter().any(|m| {
                m.traj.len() != num_preds
                    || m.scores.len() != num_preds
                    || m.uncertainty.len() != num_preds
            }) {
                return Err(Error::LossInputMismatch(format!(
                    "scene {}: actor {} forecast length != {}",
                    scene, a, num_preds
                )));
            }
        }

        // Valid-actor filter and endpoint selection. Visible flags carry a
        // small rank-breaking fraction so the latest visible step wins.
        let mut valid: Vec<(usize, usize)> = Vec::new();
        for (a, mask) in has.iter().enumerate() {
            let mut best = f32::NEG_INFINITY;
            let mut last_idx = 0;
            for (p, &visible) in mask.iter().enumerate() {
                let v = if visible { 1.0 } else { 0.0 } + 0.1 * p as f32 / num_preds as f32;
                if v >= best {
                    best = v;
                    last_idx = p;
                }
            }
            if best > 1.0 {
                valid.push((a, last_idx));
            }
        }
        if valid.is_empty() {
            return Ok(());
        }

        // Best mode per actor: minimum endpoint distance, scores unused.
        let mut chosen: Vec<(usize, usize, usize)> = Vec::with_capacity(valid.len());
        for &(a, last_idx) in &valid {
            let target = gt[a][last_idx];
            let mut best_mode = 0;
            let mut best_dist = f32::INFINITY;
            for (k, mode) in forecasts[a].modes.iter().enumerate() {
                let dx = mode.traj[last_idx][0] - target[0];
                let dy = mode.traj[last_idx][1] - target[1];
                let dist = (dx * dx + dy * dy).sqrt();
                if dist < best_dist {
                    best_dist = dist;
                    best_mode = k;
                }
            }
            chosen.push((a, last_idx, best_mode));
        }

        // Masked per-step residuals, uncertainty rows and confidence values
        // for the chosen modes.
        let n = chosen.len();
        let mut residual = vec![vec![0.0f32; num_preds]; n];
        let mut num_a = vec![0usize; num_preds];
        let mut z_sum = vec![0.0f32; num_preds];
        for (row, &(a, _, k)) in chosen.iter().enumerate() {
            let mode = &forecasts[a].modes[k];
            for p in 0..num_preds {
                if !has[a][p] {
                    continue;
                }
                residual[row][p] = (gt[a][p][0] - mode.traj[p][0]).abs()
                    + (gt[a][p][1] - mode.traj[p][1]).abs();
                num_a[p] += 1;
                z_sum[p] += mode.scores[p];
            }
        }

        // Per-step likelihood terms.
        let mut step_terms = vec![0.0f32; num_preds];
        for p in 0..num_preds {
            if num_a[p] == 0 {
                continue;
            }
            let z_bar = z_sum[p] / num_a[p] as f32;

            // Quadratic form d' (U U^T / f_d + cov_reg I) d, computed through
            // the contracted vector sum_a d_a * u_a.
            let mut contracted = vec![0.0f32; self.f_d];
            let mut diag = 0.0f32;
            let mut log_norm = 0.0f32;
            for (row, &(a, _, k)) in chosen.iter().enumerate() {
                if !has[a][p] {
                    continue;
                }
                let d = residual[row][p];
                let u = &forecasts[a].modes[k].uncertainty[p];
                for (c, &uv) in contracted.iter_mut().zip(u.iter()) {
                    *c += d * uv;
                }
                diag += d * d;
                // Exact-zero entries are patched with a multiplicative
                // indicator before the log.
                let mut row_log = 0.0f32;
                for &uv in u.iter() {
                    let patched = if uv == 0.0 { 1.0 } else { uv };
                    row_log += patched.ln();
                }
                log_norm += 2.0 * row_log / self.f_d as f32;
            }
            let quad = contracted.iter().map(|c| c * c).sum::<f32>() / self.f_d as f32
                + self.cov_reg * diag;

            step_terms[p] =
                (quad / z_bar + num_a[p] as f32 * z_bar.ln() - log_norm) / 2.0;
        }

        let full: f32 = step_terms.iter().sum();
        let last = step_terms[num_preds - 1];

        out.reg_loss += self.reg_coef * full + self.f_weight * self.reg_coef * last;
        out.cls_loss += self.cls_coef * 0.0;

        let visible: usize = chosen
            .iter()
            .map(|&(a, _, _)| has[a].iter().filter(|&&v| v).count())
            .sum();
        out.num_reg += visible as f32;
        out.num_cls += visible as f32;
        Ok(())
    }
}
