//! Model configuration.
//!
//! One explicit value carries every recognized option; components receive it
//! at construction time rather than reading shared mutable state.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Configuration for the fusion engine and prediction head.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Actor embedding width
    pub n_actor: usize,
    /// Lane node embedding width
    pub n_map: usize,
    /// Uncertainty vector width per future step
    pub f_d: usize,
    /// Number of hop scales for predecessor/successor relations
    pub num_scales: usize,
    /// Number of residual rounds per graph convolution block
    pub num_conv_rounds: usize,
    /// Width of the lane turn one-hot attribute
    pub turn_width: usize,
    /// Distance threshold for the actor-to-map attention passes
    pub actor2map_dist: f32,
    /// Distance threshold for the map-to-actor attention passes
    pub map2actor_dist: f32,
    /// Distance threshold for the actor-to-actor attention passes
    pub actor2actor_dist: f32,
    /// Number of trajectory modes per actor
    pub num_mods: usize,
    /// Number of predicted future steps
    pub num_preds: usize,
    /// Emphasis weight for the final-step loss term
    pub f_weight: f32,
    /// Additive covariance regularization constant
    pub cov_reg: f32,
    /// Upper bound of the decoded per-step uncertainty values
    pub un_cap: f32,
    /// Classification loss coefficient (structurally present, disabled)
    pub cls_coef: f32,
    /// Regression loss coefficient
    pub reg_coef: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_actor: 128,
            n_map: 128,
            f_d: 128,
            num_scales: 6,
            num_conv_rounds: 4,
            turn_width: 2,
            actor2map_dist: 7.0,
            map2actor_dist: 6.0,
            actor2actor_dist: 100.0,
            num_mods: 6,
            num_preds: 30,
            f_weight: 12.0,
            cov_reg: 0.05,
            un_cap: 0.3,
            cls_coef: 0.0,
            reg_coef: 1.0,
        }
    }
}

impl ModelConfig {
    /// Check the configuration for values the pipeline cannot operate on.
    pub fn validate(&self) -> Result<()> {
        if self.n_actor == 0 || self.n_map == 0 || self.f_d == 0 {
            return Err(Error::InvalidConfig(
                "embedding widths must be positive".to_string(),
            ));
        }
        if self.num_scales == 0 || self.num_conv_rounds == 0 {
            return Err(Error::InvalidConfig(
                "num_scales and num_conv_rounds must be positive".to_string(),
            ));
        }
        if self.num_mods == 0 || self.num_preds == 0 {
            return Err(Error::InvalidConfig(
                "num_mods and num_preds must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("actor2map_dist", self.actor2map_dist),
            ("map2actor_dist", self.map2actor_dist),
            ("actor2actor_dist", self.actor2actor_dist),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "{} must be a non-negative finite distance, got {}",
                    name, value
                )));
            }
        }
        if self.un_cap <= 0.0 {
            return Err(Error::InvalidConfig(
                "un_cap must be positive".to_string(),
            ));
        }
        if self.cov_reg < 0.0 {
            return Err(Error::InvalidConfig(
                "cov_reg must be non-negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
