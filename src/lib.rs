//! # lanefuse - Batched Lane-Graph Fusion for Trajectory Forecasting
//!
//! A motion forecasting engine that fuses traffic-actor features with a
//! vectorized road-lane graph:
//! - **Batch assembly**: merges variably-sized per-scene actor sets and
//!   lane graphs into one batch with offset-corrected edges
//! - **Sparse distance attention**: distance-gated cross-set attention used
//!   for actor-to-map, map-to-actor and actor-to-actor passes
//! - **Multi-scale graph convolution**: residual multi-relation convolution
//!   over the lane graph at several hop scales
//! - **Fusion cycle**: the four-pass actor/map fusion sequence
//! - **Prediction head**: multi-modal trajectory decoding with per-mode
//!   confidence and per-step uncertainty
//! - **Prediction loss**: uncertainty-weighted covariance likelihood loss
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lanefuse::core::config::ModelConfig;
//! use lanefuse::pipeline::FusionPipeline;
//!
//! let pipeline = FusionPipeline::new(ModelConfig::default()).unwrap();
//! ```

pub mod core;
pub mod fusion;
pub mod graph;
pub mod nn;
pub mod pipeline;
pub mod prediction;

pub use crate::core::error::{Error, Result};
