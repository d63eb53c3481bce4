//! End-to-end forward pass: batch assembly, lane encoding, fusion cycle and
//! trajectory decoding.
//!
//! The trajectory feature extractor is an external collaborator supplied
//! through the [`ActorEncoder`] trait; everything downstream of it lives
//! here. The assembled batch is owned by one forward invocation and
//! discarded afterwards.

use crate::core::config::ModelConfig;
use crate::core::error::{Error, Result};
use crate::fusion::cycle::FusionCycle;
use crate::fusion::lane_conv::MapEncoder;
use crate::graph::batch::{gather_actors, gather_graphs};
use crate::graph::scene::{ActorEncoder, SceneInput};
use crate::prediction::head::{ActorForecast, PredictionHead};
use tracing::debug;

/// The full fusion pipeline for one batch of scenes.
pub struct FusionPipeline {
    config: ModelConfig,
    map_encoder: MapEncoder,
    cycle: FusionCycle,
    head: PredictionHead,
}

impl FusionPipeline {
    /// Create a pipeline after validating the configuration.
    pub fn new(config: ModelConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            map_encoder: MapEncoder::new(
                config.n_map,
                config.num_scales,
                config.num_conv_rounds,
            ),
            cycle: FusionCycle::new(&config),
            head: PredictionHead::new(&config)?,
            config,
        })
    }

    /// The configuration this pipeline was built with.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Run one forward pass over a batch of scenes.
    ///
    /// Returns per-scene, per-actor ranked forecasts in the local frame; use
    /// [`crate::prediction::head::transform_to_world`] with the caller's
    /// rotation and origin to obtain world coordinates.
    pub fn forward<E: ActorEncoder>(
        &self,
        encoder: &E,
        scenes: &[SceneInput],
    ) -> Result<Vec<Vec<ActorForecast>>> {
        let actor_batch = gather_actors(scenes)?;
        let actors = encoder.encode(&actor_batch.trajs);
        if actors.len() != actor_batch.trajs.len() {
            return Err(Error::EncoderCountMismatch {
                expected: actor_batch.trajs.len(),
                actual: actors.len(),
            });
        }
        if let Some(bad) = actors.iter().find(|e| e.len() != self.config.n_actor) {
            return Err(Error::EncoderWidthMismatch {
                expected: self.config.n_actor,
                actual: bad.len(),
            });
        }

        let graph = gather_graphs(scenes, &self.config)?;
        let nodes = self.map_encoder.forward(&graph);
        debug!(
            actors = actors.len(),
            lane_nodes = nodes.len(),
            "running fusion cycle"
        );

        let fused = self.cycle.forward(
            &actors,
            &actor_batch.scenes,
            &actor_batch.ctrs,
            nodes,
            &graph,
        );
        Ok(self
            .head
            .forward(&fused, &actor_batch.scenes, &actor_batch.ctrs))
    }
}
