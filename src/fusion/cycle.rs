//! The actor/map fusion cycle.
//!
//! Four passes in fixed order: actor-to-map, map-to-map, map-to-actor,
//! actor-to-actor. The cycle runs exactly once per forward pass; lane
//! embeddings are discarded after the map-to-actor step.

use crate::core::config::ModelConfig;
use crate::fusion::attention::DistAttention;
use crate::fusion::lane_conv::LaneGraphConv;
use crate::graph::batch::GraphBatch;
use crate::nn::NormedLinear;
use std::ops::Range;
use tracing::debug;

/// Actor-to-map pass: fuses static lane attributes, then lets lane nodes
/// attend to nearby actors.
#[derive(Clone, Debug)]
pub struct ActorToMap {
    /// Static attribute fusion (embedding + turn + control + intersect)
    pub meta: NormedLinear,
    /// Two stacked attention passes
    att: Vec<DistAttention>,
}

impl ActorToMap {
    fn new(config: &ModelConfig) -> Self {
        Self {
            meta: NormedLinear::new(
                config.n_map + config.turn_width + 2,
                config.n_map,
                true,
            ),
            att: (0..2)
                .map(|_| DistAttention::new(config.n_map, config.n_actor))
                .collect(),
        }
    }

    fn forward(
        &self,
        nodes: Vec<Vec<f32>>,
        graph: &GraphBatch,
        actors: &[Vec<f32>],
        actor_scenes: &[Range<usize>],
        actor_ctrs: &[[f32; 2]],
        dist_th: f32,
    ) -> Vec<Vec<f32>> {
        let mut feat: Vec<Vec<f32>> = nodes
            .iter()
            .enumerate()
            .map(|(i, emb)| {
                let mut meta_in =
                    Vec::with_capacity(emb.len() + graph.turn[i].len() + 2);
                meta_in.extend_from_slice(emb);
                meta_in.extend_from_slice(&graph.turn[i]);
                meta_in.push(graph.control[i]);
                meta_in.push(graph.intersect[i]);
                self.meta.forward(&meta_in)
            })
            .collect();

        for att in &self.att {
            feat = att.forward(
                &feat,
                &graph.scenes,
                &graph.ctrs,
                actors,
                actor_scenes,
                actor_ctrs,
                dist_th,
            );
        }
        feat
    }
}

/// Map-to-actor pass: actors attend to nearby lane nodes.
#[derive(Clone, Debug)]
pub struct MapToActor {
    att: Vec<DistAttention>,
}

impl MapToActor {
    fn new(config: &ModelConfig) -> Self {
        Self {
            att: (0..2)
                .map(|_| DistAttention::new(config.n_actor, config.n_map))
                .collect(),
        }
    }
}

/// Actor-to-actor pass: interaction among actors of the same scene.
#[derive(Clone, Debug)]
pub struct ActorToActor {
    att: Vec<DistAttention>,
}

impl ActorToActor {
    fn new(config: &ModelConfig) -> Self {
        Self {
            att: (0..2)
                .map(|_| DistAttention::new(config.n_actor, config.n_actor))
                .collect(),
        }
    }

    fn forward(
        &self,
        mut actors: Vec<Vec<f32>>,
        actor_scenes: &[Range<usize>],
        actor_ctrs: &[[f32; 2]],
        dist_th: f32,
    ) -> Vec<Vec<f32>> {
        for att in &self.att {
            actors = att.forward(
                &actors,
                actor_scenes,
                actor_ctrs,
                &actors,
                actor_scenes,
                actor_ctrs,
                dist_th,
            );
        }
        actors
    }
}

/// The full four-pass fusion cycle.
#[derive(Clone, Debug)]
pub struct FusionCycle {
    a2m: ActorToMap,
    m2m: LaneGraphConv,
    m2a: MapToActor,
    a2a: ActorToActor,
    actor2map_dist: f32,
    map2actor_dist: f32,
    actor2actor_dist: f32,
}

impl FusionCycle {
    /// Create a fusion cycle with independently-weighted passes.
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            a2m: ActorToMap::new(config),
            m2m: LaneGraphConv::new(config.n_map, config.num_scales, config.num_conv_rounds),
            m2a: MapToActor::new(config),
            a2a: ActorToActor::new(config),
            actor2map_dist: config.actor2map_dist,
            map2actor_dist: config.map2actor_dist,
            actor2actor_dist: config.actor2actor_dist,
        }
    }

    /// Run the cycle and return fused actor embeddings.
    ///
    /// When the lane batch is empty the actor/map passes are skipped
    /// entirely and only the actor-to-actor interaction runs.
    pub fn forward(
        &self,
        actors: &[Vec<f32>],
        actor_scenes: &[Range<usize>],
        actor_ctrs: &[[f32; 2]],
        nodes: Vec<Vec<f32>>,
        graph: &GraphBatch,
    ) -> Vec<Vec<f32>> {
        if nodes.is_empty() {
            debug!("no lane nodes; running actor-to-actor pass only");
            return self.a2a.forward(
                actors.to_vec(),
                actor_scenes,
                actor_ctrs,
                self.actor2actor_dist,
            );
        }

        let nodes = self.a2m.forward(
            nodes,
            graph,
            actors,
            actor_scenes,
            actor_ctrs,
            self.actor2map_dist,
        );
        let nodes = self.m2m.forward(&nodes, graph);

        let mut fused = actors.to_vec();
        for att in &self.m2a.att {
            fused = att.forward(
                &fused,
                actor_scenes,
                actor_ctrs,
                &nodes,
                &graph.scenes,
                &graph.ctrs,
                self.map2actor_dist,
            );
        }

        self.a2a
            .forward(fused, actor_scenes, actor_ctrs, self.actor2actor_dist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::batch::gather_graphs;
    use crate::graph::scene::{LaneGraph, SceneInput};

    fn small_config() -> ModelConfig {
        ModelConfig {
            n_actor: 8,
            n_map: 8,
            num_scales: 2,
            num_conv_rounds: 2,
            ..Default::default()
        }
    }

    fn map_scene() -> SceneInput {
        let mut graph = LaneGraph::empty(2);
        let n = 3;
        graph.ctrs = (0..n).map(|i| [i as f32, 0.5]).collect();
        graph.feats = vec![[1.0, 0.0]; n];
        graph.turn = vec![vec![0.0, 0.0]; n];
        graph.control = vec![0.0; n];
        graph.intersect = vec![1.0; n];
        for k in 1..n {
            for s in 0..2 {
                graph.suc[s].push(k - 1, k);
                graph.pre[s].push(k, k - 1);
            }
        }
        SceneInput {
            actor_trajs: vec![vec![[0.0, 0.0, 1.0]; 4]; 2],
            actor_ctrs: vec![[0.0, 0.0], [2.0, 0.0]],
            graph,
        }
    }

    #[test]
    fn test_full_cycle_shapes() {
        let config = small_config();
        let scene = map_scene();
        let graph = gather_graphs(&[scene.clone()], &config).unwrap();
        let cycle = FusionCycle::new(&config);

        let actors = vec![vec![0.3; 8], vec![0.5; 8]];
        let nodes = vec![vec![0.2; 8]; 3];
        let fused = cycle.forward(&actors, &[0..2], &scene.actor_ctrs, nodes, &graph);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].len(), 8);
        assert!(fused.iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn test_empty_map_cycle_equals_actor_pass_only() {
        let config = small_config();
        let mut scene = map_scene();
        scene.graph = LaneGraph::empty(2);
        let graph = gather_graphs(&[scene.clone()], &config).unwrap();
        let cycle = FusionCycle::new(&config);

        let actors = vec![vec![0.3; 8], vec![0.5; 8]];
        let fused = cycle.forward(&actors, &[0..2], &scene.actor_ctrs, Vec::new(), &graph);
        let a2a_only = cycle.a2a.forward(
            actors.clone(),
            &[0..2],
            &scene.actor_ctrs,
            config.actor2actor_dist,
        );
        for (a, b) in fused.iter().flatten().zip(a2a_only.iter().flatten()) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
