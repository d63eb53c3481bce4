//! Multi-modal trajectory decoding and the uncertainty-weighted loss.

pub mod head;
pub mod loss;

pub use head::{transform_to_world, ActorForecast, ModeForecast, PredictionHead};
pub use loss::{LossOutput, PredictionLoss};
