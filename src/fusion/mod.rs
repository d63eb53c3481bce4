//! Actor/map fusion: distance-gated attention, lane-graph convolution and
//! the four-pass fusion cycle.

pub mod attention;
pub mod cycle;
pub mod lane_conv;

pub use attention::DistAttention;
pub use cycle::FusionCycle;
pub use lane_conv::{LaneGraphConv, MapEncoder};
