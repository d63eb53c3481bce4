//! Core utilities and common types for lanefuse.

pub mod config;
pub mod error;

pub use config::ModelConfig;
pub use error::{Error, Result};
