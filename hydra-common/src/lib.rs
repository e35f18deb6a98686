//! # Hydra Common Library
//!
//! Shared code for the hydration tracker crates including:
//! - Error types
//! - Configuration loading (TOML file + environment overrides)
//! - Event types and the EventBus push hook
//! - Clock and day-boundary helpers
//! - Tracing initialisation

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod time;

pub use error::{Error, Result};
