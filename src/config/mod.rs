//! Configuration Management
//!
//! Unified configuration system with hierarchical resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/novelsmith/config.toml)
//! 3. Project config (.novelsmith/config.toml)
//! 4. Environment variables (NOVELSMITH_*)
//! 5. CLI arguments (highest priority)

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::*;
