//! Config Command
//!
//! Usage:
//!   novelsmith config show [-f json]
//!   novelsmith config path
//!   novelsmith config init [-g] [--force]

use std::path::Path;

use crate::config::ConfigLoader;
use crate::types::Result;

/// Show the effective configuration (merged from all sources)
pub fn show(config_override: Option<&Path>, format: &str) -> Result<()> {
    let config = match config_override {
        Some(path) => ConfigLoader::load_with_override(path)?,
        None => ConfigLoader::load()?,
    };
    println!("{}", ConfigLoader::render(&config, format == "json")?);
    Ok(())
}

/// Show configuration paths
pub fn path() -> Result<()> {
    ConfigLoader::show_path();
    Ok(())
}

/// Initialize global configuration
pub fn init_global(force: bool) -> Result<()> {
    let dir = ConfigLoader::init_global(force)?;
    println!("✓ Initialized global configuration");
    println!("  Directory: {}", dir.display());
    if let Some(config_path) = ConfigLoader::global_config_path() {
        println!("  Config:    {}", config_path.display());
    }
    Ok(())
}

/// Initialize project configuration
pub fn init_project(force: bool) -> Result<()> {
    let dir = ConfigLoader::init_project(force)?;
    println!("✓ Initialized project configuration");
    println!("  Directory: {}", dir.display());
    println!(
        "  Config:    {}",
        ConfigLoader::project_config_path().display()
    );
    Ok(())
}
