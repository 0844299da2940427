//! Init Command
//!
//! Initialize a novelsmith workspace in the current directory.

use crate::cli::util::open_database;
use crate::config::ConfigLoader;
use crate::types::{NovelError, Result};

pub fn run(force: bool) -> Result<()> {
    let dir = ConfigLoader::project_dir();
    if dir.exists() && !force {
        return Err(NovelError::Config(
            "Already initialized. Use --force to overwrite.".to_string(),
        ));
    }

    ConfigLoader::init_project(force)?;

    // Initialize global config if not exists (don't force overwrite)
    if let Err(e) = ConfigLoader::init_global(false) {
        tracing::debug!("Global config init skipped: {}", e);
    }

    let config = ConfigLoader::load()?;
    open_database(&config.storage.database_path)?;

    println!("✓ Initialized novelsmith in {}/", dir.display());
    println!("  Database: {}", config.storage.database_path.display());
    println!("  Prompts:  {}/prompts/<stage>.md (optional overrides)", dir.display());
    println!();
    println!("Next steps:");
    println!(
        "  1. Set NOVELSMITH_LLM__API_KEY (or edit {})",
        ConfigLoader::project_config_path().display()
    );
    println!("  2. Run 'novelsmith new --title ... --premise ...' to create a project");
    println!("  3. Run 'novelsmith generate <project>'");

    Ok(())
}
