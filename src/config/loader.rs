//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (~/.config/novelsmith/config.toml)
//! 3. Project config (.novelsmith/config.toml)
//! 4. Environment variables (NOVELSMITH_* prefix, `__` separates sections)

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::Config;
use crate::types::{NovelError, Result};

/// Environment variable prefix
const ENV_PREFIX: &str = "NOVELSMITH_";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain:
    /// defaults → global → project → env vars
    pub fn load() -> Result<Config> {
        Self::load_layers(Self::global_config_path(), Some(Self::project_config_path()))
    }

    /// Like `load`, with an explicit file taking the place of the project config
    pub fn load_with_override(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Err(NovelError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        Self::load_layers(Self::global_config_path(), Some(path.to_path_buf()))
    }

    /// Load configuration from a specific file only
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| NovelError::Config(format!("Configuration error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn load_layers(global: Option<PathBuf>, project: Option<PathBuf>) -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = global
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        if let Some(project_path) = project
            && project_path.exists()
        {
            debug!("Loading project config from: {}", project_path.display());
            figment = figment.merge(Toml::file(&project_path));
        }

        // NOVELSMITH_LLM__MODEL -> llm.model, NOVELSMITH_LLM__API_KEY -> llm.api_key
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__").lowercase(true));

        let config: Config = figment
            .extract()
            .map_err(|e| NovelError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Get path to global config directory (~/.config/novelsmith/)
    pub fn global_dir() -> Option<PathBuf> {
        env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                env::var("HOME")
                    .ok()
                    .map(|home| PathBuf::from(home).join(".config"))
            })
            .map(|p| p.join("novelsmith"))
    }

    /// Get path to global config file
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    /// Get path to project config file
    pub fn project_config_path() -> PathBuf {
        Self::project_dir().join("config.toml")
    }

    /// Get project data directory
    pub fn project_dir() -> PathBuf {
        PathBuf::from(".novelsmith")
    }

    /// Check if the workspace is initialized
    pub fn is_project_initialized() -> bool {
        Self::project_dir().exists()
    }

    // =========================================================================
    // Config Commands
    // =========================================================================

    /// Show config file paths
    pub fn show_path() {
        println!("Configuration paths:");
        println!();

        if let Some(global) = Self::global_config_path() {
            let exists = if global.exists() { "✓" } else { "✗" };
            println!("  Global:  {} {}", exists, global.display());
        } else {
            println!("  Global:  (not available)");
        }

        let project = Self::project_config_path();
        let exists = if project.exists() { "✓" } else { "✗" };
        println!("  Project: {} {}", exists, project.display());
    }

    /// Render the effective configuration
    pub fn render(config: &Config, as_json: bool) -> Result<String> {
        if as_json {
            Ok(serde_json::to_string_pretty(config)?)
        } else {
            toml::to_string_pretty(config).map_err(|e| NovelError::Config(e.to_string()))
        }
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Initialize global configuration
    pub fn init_global(force: bool) -> Result<PathBuf> {
        let global_dir = Self::global_dir().ok_or_else(|| {
            NovelError::Config("Cannot determine global config directory".to_string())
        })?;
        Self::write_default(&global_dir, force)?;
        Ok(global_dir)
    }

    /// Initialize the `.novelsmith/` workspace in the current directory
    pub fn init_project(force: bool) -> Result<PathBuf> {
        let project_dir = Self::project_dir();
        Self::write_default(&project_dir, force)?;
        fs::create_dir_all(project_dir.join("prompts"))?;
        Ok(project_dir)
    }

    fn write_default(dir: &Path, force: bool) -> Result<()> {
        fs::create_dir_all(dir)?;
        let config_path = dir.join("config.toml");
        if !config_path.exists() || force {
            fs::write(&config_path, Self::default_config_toml()?)?;
            info!("Created config: {}", config_path.display());
        } else {
            info!("Config exists: {}", config_path.display());
        }
        Ok(())
    }

    /// Default configuration rendered as commented TOML
    fn default_config_toml() -> Result<String> {
        let body = toml::to_string_pretty(&Config::default())
            .map_err(|e| NovelError::Config(e.to_string()))?;
        Ok(format!(
            "# novelsmith configuration\n\
             # Keys may be overridden with NOVELSMITH_<SECTION>__<KEY> environment variables.\n\
             # The API key is best supplied as NOVELSMITH_LLM__API_KEY.\n\n{}",
            body
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[llm]
provider = "ollama"
model = "llama3"

[pipeline]
pacing_interval = 3

[stages.scene_writer]
temperature = 1.2
"#,
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.model, "llama3");
        assert_eq!(config.pipeline.pacing_interval, 3);
        assert_eq!(config.pipeline.approve_threshold, 8);
        assert_eq!(config.temperature_for("scene_writer"), 1.2);
    }

    #[test]
    fn test_load_from_file_validates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[pipeline]\npacing_interval = 0\n").unwrap();
        assert!(matches!(
            ConfigLoader::load_from_file(&path),
            Err(NovelError::Config(_))
        ));
    }

    #[test]
    fn test_default_config_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, ConfigLoader::default_config_toml().unwrap()).unwrap();
        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.llm.model, Config::default().llm.model);
        assert_eq!(config.pipeline.scene_tail_chars, 1500);
    }

    #[test]
    fn test_missing_override_file() {
        let result = ConfigLoader::load_with_override(Path::new("/nonexistent/novelsmith.toml"));
        assert!(matches!(result, Err(NovelError::Config(_))));
    }
}
