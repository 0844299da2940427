//! CLI Common Utilities
//!
//! Shared initialization and context management for CLI commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::ai::provider::{ProviderConfig, create_provider};
use crate::config::{Config, ConfigLoader};
use crate::novel::{NovelPipeline, Project, ProjectManager};
use crate::storage::{Database, SharedDatabase};
use crate::types::{NovelError, Result};

/// Command execution context
///
/// Loaded once per command: validates initialization, resolves configuration
/// and opens the project database.
#[derive(Clone)]
pub struct CommandContext {
    pub db: SharedDatabase,
    pub config: Arc<Config>,
}

impl CommandContext {
    pub fn load(config_override: Option<&Path>) -> Result<Self> {
        require_initialized()?;
        let config = match config_override {
            Some(path) => ConfigLoader::load_with_override(path)?,
            None => ConfigLoader::load()?,
        };
        let db = open_database(&config.storage.database_path)?;
        Ok(Self {
            db: Arc::new(db),
            config: Arc::new(config),
        })
    }

    /// Lifecycle operations; no model provider needed
    pub fn projects(&self) -> ProjectManager {
        ProjectManager::new(Arc::clone(&self.db))
    }

    /// Pipeline over the configured model provider
    pub fn pipeline(&self) -> Result<NovelPipeline> {
        let provider = create_provider(&ProviderConfig::from(&self.config.llm))?;
        Ok(NovelPipeline::new(Arc::clone(&self.db), provider, Arc::clone(&self.config))?
            .with_projects(self.projects()))
    }

    /// Resolve a project by full id or unique prefix
    pub fn project(&self, id_or_prefix: &str) -> Result<Project> {
        self.projects().find_project(id_or_prefix)
    }
}

/// Require the workspace to be initialized
///
/// Returns the `.novelsmith` directory, or `NovelError::NotInitialized`.
pub fn require_initialized() -> Result<PathBuf> {
    let dir = ConfigLoader::project_dir();
    if !dir.exists() {
        return Err(NovelError::NotInitialized);
    }
    Ok(dir)
}

/// Open (creating if needed) and migrate the database
pub fn open_database(path: &Path) -> Result<Database> {
    let db = Database::open(path)?;
    db.initialize()?;
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_database_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/data/novel.db");
        let db = open_database(&path).unwrap();
        assert!(path.exists());
        // reopening an initialized database is fine
        drop(db);
        assert!(open_database(&path).is_ok());
    }
}
