//! novelsmith - Multi-Agent Fiction Manuscript Pipeline
//!
//! Turns a premise into a complete manuscript by driving a sequence of
//! specialised model calls: an outline with a world bible, then for every
//! chapter a scene plan, scene prose, a continuity audit, an editorial pass
//! and a summary. A pacing review runs every few chapters.
//!
//! ## Core Features
//!
//! - **Checkpoint/Resume**: every stage result is committed atomically, so an
//!   interrupted run resumes at the first uncommitted stage
//! - **Cooperative Stop**: pause and cancel take effect between stages, from
//!   this process or another one sharing the database
//! - **Continuity Guard**: immutable character attributes survive every
//!   world-bible update
//! - **Repetition Control**: opening, closing and phrase patterns plus
//!   overused vocabulary are fed back into later prompts
//!
//! ## Quick Start
//!
//! ```ignore
//! use novelsmith::{Config, Database, NewProject, NovelPipeline, ProgressReporter};
//! use novelsmith::ai::{ProviderConfig, create_provider};
//!
//! let db = Arc::new(Database::open("novelsmith.db")?);
//! db.initialize()?;
//! let config = Arc::new(Config::default());
//! let provider = create_provider(&ProviderConfig::from(&config.llm))?;
//! let pipeline = NovelPipeline::new(db, provider, config)?;
//!
//! let project = pipeline.projects().create_project(request)?;
//! let progress = ProgressReporter::new(project.id.clone());
//! let finished = pipeline.start_generation(&project.id, &progress).await?;
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: model client abstraction, prompt layout, structured-output recovery
//! - [`novel`]: domain types, stage agents and the generation pipeline
//! - [`storage`]: SQLite persistence with connection pooling
//! - [`config`]: layered configuration

pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod novel;
pub mod storage;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::error::{ErrorCategory, NovelError, Result, ResultExt};
pub use types::{ProjectId, TokenUsage};

// Storage
pub use storage::database::PoolConfig;
pub use storage::{Database, ProjectStore, SharedDatabase};

// =============================================================================
// Pipeline Re-exports
// =============================================================================

pub use novel::{
    Chapter, ChapterStatus, ChapterStep, NewProject, NovelPipeline, ProgressEvent,
    ProgressReporter, Project, ProjectManager, ProjectOverview, ProjectStatus, Stage, WorldBible,
};

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{LlmProvider, LlmResponse, SharedProvider, TimeoutConfig, with_timeout};
