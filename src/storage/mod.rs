pub mod database;
pub mod project_store;

pub use database::{Database, PoolConfig, SharedDatabase};
pub use project_store::{EditCommit, ProjectStore};
