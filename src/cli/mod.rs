pub mod commands;
pub mod progress;
pub mod ui;
pub mod util;

pub use progress::ConsoleRenderer;
pub use util::{CommandContext, require_initialized};
