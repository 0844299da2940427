//! Global Constants
//!
//! Centralized constants for tuning that is not user-facing.
//! User-facing knobs live in `config::PipelineConfig`.

/// Chapter numbering for structural chapters
pub mod chapters {
    /// Prologue chapter number
    pub const PROLOGUE: u32 = 0;

    /// Epilogue chapter number
    pub const EPILOGUE: u32 = 998;

    /// Author's note chapter number
    pub const AUTHOR_NOTE: u32 = 999;

    /// Upper bound on regular chapters per project
    pub const MAX_REGULAR: u32 = 200;
}

/// Structured-output recovery constants
pub mod recovery {
    /// Default bound for the position-based repair loop
    pub const MAX_POSITION_REPAIRS: usize = 50;

    /// Characters of raw output kept in error messages
    pub const ERROR_PREVIEW_CHARS: usize = 200;
}

/// Stage agent constants
pub mod agents {
    /// Minimum scenes the planner must return
    pub const MIN_SCENES: usize = 3;

    /// Maximum scenes the planner may return
    pub const MAX_SCENES: usize = 4;

    /// Shortest editor patch snippet accepted
    pub const MIN_PATCH_SNIPPET_CHARS: usize = 20;

    /// Chapters of summaries the pacing director reviews
    pub const PACING_WINDOW: usize = 5;

    /// Default target words for a scene when the plan omits one
    pub const DEFAULT_SCENE_WORDS: u32 = 1200;

    /// Summaries in which a lead character must appear
    pub const MIN_ARC_APPEARANCES: usize = 3;

    /// Summaries in which a plot thread must be referenced
    pub const MIN_THREAD_REFERENCES: usize = 2;

    /// Allowed deviation of act ratios from 25/50/25, in percentage points
    pub const ACT_RATIO_TOLERANCE: f64 = 10.0;
}

/// Pattern tracker constants
pub mod patterns {
    /// Minimum count before a scene type or method is overused
    pub const OVERUSE_MIN_COUNT: usize = 3;

    /// Share of prior chapters above which a scene type is overused
    pub const OVERUSE_RATIO: f64 = 0.3;

    /// Chapters inspected for trope frequency
    pub const TROPE_WINDOW: usize = 5;

    /// Occurrences within the window that flag a trope
    pub const TROPE_LIMIT: usize = 2;

    /// Uses of the anonymous tip allowed per project
    pub const ANONYMOUS_TIP_LIMIT: usize = 1;
}

/// Vocabulary tracker constants
pub mod vocabulary {
    /// Chapters kept in the rolling window
    pub const WINDOW_CHAPTERS: usize = 3;

    /// Uses within the window that make a word overused
    pub const OVERUSE_THRESHOLD: usize = 12;

    /// Shortest word considered
    pub const MIN_WORD_LEN: usize = 4;

    /// Entries listed in the prompt block
    pub const MAX_REPORTED: usize = 15;
}

/// Retry constants for stage calls
pub mod retry {
    /// Maximum random jitter added to a retry delay (milliseconds)
    pub const MAX_JITTER_MS: u64 = 250;

    /// Upper bound on any retry delay (seconds)
    pub const MAX_DELAY_SECS: u64 = 30;
}

/// HTTP/Network constants
pub mod network {
    /// Default request timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

    /// Connection timeout (seconds)
    pub const CONNECTION_TIMEOUT_SECS: u64 = 30;
}

/// Progress channel constants
pub mod progress {
    /// Broadcast channel capacity
    pub const CHANNEL_CAPACITY: usize = 256;
}
