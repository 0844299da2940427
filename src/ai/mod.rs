//! AI Integration Layer
//!
//! Model client abstraction, prompt layout, call timeouts and structured-output
//! recovery.

pub mod prompt;
pub mod provider;
pub mod timeout;
pub mod validation;

pub use provider::{
    ErrorCategory, ErrorClassifier, GenerationOptions, LlmError, LlmProvider, LlmRequest,
    LlmResponse, ProviderConfig, ResponseMetadata, ResponseTiming, SharedProvider,
    create_provider,
};
pub use prompt::PromptBuilder;
pub use timeout::{TimeoutConfig, with_timeout};
pub use validation::{OutputSpec, ProcessedResponse, RepairStrategy, StructuredOutput};
