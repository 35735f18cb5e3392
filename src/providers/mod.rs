//! Provider implementations for different LLM services.

pub mod watsonx;

// Re-export commonly used provider types
pub use watsonx::WatsonxProvider;
