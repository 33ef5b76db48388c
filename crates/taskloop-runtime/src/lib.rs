//! # taskloop-runtime
//!
//! Runtime providers for the taskloop engine.
//!
//! ## Providers
//!
//! - **Ollama** (default): Local LLM inference via Ollama
//!
//! ## Usage
//!
//! ```rust,ignore
//! use taskloop_runtime::{OllamaProvider, Task};
//!
//! let provider = OllamaProvider::from_env();
//! let result = Task::prompt("Hello").run(&provider).await?;
//! ```

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "ollama")]
pub use ollama::{OllamaConfig, OllamaProvider};

// Re-export core types for convenience
pub use taskloop_core::{
    AgentError, EngineConfig, Invocable, LlmProvider, Message, Result, Role, RunResult, Task,
    TaskSpec, Tool, ToolRegistry,
};
