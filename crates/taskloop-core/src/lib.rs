//! # taskloop-core
//!
//! Provider-agnostic task orchestration: structured output decoding, tool
//! decisions and a bounded agent loop.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                            Task                              │
//! │  ┌─────────────┐  ┌─────────────┐  ┌──────────────────────┐  │
//! │  │ Agent Loop  │──│  Executor   │──│   LlmProvider        │  │
//! │  │  + Memory   │  │ (one turn)  │  │   (Strategy)         │  │
//! │  └─────────────┘  └──────┬──────┘  └──────────────────────┘  │
//! │                   ┌──────┴──────┐                            │
//! │                   │    Tools    │                            │
//! │                   │   Registry  │                            │
//! │                   └─────────────┘                            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait is the only seam to the model backend; it always
//! returns plain text and all decoding happens here.

pub mod agent;
pub mod config;
pub mod decode;
pub mod error;
pub mod executor;
pub mod memory;
pub mod message;
pub mod provider;
pub mod render;
pub mod result;
pub mod schema;
pub mod task;
pub mod tool;

#[cfg(test)]
mod test_support;

pub use agent::AgentLoop;
pub use config::EngineConfig;
pub use error::{AgentError, Result};
pub use executor::{Decision, Executor};
pub use memory::{ConversationMemory, MemoryEntry};
pub use message::{Message, Role};
pub use provider::{GenerateParams, Generation, LlmProvider, PromptInput, TokenUsage};
pub use render::RenderLimits;
pub use result::RunResult;
pub use schema::{FieldType, OutputSchema};
pub use task::{Task, TaskSpec};
pub use tool::{Invocable, ParameterSchema, Tool, ToolContext, ToolParams, ToolRegistry};
