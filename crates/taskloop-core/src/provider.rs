//! LLM Provider Strategy Pattern
//!
//! The engine talks to a text-generation backend only through [`LlmProvider`].
//! Providers always return plain text; decoding structure out of that text is
//! the engine's job.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use taskloop_core::provider::{GenerateParams, LlmProvider};
//!
//! let provider = OllamaProvider::localhost();
//! let generation = provider
//!     .generate(&GenerateParams::prompt("Say hello").with_temperature(0.0))
//!     .await?;
//! println!("{}", generation.text);
//! ```

use std::ops::AddAssign;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::Message;

/// What the provider should respond to
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptInput {
    /// A single prompt string
    Prompt(String),
    /// An ordered message list
    Messages(Vec<Message>),
}

/// Parameters for a single `generate` call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerateParams {
    /// Prompt text or message list
    #[serde(flatten)]
    pub input: PromptInput,

    /// System instructions, sent separately if the backend supports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Sampling temperature (0.0 = deterministic)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Model identifier (e.g., "llama3.2")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Per-call timeout in seconds, enforced by the adapter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Whether the adapter may serve this call from a cache
    #[serde(default)]
    pub cache: bool,

    /// Cache entry lifetime in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_ttl: Option<u64>,

    /// Example payload illustrating the expected output shape
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<serde_json::Value>,
}

impl GenerateParams {
    fn from_input(input: PromptInput) -> Self {
        Self {
            input,
            system: None,
            temperature: None,
            max_tokens: None,
            model: None,
            timeout: None,
            cache: false,
            cache_ttl: None,
            example: None,
        }
    }

    /// Params for a single prompt string
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self::from_input(PromptInput::Prompt(prompt.into()))
    }

    /// Params for an ordered message list
    pub fn messages(messages: Vec<Message>) -> Self {
        Self::from_input(PromptInput::Messages(messages))
    }

    #[must_use]
    pub fn with_system(mut self, system: Option<String>) -> Self {
        self.system = system;
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// The prompt text, if this call was built from a single prompt
    pub fn prompt_text(&self) -> Option<&str> {
        match &self.input {
            PromptInput::Prompt(p) => Some(p),
            PromptInput::Messages(_) => None,
        }
    }
}

/// Token usage statistics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Usage from provider-reported counts, clamped to `u32`
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        let clamp = |n: u64| u32::try_from(n).unwrap_or(u32::MAX);
        Self {
            prompt_tokens: clamp(prompt_tokens),
            completion_tokens: clamp(completion_tokens),
            total_tokens: clamp(prompt_tokens.saturating_add(completion_tokens)),
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(rhs.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(rhs.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(rhs.total_tokens);
    }
}

/// Response from a `generate` call
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    /// The generated text
    pub text: String,

    /// Token usage statistics (if available)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl Generation {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }
}

/// Strategy trait for LLM providers
///
/// Implement this trait to add support for new LLM backends.
/// The engine works exclusively through this interface.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short provider name used in logs
    fn name(&self) -> &str;

    /// Check if the provider is available and configured correctly
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    /// Generate text for the given params
    async fn generate(&self, params: &GenerateParams) -> Result<Generation>;
}
