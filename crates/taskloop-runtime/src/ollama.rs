//! Ollama LLM Provider
//!
//! Implementation of `LlmProvider` for local Ollama inference.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use ollama_rs::{
    Ollama,
    error::OllamaError,
    generation::chat::{ChatMessage, ChatMessageResponse, MessageRole, request::ChatMessageRequest},
    models::ModelOptions,
};
use taskloop_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{GenerateParams, Generation, LlmProvider, PromptInput, TokenUsage},
};

/// Model used when neither the task nor the environment names one
pub const DEFAULT_MODEL: &str = "llama3.2";

/// Ollama provider configuration
#[derive(Clone, Debug)]
pub struct OllamaConfig {
    /// Ollama host URL
    pub host: String,

    /// Ollama port
    pub port: u16,

    /// Default model
    pub model: String,

    /// Request timeout in seconds, unless a call sets its own
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost".into(),
            port: 11434,
            model: DEFAULT_MODEL.into(),
            timeout_secs: 120,
        }
    }
}

impl OllamaConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let host = std::env::var("OLLAMA_HOST").unwrap_or(defaults.host);
        let port = std::env::var("OLLAMA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);
        let model = std::env::var("OLLAMA_MODEL").unwrap_or(defaults.model);

        Self {
            host,
            port,
            model,
            ..defaults
        }
    }
}

/// Ollama LLM provider
pub struct OllamaProvider {
    client: Ollama,
    config: OllamaConfig,
}

impl OllamaProvider {
    /// Create a new Ollama provider with custom host/port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::from_config(OllamaConfig {
            host: host.into(),
            port,
            ..Default::default()
        })
    }

    /// Create from configuration
    pub fn from_config(config: OllamaConfig) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client: Ollama::new_with_client(config.host.clone(), config.port, http),
            config,
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Self {
        Self::from_config(OllamaConfig::from_env())
    }

    /// Create with default localhost settings
    pub fn localhost() -> Self {
        Self::from_config(OllamaConfig::default())
    }

    pub const fn config(&self) -> &OllamaConfig {
        &self.config
    }

    /// Names of the locally installed models
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let timeout_secs = self.config.timeout_secs;
        let models = bounded(timeout_secs, self.client.list_local_models())
            .await?
            .map_err(|e| AgentError::ProviderUnavailable(e.to_string()))?;

        Ok(models.into_iter().map(|m| m.name).collect())
    }

    /// Convert generate params to Ollama chat messages, system text first
    fn convert_messages(params: &GenerateParams) -> Vec<ChatMessage> {
        let mut messages = Vec::new();
        if let Some(system) = params.system.as_ref().filter(|s| !s.is_empty()) {
            messages.push(ChatMessage::new(MessageRole::System, system.clone()));
        }
        match &params.input {
            PromptInput::Prompt(prompt) => {
                messages.push(ChatMessage::new(MessageRole::User, prompt.clone()));
            }
            PromptInput::Messages(history) => {
                messages.extend(history.iter().map(|m: &Message| {
                    let role = match m.role {
                        Role::System => MessageRole::System,
                        Role::User => MessageRole::User,
                        Role::Assistant => MessageRole::Assistant,
                    };
                    ChatMessage::new(role, m.content.clone())
                }));
            }
        }
        messages
    }

    /// Build the chat request for one call
    fn chat_request(&self, params: &GenerateParams) -> ChatMessageRequest {
        let model = params
            .model
            .clone()
            .unwrap_or_else(|| self.config.model.clone());
        let request = ChatMessageRequest::new(model, Self::convert_messages(params));

        if params.temperature.is_none() && params.max_tokens.is_none() {
            return request;
        }
        let mut options = ModelOptions::default();
        if let Some(temperature) = params.temperature {
            options = options.temperature(temperature);
        }
        if let Some(max_tokens) = params.max_tokens {
            options = options.num_predict(i32::try_from(max_tokens).unwrap_or(i32::MAX));
        }
        request.options(options)
    }

    fn usage(response: &ChatMessageResponse) -> Option<TokenUsage> {
        response
            .final_data
            .as_ref()
            .map(|d| TokenUsage::new(d.prompt_eval_count.into(), d.eval_count.into()))
    }

    fn map_error(err: &OllamaError) -> AgentError {
        match err {
            OllamaError::ReqwestError(e) if e.is_connect() => {
                AgentError::ProviderUnavailable(e.to_string())
            }
            _ => AgentError::Provider(err.to_string()),
        }
    }
}

/// Await `fut`, mapping expiry after `timeout_secs` to `AgentError::Timeout`
async fn bounded<F: Future>(timeout_secs: u64, fut: F) -> Result<F::Output> {
    tokio::time::timeout(Duration::from_secs(timeout_secs), fut)
        .await
        .map_err(|_| AgentError::Timeout(timeout_secs))
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn health_check(&self) -> Result<bool> {
        match self.list_models().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!("Ollama health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn generate(&self, params: &GenerateParams) -> Result<Generation> {
        let timeout_secs = params.timeout.unwrap_or(self.config.timeout_secs);
        if params.cache {
            tracing::debug!("Ollama has no response cache; cache flags ignored");
        }

        let model = params.model.as_deref().unwrap_or(self.config.model.as_str());
        tracing::debug!(model, "Sending chat request");
        let request = self.chat_request(params);

        let response = bounded(timeout_secs, self.client.send_chat_messages(request))
            .await?
            .map_err(|e| Self::map_error(&e))?;

        Ok(Generation {
            usage: Self::usage(&response),
            text: response.message.content,
        })
    }
}
