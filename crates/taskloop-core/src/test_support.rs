//! Provider doubles for unit tests

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AgentError, Result};
use crate::provider::{GenerateParams, Generation, LlmProvider, TokenUsage};

/// Replies with canned responses in order and records every call
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<GenerateParams>>,
    usage: Option<TokenUsage>,
}

impl ScriptedProvider {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            calls: Mutex::new(Vec::new()),
            usage: None,
        }
    }

    /// Report this usage on every call
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn calls(&self) -> Vec<GenerateParams> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Prompt text of the n-th call
    pub fn prompt(&self, n: usize) -> String {
        self.calls()[n].prompt_text().unwrap_or_default().to_string()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, params: &GenerateParams) -> Result<Generation> {
        self.calls.lock().unwrap().push(params.clone());
        let text = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AgentError::Provider("script exhausted".into()))?;
        Ok(Generation {
            text,
            usage: self.usage,
        })
    }
}

/// Replies by routing each call through a closure
pub struct FnProvider<F> {
    respond: F,
    calls: Mutex<usize>,
}

impl<F> FnProvider<F>
where
    F: Fn(&GenerateParams) -> String + Send + Sync,
{
    pub const fn new(respond: F) -> Self {
        Self {
            respond,
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl<F> LlmProvider for FnProvider<F>
where
    F: Fn(&GenerateParams) -> String + Send + Sync,
{
    fn name(&self) -> &str {
        "fn"
    }

    async fn generate(&self, params: &GenerateParams) -> Result<Generation> {
        *self.calls.lock().unwrap() += 1;
        Ok(Generation::text((self.respond)(params)))
    }
}

/// True when `params` is a tool-decision call
pub fn is_decision(params: &GenerateParams) -> bool {
    params
        .prompt_text()
        .is_some_and(|p| p.contains(crate::executor::DECISION_MARKER))
}
