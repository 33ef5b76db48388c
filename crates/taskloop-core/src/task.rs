//! Task Descriptor
//!
//! A [`Task`] is the caller's description of one exchange with the model:
//! what to ask, what shape the answer should have, which tools may be used
//! and whether to keep going as an agent. It is consumed by [`Task::run`].
//!
//! ```rust,ignore
//! let result = Task::prompt("Summarise this ticket: ...")
//!     .schema(OutputSchema::new().field("title", "string").field("priority", "int"))
//!     .required(["title"])
//!     .run(&provider)
//!     .await?;
//! ```

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::agent::AgentLoop;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::executor::Executor;
use crate::message::{Message, last_user_content};
use crate::provider::{GenerateParams, LlmProvider, PromptInput};
use crate::result::RunResult;
use crate::schema::OutputSchema;
use crate::tool::{Invocable, ParameterSchema, ToolContext, ToolRegistry};

/// Caller-built configuration for one run
#[derive(Clone, Debug, Default)]
pub struct Task {
    prompt: Option<String>,
    messages: Vec<Message>,
    system: Option<String>,
    schema: Option<OutputSchema>,
    required: Vec<String>,
    example: Option<Value>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
    cache: bool,
    cache_ttl: Option<u64>,
    tools: ToolRegistry,
    context: HashMap<String, Value>,
    goal: Option<String>,
    max_turns: Option<usize>,
    agent: bool,
    strict: bool,
    config: EngineConfig,
}

impl Task {
    pub fn new() -> Self {
        Self::default()
    }

    /// Task with a single prompt
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self::new().with_prompt(prompt)
    }

    // ------------------------------------------------------------------
    // Builder
    // ------------------------------------------------------------------

    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    #[must_use]
    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    #[must_use]
    pub fn messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    #[must_use]
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    #[must_use]
    pub fn schema(mut self, schema: OutputSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    #[must_use]
    pub fn required<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(fields.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn example(mut self, example: Value) -> Self {
        self.example = Some(example);
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    #[must_use]
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Allow the provider to serve calls from its cache
    #[must_use]
    pub fn cache(mut self, ttl_secs: Option<u64>) -> Self {
        self.cache = true;
        self.cache_ttl = ttl_secs;
        self
    }

    /// Register a tool on this task
    pub fn tool(
        mut self,
        name: impl Into<String>,
        invocable: Invocable,
        description: Option<&str>,
        params: Option<Vec<ParameterSchema>>,
    ) -> Result<Self> {
        self.tools.register(name, invocable, description, params)?;
        Ok(self)
    }

    /// Replace the tool registry
    #[must_use]
    pub fn tools_from(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Add context metadata exposed to tools
    #[must_use]
    pub fn context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Set a goal; implies agent mode
    #[must_use]
    pub fn goal(mut self, goal: impl Into<String>) -> Self {
        self.goal = Some(goal.into());
        self.agent = true;
        self
    }

    /// Set the turn budget; implies agent mode
    #[must_use]
    pub fn max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = Some(max_turns);
        self.agent = true;
        self
    }

    /// Run as a multi-turn agent
    #[must_use]
    pub fn agent(mut self) -> Self {
        self.agent = true;
        self
    }

    /// Record an error when structured output can't be decoded
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    // ------------------------------------------------------------------
    // Read access for the executor and agent loop
    // ------------------------------------------------------------------

    /// Text the tool-aware executor answers: the prompt, else the last user message
    pub fn query(&self) -> Option<&str> {
        self.prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .or_else(|| last_user_content(&self.messages))
            .filter(|q| !q.trim().is_empty())
    }

    pub const fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub const fn is_strict(&self) -> bool {
        self.strict
    }

    pub const fn is_agent(&self) -> bool {
        self.agent
    }

    pub fn goal_text(&self) -> Option<&str> {
        self.goal.as_deref()
    }

    pub const fn output_schema(&self) -> Option<&OutputSchema> {
        self.schema.as_ref()
    }

    pub fn required_fields(&self) -> &[String] {
        &self.required
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Turn budget: the task's own, else the configured default (at least 1)
    pub fn turn_budget(&self) -> usize {
        self.max_turns.unwrap_or(self.config.max_turns).max(1)
    }

    /// Temperature for plain and answer calls
    pub fn answer_temperature(&self) -> f32 {
        self.temperature.unwrap_or(self.config.answer_temperature)
    }

    pub fn tool_context(&self) -> ToolContext {
        ToolContext::new(self.context.clone())
    }

    /// Provider params sharing this task's model, limits and cache flags
    pub(crate) fn params(&self, input: PromptInput, temperature: f32) -> GenerateParams {
        GenerateParams {
            input,
            system: self.system.clone(),
            temperature: Some(temperature),
            max_tokens: self.max_tokens,
            model: self.model.clone().or_else(|| self.config.model.clone()),
            timeout: self.timeout_secs,
            cache: self.cache,
            cache_ttl: self.cache_ttl,
            example: None,
        }
    }

    /// Params for a plain-mode call.
    ///
    /// `prompt` overrides the task's own input (agent continuation turns).
    /// Schema instructions are appended to the system text.
    pub(crate) fn plain_params(&self, prompt: Option<&str>) -> GenerateParams {
        let input = match prompt {
            Some(p) => PromptInput::Prompt(p.to_string()),
            None if self.messages.is_empty() => {
                PromptInput::Prompt(self.prompt.clone().unwrap_or_default())
            }
            None => {
                let mut messages = self.messages.clone();
                if let Some(p) = self.prompt.as_ref().filter(|p| !p.trim().is_empty()) {
                    messages.push(Message::user(p.clone()));
                }
                PromptInput::Messages(messages)
            }
        };

        let mut params = self.params(input, self.answer_temperature());
        params.example.clone_from(&self.example);
        if let Some(instructions) = self.output_instructions() {
            params.system = Some(match params.system.take() {
                Some(system) => format!("{system}\n\n{instructions}"),
                None => instructions,
            });
        }
        params
    }

    fn output_instructions(&self) -> Option<String> {
        let schema = self.schema.as_ref()?;
        let mut text = String::from("Respond with valid JSON only, without commentary.");
        if !schema.is_empty() {
            text.push_str("\nReturn a JSON object (or an array of such objects) with these fields:\n");
            text.push_str(&schema.describe());
        }
        if !self.required.is_empty() {
            text.push_str(&format!("\nRequired fields: {}", self.required.join(", ")));
        }
        if let Some(example) = &self.example {
            text.push_str(&format!("\nExample:\n{example}"));
        }
        Some(text)
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Run the task once: a single turn, or the agent loop in agent mode.
    ///
    /// Expected failures are reported in the returned [`RunResult`]; `Err`
    /// is reserved for provider failures.
    pub async fn run(self, provider: &dyn LlmProvider) -> Result<RunResult> {
        if self.agent {
            AgentLoop::new(self).run(provider).await
        } else {
            Executor::new(provider).execute(&self, None).await
        }
    }
}

/// Declarative task description, loadable from JSON.
///
/// Tools can't be declared in data; `tools` lists names for the caller to
/// resolve against its own invocables.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaskSpec {
    pub prompt: Option<String>,
    pub messages: Vec<Message>,
    pub system: Option<String>,
    pub schema: Option<OutputSchema>,
    pub required: Vec<String>,
    pub example: Option<Value>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub cache: bool,
    pub cache_ttl: Option<u64>,
    pub context: HashMap<String, Value>,
    pub goal: Option<String>,
    pub max_turns: Option<usize>,
    pub agent: bool,
    pub strict: bool,
    pub tools: Vec<String>,
}

impl TaskSpec {
    /// Build a task (without tools) on top of `config`
    pub fn into_task(self, config: EngineConfig) -> Task {
        Task {
            prompt: self.prompt,
            messages: self.messages,
            system: self.system,
            schema: self.schema,
            required: self.required,
            example: self.example,
            model: self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout_secs: self.timeout_secs,
            cache: self.cache,
            cache_ttl: self.cache_ttl,
            tools: ToolRegistry::new(),
            context: self.context,
            agent: self.agent || self.goal.is_some() || self.max_turns.is_some(),
            goal: self.goal,
            max_turns: self.max_turns,
            strict: self.strict,
            config,
        }
    }
}
