//! Run Result
//!
//! Every expected failure (undecodable output, validation, tool errors, an
//! exhausted turn budget) is reported here rather than as an `Err`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::memory::MemoryEntry;
use crate::provider::TokenUsage;

/// Outcome of running a task
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub success: bool,

    /// Decoded, coerced output when a schema was declared
    pub data: Option<Value>,

    /// Last text returned by the provider
    pub raw: String,

    pub errors: Vec<String>,

    /// Tools invoked (tool-aware and agent runs only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools_used: Option<Vec<String>>,

    /// Results keyed by tool name (tool-aware and agent runs only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_turns: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_memory: Option<Vec<MemoryEntry>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_achieved: Option<bool>,

    /// Summed token usage over every provider call made for this result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl RunResult {
    /// Failed result carrying a single error
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
            ..Self::default()
        }
    }

    /// Tool-aware result with explicit tool bookkeeping
    pub(crate) fn with_tools(mut self, used: Vec<String>, results: Map<String, Value>) -> Self {
        self.tools_used = Some(used);
        self.tool_results = Some(results);
        self
    }

    #[must_use]
    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = raw.into();
        self
    }

    pub(crate) fn add_usage(&mut self, usage: Option<TokenUsage>) {
        if let Some(usage) = usage {
            *self.usage.get_or_insert_with(TokenUsage::default) += usage;
        }
    }

    /// Tools used, or an empty slice for plain runs
    pub fn tools(&self) -> &[String] {
        self.tools_used.as_deref().unwrap_or_default()
    }

    pub fn tool_result(&self, name: &str) -> Option<&Value> {
        self.tool_results.as_ref()?.get(name)
    }
}
