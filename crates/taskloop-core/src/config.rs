//! Engine Configuration
//!
//! Defaults every task starts from. Override in code, or from the
//! environment with [`EngineConfig::from_env`]:
//!
//! | variable | field |
//! |---|---|
//! | `TASKLOOP_MODEL` | `model` |
//! | `TASKLOOP_TEMPERATURE` | `answer_temperature` |
//! | `TASKLOOP_MAX_TURNS` | `max_turns` |
//! | `TASKLOOP_MEMORY_CAP` | `memory_cap` |

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::render::RenderLimits;

/// Engine-wide defaults
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Model used when a task doesn't name one
    pub model: Option<String>,

    /// Temperature for answer and plain calls when a task doesn't set one
    pub answer_temperature: f32,

    /// Temperature for tool decisions
    pub decision_temperature: f32,

    /// Turn budget for agent runs
    pub max_turns: usize,

    /// Conversation memory cap for agent runs
    pub memory_cap: usize,

    /// Bounds for tool results embedded in prompts
    pub render: RenderLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: None,
            answer_temperature: 0.3,
            decision_temperature: 0.0,
            max_turns: 10,
            memory_cap: 100,
            render: RenderLimits::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `TASKLOOP_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(model) = lookup("TASKLOOP_MODEL").filter(|m| !m.trim().is_empty()) {
            config.model = Some(model);
        }
        if let Some(temp) = parse_var(&lookup, "TASKLOOP_TEMPERATURE")? {
            config.answer_temperature = temp;
        }
        if let Some(turns) = parse_var(&lookup, "TASKLOOP_MAX_TURNS")? {
            config.max_turns = turns;
        }
        if let Some(cap) = parse_var(&lookup, "TASKLOOP_MEMORY_CAP")? {
            config.memory_cap = cap;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine can't run with
    pub fn validate(&self) -> Result<()> {
        if self.max_turns == 0 {
            return Err(AgentError::Config("max_turns must be at least 1".into()));
        }
        if self.memory_cap == 0 {
            return Err(AgentError::Config("memory_cap must be at least 1".into()));
        }
        if !(0.0..=2.0).contains(&self.answer_temperature) {
            return Err(AgentError::Config(format!(
                "temperature {} is outside 0.0..=2.0",
                self.answer_temperature
            )));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| AgentError::Config(format!("{key} has invalid value '{raw}'"))),
    }
}
