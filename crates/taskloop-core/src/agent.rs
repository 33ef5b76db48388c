//! Agent Loop
//!
//! Repeats the single-turn protocol until a turn finishes without calling a
//! tool, or the turn budget runs out. Turn 0 answers the task's own query;
//! later turns get a continuation prompt built from the conversation memory.
//!
//! A turn that called a tool is always "in progress", even when the call
//! failed, so the model gets another turn to recover.

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::Result;
use crate::executor::Executor;
use crate::memory::ConversationMemory;
use crate::provider::{LlmProvider, TokenUsage};
use crate::result::RunResult;
use crate::task::Task;

/// Error reported when the turn budget is exhausted
pub const MAX_TURNS_ERROR: &str = "Agent reached maximum turns without achieving goal";

/// Multi-turn driver for one task.
///
/// Owns the task and a memory scoped to a single run.
pub struct AgentLoop {
    task: Task,
    memory: ConversationMemory,
}

/// Running totals across turns
#[derive(Default)]
struct Totals {
    tools_used: Vec<String>,
    tool_results: Map<String, Value>,
    usage: Option<TokenUsage>,
}

impl Totals {
    /// Fold one turn in: tool names are unioned in first-seen order, results
    /// of a tool called again overwrite the earlier ones.
    fn absorb(&mut self, turn: &mut RunResult) {
        for name in turn.tools() {
            if !self.tools_used.contains(name) {
                self.tools_used.push(name.clone());
            }
        }
        if let Some(results) = turn.tool_results.take() {
            self.tool_results.extend(results);
        }
        if let Some(usage) = turn.usage.take() {
            *self.usage.get_or_insert_with(TokenUsage::default) += usage;
        }
    }
}

impl AgentLoop {
    pub fn new(task: Task) -> Self {
        let memory = ConversationMemory::new(task.config().memory_cap);
        Self { task, memory }
    }

    pub const fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Drive the task to completion or turn exhaustion.
    ///
    /// Only provider failures are returned as `Err`.
    #[tracing::instrument(
        name = "agent_run",
        skip_all,
        fields(run_id = %Uuid::new_v4(), max_turns = self.task.turn_budget())
    )]
    pub async fn run(mut self, provider: &dyn LlmProvider) -> Result<RunResult> {
        let executor = Executor::new(provider);
        let max_turns = self.task.turn_budget();
        let mut totals = Totals::default();

        if let Some(query) = self.task.query() {
            self.memory.add_user(query, 0);
        }

        for turn in 0..max_turns {
            let continuation = (turn > 0).then(|| self.continuation_prompt());
            let mut result = executor.execute(&self.task, continuation.as_deref()).await?;

            let turn_tools = result.tools().to_vec();
            totals.absorb(&mut result);
            self.memory
                .add_assistant(memory_content(&result), turn, turn_tools.clone());

            let complete = turn_tools.is_empty() && (result.success || !result.raw.trim().is_empty());
            tracing::debug!(turn, tools = ?turn_tools, complete, "Agent turn finished");
            if complete {
                tracing::info!(turns = turn + 1, "Agent finished");
                result.agent_turns = Some(turn + 1);
                result.goal_achieved = Some(true);
                return Ok(self.finish(result, totals));
            }
        }

        tracing::warn!(max_turns, "Agent exhausted its turn budget");
        let raw = self
            .memory
            .last()
            .map(|entry| entry.content.clone())
            .unwrap_or_default();
        let mut result = RunResult::failure(MAX_TURNS_ERROR).with_raw(raw);
        result.agent_turns = Some(max_turns);
        result.goal_achieved = Some(false);
        Ok(self.finish(result, totals))
    }

    fn finish(self, mut result: RunResult, totals: Totals) -> RunResult {
        result.tools_used = Some(totals.tools_used);
        result.tool_results = Some(totals.tool_results);
        result.usage = totals.usage;
        result.agent_memory = Some(self.memory.snapshot());
        result
    }

    fn continuation_prompt(&self) -> String {
        let context = self.memory.build_context(None);
        match self.task.goal_text() {
            Some(goal) => format!(
                "Goal: {goal}\n\nPrevious Context:\n{context}\n\n\
                 Continue working towards the goal. Use a tool if more information \
                 is needed, otherwise give the final answer."
            ),
            None => format!(
                "Previous Context:\n{context}\n\n\
                 Continue working on the original request. Use a tool if more \
                 information is needed, otherwise give the final answer."
            ),
        }
    }
}

/// Assistant memory text for a turn: the reply, else its errors
fn memory_content(result: &RunResult) -> String {
    if result.raw.is_empty() && !result.errors.is_empty() {
        format!("Error: {}", result.errors.join("; "))
    } else {
        result.raw.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::config::EngineConfig;
    use crate::message::Role;
    use crate::test_support::{FnProvider, ScriptedProvider, is_decision};
    use crate::tool::{Invocable, ParameterSchema, ToolParams};

    fn search_task(calls: &Arc<AtomicUsize>) -> Task {
        let calls = Arc::clone(calls);
        Task::prompt("Find the release date of Rust 1.0")
            .goal("Report the release date")
            .tool(
                "search",
                Invocable::function(move |params: ToolParams| {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    async move { Ok(json!({"query": params["q"], "hits": n})) }
                }),
                Some("Search the web"),
                Some(vec![ParameterSchema::new("q", "string", "Query")]),
            )
            .unwrap()
    }

    fn always_search(params: &crate::provider::GenerateParams) -> String {
        if is_decision(params) {
            r#"{"tool": "search", "params": {"q": "rust 1.0"}}"#.into()
        } else {
            "Still looking.".into()
        }
    }

    #[tokio::test]
    async fn test_exhausts_turn_budget() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = FnProvider::new(always_search);
        let result = search_task(&calls).max_turns(3).run(&provider).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.agent_turns, Some(3));
        assert_eq!(result.goal_achieved, Some(false));
        assert_eq!(result.errors, vec![MAX_TURNS_ERROR]);
        assert_eq!(result.raw, "Still looking.");
        assert_eq!(result.tools(), ["search".to_string()]);
        assert_eq!(result.tool_result("search"), Some(&json!({"query": "rust 1.0", "hits": 3})));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(provider.call_count(), 6);

        let memory = result.agent_memory.unwrap();
        assert_eq!(memory.len(), 4);
        assert_eq!(memory[0].role, Role::User);
        assert_eq!(memory[0].content, "Find the release date of Rust 1.0");
        let turns: Vec<usize> = memory.iter().map(|e| e.turn).collect();
        assert_eq!(turns, vec![0, 0, 1, 2]);
        assert!(memory[1..].iter().all(|e| e.tools_used.as_deref() == Some(&["search".to_string()][..])));
    }

    #[tokio::test]
    async fn test_stops_once_a_turn_needs_no_tool() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = ScriptedProvider::new([
            r#"{"tool": "search", "params": {"q": "rust 1.0"}}"#,
            "Rust 1.0 was released on 15 May 2015.",
            r#"{"tool": "none", "params": {}}"#,
            "Rust 1.0 was released on 15 May 2015.",
        ]);
        let result = search_task(&calls).max_turns(5).run(&provider).await.unwrap();

        assert!(result.success);
        assert_eq!(result.goal_achieved, Some(true));
        assert_eq!(result.agent_turns, Some(2));
        assert_eq!(result.raw, "Rust 1.0 was released on 15 May 2015.");
        assert_eq!(result.tools(), ["search".to_string()]);
        assert!(result.tool_result("search").is_some());
        assert_eq!(provider.call_count(), 4);

        // The second decision sees the goal and the first turn's transcript
        let prompt = provider.prompt(2);
        assert!(prompt.contains("Goal: Report the release date"));
        assert!(prompt.contains("Assistant (Turn 0) [Used tools: search]"));
    }

    #[tokio::test]
    async fn test_continuation_without_goal() {
        let provider = ScriptedProvider::new([
            r#"{"tool": "search", "params": {"q": "rust 1.0"}}"#,
            "Searching.",
            r#"{"tool": "none", "params": {}}"#,
            "15 May 2015.",
        ]);
        let task = Task::prompt("When was Rust 1.0 released?")
            .tool(
                "search",
                Invocable::function(|_params: ToolParams| async { Ok(json!({"hits": 1})) }),
                Some("Search the web"),
                Some(vec![ParameterSchema::new("q", "string", "Query")]),
            )
            .unwrap()
            .max_turns(3);
        assert!(task.goal_text().is_none());

        let result = task.run(&provider).await.unwrap();
        assert_eq!(result.agent_turns, Some(2));

        let prompt = provider.prompt(2);
        assert!(prompt.contains("User request: Previous Context:\nUser (Turn 0): When was Rust 1.0 released?"));
        assert!(prompt.contains("Continue working on the original request."));
        assert!(!prompt.contains("Goal:"));
    }

    #[tokio::test]
    async fn test_failed_tool_turn_stays_in_progress() {
        let provider = ScriptedProvider::new([
            r#"{"tool": "search", "params": {}}"#,
            r#"{"tool": "search", "params": {"q": "rust"}}"#,
            "Found it.",
            r#"{"tool": "none", "params": {}}"#,
            "Done.",
        ]);
        let calls = Arc::new(AtomicUsize::new(0));
        let result = search_task(&calls).max_turns(4).run(&provider).await.unwrap();

        assert!(result.success);
        assert_eq!(result.agent_turns, Some(3));
        let memory = result.agent_memory.unwrap();
        assert_eq!(memory[1].content, "Error: Missing required parameter: q");
        assert_eq!(memory[1].tools_used, Some(vec!["search".to_string()]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_agent_without_tools_finishes_first_turn() {
        let provider = ScriptedProvider::new(["Hello!"]);
        let result = Task::prompt("Hi").agent().run(&provider).await.unwrap();

        assert!(result.success);
        assert_eq!(result.agent_turns, Some(1));
        assert_eq!(result.tools_used, Some(Vec::new()));
        assert_eq!(result.tool_results, Some(Map::new()));
        assert_eq!(result.agent_memory.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_memory_cap_from_config_keeps_anchor() {
        let config = EngineConfig {
            memory_cap: 3,
            ..EngineConfig::default()
        };
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = FnProvider::new(always_search);
        let result = search_task(&calls)
            .with_config(config)
            .max_turns(6)
            .run(&provider)
            .await
            .unwrap();

        let memory = result.agent_memory.unwrap();
        assert_eq!(memory.len(), 3);
        assert_eq!(memory[0].content, "Find the release date of Rust 1.0");
        assert_eq!(memory[2].turn, 5);
    }

    #[test]
    fn test_loop_owns_memory_with_configured_cap() {
        let config = EngineConfig {
            memory_cap: 7,
            ..EngineConfig::default()
        };
        let agent = AgentLoop::new(Task::prompt("x").with_config(config));
        assert_eq!(agent.memory().capacity(), 7);
        assert!(agent.memory().is_empty());
    }
}
