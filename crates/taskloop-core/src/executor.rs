//! Single-Turn Executor
//!
//! Runs one exchange with the provider. Without tools the task's prompt is
//! sent as-is and the reply optionally decoded against the output schema.
//! With tools the turn follows a fixed protocol:
//!
//! 1. DECIDE: ask the model which tool to use, at the decision temperature
//! 2. VALIDATE: check the chosen tool exists and its params fit the schema
//! 3. INVOKE: run the tool, catching errors and panics
//! 4. ANSWER: ask the model to answer from the rendered tool result
//!
//! A decision of `"none"` skips straight to a direct answer.

use serde_json::{Map, Value};

use crate::decode::{extract_json, extract_object};
use crate::error::Result;
use crate::provider::{GenerateParams, Generation, LlmProvider, PromptInput};
use crate::render::render_tool_result;
use crate::result::RunResult;
use crate::schema::missing_required;
use crate::task::Task;
use crate::tool::{NO_TOOL, validate_params};

/// Opening line of every tool-decision prompt
pub(crate) const DECISION_MARKER: &str = "Decide whether one of the tools below is needed";

const DECISION_FORMAT: &str = r#"Respond with only a JSON object in this exact format:
{"tool": "<tool name or none>", "params": {"<parameter>": <value>}}

Use "none" as the tool when the request can be answered without a tool."#;

/// Model's choice in the DECIDE phase
#[derive(Clone, Debug, PartialEq)]
pub struct Decision {
    /// Tool name, or `"none"`
    pub tool: String,

    /// Arguments as given by the model; not necessarily an object
    pub params: Value,

    /// Decision text as returned by the provider
    pub raw: String,
}

impl Decision {
    pub fn is_none(&self) -> bool {
        self.tool == NO_TOOL
    }
}

/// Parse a tool decision out of model output.
///
/// Accepts `arguments` as an alias for `params`. A missing params key
/// yields `Value::Null`, which fails validation later rather than here.
pub fn parse_decision(text: &str) -> Option<Decision> {
    let object = extract_object(text)?;
    let tool = object.get("tool")?.as_str()?.trim();
    if tool.is_empty() {
        return None;
    }
    let tool = if tool.eq_ignore_ascii_case(NO_TOOL) {
        NO_TOOL.to_string()
    } else {
        tool.to_string()
    };
    let params = object
        .get("params")
        .or_else(|| object.get("arguments"))
        .cloned()
        .unwrap_or(Value::Null);

    Some(Decision {
        tool,
        params,
        raw: text.to_string(),
    })
}

/// Runs single turns against one provider
pub struct Executor<'a> {
    provider: &'a dyn LlmProvider,
}

impl<'a> Executor<'a> {
    pub const fn new(provider: &'a dyn LlmProvider) -> Self {
        Self { provider }
    }

    /// Run one turn of `task`.
    ///
    /// `prompt` replaces the task's own prompt for this turn only. Tool-aware
    /// mode is used whenever the task has tools registered.
    pub async fn execute(&self, task: &Task, prompt: Option<&str>) -> Result<RunResult> {
        if task.tools().is_empty() {
            self.execute_plain(task, prompt).await
        } else {
            self.execute_with_tools(task, prompt).await
        }
    }

    async fn generate(&self, params: &GenerateParams, result: &mut RunResult) -> Result<String> {
        let Generation { text, usage } = self.provider.generate(params).await?;
        result.add_usage(usage);
        Ok(text)
    }

    async fn execute_plain(&self, task: &Task, prompt: Option<&str>) -> Result<RunResult> {
        let params = task.plain_params(prompt);
        let mut result = RunResult::default();
        let raw = self.generate(&params, &mut result).await?;

        let structured = task.output_schema().is_some() || !task.required_fields().is_empty();
        if !structured {
            result.success = !raw.trim().is_empty();
            result.raw = raw;
            return Ok(result);
        }

        let decoded = extract_json(&raw);
        if decoded.is_none() {
            tracing::debug!(provider = self.provider.name(), "No JSON found in response");
            if task.is_strict() {
                result.errors.push("Failed to decode JSON from response".into());
            }
        }
        result
            .errors
            .extend(missing_required(decoded.as_ref(), task.required_fields()));

        result.success = decoded.is_some() && result.errors.is_empty();
        result.data = match (decoded, task.output_schema()) {
            (Some(data), Some(schema)) => Some(schema.coerce(data)),
            (data, _) => data,
        };
        result.raw = raw;
        Ok(result)
    }

    async fn execute_with_tools(&self, task: &Task, prompt: Option<&str>) -> Result<RunResult> {
        let Some(query) = prompt.filter(|p| !p.trim().is_empty()).or_else(|| task.query()) else {
            return Ok(RunResult::failure("No user prompt provided").with_tools(Vec::new(), Map::new()));
        };
        let config = task.config();
        let mut result = RunResult::default();

        // DECIDE
        let decide = task.params(
            PromptInput::Prompt(decision_prompt(task, query)),
            config.decision_temperature,
        );
        let decision_text = self.generate(&decide, &mut result).await?;

        let Some(decision) = parse_decision(&decision_text) else {
            tracing::debug!(raw = %decision_text, "Unparsable tool decision");
            result.errors.push("Failed to parse tool decision JSON".into());
            result.raw = decision_text;
            return Ok(result.with_tools(Vec::new(), Map::new()));
        };

        if decision.is_none() {
            tracing::debug!("Model answered without a tool");
            let direct = task.params(
                PromptInput::Prompt(direct_prompt(query)),
                task.answer_temperature(),
            );
            let raw = self.generate(&direct, &mut result).await?;
            result.raw = raw;
            result.success = true;
            return Ok(result.with_tools(Vec::new(), Map::new()));
        }

        // VALIDATE
        let Some(tool) = task.tools().get(&decision.tool) else {
            tracing::warn!(tool = %decision.tool, "Model chose an unknown tool");
            result.errors.push(format!("Unknown tool: {}", decision.tool));
            return Ok(result.with_tools(Vec::new(), Map::new()));
        };
        let Value::Object(params) = decision.params else {
            result.errors.push("Tool decision missing params object".into());
            return Ok(result.with_tools(Vec::new(), Map::new()));
        };
        let params = match validate_params(&tool.parameters, &params) {
            Ok(params) => params,
            Err(errors) => {
                tracing::debug!(tool = %tool.name, ?errors, "Tool params rejected");
                result.errors = errors;
                return Ok(result.with_tools(vec![tool.name.clone()], Map::new()));
            }
        };

        // INVOKE
        tracing::debug!(tool = %tool.name, "Executing tool");
        let output = match tool.invoke_guarded(params, &task.tool_context()).await {
            Ok(output) => output,
            Err(message) => {
                tracing::warn!(tool = %tool.name, error = %message, "Tool execution failed");
                result.errors.push(format!("Tool execution failed: {message}"));
                return Ok(result.with_tools(vec![tool.name.clone()], Map::new()));
            }
        };

        // ANSWER
        let rendered = render_tool_result(&output, &config.render);
        let answer = task.params(
            PromptInput::Prompt(answer_prompt(query, &tool.name, &rendered)),
            task.answer_temperature(),
        );
        let raw = self.generate(&answer, &mut result).await?;
        result.raw = raw;
        result.success = true;

        let mut tool_results = Map::new();
        tool_results.insert(tool.name.clone(), output);
        Ok(result.with_tools(vec![tool.name.clone()], tool_results))
    }
}

fn decision_prompt(task: &Task, query: &str) -> String {
    format!(
        "{DECISION_MARKER} to handle the user's request.\n\n{}User request: {query}\n\n{DECISION_FORMAT}",
        task.tools().generate_prompt_section()
    )
}

fn direct_prompt(query: &str) -> String {
    format!(
        "Respond to the user's request directly. If it is ambiguous or missing \
         information, ask a short clarifying question instead.\n\nUser request: {query}"
    )
}

fn answer_prompt(query: &str, tool: &str, rendered: &str) -> String {
    format!(
        "Answer the user's request using only the result of the `{tool}` tool below. \
         Do not add information that is not in the result.\n\n\
         User request: {query}\n\nTool: {tool}\nResult:\n{rendered}"
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::error::AgentError;
    use crate::provider::TokenUsage;
    use crate::schema::OutputSchema;
    use crate::test_support::ScriptedProvider;
    use crate::tool::{Invocable, ParameterSchema, ToolContext, ToolParams};

    fn counting_tool(calls: &Arc<AtomicUsize>) -> Invocable {
        let calls = Arc::clone(calls);
        Invocable::function(move |params: ToolParams| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(json!({"status": "shipped", "order_id": params["order_id"]})) }
        })
    }

    fn order_task(calls: &Arc<AtomicUsize>) -> Task {
        Task::prompt("Where is order 17?")
            .tool(
                "get_status",
                counting_tool(calls),
                Some("Look up an order"),
                Some(vec![ParameterSchema::new("order_id", "string", "Order id")]),
            )
            .unwrap()
    }

    #[test]
    fn test_parse_decision() {
        let decision = parse_decision(r#"Sure: {"tool": "search", "params": {"q": "rust"}}"#).unwrap();
        assert_eq!(decision.tool, "search");
        assert_eq!(decision.params, json!({"q": "rust"}));

        let alias = parse_decision(r#"{"tool": "search", "arguments": {"q": "x"}}"#).unwrap();
        assert_eq!(alias.params, json!({"q": "x"}));

        assert!(parse_decision(r#"{"tool": "NONE", "params": {}}"#).unwrap().is_none());
        assert_eq!(parse_decision(r#"{"tool": "search"}"#).unwrap().params, Value::Null);
        assert!(parse_decision("I'd rather not").is_none());
        assert!(parse_decision(r#"{"tool": 3, "params": {}}"#).is_none());

        let cited = parse_decision(r#"Step [1]: {"tool": "search", "params": {"q": "x"}}"#).unwrap();
        assert_eq!(cited.tool, "search");
        assert_eq!(cited.params, json!({"q": "x"}));
    }

    #[tokio::test]
    async fn test_plain_prompt_without_schema() {
        let provider = ScriptedProvider::new(["Hi there! How can I help?"]);
        let result = Task::prompt("Hello").run(&provider).await.unwrap();

        assert!(result.success);
        assert_eq!(result.data, None);
        assert_eq!(result.raw, "Hi there! How can I help?");
        assert!(result.errors.is_empty());
        assert!(result.tools_used.is_none());
        assert_eq!(provider.prompt(0), "Hello");
    }

    #[tokio::test]
    async fn test_plain_empty_reply_fails() {
        let provider = ScriptedProvider::new(["   "]);
        let result = Task::prompt("Hello").run(&provider).await.unwrap();
        assert!(!result.success);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_schema_output_decoded_and_coerced() {
        let provider = ScriptedProvider::new([
            "Here you go:\n```json\n{\"title\": \"Broken login\", \"priority\": \"2\", \"owner\": null}\n```",
        ]);
        let result = Task::prompt("Summarise the ticket")
            .schema(
                OutputSchema::new()
                    .field("title", "string")
                    .field("priority", "int")
                    .field("owner", "string")
                    .field("due", "string"),
            )
            .required(["title"])
            .run(&provider)
            .await
            .unwrap();

        assert!(result.success, "errors: {:?}", result.errors);
        assert_eq!(
            result.data,
            Some(json!({"title": "Broken login", "priority": 2, "owner": null, "due": null}))
        );
    }

    #[tokio::test]
    async fn test_schema_output_after_citation() {
        let provider = ScriptedProvider::new([
            r#"Per source [1], the record is {"title": "Ada", "year": "1843"}"#,
        ]);
        let result = Task::prompt("Find the record")
            .schema(OutputSchema::new().field("title", "string").field("year", "int"))
            .required(["title"])
            .run(&provider)
            .await
            .unwrap();

        assert!(result.success, "errors: {:?}", result.errors);
        assert_eq!(result.data, Some(json!({"title": "Ada", "year": 1843})));
    }

    #[tokio::test]
    async fn test_required_checked_before_coercion() {
        let provider = ScriptedProvider::new([r#"{"a": null}"#]);
        let result = Task::prompt("x")
            .schema(OutputSchema::new().field("a", "string").field("b", "int"))
            .required(["a", "b"])
            .run(&provider)
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(
            result.errors,
            vec!["Missing required field: a", "Missing required field: b"]
        );
        assert_eq!(result.data, Some(json!({"a": null, "b": null})));
    }

    #[tokio::test]
    async fn test_array_items_checked_independently() {
        let provider = ScriptedProvider::new([r#"[{"name": "a", "qty": "1"}, {"qty": 2}]"#]);
        let result = Task::prompt("x")
            .schema(OutputSchema::new().field("name", "string").field("qty", "int"))
            .required(["name"])
            .run(&provider)
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.errors, vec!["Item 2: Missing required field: name"]);
        assert_eq!(
            result.data,
            Some(json!([{"name": "a", "qty": 1}, {"name": null, "qty": 2}]))
        );
    }

    #[tokio::test]
    async fn test_undecodable_output() {
        let schema = OutputSchema::from_names(["title"]);

        let provider = ScriptedProvider::new(["no json here"]);
        let lenient = Task::prompt("x").schema(schema.clone()).run(&provider).await.unwrap();
        assert!(!lenient.success);
        assert!(lenient.errors.is_empty());
        assert_eq!(lenient.data, None);
        assert_eq!(lenient.raw, "no json here");

        let provider = ScriptedProvider::new(["no json here"]);
        let strict = Task::prompt("x").schema(schema).strict().run(&provider).await.unwrap();
        assert_eq!(strict.errors, vec!["Failed to decode JSON from response"]);
    }

    #[tokio::test]
    async fn test_missing_required_param_never_invokes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = ScriptedProvider::new([r#"{"tool": "get_status", "params": {}}"#]);
        let result = order_task(&calls).run(&provider).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.errors, vec!["Missing required parameter: order_id"]);
        assert_eq!(result.tools(), ["get_status".to_string()]);
        assert_eq!(result.tool_results, Some(Map::new()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_full_tool_protocol() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = ScriptedProvider::new([
            r#"{"tool": "get_status", "params": {"order_id": "17"}}"#,
            "Order 17 has shipped.",
        ])
        .with_usage(TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        });
        let result = order_task(&calls).run(&provider).await.unwrap();

        assert!(result.success);
        assert_eq!(result.raw, "Order 17 has shipped.");
        assert_eq!(result.tools(), ["get_status".to_string()]);
        assert_eq!(
            result.tool_result("get_status"),
            Some(&json!({"status": "shipped", "order_id": "17"}))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.usage.unwrap().total_tokens, 30);

        let calls_made = provider.calls();
        assert_eq!(calls_made[0].temperature, Some(0.0));
        assert!(provider.prompt(0).contains("### get_status"));
        assert!(provider.prompt(1).contains("\"status\": \"shipped\""));
        assert_eq!(calls_made[1].temperature, Some(0.3));
    }

    #[tokio::test]
    async fn test_none_decision_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = ScriptedProvider::new([
            r#"{"tool": "none", "params": {}}"#,
            "Which order do you mean?",
        ]);
        let task = order_task(&calls)
            .tool("cancel", counting_tool(&calls), Some("Cancel"), Some(Vec::new()))
            .unwrap();
        let result = task.run(&provider).await.unwrap();

        assert!(result.success);
        assert_eq!(result.data, None);
        assert_eq!(result.raw, "Which order do you mean?");
        assert!(result.tools().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_decision_failures() {
        let calls = Arc::new(AtomicUsize::new(0));

        let provider = ScriptedProvider::new(["I think I'll just answer."]);
        let result = order_task(&calls).run(&provider).await.unwrap();
        assert_eq!(result.errors, vec!["Failed to parse tool decision JSON"]);
        assert_eq!(result.raw, "I think I'll just answer.");
        assert!(result.tools().is_empty());

        let provider = ScriptedProvider::new([r#"{"tool": "teleport", "params": {}}"#]);
        let result = order_task(&calls).run(&provider).await.unwrap();
        assert_eq!(result.errors, vec!["Unknown tool: teleport"]);
        assert!(result.tools().is_empty());

        let provider = ScriptedProvider::new([r#"{"tool": "get_status", "params": "17"}"#]);
        let result = order_task(&calls).run(&provider).await.unwrap();
        assert_eq!(result.errors, vec!["Tool decision missing params object"]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tool_error_and_panic_are_results() {
        let provider = ScriptedProvider::new([r#"{"tool": "lookup", "params": {}}"#]);
        let task = Task::prompt("x")
            .tool(
                "lookup",
                Invocable::contextual(|_p, ctx: ToolContext| async move {
                    Err::<Value, _>(anyhow::anyhow!(
                        "no tenant {}",
                        ctx.get_or("tenant", json!("?"))
                    ))
                }),
                None,
                None,
            )
            .unwrap()
            .context("tenant", json!("acme"));
        let result = task.run(&provider).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.errors, vec![r#"Tool execution failed: no tenant "acme""#]);
        assert_eq!(result.tools(), ["lookup".to_string()]);
        assert_eq!(result.tool_results, Some(Map::new()));

        let provider = ScriptedProvider::new([r#"{"tool": "crash", "params": {}}"#]);
        let task = Task::prompt("x")
            .tool(
                "crash",
                Invocable::function(|p: ToolParams| async move {
                    let rows: Vec<Value> = Vec::new();
                    Ok(rows[p.len() + 3].clone())
                }),
                None,
                None,
            )
            .unwrap();
        let result = task.run(&provider).await.unwrap();
        assert!(result.errors[0].starts_with("Tool execution failed: index out of bounds"));
    }

    #[tokio::test]
    async fn test_no_query_fails_without_calling_provider() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = ScriptedProvider::new(Vec::<String>::new());
        let task = Task::new()
            .tool("get_status", counting_tool(&calls), None, None)
            .unwrap();
        let result = task.run(&provider).await.unwrap();

        assert_eq!(result.errors, vec!["No user prompt provided"]);
        assert_eq!(result.tools_used, Some(Vec::new()));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_provider_errors_propagate() {
        let provider = ScriptedProvider::new(Vec::<String>::new());
        let err = Task::prompt("Hello").run(&provider).await.unwrap_err();
        assert!(matches!(err, AgentError::Provider(_)));
    }
}
