//! Tool Result Rendering
//!
//! Tool results are embedded in the answer prompt, so they are bounded in
//! depth, breadth, string length and total size. Anything cut is replaced by
//! an explicit marker.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Bounds applied when rendering a tool result into a prompt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderLimits {
    /// Total characters of the rendered text
    pub max_chars: usize,
    /// Container nesting levels kept
    pub max_depth: usize,
    /// Items kept per array or object
    pub max_items: usize,
    /// Characters kept per string
    pub max_string: usize,
}

impl Default for RenderLimits {
    fn default() -> Self {
        Self {
            max_chars: 12_000,
            max_depth: 5,
            max_items: 50,
            max_string: 800,
        }
    }
}

/// Render a tool result as prompt text within `limits`.
///
/// String results are used verbatim (after the per-string cap); everything
/// else is pretty-printed JSON.
pub fn render_tool_result(value: &Value, limits: &RenderLimits) -> String {
    let text = match bound(value, limits, 0) {
        Value::String(s) => s,
        other => serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string()),
    };
    truncate_total(text, limits.max_chars)
}

fn bound(value: &Value, limits: &RenderLimits, depth: usize) -> Value {
    match value {
        Value::String(s) => Value::String(truncate_string(s, limits.max_string)),
        Value::Array(items) => {
            if depth >= limits.max_depth {
                return Value::String(format!(
                    "[array of {} items omitted: max depth reached]",
                    items.len()
                ));
            }
            let mut out: Vec<Value> = items
                .iter()
                .take(limits.max_items)
                .map(|item| bound(item, limits, depth + 1))
                .collect();
            if items.len() > limits.max_items {
                out.push(Value::String(format!(
                    "[... {} more items truncated]",
                    items.len() - limits.max_items
                )));
            }
            Value::Array(out)
        }
        Value::Object(map) => {
            if depth >= limits.max_depth {
                return Value::String(format!(
                    "[object with {} keys omitted: max depth reached]",
                    map.len()
                ));
            }
            let mut out: Map<String, Value> = map
                .iter()
                .take(limits.max_items)
                .map(|(k, v)| (k.clone(), bound(v, limits, depth + 1)))
                .collect();
            if map.len() > limits.max_items {
                out.insert(
                    "...".into(),
                    Value::String(format!(
                        "[{} more keys truncated]",
                        map.len() - limits.max_items
                    )),
                );
            }
            Value::Object(out)
        }
        scalar => scalar.clone(),
    }
}

fn truncate_string(s: &str, max: usize) -> String {
    let total = s.chars().count();
    if total <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max).collect();
    format!("{kept}... [truncated {} chars]", total - max)
}

fn truncate_total(text: String, max: usize) -> String {
    if text.chars().count() <= max {
        return text;
    }
    let kept: String = text.chars().take(max).collect();
    format!("{kept}\n... [output truncated at {max} characters]")
}
