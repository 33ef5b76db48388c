//! JSON Extraction
//!
//! Models wrap JSON in prose and markdown fences. These helpers dig the first
//! structured (object or array) JSON value out of free-form text.

use serde_json::{Map, Value};

const FENCE: &str = "```";

/// Extract the first JSON object or array embedded in `text`.
///
/// Tried in order: the whole trimmed text, each fenced code block, then the
/// balanced `{...}` / `[...]` spans in reading order. Among spans, objects
/// and arrays holding structured items win over arrays of bare scalars, so a
/// citation like `[1]` in prose does not shadow the payload. Scalars never
/// count as a successful decode.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(value) = parse_structured(trimmed) {
        return Some(value);
    }

    for block in fenced_blocks(trimmed) {
        if let Some(value) = parse_structured(block) {
            return Some(value);
        }
    }

    let mut scalar_array = None;
    for value in balanced_spans(trimmed).into_iter().filter_map(parse_structured) {
        if is_payload(&value) {
            return Some(value);
        }
        scalar_array.get_or_insert(value);
    }
    scalar_array
}

/// Extract the first JSON object embedded in `text`.
pub fn extract_object(text: &str) -> Option<Map<String, Value>> {
    match extract_json(text)? {
        Value::Object(map) => return Some(map),
        // A one-element array wrapping an object is accepted
        Value::Array(items) if items.len() == 1 => {
            if let Some(Value::Object(map)) = items.into_iter().next() {
                return Some(map);
            }
        }
        _ => {}
    }
    balanced_spans(text.trim())
        .into_iter()
        .filter(|span| span.starts_with('{'))
        .find_map(|span| serde_json::from_str::<Map<String, Value>>(span).ok())
}

fn parse_structured(candidate: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
        _ => None,
    }
}

fn is_payload(value: &Value) -> bool {
    match value {
        Value::Object(_) => true,
        Value::Array(items) => items
            .iter()
            .any(|item| matches!(item, Value::Object(_) | Value::Array(_))),
        _ => false,
    }
}

/// Contents of every ``` fenced block, with any language tag stripped.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find(FENCE) {
        let after_open = &rest[open + FENCE.len()..];
        let Some(close) = after_open.find(FENCE) else {
            break;
        };
        let body = &after_open[..close];
        // Drop an info string such as `json` on the opening line
        let body = match body.find('\n') {
            Some(nl) if !body[..nl].trim_start().starts_with(['{', '[']) => &body[nl + 1..],
            _ => body,
        };
        blocks.push(body);
        rest = &after_open[close + FENCE.len()..];
    }
    blocks
}

/// How a scan from one opening bracket ended
enum ScanEnd {
    /// The opening bracket closed; byte offset just past it
    Closed(usize),
    /// A closer that does not match; byte offset just past it
    Mismatch(usize),
    /// Text ran out with brackets still open
    Unterminated,
}

struct Scan {
    end: ScanEnd,
    /// First bracket seen inside a string literal, which a scan starting
    /// there would read differently
    quoted_opener: Option<usize>,
}

/// Balanced bracket spans ordered by opening position.
///
/// One scan records every nested span it closes. The next scan resumes past
/// the closed span, or at the first bracket the scan saw quoted, so a run of
/// unclosed brackets is read once rather than once per bracket.
fn balanced_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut next = find_opener(text, 0);
    while let Some(from) = next {
        let scan = scan_spans(text, from, &mut spans);
        next = scan.quoted_opener.or_else(|| match scan.end {
            ScanEnd::Closed(pos) | ScanEnd::Mismatch(pos) => find_opener(text, pos),
            ScanEnd::Unterminated => None,
        });
    }
    spans.sort_unstable();
    spans.dedup();
    spans.into_iter().map(|(start, end)| &text[start..end]).collect()
}

fn find_opener(text: &str, from: usize) -> Option<usize> {
    text[from..].find(['{', '[']).map(|idx| from + idx)
}

/// Scan from the bracket at `from`, honouring JSON string literals and
/// escapes, pushing each balanced `(start, end)` span closed on the way.
fn scan_spans(text: &str, from: usize, spans: &mut Vec<(usize, usize)>) -> Scan {
    let mut open: Vec<(usize, char)> = Vec::new();
    let mut quoted_opener = None;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[from..].char_indices() {
        let idx = from + offset;
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                '{' | '[' => {
                    quoted_opener.get_or_insert(idx);
                }
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => open.push((idx, '}')),
            '[' => open.push((idx, ']')),
            '}' | ']' => match open.pop() {
                Some((start, closer)) if closer == c => {
                    spans.push((start, idx + 1));
                    if open.is_empty() {
                        return Scan {
                            end: ScanEnd::Closed(idx + 1),
                            quoted_opener,
                        };
                    }
                }
                _ => {
                    return Scan {
                        end: ScanEnd::Mismatch(idx + 1),
                        quoted_opener,
                    };
                }
            },
            _ => {}
        }
    }
    Scan {
        end: ScanEnd::Unterminated,
        quoted_opener,
    }
}
