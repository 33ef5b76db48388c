//! Built-in tools the CLI can attach to a task by name

use async_trait::async_trait;
use serde_json::{Value, json};
use taskloop_core::tool::{ParameterSchema, Tool, ToolContext, ToolParams, ToolRegistry};

/// Names accepted by [`builtin_registry`]
pub const BUILTIN_TOOLS: &[&str] = &["datetime", "calculate"];

/// Registry holding the named built-in tools, in the order given.
///
/// Repeated names are registered once.
pub fn builtin_registry(names: &[String]) -> anyhow::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for name in names {
        if registry.get(name).is_some() {
            continue;
        }
        match name.as_str() {
            "datetime" => registry.register_tool(name.as_str(), DateTimeTool)?,
            "calculate" => registry.register_tool(name.as_str(), CalculatorTool)?,
            other => anyhow::bail!(
                "unknown tool '{other}' (available: {})",
                BUILTIN_TOOLS.join(", ")
            ),
        };
    }
    Ok(registry)
}

/// DateTime tool - returns current time
#[derive(Default)]
pub struct DateTimeTool;

#[async_trait]
impl Tool for DateTimeTool {
    fn description(&self) -> String {
        "Get the current date and time (UTC)".into()
    }

    fn params(&self) -> Vec<ParameterSchema> {
        vec![
            ParameterSchema::new("format", "string", "Output format: 'iso', 'human', or 'unix'")
                .with_default(json!("human"))
                .one_of(vec![json!("iso"), json!("human"), json!("unix")]),
        ]
    }

    async fn invoke(&self, params: ToolParams, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let format = params
            .get("format")
            .and_then(Value::as_str)
            .unwrap_or("human");

        let now = chrono::Utc::now();

        Ok(match format {
            "iso" => json!(now.to_rfc3339()),
            "unix" => json!(now.timestamp()),
            _ => json!(now.format("%A, %B %d, %Y at %H:%M:%S UTC").to_string()),
        })
    }
}

/// Calculator tool - evaluates arithmetic expressions
#[derive(Default)]
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn description(&self) -> String {
        "Evaluate an arithmetic expression with + - * / % ^ and parentheses".into()
    }

    fn params(&self) -> Vec<ParameterSchema> {
        vec![ParameterSchema::new(
            "expression",
            "string",
            "Expression to evaluate (e.g., '2 + 2', '(10 - 4) * 5')",
        )]
    }

    async fn invoke(&self, params: ToolParams, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let expression = params
            .get("expression")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("Missing expression"))?;

        let result = evaluate_expression(expression).map_err(anyhow::Error::msg)?;
        Ok(json!({"expression": expression, "result": result}))
    }
}

/// Deepest nesting of parentheses, signs and exponents accepted
const MAX_DEPTH: usize = 256;

/// Evaluate an arithmetic expression.
///
/// Usual precedence; `^` is right-associative and binds tighter than unary
/// minus, so `-2^2` is `-4`.
pub fn evaluate_expression(expr: &str) -> Result<f64, String> {
    let mut parser = ExprParser {
        chars: expr.chars().filter(|c| !c.is_whitespace()).collect(),
        pos: 0,
        depth: 0,
    };
    if parser.chars.is_empty() {
        return Err("Empty expression".into());
    }

    let value = parser.sum()?;
    if let Some(c) = parser.peek() {
        return Err(format!("Unexpected '{c}' at position {}", parser.pos));
    }
    if value.is_finite() {
        Ok(value)
    } else {
        Err("Result is not a finite number".into())
    }
}

struct ExprParser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn sum(&mut self) -> Result<f64, String> {
        let mut value = self.product()?;
        loop {
            if self.eat('+') {
                value += self.product()?;
            } else if self.eat('-') {
                value -= self.product()?;
            } else {
                return Ok(value);
            }
        }
    }

    fn product(&mut self) -> Result<f64, String> {
        let mut value = self.unary()?;
        loop {
            if self.eat('*') {
                value *= self.unary()?;
            } else if self.eat('/') {
                let rhs = self.unary()?;
                if rhs == 0.0 {
                    return Err("Division by zero".into());
                }
                value /= rhs;
            } else if self.eat('%') {
                let rhs = self.unary()?;
                if rhs == 0.0 {
                    return Err("Division by zero".into());
                }
                value %= rhs;
            } else {
                return Ok(value);
            }
        }
    }

    // Every recursive path passes through here
    fn unary(&mut self) -> Result<f64, String> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(format!("Expression nested deeper than {MAX_DEPTH} levels"));
        }
        let value = self.signed();
        self.depth -= 1;
        value
    }

    fn signed(&mut self) -> Result<f64, String> {
        if self.eat('-') {
            Ok(-self.unary()?)
        } else if self.eat('+') {
            self.unary()
        } else {
            self.power()
        }
    }

    fn power(&mut self) -> Result<f64, String> {
        let base = self.atom()?;
        if self.eat('^') {
            Ok(base.powf(self.unary()?))
        } else {
            Ok(base)
        }
    }

    fn atom(&mut self) -> Result<f64, String> {
        if self.eat('(') {
            let value = self.sum()?;
            if !self.eat(')') {
                return Err(format!("Expected ')' at position {}", self.pos));
            }
            return Ok(value);
        }

        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || c == '.')
        {
            self.pos += 1;
        }
        if start == self.pos {
            return match self.peek() {
                Some(c) => Err(format!("Unexpected '{c}' at position {start}")),
                None => Err("Unexpected end of expression".into()),
            };
        }
        let number: String = self.chars[start..self.pos].iter().collect();
        number
            .parse::<f64>()
            .map_err(|e| format!("Parse error: {e}"))
    }
}
