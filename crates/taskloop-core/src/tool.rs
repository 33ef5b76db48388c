//! Tool System
//!
//! Caller-registered operations the model may request during a decision step.
//!
//! An invocable comes in one of four shapes, resolved once at registration
//! into [`Invocable`]:
//!
//! - a function taking only the params
//! - a function taking the params and a read-only [`ToolContext`]
//! - a factory ("class reference") that builds a fresh [`Tool`] per call
//! - a shared [`Tool`] instance
//!
//! Self-describing shapes (factory, instance) provide their own description
//! and parameter schema when the registration omits them.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AgentError, Result};
use crate::schema::{FieldType, json_type_name};

/// Validated parameters handed to a tool
pub type ToolParams = Map<String, Value>;

/// Future returned by function-shaped tools
pub type ToolFuture = BoxFuture<'static, anyhow::Result<Value>>;

/// Tool name the model uses to decline every tool
pub const NO_TOOL: &str = "none";

/// Read-only view over the caller's context metadata
#[derive(Clone, Debug, Default)]
pub struct ToolContext {
    values: Arc<HashMap<String, Value>>,
}

impl ToolContext {
    pub fn new(values: HashMap<String, Value>) -> Self {
        Self {
            values: Arc::new(values),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Value for `key`, or `default` when it is absent
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.values.get(key).cloned().unwrap_or(default)
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Parameter definition for a tool
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// Declared primitive type
    #[serde(rename = "type")]
    pub param_type: FieldType,

    /// Human-readable description (shown to the model)
    #[serde(default)]
    pub description: String,

    /// Whether this parameter is required
    #[serde(default = "default_required")]
    pub required: bool,

    /// Default value if not provided
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Enum of allowed values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

const fn default_required() -> bool {
    true
}

impl ParameterSchema {
    /// A required parameter
    pub fn new(name: impl Into<String>, param_type: &str, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: FieldType::parse(param_type),
            description: description.into(),
            required: true,
            default: None,
            enum_values: None,
        }
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.required = false;
        self.default = Some(default);
        self
    }

    #[must_use]
    pub fn one_of(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }
}

/// Self-describing tool: implement to register a type rather than a closure
#[async_trait]
pub trait Tool: Send + Sync {
    /// Human-readable description (shown to the model)
    fn description(&self) -> String;

    /// Parameter definitions
    fn params(&self) -> Vec<ParameterSchema> {
        Vec::new()
    }

    /// Run the tool with validated params
    async fn invoke(&self, params: ToolParams, ctx: &ToolContext) -> anyhow::Result<Value>;
}

type FunctionFn = dyn Fn(ToolParams) -> ToolFuture + Send + Sync;
type ContextualFn = dyn Fn(ToolParams, ToolContext) -> ToolFuture + Send + Sync;
type FactoryFn = dyn Fn() -> Box<dyn Tool> + Send + Sync;

/// A registered tool's executable part, in one of the supported shapes
#[derive(Clone)]
pub enum Invocable {
    /// Receives only the params
    Function(Arc<FunctionFn>),
    /// Receives the params and the tool context
    Contextual(Arc<ContextualFn>),
    /// Builds a fresh tool for every call
    Factory(Arc<FactoryFn>),
    /// A shared tool instance
    Instance(Arc<dyn Tool>),
}

impl std::fmt::Debug for Invocable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shape = match self {
            Self::Function(_) => "Function",
            Self::Contextual(_) => "Contextual",
            Self::Factory(_) => "Factory",
            Self::Instance(_) => "Instance",
        };
        write!(f, "Invocable::{shape}")
    }
}

impl Invocable {
    pub fn function<F, Fut>(f: F) -> Self
    where
        F: Fn(ToolParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::Function(Arc::new(move |params: ToolParams| f(params).boxed()))
    }

    pub fn contextual<F, Fut>(f: F) -> Self
    where
        F: Fn(ToolParams, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::Contextual(Arc::new(move |params: ToolParams, ctx: ToolContext| {
            f(params, ctx).boxed()
        }))
    }

    /// A tool type constructed per call
    pub fn factory<T>() -> Self
    where
        T: Tool + Default + 'static,
    {
        Self::Factory(Arc::new(|| Box::new(T::default()) as Box<dyn Tool>))
    }

    pub fn instance<T>(tool: T) -> Self
    where
        T: Tool + 'static,
    {
        Self::Instance(Arc::new(tool))
    }

    /// Description and params the invocable reports about itself.
    ///
    /// Plain functions carry no metadata.
    pub fn introspect(&self) -> (String, Vec<ParameterSchema>) {
        match self {
            Self::Function(_) | Self::Contextual(_) => (String::new(), Vec::new()),
            Self::Factory(make) => {
                let tool = make();
                (tool.description(), tool.params())
            }
            Self::Instance(tool) => (tool.description(), tool.params()),
        }
    }

    pub async fn invoke(&self, params: ToolParams, ctx: &ToolContext) -> anyhow::Result<Value> {
        match self {
            Self::Function(f) => f(params).await,
            Self::Contextual(f) => f(params, ctx.clone()).await,
            Self::Factory(make) => make().invoke(params, ctx).await,
            Self::Instance(tool) => tool.invoke(params, ctx).await,
        }
    }
}

/// A registered tool
#[derive(Clone, Debug)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParameterSchema>,
    pub invocable: Invocable,
}

impl ToolDefinition {
    /// Invoke, turning returned errors and panics into an error message.
    pub async fn invoke_guarded(
        &self,
        params: ToolParams,
        ctx: &ToolContext,
    ) -> std::result::Result<Value, String> {
        match AssertUnwindSafe(self.invocable.invoke(params, ctx))
            .catch_unwind()
            .await
        {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(format!("{err:#}")),
            Err(panic) => Err(panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "tool panicked".into())),
        }
    }
}

/// Check params against a tool's parameter schema.
///
/// Every violation is collected. On success the params are returned with
/// defaults filled in; undeclared params pass through.
pub fn validate_params(
    schema: &[ParameterSchema],
    params: &ToolParams,
) -> std::result::Result<ToolParams, Vec<String>> {
    let mut validated = params.clone();
    let mut errors = Vec::new();

    for param in schema {
        match params.get(&param.name).filter(|v| !v.is_null()) {
            None => {
                if let Some(default) = &param.default {
                    validated.insert(param.name.clone(), default.clone());
                } else if param.required {
                    errors.push(format!("Missing required parameter: {}", param.name));
                }
            }
            Some(value) if !param.param_type.accepts(value) => errors.push(format!(
                "Invalid type for parameter {}: expected {}, got {}",
                param.name,
                param.param_type,
                json_type_name(value)
            )),
            Some(value) => {
                if let Some(allowed) = &param.enum_values {
                    if !allowed.contains(value) {
                        let allowed: Vec<String> = allowed.iter().map(Value::to_string).collect();
                        errors.push(format!(
                            "Invalid value for parameter {}: expected one of {}",
                            param.name,
                            allowed.join(", ")
                        ));
                    }
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(validated)
    } else {
        Err(errors)
    }
}

/// Registry for a task's tools, in registration order
#[derive(Clone, Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
}

impl ToolRegistry {
    pub const fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool.
    ///
    /// Missing description or params are taken from the invocable itself.
    /// Empty, reserved or duplicate names are contract violations.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        invocable: Invocable,
        description: Option<&str>,
        params: Option<Vec<ParameterSchema>>,
    ) -> Result<&mut Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(AgentError::Contract("tool name must not be empty".into()));
        }
        if name.trim().eq_ignore_ascii_case(NO_TOOL) {
            return Err(AgentError::Contract(format!(
                "tool name '{NO_TOOL}' is reserved"
            )));
        }
        if self.get(&name).is_some() {
            return Err(AgentError::Contract(format!(
                "tool '{name}' is already registered"
            )));
        }

        let (description, parameters) = match (description, params) {
            (Some(desc), Some(params)) => (desc.to_string(), params),
            (desc, params) => {
                let (own_desc, own_params) = invocable.introspect();
                (
                    desc.map_or(own_desc, str::to_string),
                    params.unwrap_or(own_params),
                )
            }
        };

        tracing::debug!(tool = %name, shape = ?invocable, params = parameters.len(), "Registered tool");
        self.tools.push(ToolDefinition {
            name,
            description,
            parameters,
            invocable,
        });
        Ok(self)
    }

    /// Register a self-describing tool instance
    pub fn register_tool<T: Tool + 'static>(
        &mut self,
        name: impl Into<String>,
        tool: T,
    ) -> Result<&mut Self> {
        self.register(name, Invocable::instance(tool), None, None)
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.tools
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Prompt section describing every tool
    pub fn generate_prompt_section(&self) -> String {
        let mut prompt = String::from("## Available Tools\n\n");

        for tool in &self.tools {
            prompt.push_str(&format!("### {}\n", tool.name));
            if !tool.description.is_empty() {
                prompt.push_str(&format!("{}\n", tool.description));
            }

            if tool.parameters.is_empty() {
                prompt.push_str("Parameters: none\n");
            } else {
                prompt.push_str("**Parameters:**\n");
                for param in &tool.parameters {
                    let required = if param.required { " (required)" } else { "" };
                    prompt.push_str(&format!(
                        "- `{}` ({}){}: {}\n",
                        param.name, param.param_type, required, param.description
                    ));
                }
            }
            prompt.push('\n');
        }

        prompt
    }
}
