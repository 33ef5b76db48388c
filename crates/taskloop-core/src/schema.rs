//! Output Schema
//!
//! Caller-declared field→type expectations used to coerce decoded model
//! output and to check required fields.
//!
//! Three declaration shapes are accepted, in code and in JSON:
//!
//! ```text
//! ["title", "summary"]                                   all fields are strings
//! {"title": "string", "score": "int"}                    name → type
//! {"score": ["float", "Confidence between 0 and 1"]}     name → [type, description]
//! ```
//!
//! Descriptions only feed prompt building; they never change coercion.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Primitive type a field or tool parameter is declared as
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int,
    Float,
    Bool,
    Array,
    Object,
    /// Unrecognised type name: no coercion, any value accepted
    Any,
}

impl FieldType {
    /// Parse a declared type name. `number` is an alias for `float`.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "string" | "str" | "text" => Self::String,
            "int" | "integer" => Self::Int,
            "float" | "double" | "number" => Self::Float,
            "bool" | "boolean" => Self::Bool,
            "array" | "list" => Self::Array,
            "object" | "map" => Self::Object,
            _ => Self::Any,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
        }
    }

    /// Cast a value to this type.
    ///
    /// `null` is returned untouched so an omitted field stays distinguishable
    /// from a field the model emitted with the wrong type.
    pub fn coerce(self, value: &Value) -> Value {
        if value.is_null() {
            return Value::Null;
        }
        match self {
            Self::String => Value::String(cast_string(value)),
            Self::Int => cast_int(value),
            Self::Float => Value::from(cast_float(value)),
            Self::Bool => Value::Bool(cast_bool(value)),
            Self::Array => match value {
                Value::Array(_) | Value::Object(_) => value.clone(),
                scalar => Value::Array(vec![scalar.clone()]),
            },
            Self::Object | Self::Any => value.clone(),
        }
    }

    /// Strict type check used for tool parameters (no casting).
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Int => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON type name of a value, for error messages
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn cast_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn cast_int(value: &Value) -> Value {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => value.clone(),
        Value::Number(n) => Value::from(n.as_f64().map_or(0, |f| f.trunc() as i64)),
        Value::Bool(b) => Value::from(i64::from(*b)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
                .map_or_else(|| Value::from(0), Value::from)
        }
        Value::Array(items) => Value::from(i64::from(!items.is_empty())),
        Value::Object(map) => Value::from(i64::from(!map.is_empty())),
        Value::Null => Value::Null,
    }
}

fn cast_float(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()).unwrap_or(0.0),
        Value::Array(items) => f64::from(u8::from(!items.is_empty())),
        Value::Object(map) => f64::from(u8::from(!map.is_empty())),
        Value::Null => 0.0,
    }
}

fn cast_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "" | "0" | "false" | "no" | "off" | "null"
        ),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Null => false,
    }
}

/// One declared output field
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Ordered set of declared output fields
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "SchemaRepr")]
pub struct OutputSchema {
    fields: Vec<SchemaField>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SchemaRepr {
    Names(Vec<String>),
    Typed(Map<String, Value>),
}

impl TryFrom<SchemaRepr> for OutputSchema {
    type Error = String;

    fn try_from(repr: SchemaRepr) -> Result<Self, Self::Error> {
        match repr {
            SchemaRepr::Names(names) => Ok(Self::from_names(names)),
            SchemaRepr::Typed(map) => {
                let mut schema = Self::new();
                for (name, decl) in map {
                    let (field_type, description) = match &decl {
                        Value::String(ty) => (ty.as_str(), None),
                        Value::Array(parts) => match parts.as_slice() {
                            [Value::String(ty)] => (ty.as_str(), None),
                            [Value::String(ty), Value::String(desc), ..] => {
                                (ty.as_str(), Some(desc.clone()))
                            }
                            _ => return Err(format!("invalid declaration for field '{name}'")),
                        },
                        Value::Object(obj) => match obj.get("type").and_then(Value::as_str) {
                            Some(ty) => (
                                ty,
                                obj.get("description").and_then(Value::as_str).map(str::to_string),
                            ),
                            None => return Err(format!("field '{name}' has no type")),
                        },
                        _ => return Err(format!("invalid declaration for field '{name}'")),
                    };
                    schema.push(name, FieldType::parse(field_type), description);
                }
                Ok(schema)
            }
        }
    }
}

impl OutputSchema {
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Flat name list; every field is a string
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut schema = Self::new();
        for name in names {
            schema.push(name.into(), FieldType::String, None);
        }
        schema
    }

    /// Add a typed field
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field_type: &str) -> Self {
        self.push(name.into(), FieldType::parse(field_type), None);
        self
    }

    /// Add a typed field with a prompt description
    #[must_use]
    pub fn described(
        mut self,
        name: impl Into<String>,
        field_type: &str,
        description: impl Into<String>,
    ) -> Self {
        self.push(name.into(), FieldType::parse(field_type), Some(description.into()));
        self
    }

    fn push(&mut self, name: String, field_type: FieldType, description: Option<String>) {
        // Redeclaring a field replaces it in place
        if let Some(existing) = self.fields.iter_mut().find(|f| f.name == name) {
            existing.field_type = field_type;
            existing.description = description;
        } else {
            self.fields.push(SchemaField {
                name,
                field_type,
                description,
            });
        }
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Coerce decoded data against the schema.
    ///
    /// Objects get every declared field (absent → `null`); arrays have each
    /// object element coerced independently. Scalars pass through.
    pub fn coerce(&self, data: Value) -> Value {
        match data {
            Value::Object(map) => Value::Object(self.coerce_object(map)),
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::Object(map) => Value::Object(self.coerce_object(map)),
                        other => other,
                    })
                    .collect(),
            ),
            other => other,
        }
    }

    fn coerce_object(&self, mut map: Map<String, Value>) -> Map<String, Value> {
        for field in &self.fields {
            let coerced = map
                .get(&field.name)
                .map_or(Value::Null, |v| field.field_type.coerce(v));
            map.insert(field.name.clone(), coerced);
        }
        map
    }

    /// Prompt fragment listing the fields to return
    pub fn describe(&self) -> String {
        self.fields
            .iter()
            .map(|f| match &f.description {
                Some(desc) => format!("- \"{}\" ({}): {}", f.name, f.field_type, desc),
                None => format!("- \"{}\" ({})", f.name, f.field_type),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Required-field check against decoded, pre-coercion data.
///
/// A missing key and an explicit `null` are both reported. Arrays are
/// checked item by item with a 1-based item prefix. `None` (nothing
/// decoded) reports every required field.
pub fn missing_required(data: Option<&Value>, required: &[String]) -> Vec<String> {
    match data {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .flat_map(|(idx, item)| {
                missing_fields(item.as_object(), required)
                    .into_iter()
                    .map(move |name| format!("Item {}: Missing required field: {name}", idx + 1))
            })
            .collect(),
        other => missing_fields(other.and_then(Value::as_object), required)
            .into_iter()
            .map(|name| format!("Missing required field: {name}"))
            .collect(),
    }
}

fn missing_fields<'a>(item: Option<&Map<String, Value>>, required: &'a [String]) -> Vec<&'a str> {
    required
        .iter()
        .filter(|name| {
            item.and_then(|m| m.get(name.as_str()))
                .is_none_or(Value::is_null)
        })
        .map(String::as_str)
        .collect()
}
