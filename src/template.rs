//! Payload templates.
//!
//! Light channels may carry a value template (applied to inbound payloads
//! before parsing) or a command template (used to render outbound payloads).
//! Evaluation sits behind [`TemplateEngine`] so hosts can plug in a richer
//! engine; [`ValueTemplate`] is the built-in one.
//!
//! The built-in syntax is a small subset of Jinja: literal text with
//! `{{ expression }}` placeholders, where an expression is a dotted path
//! (`value_json.state.brightness`, `value_json.colors[0]`) followed by zero
//! or more filters: `join("sep")`, `int`, `float`, `round(n)`, `hex`,
//! `lower`, `upper`, `trim`.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TemplateError {
    #[error("unterminated placeholder in template `{0}`")]
    Malformed(String),

    #[error("undefined variable `{0}`")]
    Undefined(String),

    #[error("unsupported filter `{0}`")]
    UnsupportedFilter(String),

    #[error("filter `{filter}` cannot be applied to {value}")]
    FilterFailed { filter: String, value: String },
}

/// Template evaluation used by the light synchronizer.
pub trait TemplateEngine: Send + Sync {
    /// Render `template` against named variables.
    fn render(&self, template: &str, context: &Map<String, Value>) -> Result<String, TemplateError>;

    /// Extract the effective payload from a raw inbound payload. The template
    /// sees the payload as `value` and, when it parses as JSON, as `value_json`.
    fn extract(&self, template: &str, payload: &str) -> Result<String, TemplateError> {
        let mut context = Map::new();
        context.insert("value".to_string(), Value::String(payload.to_string()));
        if let Ok(json) = serde_json::from_str::<Value>(payload) {
            context.insert("value_json".to_string(), json);
        }
        self.render(template, &context)
    }
}

/// Built-in placeholder engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValueTemplate;

impl TemplateEngine for ValueTemplate {
    fn render(&self, template: &str, context: &Map<String, Value>) -> Result<String, TemplateError> {
        let mut output = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            output.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| TemplateError::Malformed(template.to_string()))?;
            let value = evaluate(after[..end].trim(), context)?;
            output.push_str(&display(&value));
            rest = &after[end + 2..];
        }
        output.push_str(rest);

        Ok(output)
    }
}

fn evaluate(expression: &str, context: &Map<String, Value>) -> Result<Value, TemplateError> {
    let mut parts = split_filters(expression).into_iter();
    let path = parts.next().unwrap_or_default();
    let mut value = lookup(path.trim(), context)?;
    for filter in parts {
        value = apply_filter(filter.trim(), value)?;
    }
    Ok(value)
}

// Split on `|` outside of quoted filter arguments.
fn split_filters(expression: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote = None;
    let mut start = 0;
    for (i, c) in expression.char_indices() {
        match (c, quote) {
            ('"' | '\'', None) => quote = Some(c),
            (c, Some(q)) if c == q => quote = None,
            ('|', None) => {
                parts.push(&expression[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&expression[start..]);
    parts
}

fn lookup(path: &str, context: &Map<String, Value>) -> Result<Value, TemplateError> {
    let undefined = || TemplateError::Undefined(path.to_string());
    let mut segments = path.split('.');
    let root = segments.next().filter(|s| !s.is_empty()).ok_or_else(undefined)?;

    let (name, indices) = split_indices(root).ok_or_else(undefined)?;
    let mut current = context.get(name).ok_or_else(undefined)?;
    current = index_into(current, &indices).ok_or_else(undefined)?;

    for segment in segments {
        let (key, indices) = split_indices(segment).ok_or_else(undefined)?;
        current = current.get(key).ok_or_else(undefined)?;
        current = index_into(current, &indices).ok_or_else(undefined)?;
    }

    Ok(current.clone())
}

// `colors[0][1]` -> ("colors", [0, 1])
fn split_indices(segment: &str) -> Option<(&str, Vec<usize>)> {
    let Some(open) = segment.find('[') else {
        return Some((segment, Vec::new()));
    };
    let mut indices = Vec::new();
    for chunk in segment[open..].split_terminator(']') {
        indices.push(chunk.strip_prefix('[')?.trim().parse().ok()?);
    }
    Some((&segment[..open], indices))
}

fn index_into<'a>(mut value: &'a Value, indices: &[usize]) -> Option<&'a Value> {
    for index in indices {
        value = value.get(*index)?;
    }
    Some(value)
}

fn apply_filter(filter: &str, value: Value) -> Result<Value, TemplateError> {
    let (name, argument) = match filter.find('(') {
        Some(open) => {
            let argument = filter[open + 1..].strip_suffix(')').map(|a| a.trim());
            (filter[..open].trim(), argument)
        }
        None => (filter, None),
    };
    let failed = |value: &Value| TemplateError::FilterFailed {
        filter: name.to_string(),
        value: value.to_string(),
    };

    match name {
        "join" => {
            let separator = argument.map(unquote).unwrap_or("");
            let items = value.as_array().ok_or_else(|| failed(&value))?;
            let joined = items.iter().map(display).collect::<Vec<_>>().join(separator);
            Ok(Value::String(joined))
        }
        "int" => number_of(&value)
            .map(|n| Value::from(n.trunc() as i64))
            .ok_or_else(|| failed(&value)),
        "float" => number_of(&value)
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| failed(&value)),
        "round" => {
            let decimals = argument.and_then(|a| a.parse::<i32>().ok()).unwrap_or(0);
            number_of(&value)
                .map(|n| crate::color::round_to(n, decimals))
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| failed(&value))
        }
        "hex" => number_of(&value)
            .filter(|n| *n >= 0.0)
            .map(|n| Value::String(format!("{:02x}", n.round() as u64)))
            .ok_or_else(|| failed(&value)),
        "lower" => Ok(Value::String(display(&value).to_lowercase())),
        "upper" => Ok(Value::String(display(&value).to_uppercase())),
        "trim" => Ok(Value::String(display(&value).trim().to_string())),
        other => Err(TemplateError::UnsupportedFilter(other.to_string())),
    }
}

fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn unquote(argument: &str) -> &str {
    argument
        .strip_prefix('"')
        .and_then(|a| a.strip_suffix('"'))
        .or_else(|| argument.strip_prefix('\'').and_then(|a| a.strip_suffix('\'')))
        .unwrap_or(argument)
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
