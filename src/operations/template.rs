//! `{name}` placeholder rendering for operation code bodies.
//!
//! `{{` and `}}` produce literal braces. Dotted names walk nested objects
//! (`{db.host}`). String values are inserted verbatim, anything else as JSON.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("Unresolved placeholder '{name}'")]
    Missing { name: String },

    #[error("Unbalanced brace at position {position}")]
    Unbalanced { position: usize },
}

pub fn render(code: &str, params: &Map<String, Value>) -> Result<String, RenderError> {
    let mut rendered = String::with_capacity(code.len());
    let mut chars = code.char_indices().peekable();

    while let Some((position, ch)) = chars.next() {
        match ch {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                rendered.push('{');
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                rendered.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if !closed {
                    return Err(RenderError::Unbalanced { position });
                }
                let name = name.trim();
                let value = lookup(params, name).ok_or_else(|| RenderError::Missing {
                    name: name.to_string(),
                })?;
                match value {
                    Value::String(s) => rendered.push_str(s),
                    other => rendered.push_str(&other.to_string()),
                }
            }
            '}' => return Err(RenderError::Unbalanced { position }),
            other => rendered.push(other),
        }
    }

    Ok(rendered)
}

fn lookup<'a>(params: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    if let Some(value) = params.get(name) {
        return Some(value);
    }
    let mut parts = name.split('.');
    let mut current = params.get(parts.next()?)?;
    for part in parts {
        current = current.get(part)?;
    }
    Some(current)
}
