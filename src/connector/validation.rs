//! Presence checks for connector input parameters. Never touches the filesystem.

use serde_json::Value;

use super::InputParameters;

pub const INTERPRETER: &str = "interpreter";
pub const PARAMETER: &str = "parameter";
pub const SCRIPT: &str = "script";

/// One message per rejected field, in the order the fields were checked.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", .messages.join(", "))]
pub struct ValidationError {
    pub messages: Vec<String>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            messages: vec![message.into()],
        }
    }
}

/// Returns the named parameter when it is a string. Other JSON types read as absent.
pub fn string_param<'a>(params: &'a InputParameters, name: &str) -> Option<&'a str> {
    params.get(name).and_then(Value::as_str)
}

/// Fails with `"<name> cannot be empty!"` for every field that is absent, not a
/// string, or an empty string.
pub fn require_non_empty(params: &InputParameters, names: &[&str]) -> Result<(), ValidationError> {
    let messages: Vec<String> = names
        .iter()
        .filter(|name| string_param(params, name).map_or(true, str::is_empty))
        .map(|name| format!("{name} cannot be empty!"))
        .collect();

    if messages.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { messages })
    }
}

pub fn validate_shell_parameters(params: &InputParameters) -> Result<(), ValidationError> {
    require_non_empty(params, &[INTERPRETER, PARAMETER, SCRIPT])
}
