//! Job command rendering.
//!
//! Job commands are Jinja templates. Rendering is strict: any variable the
//! template uses but the map does not define is an error, which is how a
//! step with unsatisfied inputs is caught before it is launched.

use minijinja::{Environment, UndefinedBehavior};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CommandError(pub String);

/// Render `template` with `variables`.
pub fn render(template: &str, variables: &Map<String, Value>) -> Result<String, CommandError> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.render_str(template, variables)
        .map_err(|e| CommandError(e.to_string()))
}
