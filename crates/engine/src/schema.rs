//! Structural validation of workflow definitions.
//!
//! The schema is a YAML document compiled into the binary and turned into a
//! `JSONSchema` on first use.

use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::debug;

const WORKFLOW_SCHEMA_YAML: &str = include_str!("workflow-schema.yaml");

static WORKFLOW_SCHEMA: Lazy<JSONSchema> = Lazy::new(|| {
    // The schema ships with the crate; failing to load it is a build defect.
    let schema: Value =
        serde_yaml::from_str(WORKFLOW_SCHEMA_YAML).expect("workflow schema is valid YAML");
    JSONSchema::options()
        .compile(&schema)
        .expect("workflow schema compiles")
});

/// Check `definition` against the workflow schema.
///
/// Returns the first violation's message, or `None` when the definition is
/// structurally valid.
pub fn validate_schema(definition: &Value) -> Option<String> {
    let result = WORKFLOW_SCHEMA.validate(definition);
    match result {
        Ok(()) => None,
        Err(mut errors) => {
            let error = errors.next()?;
            debug!("schema violation at '{}': {}", error.instance_path, error);
            Some(error.to_string())
        }
    }
}
