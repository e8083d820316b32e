//! Workflow validation at the CREATE, TAG and RUN levels.
//!
//! Levels are cumulative (RUN implies TAG implies CREATE) and validation
//! stops at the first failing check.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::decoder;
use crate::models::WorkflowDefinition;
use crate::schema::validate_schema;

// ---------------------------------------------------------------------------
// Levels and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationLevel {
    /// Structure only; checked when a definition is stored.
    Create,
    /// Semantic checks; a definition must pass these to be published.
    Tag,
    /// Everything, plus the variables supplied for a run.
    Run,
}

impl fmt::Display for ValidationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "CREATE",
            Self::Tag => "TAG",
            Self::Run => "RUN",
        };
        f.write_str(s)
    }
}

impl FromStr for ValidationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CREATE" => Ok(Self::Create),
            "TAG" => Ok(Self::Tag),
            "RUN" => Ok(Self::Run),
            other => Err(format!("unknown validation level '{other}'")),
        }
    }
}

/// Why a definition failed validation. Stable across releases, unlike the
/// numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationErrorKind {
    Schema,
    DuplicateStepNames,
    DuplicateStepOutputVariable,
    UndeclaredReplicateInput,
    DuplicateWorkflowVariableNames,
    MissingVariables,
}

impl ValidationErrorKind {
    /// Numeric code reported in `ValidationResult::error_num`.
    ///
    /// Callers that branch on the failure should match on the kind; the
    /// numbers are informational and may change.
    pub fn error_num(self) -> i32 {
        match self {
            Self::Schema => 1,
            Self::DuplicateStepNames => 2,
            Self::DuplicateStepOutputVariable => 3,
            Self::UndeclaredReplicateInput => 4,
            Self::DuplicateWorkflowVariableNames => 6,
            Self::MissingVariables => 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Zero when the definition is valid.
    pub error_num: i32,
    pub error_msg: Option<Vec<String>>,
    pub kind: Option<ValidationErrorKind>,
}

impl ValidationResult {
    pub fn success() -> Self {
        Self {
            error_num: 0,
            error_msg: None,
            kind: None,
        }
    }

    pub fn failure(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            error_num: kind.error_num(),
            error_msg: Some(vec![message.into()]),
            kind: Some(kind),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error_num == 0
    }
}

// ---------------------------------------------------------------------------
// WorkflowValidator
// ---------------------------------------------------------------------------

/// Stateless validator for workflow definition documents.
pub struct WorkflowValidator;

impl WorkflowValidator {
    /// Validate `definition` at `level`.
    ///
    /// `variables` are the values supplied for a run and are only consulted
    /// at [`ValidationLevel::Run`].
    pub fn validate(
        level: ValidationLevel,
        definition: &Value,
        variables: Option<&Map<String, Value>>,
    ) -> ValidationResult {
        if let Some(error) = validate_schema(definition) {
            return ValidationResult::failure(ValidationErrorKind::Schema, error);
        }
        // Schema-valid documents can still carry the wrong types in places
        // the schema leaves open.
        let definition = match WorkflowDefinition::from_value(definition) {
            Ok(definition) => definition,
            Err(e) => return ValidationResult::failure(ValidationErrorKind::Schema, e.to_string()),
        };

        if level >= ValidationLevel::Tag {
            let result = Self::validate_tag_level(&definition);
            if !result.is_ok() {
                return result;
            }
        }
        if level == ValidationLevel::Run {
            let result = Self::validate_run_level(&definition, variables);
            if !result.is_ok() {
                return result;
            }
        }
        ValidationResult::success()
    }

    fn validate_tag_level(definition: &WorkflowDefinition) -> ValidationResult {
        let duplicates = find_duplicates(decoder::get_step_names(definition));
        if !duplicates.is_empty() {
            return ValidationResult::failure(
                ValidationErrorKind::DuplicateStepNames,
                format!("Duplicate step names found: {}", duplicates.join(", ")),
            );
        }

        for step in decoder::get_steps(definition) {
            let outputs = decoder::get_step_output_variable_names(definition, &step.name);
            if let Some(duplicate) = find_duplicates(outputs).into_iter().next() {
                return ValidationResult::failure(
                    ValidationErrorKind::DuplicateStepOutputVariable,
                    format!(
                        "Duplicate step output variable: {} (step={})",
                        duplicate, step.name
                    ),
                );
            }

            if let Some(replicate) = &step.replicate {
                let inputs = decoder::get_step_input_variable_names(definition, &step.name);
                if !inputs.contains(&replicate.using.variable) {
                    return ValidationResult::failure(
                        ValidationErrorKind::UndeclaredReplicateInput,
                        format!(
                            "Replicate input variable is not declared: {} (step={})",
                            replicate.using.variable, step.name
                        ),
                    );
                }
            }
        }

        let duplicates = find_duplicates(decoder::get_variable_names(definition));
        if !duplicates.is_empty() {
            return ValidationResult::failure(
                ValidationErrorKind::DuplicateWorkflowVariableNames,
                format!(
                    "Duplicate workflow variable names found: {}",
                    duplicates.join(", ")
                ),
            );
        }

        ValidationResult::success()
    }

    fn validate_run_level(
        definition: &WorkflowDefinition,
        variables: Option<&Map<String, Value>>,
    ) -> ValidationResult {
        let missing: Vec<String> = decoder::get_required_variable_names(definition)
            .into_iter()
            .filter(|name| !variables.is_some_and(|v| v.contains_key(name)))
            .collect();
        if !missing.is_empty() {
            return ValidationResult::failure(
                ValidationErrorKind::MissingVariables,
                format!("Missing workflow variable values for: {}", missing.join(", ")),
            );
        }
        ValidationResult::success()
    }
}

/// Names that occur more than once, each listed once in first-repeat order.
fn find_duplicates(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut duplicates: Vec<String> = Vec::new();
    for name in names {
        if !seen.insert(name.clone()) && !duplicates.contains(&name) {
            duplicates.push(name);
        }
    }
    duplicates
}
