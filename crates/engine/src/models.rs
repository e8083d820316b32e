//! Workflow definition model.
//!
//! A definition is stored as raw JSON (the `definition` of a
//! `store::Workflow`) and decoded into these types once it has passed
//! schema validation. Field names follow the definition's YAML
//! (`variable-mapping`, `from-workflow`, `from-step`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use store::Specification;

// ---------------------------------------------------------------------------
// WorkflowDefinition
// ---------------------------------------------------------------------------

/// A complete, immutable workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Steps in execution order.
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<WorkflowVariables>,
}

impl WorkflowDefinition {
    /// Decode a (schema-valid) definition document.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }

    /// Parse a YAML definition document.
    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }
}

/// Workflow-level variable declarations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowVariables {
    #[serde(default)]
    pub inputs: Vec<VariableDeclaration>,
    #[serde(default)]
    pub outputs: Vec<VariableDeclaration>,
    #[serde(default)]
    pub options: Vec<VariableDeclaration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDeclaration {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// A named unit of work backed by a Job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Step {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub specification: Specification,
    #[serde(default)]
    pub variable_mapping: Vec<VariableMapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicate: Option<Replicate>,
    /// File-carrying variables the step consumes.
    #[serde(default)]
    pub inputs: Vec<StepVariable>,
    /// File-carrying variables the step produces.
    #[serde(default)]
    pub outputs: Vec<StepVariable>,
}

/// Connects one job variable to its source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VariableMapping {
    /// The job variable being set.
    pub variable: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_workflow: Option<FromWorkflow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_step: Option<FromStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FromWorkflow {
    pub variable: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FromStep {
    pub name: String,
    pub variable: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replicate {
    pub using: ReplicateUsing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicateUsing {
    pub variable: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepVariable {
    pub variable: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_yaml_definition() {
        let def = WorkflowDefinition::from_yaml_str(
            r#"
kind: DataManagerWorkflow
kind-version: "2024.1"
name: smiles-to-file
description: Write a SMILES string to a file
steps:
- name: step-1
  specification:
    collection: workflow-engine-unit-test-jobs
    job: smiles-to-file
    version: "1.0.0"
  variable-mapping:
  - variable: smiles
    from-workflow:
      variable: smiles
  outputs:
  - variable: outputFile
variables:
  inputs:
  - name: smiles
  options:
  - name: outputFile
    default: output.smi
"#,
        )
        .expect("decodes");

        assert_eq!(def.name, "smiles-to-file");
        assert_eq!(def.steps.len(), 1);
        let step = &def.steps[0];
        assert_eq!(step.specification.job, "smiles-to-file");
        assert_eq!(
            step.variable_mapping[0].from_workflow,
            Some(FromWorkflow { variable: "smiles".into() })
        );
        assert_eq!(step.outputs[0].variable, "outputFile");
        let variables = def.variables.expect("variables");
        assert_eq!(variables.options[0].default, Some(Value::from("output.smi")));
    }

    #[test]
    fn missing_optional_sections_default_to_empty() {
        let def = WorkflowDefinition::from_yaml_str(
            r#"
name: minimal
steps:
- name: step-1
  specification: {collection: c, job: j, version: "1"}
"#,
        )
        .unwrap();
        assert!(def.variables.is_none());
        assert!(def.steps[0].variable_mapping.is_empty());
        assert!(def.steps[0].replicate.is_none());
    }
}
