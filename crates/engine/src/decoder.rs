//! Read-only queries over a `WorkflowDefinition`.
//!
//! Shared by the validator and the engine. None of these functions
//! de-duplicate; finding duplicates is the validator's job.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::WiringError;
use crate::models::{Step, WorkflowDefinition};

/// A variable connection: the value named `in_` at the source is copied to
/// the job variable `out` of the receiving step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connector {
    #[serde(rename = "in")]
    pub in_: String,
    pub out: String,
}

impl Connector {
    pub fn new(in_: impl Into<String>, out: impl Into<String>) -> Self {
        Self {
            in_: in_.into(),
            out: out.into(),
        }
    }
}

/// Where a replicating step gets the list it replicates over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationDriver {
    pub source_step_name: String,
    /// The output of the source step that holds the list.
    pub source_variable: String,
    /// The step's own variable set to one element per replica.
    pub variable: String,
}

pub fn get_step_names(definition: &WorkflowDefinition) -> Vec<String> {
    definition.steps.iter().map(|s| s.name.clone()).collect()
}

pub fn get_steps(definition: &WorkflowDefinition) -> &[Step] {
    &definition.steps
}

pub fn get_step<'a>(definition: &'a WorkflowDefinition, name: &str) -> Option<&'a Step> {
    definition.steps.iter().find(|s| s.name == name)
}

pub fn get_name(definition: &WorkflowDefinition) -> &str {
    &definition.name
}

pub fn get_description(definition: &WorkflowDefinition) -> Option<&str> {
    definition.description.as_deref()
}

/// Names of every declared workflow variable (inputs, outputs then options).
pub fn get_variable_names(definition: &WorkflowDefinition) -> Vec<String> {
    let Some(variables) = &definition.variables else {
        return Vec::new();
    };
    variables
        .inputs
        .iter()
        .chain(&variables.outputs)
        .chain(&variables.options)
        .map(|v| v.name.clone())
        .collect()
}

/// Every workflow variable referenced by a `from-workflow` connection.
pub fn get_workflow_variable_names(definition: &WorkflowDefinition) -> BTreeSet<String> {
    definition
        .steps
        .iter()
        .flat_map(|s| &s.variable_mapping)
        .filter_map(|m| m.from_workflow.as_ref())
        .map(|w| w.variable.clone())
        .collect()
}

/// Variables the user must supply to run the workflow: every input, plus
/// every option that has no default.
pub fn get_required_variable_names(definition: &WorkflowDefinition) -> Vec<String> {
    let Some(variables) = &definition.variables else {
        return Vec::new();
    };
    variables
        .inputs
        .iter()
        .map(|v| v.name.clone())
        .chain(
            variables
                .options
                .iter()
                .filter(|o| o.default.is_none())
                .map(|o| o.name.clone()),
        )
        .collect()
}

pub fn get_step_input_variable_names(definition: &WorkflowDefinition, step_name: &str) -> Vec<String> {
    get_step(definition, step_name)
        .map(|s| s.inputs.iter().map(|v| v.variable.clone()).collect())
        .unwrap_or_default()
}

pub fn get_step_output_variable_names(definition: &WorkflowDefinition, step_name: &str) -> Vec<String> {
    get_step(definition, step_name)
        .map(|s| s.outputs.iter().map(|v| v.variable.clone()).collect())
        .unwrap_or_default()
}

/// The step's `from-workflow` connections.
pub fn get_step_workflow_variable_mapping(step: &Step) -> Vec<Connector> {
    step.variable_mapping
        .iter()
        .filter_map(|m| {
            m.from_workflow
                .as_ref()
                .map(|w| Connector::new(&w.variable, &m.variable))
        })
        .collect()
}

/// The step's `from-step` connections, grouped by source step name.
pub fn get_step_prior_step_variable_mapping(step: &Step) -> BTreeMap<String, Vec<Connector>> {
    let mut mapping: BTreeMap<String, Vec<Connector>> = BTreeMap::new();
    for m in &step.variable_mapping {
        if let Some(from) = &m.from_step {
            mapping
                .entry(from.name.clone())
                .or_default()
                .push(Connector::new(&from.variable, &m.variable));
        }
    }
    mapping
}

/// Trace a replicating step's variable back to the prior step feeding it.
///
/// `Ok(None)` for a step that does not replicate.
pub fn get_step_replication_driver(step: &Step) -> Result<Option<ReplicationDriver>, WiringError> {
    let Some(replicate) = &step.replicate else {
        return Ok(None);
    };
    let variable = &replicate.using.variable;
    get_step_prior_step_variable_mapping(step)
        .into_iter()
        .find_map(|(source_step_name, connectors)| {
            connectors
                .into_iter()
                .find(|c| &c.out == variable)
                .map(|c| ReplicationDriver {
                    source_step_name,
                    source_variable: c.in_,
                    variable: variable.clone(),
                })
        })
        .map(Some)
        .ok_or_else(|| WiringError::UntracedReplicateVariable {
            step: step.name.clone(),
            variable: variable.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORTCUT: &str = r#"
name: shortcut-example-1
description: A workflow with two steps connected by a file
steps:
- name: example-1-step-1
  specification:
    collection: workflow-engine-unit-test-jobs
    job: shortcut-example-1-process-a
    version: "1.0.0"
  variable-mapping:
  - variable: inputFile
    from-workflow:
      variable: candidateMolecules
  outputs:
  - variable: outputFile
- name: example-1-step-2
  specification:
    collection: workflow-engine-unit-test-jobs
    job: shortcut-example-1-process-b
    version: "1.0.0"
  variable-mapping:
  - variable: inputFile
    from-step:
      name: example-1-step-1
      variable: outputFile
  - variable: rdkitPropertyName
    from-workflow:
      variable: rdkitPropertyName
  inputs:
  - variable: inputFile
  outputs:
  - variable: outputFile
  - variable: outputFile
variables:
  inputs:
  - name: candidateMolecules
  outputs:
  - name: clusteredMolecules
  options:
  - name: rdkitPropertyName
  - name: clusterCount
    default: 4
"#;

    fn shortcut() -> WorkflowDefinition {
        WorkflowDefinition::from_yaml_str(SHORTCUT).expect("definition")
    }

    #[test]
    fn step_names_keep_definition_order() {
        assert_eq!(
            get_step_names(&shortcut()),
            vec!["example-1-step-1", "example-1-step-2"]
        );
        assert_eq!(get_name(&shortcut()), "shortcut-example-1");
        assert_eq!(
            get_description(&shortcut()),
            Some("A workflow with two steps connected by a file")
        );
    }

    #[test]
    fn variable_names_cover_all_declarations() {
        assert_eq!(
            get_variable_names(&shortcut()),
            vec![
                "candidateMolecules",
                "clusteredMolecules",
                "rdkitPropertyName",
                "clusterCount"
            ]
        );
    }

    #[test]
    fn workflow_variable_names_come_from_connections() {
        let names = get_workflow_variable_names(&shortcut());
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["candidateMolecules", "rdkitPropertyName"]
        );
    }

    #[test]
    fn required_variables_skip_defaulted_options() {
        assert_eq!(
            get_required_variable_names(&shortcut()),
            vec!["candidateMolecules", "rdkitPropertyName"]
        );
    }

    #[test]
    fn step_outputs_keep_duplicates() {
        let def = shortcut();
        assert_eq!(
            get_step_output_variable_names(&def, "example-1-step-2"),
            vec!["outputFile", "outputFile"]
        );
        assert_eq!(
            get_step_input_variable_names(&def, "example-1-step-2"),
            vec!["inputFile"]
        );
        assert!(get_step_input_variable_names(&def, "no-such-step").is_empty());
    }

    #[test]
    fn connections_are_split_by_source() {
        let def = shortcut();
        let step = get_step(&def, "example-1-step-2").unwrap();

        assert_eq!(
            get_step_workflow_variable_mapping(step),
            vec![Connector::new("rdkitPropertyName", "rdkitPropertyName")]
        );
        let prior = get_step_prior_step_variable_mapping(step);
        assert_eq!(prior.len(), 1);
        assert_eq!(
            prior["example-1-step-1"],
            vec![Connector::new("outputFile", "inputFile")]
        );
    }

    #[test]
    fn replication_driver_traces_the_prior_step() {
        let mut def = shortcut();
        def.steps[1].replicate = Some(crate::models::Replicate {
            using: crate::models::ReplicateUsing {
                variable: "inputFile".into(),
            },
        });

        let driver = get_step_replication_driver(&def.steps[1])
            .unwrap()
            .expect("a driver");
        assert_eq!(
            driver,
            ReplicationDriver {
                source_step_name: "example-1-step-1".into(),
                source_variable: "outputFile".into(),
                variable: "inputFile".into(),
            }
        );
        assert_eq!(get_step_replication_driver(&def.steps[0]).unwrap(), None);
    }

    #[test]
    fn untraceable_replication_is_a_wiring_error() {
        let mut def = shortcut();
        def.steps[1].replicate = Some(crate::models::Replicate {
            using: crate::models::ReplicateUsing {
                variable: "rdkitPropertyName".into(),
            },
        });

        let err = get_step_replication_driver(&def.steps[1]).unwrap_err();
        assert!(matches!(err, WiringError::UntracedReplicateVariable { .. }));
    }
}
