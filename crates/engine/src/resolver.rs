//! Step variable resolution.
//!
//! Variables are layered, later layers overriding earlier ones:
//!
//! 1. static variables of the step's job specification,
//! 2. workflow (run) variables copied through `from-workflow` connections,
//! 3. prior step variables copied through `from-step` connections.
//!
//! Everything here is pure; the engine fetches the inputs from the store.

use serde_json::{Map, Value};

use crate::decoder::Connector;
use crate::error::{ResolveError, WiringError};
use crate::models::WorkflowDefinition;

/// The `from-step` connections to one prior step, with the variables that
/// step recorded when it was launched.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorStepVariables {
    pub step_name: String,
    pub connectors: Vec<Connector>,
    pub variables: Map<String, Value>,
}

/// Build the variable map for `step_name`.
pub fn resolve(
    step_name: &str,
    specification_variables: Option<&Map<String, Value>>,
    run_variables: &Map<String, Value>,
    workflow_connectors: &[Connector],
    prior_steps: &[PriorStepVariables],
) -> Result<Map<String, Value>, ResolveError> {
    let mut variables = specification_variables.cloned().unwrap_or_default();

    for connector in workflow_connectors {
        // An unset workflow variable is left for command rendering to report.
        if let Some(value) = run_variables.get(&connector.in_) {
            variables.insert(connector.out.clone(), value.clone());
        }
    }

    for prior in prior_steps {
        for connector in &prior.connectors {
            let value = prior.variables.get(&connector.in_).ok_or_else(|| {
                WiringError::MissingPriorStepVariable {
                    step: step_name.to_owned(),
                    prior_step: prior.step_name.clone(),
                    variable: connector.in_.clone(),
                }
            })?;
            variables.insert(connector.out.clone(), value.clone());
        }
    }

    Ok(variables)
}

/// The run's variables with defaults filled in for unset workflow options.
pub fn run_variables(
    definition: &WorkflowDefinition,
    supplied: &Map<String, Value>,
) -> Map<String, Value> {
    let mut variables = Map::new();
    if let Some(declared) = &definition.variables {
        for option in &declared.options {
            if let Some(default) = &option.default {
                variables.insert(option.name.clone(), default.clone());
            }
        }
    }
    variables.extend(supplied.iter().map(|(k, v)| (k.clone(), v.clone())));
    variables
}

/// Combine the recorded variables of a replicated step's replicas (given in
/// replica order) into one map of arrays.
///
/// A variable is only carried over when every replica recorded it.
pub fn aggregate_replica_variables(replicas: &[Map<String, Value>]) -> Map<String, Value> {
    let Some(first) = replicas.first() else {
        return Map::new();
    };
    first
        .keys()
        .filter_map(|name| {
            replicas
                .iter()
                .map(|r| r.get(name).cloned())
                .collect::<Option<Vec<_>>>()
                .map(|values| (name.clone(), Value::Array(values)))
        })
        .collect()
}
