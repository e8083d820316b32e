//! `engine` crate — workflow definitions, their validation, and the engine
//! that runs them.

pub mod decoder;
pub mod engine;
pub mod error;
pub mod models;
pub mod resolver;
pub mod schema;
pub mod validator;

pub use decoder::{Connector, ReplicationDriver};
pub use engine::{EngineConfig, WorkflowEngine};
pub use error::{EngineError, ResolveError, WiringError, INTERNAL_ERROR_NUM};
pub use models::{Step, WorkflowDefinition};
pub use schema::validate_schema;
pub use validator::{ValidationErrorKind, ValidationLevel, ValidationResult, WorkflowValidator};
