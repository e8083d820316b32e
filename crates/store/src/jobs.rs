//! Job catalog — the read-only (collection, job, version) lookup table.
//!
//! Catalogs are loaded from YAML documents of the form:
//!
//! ```yaml
//! collection: workflow-engine-unit-test-jobs
//! jobs:
//!   smiles-to-file:
//!     version: "1.0.0"        # optional, any version matches when absent
//!     command: echo {{ smiles }} > {{ outputFile }}
//!     variables: {}           # optional static variables
//!     outputs:
//!       outputFile:
//!         type: file
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::{
    models::{Job, JobDefinition, JobOutput},
    StoreError,
};

/// Version marker for catalog entries that match any requested version.
const ANY_VERSION: &str = "*";

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    collection: String,
    #[serde(default)]
    jobs: BTreeMap<String, CatalogJob>,
}

#[derive(Debug, Deserialize)]
struct CatalogJob {
    #[serde(default)]
    version: Option<String>,
    command: String,
    #[serde(default)]
    variables: Option<Map<String, Value>>,
    #[serde(default)]
    outputs: BTreeMap<String, JobOutput>,
}

#[derive(Debug, Clone, Default)]
pub struct JobCatalog {
    jobs: BTreeMap<(String, String), Job>,
}

impl JobCatalog {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, StoreError> {
        let mut catalog = Self::default();
        catalog.extend_from_yaml_str(yaml)?;
        Ok(catalog)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_yaml_str(&content)?;
        info!("Loaded {} job definitions from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// Add every job of another catalog document (one collection).
    pub fn extend_from_yaml_str(&mut self, yaml: &str) -> Result<(), StoreError> {
        let document: CatalogDocument = serde_yaml::from_str(yaml)?;
        for (name, entry) in document.jobs {
            self.insert(Job {
                collection: document.collection.clone(),
                job: name,
                version: entry.version.unwrap_or_else(|| ANY_VERSION.to_owned()),
                command: entry.command,
                variables: entry.variables,
                definition: JobDefinition {
                    outputs: entry.outputs,
                },
            });
        }
        Ok(())
    }

    pub fn insert(&mut self, job: Job) {
        self.jobs.insert((job.collection.clone(), job.job.clone()), job);
    }

    pub fn get(&self, collection: &str, job: &str, version: &str) -> Option<Job> {
        let found = self.jobs.get(&(collection.to_owned(), job.to_owned()))?;
        if found.version != ANY_VERSION && found.version != version {
            return None;
        }
        let mut found = found.clone();
        found.version = version.to_owned();
        Some(found)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
