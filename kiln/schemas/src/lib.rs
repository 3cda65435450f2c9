//! # Kiln Schemas
//!
//! This crate contains the configuration types of a kiln recipe file. A recipe
//! declares named jobs, each with the external tools it depends on and an ordered
//! list of steps. Keeping these types here lets the core engine, the CLI and any
//! other tooling share a single definition of the file format.

use std::collections::{BTreeMap, HashMap};

use bon::Builder;
use serde::{Deserialize, Serialize};

pub mod actions;
pub mod jobs;
pub mod progress;

pub use actions::{ActionType, UnknownActionType};
pub use jobs::{DependencyDefinition, JobDefinition, Step, StepBuilder};
pub use progress::ProgressEvent;

/// Variables available to step templates, keyed by name.
pub type Variables = HashMap<String, String>;

fn current_version() -> String {
    "v1".to_string()
}

/// Definition of a kiln recipe.
///
/// A recipe is a set of independent jobs. Every job runs concurrently with the
/// others; the steps inside a job run sequentially.
///
/// # Examples
///
/// ```
/// use kiln_schemas::{ActionType, JobDefinition, Recipe, Step};
///
/// let recipe = Recipe::builder()
///     .jobs(
///         [(
///             "linux".to_string(),
///             JobDefinition::builder()
///                 .steps(vec![Step::builder()
///                     .name("prepare output".to_string())
///                     .action(ActionType::CreatePath)
///                     .source("dist/linux".to_string())
///                     .build()])
///                 .build(),
///         )]
///         .into(),
///     )
///     .build();
///
/// assert_eq!(recipe.version, "v1");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[serde(rename_all = "snake_case")]
pub struct Recipe {
    /// Schema version for migration compatibility
    #[serde(default = "current_version")]
    #[builder(default = current_version())]
    pub version: String,

    /// Variables shared by every job of this recipe
    #[serde(default)]
    #[builder(default)]
    pub variables: Variables,

    /// Jobs keyed by their unique name
    #[serde(default)]
    #[builder(default)]
    pub jobs: BTreeMap<String, JobDefinition>,
}

impl Recipe {
    /// Variables a job starts with: recipe variables, overridden by the job's
    /// own variables, overridden by `params`.
    ///
    /// Each call returns a fresh map so concurrently running jobs never share one.
    pub fn job_variables(&self, job: &str, params: &Variables) -> Variables {
        let mut variables = self.variables.clone();

        if let Some(definition) = self.jobs.get(job) {
            variables.extend(
                definition
                    .variables
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
        }

        variables.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        variables
    }
}
