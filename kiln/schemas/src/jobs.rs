//! Job and step configuration types.
//!
//! A job declares the external tools it needs and an ordered list of steps.
//! Step fields are templates: `${name}` placeholders are resolved against the
//! job's variables right before the step runs, so a step can use values saved
//! by the steps before it.

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::{ActionType, Variables};

/// A single declared operation inside a job.
///
/// # Examples
///
/// ```
/// use kiln_schemas::{ActionType, Step};
///
/// let step = Step::builder()
///     .name("read version".to_string())
///     .action(ActionType::Command)
///     .source("git describe --tags".to_string())
///     .save("version".to_string())
///     .build();
///
/// assert!(step.location.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "snake_case")]
pub struct Step {
    /// Human readable name, used in logs
    #[serde(default)]
    #[builder(default)]
    pub name: String,

    /// Operation to perform
    #[serde(rename = "type")]
    pub action: ActionType,

    /// Working directory for the duration of the step, empty to keep the current one
    #[serde(default)]
    #[builder(default)]
    pub location: String,

    /// First operand, its meaning depends on the action type
    #[serde(default)]
    #[builder(default)]
    pub source: String,

    /// Second operand, its meaning depends on the action type
    #[serde(default)]
    #[builder(default)]
    pub target: String,

    /// Variable name the step output is stored under
    #[serde(default)]
    #[builder(default)]
    pub save: String,

    /// Save stderr instead of stdout for command steps
    #[serde(default)]
    #[builder(default)]
    pub save_stderr: bool,

    /// Template reported on the job's standard output once the step succeeded
    #[serde(default)]
    #[builder(default)]
    pub to_stdout: String,

    /// Template reported on the job's standard error once the step succeeded
    #[serde(default)]
    #[builder(default)]
    pub to_stderr: String,
}

fn default_dependency_type() -> ActionType {
    ActionType::Command
}

/// An external requirement checked before a job may run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "snake_case")]
pub struct DependencyDefinition {
    /// Name of the required executable
    pub name: String,

    /// Operation the dependency is used with; command types are resolved on `PATH`
    #[serde(rename = "type", default = "default_dependency_type")]
    #[builder(default = default_dependency_type())]
    pub kind: ActionType,
}

/// Declaration of a job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "snake_case")]
pub struct JobDefinition {
    /// Variables only visible to this job, overriding recipe variables
    #[serde(default)]
    #[builder(default)]
    pub variables: Variables,

    /// Tools that must be present before the job is allowed to run
    #[serde(default)]
    #[builder(default)]
    pub dependencies: Vec<DependencyDefinition>,

    /// Steps executed in order
    #[serde(default)]
    #[builder(default)]
    pub steps: Vec<Step>,
}
