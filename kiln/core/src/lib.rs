//! # Kiln Core
//!
//! Parallel job coordination and step execution for kiln recipes.
//!
//! A recipe is loaded with [`templating::TemplateLoader`], turned into
//! [`job::StepJob`]s with [`job::jobs_from_recipe`] and handed to a
//! [`conductor::Conductor`], which runs every job concurrently and aborts the
//! whole group on the first failure.
//!
//! ```no_run
//! use std::{collections::HashMap, sync::Arc};
//!
//! use kiln_core::prelude::*;
//!
//! # async fn release() -> kiln_core::error::Result<()> {
//! let recipe = Recipe::from_file("kiln.toml", TemplateFormat::Toml, HashMap::new())?;
//!
//! let mut conductor = Conductor::new().with_tracker(Arc::new(LoggingProgressTracker));
//! for job in jobs_from_recipe(&recipe, &HashMap::new(), &[])? {
//!     conductor.register(job)?;
//! }
//!
//! conductor.execute().await?;
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod conductor;
pub mod dependency;
pub mod error;
pub mod executive;
pub mod job;
pub mod message;
pub mod progress_tracker;
pub mod templating;

pub use kiln_schemas as schemas;

/// Prelude to import the commonly used types and functions
pub mod prelude {
    pub use crate::action::{Action, ActionError, ActionOutput};
    pub use crate::conductor::{Conductor, ConductorError};
    pub use crate::dependency::{Dependency, DependencyError};
    pub use crate::error::{Error, Result};
    pub use crate::executive::{Executive, ExecutiveError};
    pub use crate::job::{jobs_from_recipe, Job, JobError, Reporter, StepJob};
    pub use crate::message::Message;
    pub use crate::progress_tracker::{LoggingProgressTracker, ProgressTracker};
    pub use crate::templating::{format_from_path, TemplateFormat, TemplateLoader};

    pub use kiln_schemas::{
        ActionType, DependencyDefinition, JobDefinition, ProgressEvent, Recipe, Step, Variables,
    };
}
