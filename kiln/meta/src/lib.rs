//! Kiln - declarative build and release automation
//!
//! This crate is a meta-package that re-exports the most commonly used
//! types and functions of the kiln crates.
//!
//! # Features
//!
//! - **core**: Job coordination and step execution (enabled by default)
//! - **toml**: TOML recipes (enabled by default)
//! - **json**: JSON recipes
//!
//! # Examples
//!
//! ```no_run
//! use std::{collections::HashMap, sync::Arc};
//!
//! use kiln::prelude::*;
//!
//! # async fn run() -> kiln::Result<()> {
//! let recipe = Recipe::from_file("kiln.toml", TemplateFormat::Toml, HashMap::new())?;
//!
//! let mut conductor = Conductor::new().with_tracker(Arc::new(LoggingProgressTracker));
//! for job in jobs_from_recipe(&recipe, &HashMap::new(), &[])? {
//!     conductor.register(job)?;
//! }
//! conductor.execute().await?;
//! # Ok(())
//! # }
//! ```

// Re-exports from core
#[cfg(feature = "core")]
pub use kiln_core::{self as core, prelude as core_prelude};

#[cfg(feature = "core")]
pub use kiln_core::{
    action, conductor, dependency, error, executive, job, message, progress_tracker, templating,
    error::Result,
};

// Re-exports from schemas
pub use kiln_schemas::{self as schemas, ActionType, JobDefinition, ProgressEvent, Recipe, Step};

/// Prelude module that exports commonly used types and functions.
///
/// This module provides a convenient way to import all the necessary
/// components with a single `use kiln::prelude::*;` statement.
pub mod prelude {
    pub use kiln_schemas::{
        ActionType, DependencyDefinition, JobDefinition, ProgressEvent, Recipe, Step, Variables,
    };

    #[cfg(feature = "core")]
    pub use kiln_core::prelude::*;
}

#[cfg(feature = "core")]
pub mod api {
    //! A simpler API for common use cases

    use std::{collections::HashMap, path::Path, sync::Arc};

    use crate::prelude::*;

    /// Load the recipe at `path` and run all of its jobs, or only the `selection`.
    ///
    /// The format is picked from the file extension and progress is logged with
    /// the [`LoggingProgressTracker`].
    pub async fn run_recipe_file<P: AsRef<Path>>(
        path: P,
        params: HashMap<String, String>,
        selection: &[String],
    ) -> crate::Result<()> {
        let path = path.as_ref();
        let recipe = Recipe::from_file(path, format_from_path(path), params.clone())?;

        let mut conductor = Conductor::new().with_tracker(Arc::new(LoggingProgressTracker));
        for job in jobs_from_recipe(&recipe, &params, selection)? {
            conductor.register(job)?;
        }

        conductor.execute().await?;
        Ok(())
    }
}
