//! Units of work coordinated by the [`Conductor`](crate::conductor::Conductor).
//!
//! Anything implementing [`Job`] can be registered. [`StepJob`] is the job built
//! from a recipe: it checks its dependencies up front and runs its steps through an
//! [`Executive`] on a blocking thread.

use std::{error::Error as StdError, sync::Arc};

use async_trait::async_trait;
use kiln_schemas::{JobDefinition, Recipe, Step, Variables};
use miette::Diagnostic;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::{
    dependency::{Dependency, DependencyError},
    executive::{Executive, ExecutiveError},
    message::Message,
};

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum JobError {
    #[error("job '{job}' cannot run: {source}")]
    #[diagnostic(code(kiln::job::dependency))]
    Dependency {
        job: String,
        #[source]
        #[diagnostic_source]
        source: DependencyError,
    },

    #[error("unknown job '{0}'")]
    #[diagnostic(
        code(kiln::job::unknown),
        help("Run `kiln list` to see the jobs declared in the recipe")
    )]
    UnknownJob(String),

    #[error("job '{job}' panicked: {reason}")]
    #[diagnostic(code(kiln::job::panicked))]
    Panicked { job: String, reason: String },
}

/// A concurrently runnable unit of work.
///
/// `run` reports through `tx`: any number of status and output messages, then
/// either a single done message on success or an error message on failure. Once
/// `ctx` is cancelled the job should stop sending and return.
#[async_trait]
pub trait Job: Send + Sync {
    /// Unique name, used as the registry key and as the owner of every message
    fn name(&self) -> &str;

    async fn run(&self, ctx: CancellationToken, tx: mpsc::Sender<Message>);
}

/// Sends messages on behalf of one job, giving up once the run is cancelled
#[derive(Debug, Clone)]
pub struct Reporter {
    owner: String,
    ctx: CancellationToken,
    tx: mpsc::Sender<Message>,
}

impl Reporter {
    pub fn new(owner: impl Into<String>, ctx: CancellationToken, tx: mpsc::Sender<Message>) -> Self {
        Self {
            owner: owner.into(),
            ctx,
            tx,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Send `message`, returns false if it was not delivered
    pub async fn send(&self, message: Message) -> bool {
        if self.ctx.is_cancelled() {
            return false;
        }

        tokio::select! {
            biased;
            _ = self.ctx.cancelled() => false,
            sent = self.tx.send(message) => sent.is_ok(),
        }
    }

    pub async fn status(&self, text: impl Into<String>) -> bool {
        self.send(Message::new_status(&self.owner, text)).await
    }

    pub async fn output(&self, text: impl Into<String>) -> bool {
        self.send(Message::new_output(&self.owner, text)).await
    }

    pub async fn error<E>(&self, error: E) -> bool
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        self.send(Message::new_error(&self.owner, error)).await
    }

    pub async fn done(&self) -> bool {
        self.send(Message::new_done(&self.owner)).await
    }

    /// Send an output message from a blocking thread.
    ///
    /// Must not be called from async code.
    pub fn blocking_output(&self, text: impl Into<String>) -> bool {
        if self.ctx.is_cancelled() {
            return false;
        }
        self.tx
            .blocking_send(Message::new_output(&self.owner, text))
            .is_ok()
    }
}

/// A job running a sequence of recipe steps
#[derive(Debug, Clone)]
pub struct StepJob {
    name: String,
    steps: Arc<Vec<Step>>,
    variables: Variables,
    dependencies: Vec<Dependency>,
}

impl StepJob {
    /// Build the job, checking every declared dependency.
    ///
    /// A job whose dependencies are missing is never constructed and so can
    /// never be registered.
    pub fn try_new(
        name: impl Into<String>,
        definition: &JobDefinition,
        variables: Variables,
    ) -> Result<Self, JobError> {
        let name = name.into();

        let dependencies = definition
            .dependencies
            .iter()
            .map(|declared| {
                let mut dependency = Dependency::from(declared);
                dependency.init().map(|_| dependency)
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| JobError::Dependency {
                job: name.clone(),
                source,
            })?;

        Ok(Self {
            name,
            steps: Arc::new(definition.steps.clone()),
            variables,
            dependencies,
        })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Dependencies with executables resolved to absolute paths
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }
}

#[async_trait]
impl Job for StepJob {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(job = %self.name))]
    async fn run(&self, ctx: CancellationToken, tx: mpsc::Sender<Message>) {
        let reporter = Reporter::new(&self.name, ctx.clone(), tx);

        if !reporter
            .status(format!("running {} step(s)", self.steps.len()))
            .await
        {
            return;
        }

        let steps = Arc::clone(&self.steps);
        let mut variables = self.variables.clone();
        let stdout = reporter.clone();
        let stderr = reporter.clone();

        let result = tokio::task::spawn_blocking(move || {
            Executive::new(&steps, &mut variables)
                .with_stdout(|text| {
                    stdout.blocking_output(text);
                })
                .with_stderr(|text| {
                    stderr.blocking_output(text);
                })
                .with_cancellation(ctx)
                .exec()
        })
        .await;

        match result {
            Ok(Ok(())) => {
                reporter.done().await;
            }
            Ok(Err(ExecutiveError::Cancelled { step })) => {
                debug!("Stopped before step {step}, the run was cancelled");
            }
            Ok(Err(error)) => {
                reporter.error(error).await;
            }
            Err(join_error) => {
                reporter
                    .error(JobError::Panicked {
                        job: self.name.clone(),
                        reason: join_error.to_string(),
                    })
                    .await;
            }
        }
    }
}

/// Build the jobs of `recipe`.
///
/// With an empty `selection` every job is built, otherwise only the named ones.
/// Each job gets its own copy of the recipe variables, its job variables and `params`.
pub fn jobs_from_recipe(
    recipe: &Recipe,
    params: &Variables,
    selection: &[String],
) -> Result<Vec<StepJob>, JobError> {
    if let Some(unknown) = selection
        .iter()
        .find(|name| !recipe.jobs.contains_key(name.as_str()))
    {
        return Err(JobError::UnknownJob(unknown.clone()));
    }

    recipe
        .jobs
        .iter()
        .filter(|(name, _)| selection.is_empty() || selection.contains(name))
        .map(|(name, definition)| {
            StepJob::try_new(name, definition, recipe.job_variables(name, params))
        })
        .collect()
}
