//! Sequential step runner of a single job.

use kiln_schemas::{Step, Variables};
use miette::Diagnostic;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    action::{Action, ActionError},
    templating::{substitute, TemplateError},
};

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum ExecutiveError {
    #[error("command execution failed: (Step {step}) failed to format {field}: {source}")]
    #[diagnostic(
        code(kiln::executive::format),
        help("Check that every variable used by the step is defined or saved by an earlier step")
    )]
    Format {
        step: usize,
        field: &'static str,
        #[source]
        source: TemplateError,
    },

    #[error("command execution failed: (Step {step}) {source}")]
    #[diagnostic(code(kiln::executive::step))]
    Step {
        step: usize,
        name: String,
        #[source]
        source: ActionError,
    },

    #[error("command execution cancelled before step {step}")]
    #[diagnostic(code(kiln::executive::cancelled))]
    Cancelled { step: usize },
}

impl ExecutiveError {
    /// 1-based position of the step that failed
    pub fn step(&self) -> usize {
        match self {
            ExecutiveError::Format { step, .. }
            | ExecutiveError::Step { step, .. }
            | ExecutiveError::Cancelled { step } => *step,
        }
    }
}

type Report<'a> = Box<dyn FnMut(&str) + Send + 'a>;

/// Runs the steps of one job in order, stopping at the first failure.
///
/// Step fields are resolved against `variables` right before the step runs, and
/// values saved by a step are written back into `variables`. The map belongs to
/// this executive for the duration of [`Executive::exec`].
pub struct Executive<'a> {
    steps: &'a [Step],
    variables: &'a mut Variables,
    stdout: Report<'a>,
    stderr: Report<'a>,
    cancellation: Option<CancellationToken>,
}

impl<'a> Executive<'a> {
    pub fn new(steps: &'a [Step], variables: &'a mut Variables) -> Self {
        Self {
            steps,
            variables,
            stdout: Box::new(|text: &str| info!("{text}")),
            stderr: Box::new(|text: &str| warn!("{text}")),
            cancellation: None,
        }
    }

    /// Receives the resolved `to_stdout` text of each step
    pub fn with_stdout(mut self, report: impl FnMut(&str) + Send + 'a) -> Self {
        self.stdout = Box::new(report);
        self
    }

    /// Receives the resolved `to_stderr` text of each step
    pub fn with_stderr(mut self, report: impl FnMut(&str) + Send + 'a) -> Self {
        self.stderr = Box::new(report);
        self
    }

    /// Stop before the next step once `token` is cancelled.
    ///
    /// A step that is already running is not interrupted.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Run every step in order
    #[instrument(skip_all, fields(steps = self.steps.len()))]
    pub fn exec(&mut self) -> Result<(), ExecutiveError> {
        let steps = self.steps;

        for (index, step) in steps.iter().enumerate() {
            let position = index + 1;

            if self
                .cancellation
                .as_ref()
                .is_some_and(|token| token.is_cancelled())
            {
                debug!("Cancelled before step {position}");
                return Err(ExecutiveError::Cancelled { step: position });
            }

            self.exec_step(position, step)?;
        }

        Ok(())
    }

    fn exec_step(&mut self, position: usize, step: &Step) -> Result<(), ExecutiveError> {
        let name = if step.name.is_empty() {
            step.action.to_string()
        } else {
            step.name.clone()
        };
        debug!("(Step {position}) {name}");

        let mut action = Action::new(name.clone(), step.action)
            .with_location(self.format(position, "location", &step.location)?)
            .with_source(self.format(position, "source", &step.source)?)
            .with_target(self.format(position, "target", &step.target)?);
        action.save = step.save.clone();
        action.save_stderr = step.save_stderr;

        let failed = |source: ActionError| ExecutiveError::Step {
            step: position,
            name: name.clone(),
            source,
        };

        action.init().map_err(failed)?;
        let output = action.run().map_err(failed)?;

        if !action.save.is_empty() {
            if let Some(value) = output.saved_value(action.save_stderr) {
                debug!("Saved {} = {value:?}", action.save);
                self.variables.insert(action.save.clone(), value);
            }
        }

        if !step.to_stdout.is_empty() {
            let text = self.format(position, "to_stdout", &step.to_stdout)?;
            if !text.is_empty() {
                (self.stdout)(&text);
            }
        }

        if !step.to_stderr.is_empty() {
            let text = self.format(position, "to_stderr", &step.to_stderr)?;
            if !text.is_empty() {
                (self.stderr)(&text);
            }
        }

        Ok(())
    }

    fn format(&self, step: usize, field: &'static str, raw: &str) -> Result<String, ExecutiveError> {
        substitute(raw, self.variables).map_err(|source| ExecutiveError::Format {
            step,
            field,
            source,
        })
    }
}
