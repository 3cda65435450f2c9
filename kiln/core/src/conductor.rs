//! Fan-out of jobs and fan-in of their messages.
//!
//! [`Conductor::run`] launches every registered job as its own task, all sharing one
//! bounded channel and one cancellation token. [`Conductor::coordinate`] is the only
//! reader of that channel and the only place jobs are removed from the registry:
//!
//! - a done message removes its owner, and an empty registry ends the run successfully
//! - the first error message cancels every other job and ends the run with that error
//! - anything else is reported as progress
//!
//! Cancellation is cooperative. A job that never sends done nor error keeps
//! [`Conductor::coordinate`] waiting, no timeout is applied.

use std::{collections::HashMap, sync::Arc, time::Instant};

use kiln_schemas::ProgressEvent;
use miette::Diagnostic;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

use crate::{
    job::Job,
    message::{JobFailure, Message},
    progress_tracker::ProgressTracker,
};

const MIN_CHANNEL_CAPACITY: usize = 4;

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum ConductorError {
    #[error("jobless: no jobs registered")]
    #[diagnostic(
        code(kiln::conductor::jobless),
        help("Declare at least one job in the recipe or check the --job selection")
    )]
    Jobless,

    #[error("job '{0}' is already registered")]
    #[diagnostic(code(kiln::conductor::duplicate_job))]
    DuplicateJob(String),

    #[error("coordination requested before the jobs were started")]
    #[diagnostic(code(kiln::conductor::not_started))]
    NotStarted,

    #[error("jobs were already started")]
    #[diagnostic(code(kiln::conductor::already_started))]
    AlreadyStarted,

    #[error("job '{owner}' failed: {source}")]
    #[diagnostic(code(kiln::conductor::job_failed))]
    JobFailed {
        owner: String,
        #[source]
        source: JobFailure,
    },
}

/// Outcome of a received message for the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    NotDone,
    JobDone,
    AllCompleted,
}

/// Runs a group of jobs concurrently and stops them all on the first failure
#[derive(Default)]
pub struct Conductor {
    jobs: HashMap<String, Arc<dyn Job>>,
    cancellation: Option<CancellationToken>,
    receiver: Option<mpsc::Receiver<Message>>,
    tracker: Option<Arc<dyn ProgressTracker>>,
    started: Option<Instant>,
}

impl Conductor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report coordination events to `tracker`
    pub fn with_tracker(mut self, tracker: Arc<dyn ProgressTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Share `token` with the jobs instead of creating one on [`Conductor::run`].
    ///
    /// Cancelling it from outside ends [`Conductor::coordinate`] without an error.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Add a job to the registry, names must be unique
    pub fn register(&mut self, job: impl Job + 'static) -> Result<(), ConductorError> {
        let name = job.name().to_string();
        if self.jobs.contains_key(&name) {
            return Err(ConductorError::DuplicateJob(name));
        }

        debug!("Registered job {name}");
        self.jobs.insert(name, Arc::new(job));
        Ok(())
    }

    /// Names of the jobs that have not completed, sorted
    pub fn pending_jobs(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.keys().cloned().collect();
        names.sort();
        names
    }

    /// Token shared with the jobs, available once [`Conductor::run`] was called
    /// or a token was supplied with [`Conductor::with_cancellation`]
    pub fn cancellation_token(&self) -> Option<CancellationToken> {
        self.cancellation.clone()
    }

    /// Launch every registered job as a task and return immediately.
    ///
    /// Must be called from within a Tokio runtime. Nothing is created or launched
    /// when the registry is empty.
    pub fn run(&mut self) -> Result<(), ConductorError> {
        if self.jobs.is_empty() {
            return Err(ConductorError::Jobless);
        }
        if self.started.is_some() {
            return Err(ConductorError::AlreadyStarted);
        }

        let capacity = (self.jobs.len() * 2).max(MIN_CHANNEL_CAPACITY);
        let (tx, rx) = mpsc::channel(capacity);
        let ctx = self
            .cancellation
            .get_or_insert_with(CancellationToken::new)
            .clone();

        for (name, job) in self.jobs.iter() {
            let job = Arc::clone(job);
            let ctx = ctx.clone();
            let tx = tx.clone();

            tokio::spawn(
                async move { job.run(ctx, tx).await }.instrument(info_span!("job", name = %name)),
            );
        }

        self.receiver = Some(rx);
        self.started = Some(Instant::now());

        info!("Launched {} job(s)", self.jobs.len());
        self.report(ProgressEvent::Started {
            jobs: self.jobs.len(),
        });

        Ok(())
    }

    /// Consume job messages until every job is done, a job fails, or the run is cancelled.
    ///
    /// Returns `Ok` when all jobs completed, when the token was cancelled from
    /// outside, or when every sender went away. The first job error cancels the
    /// token and is returned as [`ConductorError::JobFailed`].
    #[instrument(skip_all)]
    pub async fn coordinate(&mut self) -> Result<(), ConductorError> {
        let mut receiver = self.receiver.take().ok_or(ConductorError::NotStarted)?;
        let ctx = self.cancellation.clone().ok_or(ConductorError::NotStarted)?;

        loop {
            if ctx.is_cancelled() {
                debug!("Run was cancelled, leaving coordination");
                return Ok(());
            }

            let message = tokio::select! {
                _ = ctx.cancelled() => {
                    debug!("Run was cancelled, leaving coordination");
                    return Ok(());
                }
                message = receiver.recv() => message,
            };

            let Some(message) = message else {
                warn!(
                    pending = ?self.pending_jobs(),
                    "Coordination channel closed before every job completed"
                );
                return Ok(());
            };

            match self.check_done(&message) {
                JobState::AllCompleted => {
                    self.report_completed();
                    return Ok(());
                }
                JobState::JobDone => continue,
                JobState::NotDone => {}
            }

            self.check_error(&message, &ctx)?;
            self.check_status(&message);
        }
    }

    /// [`Conductor::run`] followed by [`Conductor::coordinate`]
    pub async fn execute(&mut self) -> Result<(), ConductorError> {
        self.run()?;
        self.coordinate().await
    }

    fn check_done(&mut self, message: &Message) -> JobState {
        if !message.is_done() {
            return JobState::NotDone;
        }

        let Some(owner) = message.owner() else {
            warn!("Ignoring done message without owner");
            return JobState::NotDone;
        };

        if self.jobs.remove(&owner).is_none() {
            warn!("Ignoring done message from unknown job {owner}");
            return JobState::NotDone;
        }

        let remaining = self.jobs.len();
        debug!("Job {owner} completed, {remaining} remaining");
        self.report(ProgressEvent::JobCompleted { owner, remaining });

        if remaining == 0 {
            JobState::AllCompleted
        } else {
            JobState::JobDone
        }
    }

    fn check_error(&self, message: &Message, ctx: &CancellationToken) -> Result<(), ConductorError> {
        let Some(source) = message.error() else {
            return Ok(());
        };

        ctx.cancel();

        let owner = message.owner().unwrap_or_default();
        error!("Job {owner} failed: {source}");
        self.report(ProgressEvent::Aborted {
            owner: owner.clone(),
            error: source.to_string(),
        });

        Err(ConductorError::JobFailed { owner, source })
    }

    fn check_status(&self, message: &Message) {
        let owner = message.owner().unwrap_or_default();

        if let Some(text) = message.status() {
            debug!("[{owner}] {text}");
            self.report(ProgressEvent::Status {
                owner: owner.clone(),
                text,
            });
        }

        if let Some(text) = message.output() {
            debug!("[{owner}] {text}");
            self.report(ProgressEvent::Output { owner, text });
        }
    }

    fn report_completed(&self) {
        let duration_ms = self
            .started
            .map(|started| started.elapsed().as_millis() as u64)
            .unwrap_or_default();

        info!("All jobs completed");
        self.report(ProgressEvent::Completed { duration_ms });
    }

    fn report(&self, event: ProgressEvent) {
        if let Some(tracker) = self.tracker.as_ref() {
            tracker.on_progress(event);
        }
    }
}
