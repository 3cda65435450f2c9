use kiln_schemas::ProgressEvent;
use tracing::{error, info, instrument};

/// A trait for handling progress events while jobs are coordinated.
///
/// Implement this trait to build custom monitoring for a kiln run, for example
/// to forward job output to a UI or to collect timings.
///
/// # Examples
///
/// ```rust
/// use kiln_core::progress_tracker::ProgressTracker;
/// use kiln_schemas::ProgressEvent;
/// use std::sync::Mutex;
///
/// #[derive(Default)]
/// struct FailureCollector {
///     failed: Mutex<Vec<String>>,
/// }
///
/// impl ProgressTracker for FailureCollector {
///     fn on_progress(&self, event: ProgressEvent) {
///         if let ProgressEvent::Aborted { owner, .. } = event {
///             self.failed.lock().unwrap().push(owner);
///         }
///     }
/// }
/// ```
pub trait ProgressTracker: Send + Sync {
    /// Called for every coordination event.
    ///
    /// Events are reported from the conductor's loop in the order its messages
    /// were received, so implementations should return quickly.
    fn on_progress(&self, event: ProgressEvent);
}

/// Progress tracker logging every event with the `tracing` crate.
///
/// This is the default tracker used by the `kiln` binary.
#[derive(Debug)]
pub struct LoggingProgressTracker;

impl ProgressTracker for LoggingProgressTracker {
    #[instrument(skip_all)]
    fn on_progress(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { jobs } => {
                info!("🚀 Started {jobs} job(s)");
            }
            ProgressEvent::Status { owner, text } => {
                info!("⚙️  [{owner}] {text}");
            }
            ProgressEvent::Output { owner, text } => {
                info!("📋 [{owner}] {text}");
            }
            ProgressEvent::JobCompleted { owner, remaining } => {
                info!("✅ Completed job: {owner} ({remaining} remaining)");
            }
            ProgressEvent::Aborted { owner, error } => {
                error!("❗ Job {owner} failed, cancelling the remaining jobs: {error}");
            }
            ProgressEvent::Completed { duration_ms } => {
                info!(
                    "🎉 All jobs completed (total time: {:.2}s)",
                    duration_ms as f64 / 1000.0
                );
            }
        }
    }
}
