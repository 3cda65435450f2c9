//! Progress event types for tracking a conductor run

use serde::{Deserialize, Serialize};

/// Progress events emitted while jobs are coordinated
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// All jobs have been launched
    Started {
        /// Number of jobs launched
        jobs: usize,
    },
    /// A job reported progress
    Status {
        /// Name of the reporting job
        owner: String,
        /// Progress text
        text: String,
    },
    /// A job produced output
    Output {
        /// Name of the reporting job
        owner: String,
        /// Captured output
        text: String,
    },
    /// A job finished successfully
    JobCompleted {
        /// Name of the finished job
        owner: String,
        /// Jobs still running
        remaining: usize,
    },
    /// A job failed and every other job was cancelled
    Aborted {
        /// Name of the failed job
        owner: String,
        /// Rendered failure
        error: String,
    },
    /// Every job finished successfully
    Completed {
        /// Total duration of the run
        duration_ms: u64,
    },
}
