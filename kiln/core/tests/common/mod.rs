//! Scripted jobs and a recording tracker shared by the integration tests.

#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Instant,
};

use async_trait::async_trait;
use kiln_core::{
    job::{Job, Reporter},
    message::Message,
    progress_tracker::ProgressTracker,
};
use kiln_schemas::ProgressEvent;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

/// One scripted action of a [`ScriptedJob`]
#[derive(Clone)]
pub enum Script {
    Status(&'static str),
    Output(&'static str),
    Error(&'static str),
    Done,
    /// Wake whoever waits on the notify
    Signal(Arc<Notify>),
    /// Wait until the notify fires
    WaitFor(Arc<Notify>),
    /// Block until the run is cancelled
    Hang,
}

/// Job replaying a fixed script
pub struct ScriptedJob {
    name: String,
    script: Vec<Script>,
    cancelled: Arc<AtomicBool>,
}

impl ScriptedJob {
    pub fn new(name: &str, script: Vec<Script>) -> Self {
        Self {
            name: name.to_string(),
            script,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn succeeding(name: &str) -> Self {
        Self::new(name, vec![Script::Status("working"), Script::Done])
    }

    /// Set once the job observed the cancellation while hanging
    pub fn cancelled_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }
}

#[async_trait]
impl Job for ScriptedJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: CancellationToken, tx: mpsc::Sender<Message>) {
        let reporter = Reporter::new(&self.name, ctx.clone(), tx);

        for step in self.script.iter() {
            match step {
                Script::Status(text) => {
                    reporter.status(*text).await;
                }
                Script::Output(text) => {
                    reporter.output(*text).await;
                }
                Script::Error(text) => {
                    reporter.error(*text).await;
                }
                Script::Done => {
                    reporter.done().await;
                }
                Script::Signal(notify) => notify.notify_one(),
                Script::WaitFor(notify) => notify.notified().await,
                Script::Hang => {
                    ctx.cancelled().await;
                    self.cancelled.store(true, Ordering::SeqCst);
                    return;
                }
            }
        }
    }
}

/// Tracker keeping every event it receives with the moment it arrived
#[derive(Default)]
pub struct RecordingTracker {
    events: Mutex<Vec<(ProgressEvent, Instant)>>,
}

impl RecordingTracker {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.timed_events().into_iter().map(|(event, _)| event).collect()
    }

    pub fn timed_events(&self) -> Vec<(ProgressEvent, Instant)> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressTracker for RecordingTracker {
    fn on_progress(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push((event, Instant::now()));
    }
}
