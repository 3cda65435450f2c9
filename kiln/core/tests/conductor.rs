//! Coordination tests for the conductor using scripted jobs.

mod common;

use std::{
    sync::{atomic::Ordering, Arc},
    time::Duration,
};

use common::*;
use kiln_core::conductor::{Conductor, ConductorError};
use kiln_schemas::ProgressEvent;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

fn conductor_with(jobs: Vec<ScriptedJob>) -> (Conductor, Arc<RecordingTracker>) {
    let tracker = Arc::new(RecordingTracker::default());
    let mut conductor = Conductor::new().with_tracker(tracker.clone());
    for job in jobs {
        conductor.register(job).unwrap();
    }
    (conductor, tracker)
}

#[tokio::test]
async fn all_jobs_succeed() {
    let (mut conductor, tracker) = conductor_with(vec![
        ScriptedJob::succeeding("job1"),
        ScriptedJob::succeeding("job2"),
        ScriptedJob::succeeding("job3"),
    ]);

    conductor.run().unwrap();
    conductor.coordinate().await.unwrap();

    assert!(conductor.pending_jobs().is_empty());

    let events = tracker.events();
    assert_eq!(events.first(), Some(&ProgressEvent::Started { jobs: 3 }));
    assert!(matches!(events.last(), Some(ProgressEvent::Completed { .. })));
}

#[tokio::test]
async fn first_error_cancels_the_group() {
    let job1 = ScriptedJob::new("job1", vec![Script::Hang]);
    let job3 = ScriptedJob::new("job3", vec![Script::Hang]);
    let (job1_cancelled, job3_cancelled) = (job1.cancelled_flag(), job3.cancelled_flag());

    let (mut conductor, tracker) = conductor_with(vec![
        job1,
        ScriptedJob::new("job2", vec![Script::Status("starting"), Script::Error("boom")]),
        job3,
    ]);

    let err = conductor.execute().await.unwrap_err();

    assert!(err.to_string().contains("boom"));
    assert!(matches!(err, ConductorError::JobFailed { ref owner, .. } if owner == "job2"));
    let source = std::error::Error::source(&err).unwrap();
    assert_eq!(source.to_string(), "boom");
    assert!(conductor.cancellation_token().unwrap().is_cancelled());
    assert_eq!(conductor.pending_jobs(), vec!["job1", "job2", "job3"]);

    assert!(tracker
        .events()
        .iter()
        .any(|event| matches!(event, ProgressEvent::Aborted { owner, .. } if owner == "job2")));

    // the hanging jobs notice the cancellation on their own
    tokio::time::timeout(Duration::from_secs(5), async {
        while !(job1_cancelled.load(Ordering::SeqCst) && job3_cancelled.load(Ordering::SeqCst)) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn error_after_completed_job_keeps_the_rest_registered() {
    let first_done = Arc::new(Notify::new());

    let (mut conductor, _) = conductor_with(vec![
        ScriptedJob::new("early", vec![Script::Done, Script::Signal(first_done.clone())]),
        ScriptedJob::new("failing", vec![Script::WaitFor(first_done), Script::Error("disk full")]),
        ScriptedJob::new("late", vec![Script::Hang]),
    ]);

    let err = conductor.execute().await.unwrap_err();

    assert!(err.to_string().contains("disk full"));
    assert_eq!(conductor.pending_jobs(), vec!["failing", "late"]);
}

#[tokio::test]
async fn completes_only_once_every_job_is_done() {
    let (mut conductor, tracker) = conductor_with(vec![
        ScriptedJob::new(
            "job1",
            vec![Script::Status("one"), Script::Output("two"), Script::Done],
        ),
        ScriptedJob::new("job2", vec![Script::Done]),
        ScriptedJob::new("job3", vec![Script::Output("three"), Script::Done]),
        ScriptedJob::new("job4", vec![Script::Done]),
    ]);

    conductor.execute().await.unwrap();

    let events = tracker.events();
    let remaining: Vec<usize> = events
        .iter()
        .filter_map(|event| match event {
            ProgressEvent::JobCompleted { remaining, .. } => Some(*remaining),
            _ => None,
        })
        .collect();
    assert_eq!(remaining, vec![3, 2, 1, 0]);
    assert!(matches!(events.last(), Some(ProgressEvent::Completed { .. })));
}

#[tokio::test]
async fn waits_while_a_job_is_still_running() {
    let (mut conductor, _) = conductor_with(vec![
        ScriptedJob::succeeding("quick"),
        ScriptedJob::new("stuck", vec![Script::Hang]),
    ]);

    conductor.run().unwrap();
    let coordinated = tokio::time::timeout(Duration::from_millis(200), conductor.coordinate()).await;

    assert!(coordinated.is_err(), "coordinate returned before every job was done");
}

#[tokio::test]
async fn per_job_order_is_preserved() {
    let (mut conductor, tracker) = conductor_with(vec![
        ScriptedJob::new(
            "job1",
            vec![
                Script::Output("a"),
                Script::Output("b"),
                Script::Output("c"),
                Script::Done,
            ],
        ),
        ScriptedJob::new(
            "job2",
            vec![Script::Output("x"), Script::Output("y"), Script::Done],
        ),
    ]);

    conductor.execute().await.unwrap();

    let outputs = |job: &str| -> Vec<String> {
        tracker
            .events()
            .into_iter()
            .filter_map(|event| match event {
                ProgressEvent::Output { owner, text } if owner == job => Some(text),
                _ => None,
            })
            .collect()
    };
    assert_eq!(outputs("job1"), vec!["a", "b", "c"]);
    assert_eq!(outputs("job2"), vec!["x", "y"]);
}

#[tokio::test]
async fn jobless_run_fails() {
    let mut conductor = Conductor::new();
    assert!(matches!(conductor.run(), Err(ConductorError::Jobless)));
    assert!(matches!(
        conductor.execute().await,
        Err(ConductorError::Jobless)
    ));
    assert!(conductor.cancellation_token().is_none());
}

/// A job that ends without sending done closes the channel once every sender
/// is gone; coordination then ends successfully with the job still pending.
#[tokio::test]
#[tracing_test::traced_test]
async fn closed_channel_ends_coordination_without_error() {
    let (mut conductor, tracker) = conductor_with(vec![ScriptedJob::new(
        "silent",
        vec![Script::Status("leaving early")],
    )]);

    conductor.execute().await.unwrap();

    assert_eq!(conductor.pending_jobs(), vec!["silent"]);
    assert!(!tracker
        .events()
        .iter()
        .any(|event| matches!(event, ProgressEvent::Completed { .. })));
    assert!(logs_contain("Coordination channel closed"));
}

#[tokio::test]
async fn external_cancellation_ends_coordination() {
    let token = CancellationToken::new();
    let job = ScriptedJob::new("stuck", vec![Script::Hang]);
    let cancelled = job.cancelled_flag();

    let mut conductor = Conductor::new().with_cancellation(token.clone());
    conductor.register(job).unwrap();
    conductor.run().unwrap();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    conductor.coordinate().await.unwrap();
    canceller.await.unwrap();

    assert_eq!(conductor.pending_jobs(), vec!["stuck"]);
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cancelled.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
}
