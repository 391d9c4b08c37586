//! P0: rate-limit responses trigger a session-wide backoff and resume at the same index.

use std::time::Duration;

use history_core::{BackoffPolicy, ProjectLog, ProjectRunner, SourceError};
use tokio::time::Instant;

use crate::support::scripted_source::ScriptedSource;
use crate::support::{Workspace, project};

#[tokio::test(start_paused = true)]
async fn p0_rate_limit_waits_base_delay_then_retries_same_index() {
    let ws = Workspace::new();
    ws.seed_progress(r#"{ "demo": 2 }"#);
    let demo = project("demo");
    let mut progress = ws.load_progress(std::slice::from_ref(&demo));
    let source = ScriptedSource::new()
        .project(&demo.url, 6)
        .fail_fetch(&demo.url, 3, SourceError::RateLimited);

    let started = Instant::now();
    let runner = ProjectRunner::new(&source, "c", &ws.artifacts);
    let report = runner
        .run(&demo, &mut progress, ProjectLog::disabled("demo"))
        .await;

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(60), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(61), "elapsed {elapsed:?}");
    assert_eq!(report.rate_limited, 1);
    assert_eq!(report.sessions, 2);
    assert_eq!(source.sessions_closed(), 2);
    assert_eq!(source.attempts_for(&demo.url), vec![3, 3, 4]);
    assert_eq!(progress.last_completed("demo"), 4);
}

#[tokio::test(start_paused = true)]
async fn p0_repeated_rate_limits_double_up_to_ceiling() {
    let ws = Workspace::new();
    let demo = project("demo");
    let mut progress = ws.load_progress(std::slice::from_ref(&demo));
    let source = ScriptedSource::new().project(&demo.url, 2).fail_fetch_times(
        &demo.url,
        0,
        SourceError::RateLimited,
        4,
    );

    let started = Instant::now();
    let runner = ProjectRunner::new(&source, "c", &ws.artifacts)
        .with_backoff(BackoffPolicy::new(Duration::from_secs(10), Duration::from_secs(30)));
    let report = runner
        .run(&demo, &mut progress, ProjectLog::disabled("demo"))
        .await;

    // 10 + 20 + 30 + 30
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(90), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(91), "elapsed {elapsed:?}");
    assert_eq!(report.rate_limited, 4);
    assert_eq!(progress.last_completed("demo"), 0);
}

#[tokio::test(start_paused = true)]
async fn p0_backoff_is_not_reset_by_progress_within_a_project() {
    let ws = Workspace::new();
    let demo = project("demo");
    let mut progress = ws.load_progress(std::slice::from_ref(&demo));
    let source = ScriptedSource::new()
        .project(&demo.url, 4)
        .fail_fetch(&demo.url, 0, SourceError::RateLimited)
        .fail_fetch(&demo.url, 2, SourceError::RateLimited);

    let started = Instant::now();
    let runner = ProjectRunner::new(&source, "c", &ws.artifacts);
    runner
        .run(&demo, &mut progress, ProjectLog::disabled("demo"))
        .await;

    // 60 for the first hit, 120 for the second.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(180), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(181), "elapsed {elapsed:?}");
    assert_eq!(source.attempts_for(&demo.url), vec![0, 0, 1, 2, 2]);
}
