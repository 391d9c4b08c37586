//! P0: restart after an interrupted run.
//! Progress written before the interruption is honored and nothing is downloaded twice.

use history_core::{ProjectLog, ProjectRunner, RunOutcome};
use tokio_util::sync::CancellationToken;

use crate::support::scripted_source::ScriptedSource;
use crate::support::{Workspace, project};

#[tokio::test(start_paused = true)]
async fn p0_restart_after_interrupt_resumes_at_next_index() {
    let ws = Workspace::new();
    let demo = project("demo");
    let cancel = CancellationToken::new();
    let source = ScriptedSource::new()
        .project(&demo.url, 8)
        .cancel_on_fetch(3, cancel.clone());

    {
        let mut progress = ws.load_progress(std::slice::from_ref(&demo));
        let runner =
            ProjectRunner::new(&source, "c", &ws.artifacts).with_cancellation(cancel);
        let report = runner
            .run(&demo, &mut progress, ProjectLog::disabled("demo"))
            .await;
        assert_eq!(report.outcome, RunOutcome::Cancelled);
    }
    assert_eq!(ws.progress_on_disk()["demo"], 3);

    // Fresh process: new store loaded from disk, new token.
    let mut progress = ws.load_progress(std::slice::from_ref(&demo));
    let runner = ProjectRunner::new(&source, "c", &ws.artifacts);
    let report = runner
        .run(&demo, &mut progress, ProjectLog::disabled("demo"))
        .await;

    assert!(report.is_completed());
    assert_eq!(source.attempts_for(&demo.url), vec![0, 1, 2, 3, 4, 5, 6]);
    assert_eq!(progress.last_completed("demo"), 6);
}

#[tokio::test(start_paused = true)]
async fn p0_stale_temp_files_do_not_affect_resume() {
    let ws = Workspace::new();
    let demo = project("demo");
    ws.seed_progress(r#"{ "demo": 1 }"#);
    // Leftovers of a crash mid-write.
    std::fs::write(ws.dir.path().join(".progress.json.tmp.4242"), b"{ \"demo\": 9").expect("tmp");
    std::fs::write(ws.output_dir().join("demo_v2.zip.part"), b"half").expect("part");

    let mut progress = ws.load_progress(std::slice::from_ref(&demo));
    let source = ScriptedSource::new().project(&demo.url, 4);
    let runner = ProjectRunner::new(&source, "c", &ws.artifacts);
    let report = runner
        .run(&demo, &mut progress, ProjectLog::disabled("demo"))
        .await;

    assert!(report.is_completed());
    assert_eq!(source.attempts_for(&demo.url), vec![2]);
    assert_eq!(ws.progress_on_disk()["demo"], 2);
    assert!(ws.output_dir().join("demo_v2.zip").exists());
    assert!(!ws.output_dir().join("demo_v2.zip.part").exists());
}

#[tokio::test(start_paused = true)]
async fn p0_redownload_overwrites_existing_artifact() {
    let ws = Workspace::new();
    let demo = project("demo");
    // Artifact present but checkpoint not advanced: crash between write and checkpoint.
    std::fs::write(ws.output_dir().join("demo_v0.zip"), b"stale").expect("stale");

    let mut progress = ws.load_progress(std::slice::from_ref(&demo));
    let source = ScriptedSource::new().project(&demo.url, 2);
    let runner = ProjectRunner::new(&source, "c", &ws.artifacts);
    runner
        .run(&demo, &mut progress, ProjectLog::disabled("demo"))
        .await;

    let stored = std::fs::read(ws.output_dir().join("demo_v0.zip")).expect("read");
    assert_ne!(stored, b"stale");
    assert_eq!(progress.last_completed("demo"), 0);
}

#[tokio::test(start_paused = true)]
async fn p0_unwritable_output_dir_skips_versions_without_advancing() {
    let ws = Workspace::new();
    let demo = project("demo");
    let missing = history_core::ArtifactStore::new(ws.dir.path().join("does-not-exist"));
    let mut progress = ws.load_progress(std::slice::from_ref(&demo));
    let source = ScriptedSource::new().project(&demo.url, 3);

    let runner = ProjectRunner::new(&source, "c", &missing);
    let report = runner
        .run(&demo, &mut progress, ProjectLog::disabled("demo"))
        .await;

    assert!(report.is_completed());
    assert_eq!(report.failed_indices, vec![0, 1]);
    assert_eq!(report.downloaded, 0);
    assert_eq!(progress.last_completed("demo"), -1);
}
