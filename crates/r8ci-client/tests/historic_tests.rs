
use harness::{FakeVcs, TestContext};
use r8ci_client::error::ClientError;
use r8ci_client::{HistoricEvent, HistoricOptions, HistoricScheduler, LocalStore};
use r8ci_core::errors::HistoricError;
use r8ci_core::model::{ArtifactLayout, CommitHash};
use std::fs;
use std::sync::mpsc;
use std::sync::Arc;

fn scheduler(context: &TestContext, vcs: FakeVcs) -> HistoricScheduler {
    HistoricScheduler::new(
        Arc::new(LocalStore::new(&context.store_dir).unwrap()),
        Arc::new(vcs),
        ArtifactLayout::new("main", "r8.jar"),
        context.test_root.join("libs/r8.jar"),
    )
}

fn hashes(names: &[&str]) -> Vec<CommitHash> {
    names.iter().map(|n| CommitHash::new(n)).collect()
}

/// Five commits c4 (newest) .. c0, with artifacts for c4, c2 and c0.
fn five_commits_three_artifacts() -> TestContext {
    let context = TestContext::new();
    for name in ["c4", "c2", "c0"] {
        context.write_blob(&format!("main/{}/r8.jar", name), &format!("jar-{}", name));
    }
    context
}

#[test]
fn test_enumerate_includes_bottom() {
    let context = TestContext::new();
    let scheduler = scheduler(&context, FakeVcs::with_history(5));

    let commits = scheduler.enumerate_commits("c3", "c1").unwrap();

    let names: Vec<_> = commits.iter().map(|c| c.git_hash().as_str()).collect();
    assert_eq!(names, vec!["c3", "c2", "c1"]);
    assert_eq!(commits[0].destination(), "main/c3/r8.jar");
    assert_eq!(commits[0].timestamp(), 1_700_000_003);
}

#[test]
fn test_bottom_outside_history_is_an_error() {
    let context = TestContext::new();
    let scheduler = scheduler(&context, FakeVcs::with_history(5));

    let err = scheduler.enumerate_commits("c2", "c3").unwrap_err();

    assert!(matches!(
        err,
        ClientError::Historic(HistoricError::BottomNotFound { ref top, ref bottom })
            if top == "c2" && bottom == "c3"
    ));
    assert!(err.to_string().contains("merge commit"));
}

#[test]
fn test_visits_available_commits_in_permuted_order() {
    let context = five_commits_three_artifacts();
    let scheduler = scheduler(&context, FakeVcs::with_history(5));
    let download = context.test_root.join("libs/r8.jar");

    let available = scheduler
        .available_commits(scheduler.enumerate_commits("c4", "c0").unwrap())
        .unwrap();
    assert_eq!(available.len(), 3);

    let mut seen = Vec::new();
    let summary = scheduler
        .run("c4", "c0", &HistoricOptions::default(), |commit| {
            let jar = fs::read_to_string(&download).unwrap();
            seen.push((commit.git_hash().to_string(), jar));
            Ok(())
        })
        .unwrap();

    assert_eq!(summary.enumerated, 5);
    assert_eq!(summary.available, 3);
    assert_eq!(summary.visited, hashes(&["c2", "c4", "c0"]));
    assert!(summary.skipped.is_empty());
    assert_eq!(
        seen,
        vec![
            ("c2".to_string(), "jar-c2".to_string()),
            ("c4".to_string(), "jar-c4".to_string()),
            ("c0".to_string(), "jar-c0".to_string()),
        ]
    );
}

#[test]
fn test_max_runs_limits_visits() {
    let context = five_commits_three_artifacts();
    let scheduler = scheduler(&context, FakeVcs::with_history(5));
    let options = HistoricOptions {
        max_runs: Some(2),
        ..Default::default()
    };

    let summary = scheduler.run("c4", "c0", &options, |_| Ok(())).unwrap();

    assert_eq!(summary.visited, hashes(&["c2", "c4"]));
}

#[test]
fn test_missing_artifact_is_skipped() {
    let context = TestContext::new();
    context.write_blob("main/c4/r8.jar", "jar-c4");
    context.write_blob("main/c2/r8lib.jar", "not the artifact");
    context.write_blob("main/c0/r8.jar", "jar-c0");
    let scheduler = scheduler(&context, FakeVcs::with_history(5));

    let (sender, receiver) = mpsc::channel();
    let options = HistoricOptions {
        max_runs: None,
        event_sender: Some(sender),
    };
    let summary = scheduler.run("c4", "c0", &options, |_| Ok(())).unwrap();
    drop(options);

    assert_eq!(summary.visited, hashes(&["c4", "c0"]));
    assert_eq!(summary.skipped, hashes(&["c2"]));

    let events: Vec<HistoricEvent> = receiver.iter().collect();
    assert_eq!(
        events[0],
        HistoricEvent::Enumerated {
            total: 5,
            available: 3
        }
    );
    assert!(matches!(
        &events[1],
        HistoricEvent::Skipped { commit } if commit.git_hash().as_str() == "c2"
    ));
    let finished = events
        .iter()
        .filter(|e| matches!(e, HistoricEvent::Finished { .. }))
        .count();
    assert_eq!(finished, 2);
}

#[test]
fn test_action_failure_stops_the_run() {
    let context = five_commits_three_artifacts();
    let scheduler = scheduler(&context, FakeVcs::with_history(5));

    let result = scheduler.run("c4", "c0", &HistoricOptions::default(), |_| {
        Err(ClientError::BlobNotFound("boom".to_string()))
    });

    assert!(matches!(result, Err(ClientError::BlobNotFound(_))));
}
