
use harness::{FakeVcs, ManualClock, ScriptedRunner, TestContext};
use r8ci_client::error::ClientError;
use r8ci_client::{
    open_channel, Bot, LocalStore, Observation, ResultArchive, StateChannel, Tester, TesterExit,
    TesterOptions, TesterStep,
};
use r8ci_core::clock::Clock;
use r8ci_core::config::ChannelLayout;
use r8ci_core::digest::SourceWatch;
use r8ci_core::errors::ProtocolError;
use r8ci_core::model::{CommitHash, MarkerName, TestCommand, TestRunStatus};
use r8ci_core::protocol::{ProtocolEvent, ProtocolState};
use std::fs;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

const POLL: Duration = Duration::from_secs(30);
const LAYOUTS: [ChannelLayout; 2] = [ChannelLayout::Record, ChannelLayout::Markers];

struct Fixture {
    context: TestContext,
    channel: Arc<dyn StateChannel>,
    archive: ResultArchive,
}

impl Fixture {
    fn new(layout: ChannelLayout) -> Self {
        let context = TestContext::new();
        let store = Arc::new(LocalStore::new(&context.store_dir).unwrap());
        let channel = open_channel(layout, store.clone(), "");
        Self {
            context,
            channel,
            archive: ResultArchive::new(store),
        }
    }

    fn bot(&self, clock: Arc<dyn Clock>) -> Bot {
        Bot::new(self.channel.clone(), self.archive.clone(), clock, POLL)
    }

    fn tester(&self, vcs: Arc<FakeVcs>, runner: Arc<ScriptedRunner>) -> Tester {
        self.tester_with(vcs, runner, Arc::new(ManualClock::new()), SourceWatch::empty())
    }

    fn tester_with(
        &self,
        vcs: Arc<FakeVcs>,
        runner: Arc<ScriptedRunner>,
        clock: Arc<dyn Clock>,
        watch: SourceWatch,
    ) -> Tester {
        let options = TesterOptions {
            repo: self.context.repo_dir.clone(),
            main_branch: "main".to_string(),
            run_timeout: Duration::from_secs(7 * 3600),
            poll_interval: POLL,
            commands: vec![
                TestCommand::new("test", ["python3", "tools/test.py"]),
                TestCommand::new("run_on_app", ["python3", "tools/run_on_app.py"]),
                TestCommand::new("run_on_as_app", ["python3", "tools/run_on_as_app.py"]),
            ],
            watch,
        };
        Tester::new(
            self.channel.clone(),
            self.archive.clone(),
            vcs,
            runner,
            clock,
            options,
        )
    }

    fn no_state_blobs(&self) -> bool {
        self.context.store_is_empty_at(&[
            "STATE",
            "READY_FOR_TESTING",
            "TESTING",
            "TESTING_COMPLETE",
        ])
    }
}

fn c(hash: &str) -> CommitHash {
    CommitHash::new(hash)
}

#[test]
fn test_full_cycle_returns_to_no_blobs() {
    for layout in LAYOUTS {
        let fixture = Fixture::new(layout);
        let bot = fixture.bot(Arc::new(ManualClock::new()));
        let tester = fixture.tester(Arc::new(FakeVcs::new()), Arc::new(ScriptedRunner::new()));
        assert!(fixture.no_state_blobs());

        let receipt = bot.request(&c("abc123")).unwrap();
        assert!(receipt.cleared.is_empty());
        assert_eq!(tester.poll_once().unwrap(), TesterStep::Claimed(c("abc123")));

        let report = tester.test_commit(&c("abc123")).unwrap();
        assert_eq!(report.status, TestRunStatus::SUCCESS);

        let status = bot
            .wait_for_result(&c("abc123"), Duration::from_secs(60))
            .unwrap();
        assert_eq!(status, TestRunStatus::SUCCESS);
        assert!(fixture.channel.observe().unwrap().is_idle());
        assert!(fixture.no_state_blobs(), "{:?} left state behind", layout);
        assert_eq!(
            fixture.context.read_blob("abc123/status").as_deref(),
            Some("0")
        );
    }
}

#[test]
fn test_failing_command_end_to_end() {
    for layout in LAYOUTS {
        let fixture = Fixture::new(layout);
        let runner = Arc::new(ScriptedRunner::new().fail("tools/run_on_app.py", 1, "boom"));
        let tester = Arc::new(fixture.tester(Arc::new(FakeVcs::new()), runner.clone()));

        let worker = tester.clone();
        let clock = ManualClock::with_hook(move |_| {
            if let TesterStep::Claimed(commit) = worker.poll_once().unwrap() {
                worker.test_commit(&commit).unwrap();
            }
        });
        let bot = fixture.bot(Arc::new(clock));

        let outcome = bot.run(&c("abc123"), Duration::from_secs(3600)).unwrap();

        assert_eq!(outcome.status, TestRunStatus(1));
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(outcome.hint(), "r8ci print-logs abc123");
        assert_eq!(
            runner.ran(),
            vec![
                "tools/test.py",
                "tools/run_on_app.py",
                "tools/run_on_as_app.py"
            ]
        );

        let logs = fixture.archive.fetch_logs(&c("abc123")).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].command, "run_on_app");
        assert_eq!(logs[0].stderr, "boom");
        assert_eq!(logs[0].exitcode, "1");
        assert!(fixture.no_state_blobs());
    }
}

#[test]
fn test_bot_clears_all_stale_markers() {
    let fixture = Fixture::new(ChannelLayout::Markers);
    fixture.context.write_blob("READY_FOR_TESTING", "old1");
    fixture.context.write_blob("TESTING", "old2");
    fixture.context.write_blob("TESTING_COMPLETE", "old3");
    assert!(matches!(
        fixture.channel.observe().unwrap(),
        Observation::Conflicting(ref markers) if markers.len() == 3
    ));

    let receipt = fixture
        .bot(Arc::new(ManualClock::new()))
        .request(&c("abc123"))
        .unwrap();

    assert_eq!(receipt.cleared, MarkerName::ALL.to_vec());
    assert_eq!(
        fixture.context.read_blob("READY_FOR_TESTING").as_deref(),
        Some("abc123")
    );
    assert!(!fixture.context.blob_exists("TESTING"));
    assert!(!fixture.context.blob_exists("TESTING_COMPLETE"));
}

#[test]
fn test_bot_clears_stale_record() {
    let fixture = Fixture::new(ChannelLayout::Record);
    let mut state = ProtocolState::Idle;
    for event in [
        ProtocolEvent::Request(c("old")),
        ProtocolEvent::Claim,
        ProtocolEvent::Complete,
    ] {
        state = fixture.channel.apply(&state, event).unwrap();
    }

    let receipt = fixture
        .bot(Arc::new(ManualClock::new()))
        .request(&c("abc123"))
        .unwrap();

    assert_eq!(receipt.cleared, vec![MarkerName::TestingComplete]);
    assert_eq!(
        fixture.channel.observe().unwrap(),
        Observation::Settled(ProtocolState::Requested { commit: c("abc123") })
    );
}

#[test]
fn test_bot_discards_unreadable_record() {
    for content in ["{not json", r#"{"format":9,"generation":1,"state":{"type":"Idle"},"updated_at":"2024-01-01T00:00:00Z"}"#] {
        let fixture = Fixture::new(ChannelLayout::Record);
        fixture.context.write_blob("STATE", content);
        assert!(fixture.channel.observe().is_err());

        let receipt = fixture
            .bot(Arc::new(ManualClock::new()))
            .request(&c("abc123"))
            .unwrap();

        assert!(receipt.cleared.is_empty());
        assert_eq!(
            fixture.channel.observe().unwrap(),
            Observation::Settled(ProtocolState::Requested { commit: c("abc123") })
        );
        let tester = fixture.tester(Arc::new(FakeVcs::new()), Arc::new(ScriptedRunner::new()));
        assert_eq!(tester.poll_once().unwrap(), TesterStep::Claimed(c("abc123")));
    }
}

#[test]
fn test_bot_times_out_without_cleanup() {
    for layout in LAYOUTS {
        let fixture = Fixture::new(layout);
        let clock = Arc::new(ManualClock::new());
        let bot = fixture.bot(clock.clone());

        let err = bot.run(&c("abc123"), Duration::from_secs(90)).unwrap_err();

        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::BotTimeout { ref commit, waited })
                if commit == &c("abc123") && waited >= Duration::from_secs(90)
        ));
        assert_eq!(clock.sleeps(), vec![POLL; 3]);
        assert_eq!(
            fixture.channel.observe().unwrap(),
            Observation::Settled(ProtocolState::Requested { commit: c("abc123") })
        );
    }
}

#[test]
fn test_bot_rejects_result_of_other_commit() {
    let fixture = Fixture::new(ChannelLayout::Markers);
    fixture.context.write_blob("TESTING_COMPLETE", "other");

    let err = fixture
        .bot(Arc::new(ManualClock::new()))
        .wait_for_result(&c("abc123"), Duration::from_secs(60))
        .unwrap_err();

    assert!(matches!(
        err,
        ClientError::Protocol(ProtocolError::CommitMismatch { expected, found })
            if expected == c("abc123") && found == c("other")
    ));
    assert!(fixture.context.blob_exists("TESTING_COMPLETE"));
}

#[test]
fn test_unknown_commit_is_recorded_as_success() {
    let fixture = Fixture::new(ChannelLayout::Markers);
    let vcs = Arc::new(FakeVcs::new());
    vcs.refuse_checkout("abc123");
    let runner = Arc::new(ScriptedRunner::new().fail("tools/test.py", 1, "never runs"));
    let tester = fixture.tester(vcs.clone(), runner.clone());

    fixture
        .bot(Arc::new(ManualClock::new()))
        .request(&c("abc123"))
        .unwrap();
    tester.poll_once().unwrap();
    let report = tester.test_commit(&c("abc123")).unwrap();

    assert!(report.skipped);
    assert_eq!(report.status, TestRunStatus::SUCCESS);
    assert!(runner.ran().is_empty());
    assert_eq!(
        vcs.calls(),
        vec!["diff", "checkout main", "pull", "diff", "checkout abc123"]
    );
    assert_eq!(
        fixture.context.read_blob("TESTING_COMPLETE").as_deref(),
        Some("abc123")
    );
}

#[test]
fn test_dirty_tree_is_fatal() {
    let fixture = Fixture::new(ChannelLayout::Record);
    let vcs = Arc::new(FakeVcs::new());
    vcs.set_dirty(" src/Main.java | 2 +-\n");
    let runner = Arc::new(ScriptedRunner::new());
    let tester = fixture.tester(vcs.clone(), runner.clone());

    fixture
        .bot(Arc::new(ManualClock::new()))
        .request(&c("abc123"))
        .unwrap();
    tester.poll_once().unwrap();
    let err = tester.test_commit(&c("abc123")).unwrap_err();

    assert!(matches!(err, ClientError::DirtyWorkingTree { .. }));
    assert!(runner.ran().is_empty());
    assert_eq!(vcs.calls(), vec!["diff"]);
    assert_eq!(
        fixture.channel.observe().unwrap(),
        Observation::Settled(ProtocolState::InProgress { commit: c("abc123") })
    );
}

#[test]
fn test_runner_errors_and_timeouts_are_recorded() {
    let fixture = Fixture::new(ChannelLayout::Record);
    let runner = Arc::new(
        ScriptedRunner::new()
            .unlaunchable("tools/test.py")
            .time_out("tools/run_on_app.py"),
    );
    let tester = fixture.tester(Arc::new(FakeVcs::new()), runner);

    let report = tester.run_commands(&c("abc123"), true);

    assert_eq!(report.status, TestRunStatus(2));
    assert_eq!(report.failures().count(), 2);
    let logs = fixture.archive.fetch_logs(&c("abc123")).unwrap();
    let timed_out: Vec<_> = logs
        .iter()
        .map(|log| (log.command.as_str(), log.exitcode.as_str(), log.timed_out.as_str()))
        .collect();
    assert_eq!(
        timed_out,
        vec![("run_on_app", "None", "True"), ("test", "None", "False")]
    );
}

#[test]
fn test_run_commands_without_archive_writes_nothing() {
    let fixture = Fixture::new(ChannelLayout::Record);
    let runner = Arc::new(ScriptedRunner::new().fail("tools/test.py", 2, "bad"));
    let tester = fixture.tester(Arc::new(FakeVcs::new()), runner);

    let report = tester.run_commands(&c("abc123"), false);

    assert_eq!(report.status, TestRunStatus(1));
    assert!(fixture.archive.fetch_logs(&c("abc123")).unwrap().is_empty());
}

#[test]
fn test_tester_survives_reset_during_run() {
    for layout in LAYOUTS {
        let fixture = Fixture::new(layout);
        let tester = fixture.tester(Arc::new(FakeVcs::new()), Arc::new(ScriptedRunner::new()));
        fixture
            .bot(Arc::new(ManualClock::new()))
            .request(&c("abc123"))
            .unwrap();
        tester.poll_once().unwrap();

        fixture.channel.clear().unwrap();
        let report = tester.test_commit(&c("abc123")).unwrap();

        assert_eq!(report.status, TestRunStatus::SUCCESS);
        assert!(fixture.channel.observe().unwrap().is_idle());
        assert!(fixture.archive.has_status(&c("abc123")).unwrap());
    }
}

#[test]
fn test_tester_refuses_conflicting_markers() {
    let fixture = Fixture::new(ChannelLayout::Markers);
    fixture.context.write_blob("READY_FOR_TESTING", "a");
    fixture.context.write_blob("TESTING", "b");
    let tester = fixture.tester(Arc::new(FakeVcs::new()), Arc::new(ScriptedRunner::new()));

    assert!(matches!(
        tester.poll_once(),
        Err(ClientError::Protocol(ProtocolError::ConflictingMarkers(_)))
    ));
}

#[test]
fn test_claim_detects_replaced_request() {
    let fixture = Fixture::new(ChannelLayout::Markers);
    fixture.context.write_blob("READY_FOR_TESTING", "a");
    let observed = fixture.channel.observe().unwrap();
    fixture.context.write_blob("READY_FOR_TESTING", "b");

    let err = fixture
        .channel
        .apply(observed.state().unwrap(), ProtocolEvent::Claim)
        .unwrap_err();

    assert!(matches!(
        err,
        ClientError::Protocol(ProtocolError::ClaimMismatch { requested, found })
            if requested == c("a") && found == c("b")
    ));
    assert!(!fixture.context.blob_exists("TESTING"));
}

#[test]
fn test_record_rejects_stale_observation() {
    let fixture = Fixture::new(ChannelLayout::Record);
    let requested = fixture
        .channel
        .apply(&ProtocolState::Idle, ProtocolEvent::Request(c("a")))
        .unwrap();
    fixture
        .channel
        .apply(&requested, ProtocolEvent::Claim)
        .unwrap();

    let err = fixture
        .channel
        .apply(&requested, ProtocolEvent::Claim)
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::Protocol(ProtocolError::ConcurrentUpdate { .. })
    ));
}

#[test]
fn test_run_loop_restarts_when_sources_change() {
    let fixture = Fixture::new(ChannelLayout::Record);
    let source = fixture.context.test_root.join("r8ci");
    fs::write(&source, "v1").unwrap();
    let watch = SourceWatch::snapshot([&source]).unwrap();

    let rebuilt = source.clone();
    let clock = ManualClock::with_hook(move |_| fs::write(&rebuilt, "v2").unwrap());
    let tester = fixture.tester_with(
        Arc::new(FakeVcs::new()),
        Arc::new(ScriptedRunner::new()),
        Arc::new(clock),
        watch,
    );

    let exit = tester.run_loop(&AtomicBool::new(false)).unwrap();
    assert_eq!(exit, TesterExit::Restart);
    assert!(fixture.channel.observe().unwrap().is_idle());
}

#[test]
fn test_run_loop_restarts_after_claim_before_testing() {
    for (layout, watched) in [
        (ChannelLayout::Record, "STATE"),
        (ChannelLayout::Markers, "READY_FOR_TESTING"),
    ] {
        let fixture = Fixture::new(layout);
        fixture
            .bot(Arc::new(ManualClock::new()))
            .request(&c("abc123"))
            .unwrap();
        // Claiming rewrites this blob, so the change shows up only after
        // the pre-claim check has passed.
        let watch = SourceWatch::snapshot([fixture.context.blob_path(watched)]).unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let first = fixture.tester_with(
            Arc::new(FakeVcs::new()),
            runner.clone(),
            Arc::new(ManualClock::new()),
            watch,
        );

        let exit = first.run_loop(&AtomicBool::new(false)).unwrap();

        assert_eq!(exit, TesterExit::Restart, "{:?}", layout);
        assert!(runner.ran().is_empty());
        assert_eq!(
            fixture.channel.observe().unwrap(),
            Observation::Settled(ProtocolState::InProgress { commit: c("abc123") })
        );

        let second = fixture.tester(Arc::new(FakeVcs::new()), Arc::new(ScriptedRunner::new()));
        assert_eq!(second.poll_once().unwrap(), TesterStep::Resumed(c("abc123")));
        let report = second.test_commit(&c("abc123")).unwrap();
        assert_eq!(report.status, TestRunStatus::SUCCESS);
        assert_eq!(
            fixture.channel.observe().unwrap(),
            Observation::Settled(ProtocolState::Done { commit: c("abc123") })
        );
    }
}

#[test]
fn test_restarted_tester_resumes_claimed_work() {
    let fixture = Fixture::new(ChannelLayout::Markers);
    let first = fixture.tester(Arc::new(FakeVcs::new()), Arc::new(ScriptedRunner::new()));
    fixture
        .bot(Arc::new(ManualClock::new()))
        .request(&c("abc123"))
        .unwrap();
    assert_eq!(first.poll_once().unwrap(), TesterStep::Claimed(c("abc123")));

    let second = fixture.tester(Arc::new(FakeVcs::new()), Arc::new(ScriptedRunner::new()));
    assert_eq!(second.poll_once().unwrap(), TesterStep::Resumed(c("abc123")));
    second.test_commit(&c("abc123")).unwrap();
    assert_eq!(
        fixture.context.read_blob("TESTING_COMPLETE").as_deref(),
        Some("abc123")
    );
}

#[test]
fn test_run_loop_stops_on_request() {
    let fixture = Fixture::new(ChannelLayout::Record);
    let tester = fixture.tester(Arc::new(FakeVcs::new()), Arc::new(ScriptedRunner::new()));
    let exit = tester.run_loop(&AtomicBool::new(true)).unwrap();
    assert_eq!(exit, TesterExit::Stopped);
}
