//! Session lifecycle: time limits, forced halts, and resuming a machine
//! from a stored state with the remaining seconds.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use drill_events::{EventBus, RepoAction, RepoId};
use drill_machine::{
    ExerciseConfig, ExerciseMachine, Notification, StateConfig, StateDef, Trigger,
};
use drill_test_utils::ExerciseFixture;

const REPO: &str = "/student/77e0d2/timed.git";

fn timed_config() -> ExerciseConfig {
    ExerciseConfig::builder()
        .start_state("first")
        .state(
            "first",
            StateConfig::new().bind("onCommit", Trigger::forward("second")),
        )
        .state(
            "second",
            StateConfig::new().bind("onCommit", Trigger::forward("done")),
        )
        .state("done", StateDef::terminal())
        .build()
        .unwrap()
}

fn machine_for(fixture: &ExerciseFixture, config: ExerciseConfig) -> (ExerciseMachine, Arc<EventBus>) {
    let bus = Arc::new(EventBus::new());
    let machine = ExerciseMachine::new(
        config,
        REPO,
        fixture.repo_dir(),
        fixture.exercise_dir(),
        bus.clone(),
    );
    (machine, bus)
}

async fn wait_for(cond: impl Fn() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within two seconds");
}

#[tokio::test]
async fn running_out_of_time_dings_and_halts_in_place() {
    let fixture = ExerciseFixture::new();
    let (machine, _bus) = machine_for(&fixture, timed_config());
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    machine.observe(move |note| sink.lock().unwrap().push(note.clone()));

    machine.init(None, Some(0.25)).await.unwrap();
    wait_for(|| machine.halted()).await;

    let log = log.lock().unwrap();
    assert_eq!(
        log[log.len() - 2..],
        [
            Notification::Ding,
            Notification::Halt {
                state: Some("first".to_string())
            },
        ]
    );
}

#[tokio::test]
async fn progress_beats_the_clock() {
    let fixture = ExerciseFixture::new();
    let (machine, bus) = machine_for(&fixture, timed_config());
    let repo = RepoId::from(REPO);

    machine.init(None, Some(30.0)).await.unwrap();

    bus.fire_listeners(&repo, RepoAction::Commit, vec![]);
    wait_for(|| machine.current_state().as_deref() == Some("second")).await;
    bus.fire_listeners(&repo, RepoAction::Commit, vec![]);
    wait_for(|| machine.halted()).await;

    assert_eq!(machine.current_state().as_deref(), Some("done"));
}

/// A disconnected session is resumed on a fresh machine: the stored state
/// becomes the start state and the remaining seconds become the limit.
#[tokio::test]
async fn a_session_resumes_with_its_remaining_seconds() {
    let fixture = ExerciseFixture::new();
    let repo = RepoId::from(REPO);

    let (machine, bus) = machine_for(&fixture, timed_config());
    machine.init(None, Some(30.0)).await.unwrap();
    bus.fire_listeners(&repo, RepoAction::Commit, vec![]);
    wait_for(|| machine.current_state().as_deref() == Some("second")).await;

    // The session layer stores the state and deadline, then tears down.
    let stored_state = machine.current_state().unwrap();
    let end = machine.end_timestamp().unwrap();
    drop(machine);

    let remaining = (end - Utc::now()).num_milliseconds() as f64 / 1000.0;
    assert!(remaining > 25.0 && remaining <= 30.0);

    let (resumed, bus) = machine_for(&fixture, timed_config());
    resumed.init(Some(&stored_state), Some(remaining)).await.unwrap();
    assert_eq!(resumed.current_state().as_deref(), Some("second"));

    // The resumed machine picks up where the old one left off.
    bus.fire_listeners(&repo, RepoAction::Commit, vec![]);
    wait_for(|| resumed.halted()).await;
    assert_eq!(resumed.current_state().as_deref(), Some("done"));
}

/// Dropping a machine detaches it from the bus: events for the repository
/// no longer reach anything.
#[tokio::test]
async fn a_dropped_machine_leaves_no_live_subscriptions() {
    let fixture = ExerciseFixture::new();
    let repo = RepoId::from(REPO);

    let (machine, bus) = machine_for(&fixture, timed_config());
    machine.init(None, None).await.unwrap();
    drop(machine);

    // Nothing to observe directly; delivery must simply not panic and any
    // gate must default to proceeding.
    let proceeded = Arc::new(Mutex::new(None));
    let flag = Arc::clone(&proceeded);
    bus.fire(
        &repo,
        RepoAction::Commit,
        vec![],
        Some(Arc::new(move |ok| {
            *flag.lock().unwrap() = Some(ok);
        })),
    );

    wait_for(|| proceeded.lock().unwrap().is_some()).await;
    assert_eq!(*proceeded.lock().unwrap(), Some(true));
}
