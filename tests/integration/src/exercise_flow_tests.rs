//! End-to-end exercise flows: a machine wired to an event bus, with its
//! state logic inspecting a real temporary repository.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use drill_events::{EventBus, RepoAction, RepoId};
use drill_git::Needle;
use drill_machine::{
    ActionError, ExerciseConfig, ExerciseMachine, Outcome, StateConfig, StateDef, Trigger,
};
use drill_test_utils::ExerciseFixture;
use regex::Regex;

const REPO: &str = "/student/9a41bc/committing.git";

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

/// "Create hello.txt containing 'hello' and commit it." The commit trigger
/// verifies the working tree and only then advances.
#[tokio::test]
async fn commit_exercise_advances_only_when_the_file_is_right() {
    let fixture = ExerciseFixture::new();
    let config = ExerciseConfig::builder()
        .start_state("editing")
        .state(
            "editing",
            StateConfig::new().bind(
                "onCommit",
                Trigger::run(|utils, _event| async move {
                    if utils.file_contains("hello.txt", &Needle::from("hello")).await? {
                        Ok(Outcome::forward("done"))
                    } else {
                        Ok(Outcome::stay())
                    }
                }),
            ),
        )
        .state("done", StateDef::terminal())
        .build()
        .unwrap();
    let (machine, bus) = machine_for(&fixture, config);
    let repo = RepoId::from(REPO);

    machine.init(None, None).await.unwrap();

    // A commit without the file: the machine stays in "editing".
    fixture.write_repo_file("other.txt", "not it\n");
    fixture.commit_all("try something else");
    bus.fire_listeners(&repo, RepoAction::Commit, vec![]);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(machine.current_state().as_deref(), Some("editing"));

    // The right file arrives.
    fixture.write_repo_file("hello.txt", "hello world\n");
    fixture.commit_all("add hello");
    bus.fire_listeners(&repo, RepoAction::Commit, vec![]);
    wait_for(|| machine.halted()).await;
    assert_eq!(machine.current_state().as_deref(), Some("done"));
}

/// A commit-message exercise: the subject must match a conventional
/// pattern before the machine advances.
#[tokio::test]
async fn commit_message_is_checked_against_a_pattern() {
    let fixture = ExerciseFixture::new();
    let config = ExerciseConfig::builder()
        .start_state("fixing")
        .state(
            "fixing",
            StateConfig::new().bind(
                "onCommit",
                Trigger::run(|utils, _event| async move {
                    let needle = Needle::from(Regex::new(r"^fix:").map_err(ActionError::from)?);
                    if utils.commit_msg_contains(&needle, None).await? {
                        Ok(Outcome::forward("done"))
                    } else {
                        Ok(Outcome::stay())
                    }
                }),
            ),
        )
        .state("done", StateDef::terminal())
        .build()
        .unwrap();
    let (machine, bus) = machine_for(&fixture, config);
    let repo = RepoId::from(REPO);

    machine.init(None, None).await.unwrap();

    fixture.write_repo_file("bug.txt", "v1\n");
    fixture.commit_all("random message");
    bus.fire_listeners(&repo, RepoAction::Commit, vec![]);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!machine.halted());

    fixture.write_repo_file("bug.txt", "v2\n");
    fixture.commit_all("fix: close the loop");
    bus.fire_listeners(&repo, RepoAction::Commit, vec![]);
    wait_for(|| machine.halted()).await;
}

/// An entry action seeds the repository before the student is let loose,
/// and the seeded state's triggers are live afterwards.
#[tokio::test]
async fn entry_action_seeds_the_repo_before_binding_triggers() {
    use chrono::Utc;
    use drill_git::{CommitSpec, FileSpec, Template};

    let fixture = ExerciseFixture::new();
    fixture.write_exercise_file("broken.txt", "student is ${LOGIN}\n");

    let config = ExerciseConfig::builder()
        .start_state("seeding")
        .state(
            "seeding",
            StateConfig::new()
                .on_enter(drill_machine::EntryPoint::run(|utils| async move {
                    let spec = CommitSpec {
                        message: "Seed the exercise".to_string(),
                        author: "Drill Bot <bot@example.com>".to_string(),
                        timestamp: Utc::now(),
                        files: vec![FileSpec::full(
                            "broken.txt",
                            "broken.txt",
                            Template::values([("LOGIN", "alice")]),
                        )],
                    };
                    utils.add_commit(&spec).await?;
                    Ok(Outcome::stay())
                }))
                .bind("onCommit", Trigger::forward("done")),
        )
        .state("done", StateDef::terminal())
        .build()
        .unwrap();
    let (machine, bus) = machine_for(&fixture, config);
    let repo = RepoId::from(REPO);

    machine.init(None, None).await.unwrap();

    let seeded = std::fs::read_to_string(fixture.repo_dir().join("broken.txt")).unwrap();
    assert_eq!(seeded, "student is alice\n");

    bus.fire_listeners(&repo, RepoAction::Commit, vec![]);
    wait_for(|| machine.halted()).await;
}

/// A gated push: the handler rejects pushes until the answer file exists.
#[tokio::test]
async fn push_is_gated_on_the_working_tree() {
    let fixture = ExerciseFixture::new();
    let config = ExerciseConfig::builder()
        .start_state("answering")
        .state(
            "answering",
            StateConfig::new().bind(
                "handlePush",
                Trigger::run(|utils, event| async move {
                    let ready = utils.file_exists("answer.txt").await?;
                    event.decide(ready);
                    if ready {
                        Ok(Outcome::forward("done"))
                    } else {
                        Ok(Outcome::stay())
                    }
                }),
            ),
        )
        .state("done", StateDef::terminal())
        .build()
        .unwrap();
    let (machine, bus) = machine_for(&fixture, config);
    let repo = RepoId::from(REPO);

    machine.init(None, None).await.unwrap();

    let fire_push = |bus: Arc<EventBus>, repo: RepoId| {
        let proceeded = Arc::new(AtomicBool::new(false));
        let decided = Arc::new(AtomicBool::new(false));
        let ok_flag = proceeded.clone();
        let done_flag = decided.clone();
        bus.fire(
            &repo,
            RepoAction::Push,
            vec![],
            Some(Arc::new(move |ok| {
                ok_flag.store(ok, Ordering::SeqCst);
                done_flag.store(true, Ordering::SeqCst);
            })),
        );
        (proceeded, decided)
    };

    let (proceeded, decided) = fire_push(bus.clone(), repo.clone());
    wait_for(|| decided.load(Ordering::SeqCst)).await;
    assert!(!proceeded.load(Ordering::SeqCst));
    assert_eq!(machine.current_state().as_deref(), Some("answering"));

    fixture.write_repo_file("answer.txt", "42\n");
    let (proceeded, decided) = fire_push(bus.clone(), repo.clone());
    wait_for(|| decided.load(Ordering::SeqCst)).await;
    assert!(proceeded.load(Ordering::SeqCst));
    wait_for(|| machine.halted()).await;
    assert_eq!(machine.current_state().as_deref(), Some("done"));
}
