//! The exercise state machine
//!
//! Exactly one state is live at a time. Every transition tears down the
//! outgoing state's event subscriptions before the incoming state's are
//! bound, so a stale trigger can never fire against the wrong state.
//!
//! Transitions race: user-supplied actions run asynchronously, and a halt
//! or competing transition may land while one is in flight. The machine
//! resolves these with a transition epoch. Every committed transition and
//! every halt bumps the epoch; an async completion carrying an older epoch
//! is discarded.
//!
//! The state mutex is never held across an await point. Notifications are
//! dispatched with the mutex released, so an observer may call back into
//! the machine. A state's `step` notification always reaches observers
//! before that state's subscriptions go live, so no event delivery can be
//! attributed to a state the owner has not yet heard about.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use drill_events::{
    BindingKind, EventCallback, EventPort, RepoAction, RepoEvent, RepoId, SubscriptionId,
};
use drill_git::ExerciseUtils;
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, error};

use crate::config::{
    Binding, EntryFn, EntryKind, ExerciseConfig, ResolvedState, StateName, Target, Trigger,
};
use crate::error::{MachineError, Result};
use crate::notify::{Notification, Notifier, ObserverId, StepData};

enum CurrentState {
    Unstarted,
    At(StateName),
    End,
}

impl CurrentState {
    fn name(&self) -> Option<&str> {
        match self {
            Self::At(name) => Some(name),
            Self::Unstarted | Self::End => None,
        }
    }
}

struct MachineState {
    current: CurrentState,
    started: bool,
    /// True until `init`, so triggers and steps before then are inert.
    halted: bool,
    end_timestamp: Option<DateTime<Utc>>,
    epoch: u64,
    listeners: Vec<(SubscriptionId, RepoAction)>,
    handlers: Vec<RepoAction>,
}

impl Default for MachineState {
    fn default() -> Self {
        Self {
            current: CurrentState::Unstarted,
            started: false,
            halted: true,
            end_timestamp: None,
            epoch: 0,
            listeners: Vec::new(),
            handlers: Vec::new(),
        }
    }
}

struct MachineInner {
    repo: RepoId,
    states: HashMap<StateName, ResolvedState>,
    start_state: StateName,
    time_limit: Option<f64>,
    port: Arc<dyn EventPort>,
    utils: Arc<ExerciseUtils>,
    notifier: Notifier,
    /// Runtime the machine was initialized on, used to spawn trigger work
    /// from synchronous event callbacks.
    runtime: OnceLock<Handle>,
    state: Mutex<MachineState>,
}

/// A running (or runnable) exercise instance.
///
/// Construct with a validated [`ExerciseConfig`], then call
/// [`init`](Self::init) from within a tokio runtime. Observers attached via
/// [`observe`](Self::observe) receive [`Notification`]s for every committed
/// state change.
pub struct ExerciseMachine {
    inner: Arc<MachineInner>,
}

impl ExerciseMachine {
    pub fn new(
        config: ExerciseConfig,
        repo: impl Into<RepoId>,
        repo_dir: impl Into<PathBuf>,
        exercise_dir: impl Into<PathBuf>,
        port: Arc<dyn EventPort>,
    ) -> Self {
        let utils = Arc::new(ExerciseUtils::new(repo_dir, exercise_dir));
        Self::with_utils(config, repo, utils, port)
    }

    /// Construct with a caller-built utilities instance, e.g. one with a
    /// non-default primary branch.
    pub fn with_utils(
        config: ExerciseConfig,
        repo: impl Into<RepoId>,
        utils: Arc<ExerciseUtils>,
        port: Arc<dyn EventPort>,
    ) -> Self {
        Self {
            inner: Arc::new(MachineInner {
                repo: repo.into(),
                states: config.states,
                start_state: config.start_state,
                time_limit: config.time_limit,
                port,
                utils,
                notifier: Notifier::default(),
                runtime: OnceLock::new(),
                state: Mutex::new(MachineState::default()),
            }),
        }
    }

    /// The utilities instance handed to this machine's state actions.
    pub fn utils(&self) -> Arc<ExerciseUtils> {
        Arc::clone(&self.inner.utils)
    }

    pub fn observe(
        &self,
        callback: impl Fn(&Notification) + Send + Sync + 'static,
    ) -> ObserverId {
        self.inner.notifier.observe(Arc::new(callback))
    }

    pub fn unobserve(&self, id: ObserverId) {
        self.inner.notifier.unobserve(id);
    }

    pub fn clear_observers(&self) {
        self.inner.notifier.clear();
    }

    /// Start the machine: arm the time limit (if any) and enter the start
    /// state. Idempotent; a second call is a no-op.
    ///
    /// `start_state` overrides the configured start state and `time_limit`
    /// overrides the configured limit, which is how a resumed exercise is
    /// re-armed with its remaining seconds.
    pub async fn init(
        &self,
        start_state: Option<&str>,
        time_limit: Option<f64>,
    ) -> Result<()> {
        let limit = time_limit.or(self.inner.time_limit);
        {
            let mut st = self.inner.state.lock().expect("machine state poisoned");
            if st.started {
                return Ok(());
            }
            st.started = true;
            st.halted = false;
            if let Some(secs) = limit {
                let millis = (secs * 1000.0).round() as i64;
                st.end_timestamp = Some(Utc::now() + chrono::Duration::milliseconds(millis));
            }
        }
        let _ = self.inner.runtime.set(Handle::current());

        if let Some(secs) = limit {
            spawn_timer(&self.inner, secs.max(0.0));
        }

        let start = start_state
            .map(str::to_string)
            .unwrap_or_else(|| self.inner.start_state.clone());
        debug!(repo = %self.inner.repo, state = %start, "exercise machine starting");
        drive(&self.inner, Target::State(start), None, None).await
    }

    /// Transition into the named state. A no-op once halted.
    pub async fn step(&self, state: impl Into<StateName>) -> Result<()> {
        drive(&self.inner, Target::State(state.into()), None, None).await
    }

    /// Transition into the named state, reporting `data` as the payload of
    /// the transition that left the current state.
    pub async fn step_with(&self, state: impl Into<StateName>, data: Value) -> Result<()> {
        drive(&self.inner, Target::State(state.into()), Some(data), None).await
    }

    /// Stop the machine where it stands: unbind all subscriptions and
    /// notify observers. A no-op if already halted.
    pub fn halt(&self) {
        let note = {
            let mut st = self.inner.state.lock().expect("machine state poisoned");
            halt_locked(&self.inner, &mut st)
        };
        if let Some(note) = note {
            self.inner.notifier.dispatch(&note);
        }
    }

    pub fn current_state(&self) -> Option<StateName> {
        let st = self.inner.state.lock().expect("machine state poisoned");
        st.current.name().map(str::to_string)
    }

    pub fn halted(&self) -> bool {
        self.inner.state.lock().expect("machine state poisoned").halted
    }

    /// Wall-clock instant the time limit elapses, set at `init`.
    pub fn end_timestamp(&self) -> Option<DateTime<Utc>> {
        self.inner.state.lock().expect("machine state poisoned").end_timestamp
    }
}

impl Drop for ExerciseMachine {
    // Unbind from the event port without notifying; observers only hear
    // about halts of a machine that still exists.
    fn drop(&mut self) {
        if let Ok(mut st) = self.inner.state.lock() {
            teardown_locked(&self.inner, &mut st);
            st.epoch += 1;
            st.halted = true;
        }
    }
}

/// One committed hop of the transition loop, decided under the lock.
enum Hop {
    /// Nothing left to run; dispatch and stop.
    Done(Vec<Notification>),
    /// Dispatch the step notification, then keep driving.
    Continue {
        step: Notification,
        next: Target,
        epoch: u64,
    },
    /// Dispatch the step notification, then bind the state's triggers if
    /// the transition is still current. The step always reaches observers
    /// before any subscription goes live.
    Settle {
        step: Notification,
        bindings: Vec<Binding>,
        epoch: u64,
    },
    /// An entry action must run off-lock.
    Run {
        name: StateName,
        old: Option<StateName>,
        prev: Option<Value>,
        entry: EntryFn,
        bindings: Vec<Binding>,
        epoch: u64,
    },
}

/// Walk a transition chain to quiescence. `incoming` is the payload of the
/// transition that triggered the first hop; forwarding hops carry none.
/// `expected_epoch` guards callers that decided to transition before
/// re-acquiring the lock.
async fn drive(
    inner: &Arc<MachineInner>,
    mut target: Target,
    mut incoming: Option<Value>,
    mut expected_epoch: Option<u64>,
) -> Result<()> {
    let err: MachineError = loop {
        let hop = {
            let mut st = inner.state.lock().expect("machine state poisoned");
            if st.halted {
                return Ok(());
            }
            if let Some(expected) = expected_epoch
                && st.epoch != expected
            {
                return Ok(());
            }

            match target {
                Target::End => Hop::Done(halt_locked(inner, &mut st).into_iter().collect()),
                Target::State(ref name) => {
                    let name = name.clone();
                    teardown_locked(inner, &mut st);
                    st.epoch += 1;
                    let epoch = st.epoch;
                    let old = st.current.name().map(str::to_string);
                    st.current = CurrentState::At(name.clone());

                    let Some(def) = inner.states.get(&name) else {
                        break MachineError::UndefinedState {
                            prev: old.unwrap_or_else(|| "<none>".to_string()),
                            state: name,
                        };
                    };

                    let prev = incoming.take();
                    match def.entry {
                        EntryKind::Run(ref entry) => Hop::Run {
                            name,
                            old,
                            prev,
                            entry: Arc::clone(entry),
                            bindings: def.bindings.clone(),
                            epoch,
                        },
                        ref entry => {
                            let step = Notification::Step {
                                new: name.clone(),
                                old,
                                data: StepData { prev, new: None },
                            };
                            match entry {
                                EntryKind::Terminal => {
                                    st.halted = true;
                                    Hop::Done(vec![
                                        step,
                                        Notification::Halt { state: Some(name) },
                                    ])
                                }
                                EntryKind::Immediate(next) => Hop::Continue {
                                    step,
                                    next: next.clone(),
                                    epoch,
                                },
                                _ => Hop::Settle {
                                    step,
                                    bindings: def.bindings.clone(),
                                    epoch,
                                },
                            }
                        }
                    }
                }
            }
        };

        match hop {
            Hop::Done(notes) => {
                inner.notifier.dispatch_all(&notes);
                return Ok(());
            }
            Hop::Continue { step, next, epoch } => {
                inner.notifier.dispatch(&step);
                target = next;
                incoming = None;
                expected_epoch = Some(epoch);
            }
            Hop::Settle {
                step,
                bindings,
                epoch,
            } => {
                inner.notifier.dispatch(&step);
                let mut st = inner.state.lock().expect("machine state poisoned");
                if st.halted || st.epoch != epoch {
                    return Ok(());
                }
                setup_locked(inner, &mut st, &bindings);
                return Ok(());
            }
            Hop::Run {
                name,
                old,
                prev,
                entry,
                bindings,
                epoch,
            } => {
                let outcome = match entry(Arc::clone(&inner.utils)).await {
                    Ok(outcome) => outcome,
                    Err(cause) => break MachineError::Action(cause),
                };

                let step = Notification::Step {
                    new: name.clone(),
                    old,
                    data: StepData {
                        prev,
                        new: outcome.data,
                    },
                };

                match outcome.forward {
                    Some(next) => {
                        {
                            let st = inner.state.lock().expect("machine state poisoned");
                            if st.halted || st.epoch != epoch {
                                return Ok(());
                            }
                        }
                        inner.notifier.dispatch(&step);
                        target = next;
                        incoming = None;
                        expected_epoch = Some(epoch);
                    }
                    None => {
                        {
                            let st = inner.state.lock().expect("machine state poisoned");
                            if st.halted || st.epoch != epoch {
                                return Ok(());
                            }
                        }
                        inner.notifier.dispatch(&step);
                        let mut st = inner.state.lock().expect("machine state poisoned");
                        if st.halted || st.epoch != epoch {
                            return Ok(());
                        }
                        setup_locked(inner, &mut st, &bindings);
                        return Ok(());
                    }
                }
            }
        }
    };

    error!(error = %err, "transition failed");
    Err(err)
}

/// Tear down, bump the epoch, and mark halted. `None` if already halted.
/// The machine halts where it stands, so the notification names the state
/// it was in.
fn halt_locked(inner: &MachineInner, st: &mut MachineState) -> Option<Notification> {
    if st.halted {
        return None;
    }
    teardown_locked(inner, st);
    st.epoch += 1;
    st.halted = true;
    let state = st.current.name().map(str::to_string);
    st.current = CurrentState::End;
    Some(Notification::Halt { state })
}

fn teardown_locked(inner: &MachineInner, st: &mut MachineState) {
    for (id, action) in st.listeners.drain(..) {
        inner.port.remove_listener(&id, &inner.repo, action);
    }
    for action in st.handlers.drain(..) {
        inner.port.set_handler(&inner.repo, action, None);
    }
}

/// Bind the entered state's triggers. Each callback carries the epoch of
/// the transition that bound it, so deliveries racing a teardown are
/// discarded.
fn setup_locked(inner: &Arc<MachineInner>, st: &mut MachineState, bindings: &[Binding]) {
    let epoch = st.epoch;
    for binding in bindings {
        let callback = trigger_callback(inner, binding.trigger.clone(), epoch);
        match binding.kind {
            BindingKind::Listener => {
                let id = SubscriptionId::new();
                inner
                    .port
                    .add_listener(id.clone(), &inner.repo, binding.action, callback);
                st.listeners.push((id, binding.action));
            }
            BindingKind::Handler => {
                inner.port.set_handler(&inner.repo, binding.action, Some(callback));
                st.handlers.push(binding.action);
            }
        }
    }
}

fn trigger_callback(inner: &Arc<MachineInner>, trigger: Trigger, epoch: u64) -> EventCallback {
    let weak = Arc::downgrade(inner);
    Arc::new(move |event: RepoEvent| {
        let Some(inner) = weak.upgrade() else {
            event.decide(true);
            return;
        };
        let Some(handle) = inner.runtime.get() else {
            event.decide(true);
            return;
        };
        handle.spawn(run_trigger(Arc::clone(&inner), trigger.clone(), event, epoch));
    })
}

/// Resolve one event delivery against the state that bound it. Stale
/// deliveries resolve any gate as "proceed" and do nothing else.
async fn run_trigger(inner: Arc<MachineInner>, trigger: Trigger, event: RepoEvent, epoch: u64) {
    {
        let st = inner.state.lock().expect("machine state poisoned");
        if st.halted || st.epoch != epoch {
            drop(st);
            event.decide(true);
            return;
        }
    }

    match trigger {
        Trigger::Forward(target) => {
            event.decide(true);
            if let Err(error) = drive(&inner, target, None, Some(epoch)).await {
                error!(error = %error, "event-triggered transition failed");
            }
        }
        Trigger::Run(action) => {
            // Gated events are decided by the action itself.
            match action(Arc::clone(&inner.utils), event).await {
                Ok(outcome) => {
                    let Some(target) = outcome.forward else {
                        // Completed without a destination: stay put.
                        return;
                    };
                    if let Err(error) = drive(&inner, target, outcome.data, Some(epoch)).await {
                        error!(error = %error, "event-triggered transition failed");
                    }
                }
                Err(error) => {
                    error!(error = %error, "transition action failed");
                }
            }
        }
    }
}

/// Arm the wall-clock limit. The ding and the halt it forces are decided
/// atomically against competing halts.
fn spawn_timer(inner: &Arc<MachineInner>, secs: f64) {
    let weak = Arc::downgrade(inner);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let notes = {
            let mut st = inner.state.lock().expect("machine state poisoned");
            if st.halted {
                Vec::new()
            } else {
                let mut notes = vec![Notification::Ding];
                notes.extend(halt_locked(&inner, &mut st));
                notes
            }
        };
        inner.notifier.dispatch_all(&notes);
    });
}
