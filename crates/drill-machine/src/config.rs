//! Declarative exercise configuration
//!
//! A configuration maps state names to [`StateDef`]s. Four equivalent
//! shorthand forms exist, mirroring how exercise authors think about
//! states:
//!
//! - [`StateDef::Terminal`] — entering the state halts the exercise;
//! - [`StateDef::Forward`] — immediately forward to another state;
//! - [`StateDef::Entry`] — run an entry action which may forward;
//! - [`StateDef::Config`] — an optional entry point plus event-triggered
//!   transitions keyed by `on<Action>`/`handle<Action>`.
//!
//! Trigger keys are resolved against the recognized action vocabulary once,
//! when the configuration is built; unrecognized keys are dropped and never
//! bound.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use drill_events::{BindingKind, RepoAction, RepoEvent};
use drill_git::ExerciseUtils;
use serde_json::Value;
use tracing::debug;

use crate::error::{ActionError, ConfigError};

/// Name of a state in the exercise's transition map.
pub type StateName = String;

/// Where a transition goes: into a named state, or into termination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    State(StateName),
    End,
}

impl From<&str> for Target {
    fn from(s: &str) -> Self {
        Self::State(s.to_string())
    }
}

impl From<String> for Target {
    fn from(s: String) -> Self {
        Self::State(s)
    }
}

/// Completion of an entry or transition action: an optional forward target
/// and an optional data payload reported in the `step` notification.
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    pub forward: Option<Target>,
    pub data: Option<Value>,
}

impl Outcome {
    /// Complete without transitioning.
    pub fn stay() -> Self {
        Self::default()
    }

    /// Complete and forward into the named state.
    pub fn forward(state: impl Into<StateName>) -> Self {
        Self {
            forward: Some(Target::State(state.into())),
            data: None,
        }
    }

    /// Complete with a data payload and forward into the named state.
    pub fn forward_with(state: impl Into<StateName>, data: Value) -> Self {
        Self {
            forward: Some(Target::State(state.into())),
            data: Some(data),
        }
    }

    /// Complete by terminating the exercise.
    pub fn end() -> Self {
        Self {
            forward: Some(Target::End),
            data: None,
        }
    }

    /// Attach a data payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Boxed future returned by user-supplied actions.
pub type ActionFuture = Pin<Box<dyn Future<Output = std::result::Result<Outcome, ActionError>> + Send>>;

/// Entry action: runs with the exercise utilities as context.
pub type EntryFn = Arc<dyn Fn(Arc<ExerciseUtils>) -> ActionFuture + Send + Sync>;

/// Event-triggered transition action: runs with the exercise utilities as
/// context and receives the firing event.
pub type TriggerFn = Arc<dyn Fn(Arc<ExerciseUtils>, RepoEvent) -> ActionFuture + Send + Sync>;

/// The entry point of a state's object form.
#[derive(Clone)]
pub enum EntryPoint {
    /// Forward immediately on entry.
    Forward(Target),
    /// Run an entry action.
    Run(EntryFn),
}

impl EntryPoint {
    pub fn forward(target: impl Into<Target>) -> Self {
        Self::Forward(target.into())
    }

    pub fn run<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<ExerciseUtils>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Outcome, ActionError>> + Send + 'static,
    {
        Self::Run(Arc::new(move |utils| Box::pin(f(utils))))
    }
}

/// The reaction bound to a repository action.
#[derive(Clone)]
pub enum Trigger {
    /// Forward immediately when the action fires.
    Forward(Target),
    /// Run a transition action when the action fires.
    Run(TriggerFn),
}

impl Trigger {
    pub fn forward(target: impl Into<Target>) -> Self {
        Self::Forward(target.into())
    }

    /// Terminate the exercise when the action fires.
    pub fn end() -> Self {
        Self::Forward(Target::End)
    }

    pub fn run<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<ExerciseUtils>, RepoEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Outcome, ActionError>> + Send + 'static,
    {
        Self::Run(Arc::new(move |utils, event| Box::pin(f(utils, event))))
    }
}

/// Object form of a state definition.
#[derive(Clone, Default)]
pub struct StateConfig {
    on_enter: Option<EntryPoint>,
    triggers: Vec<(String, Trigger)>,
}

impl StateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_enter(mut self, entry: EntryPoint) -> Self {
        self.on_enter = Some(entry);
        self
    }

    /// Bind a trigger under a raw configuration key (`onCommit`,
    /// `handlePreReceive`, ...). Keys outside the recognized vocabulary are
    /// dropped when the configuration is built.
    pub fn bind(mut self, key: impl Into<String>, trigger: Trigger) -> Self {
        self.triggers.push((key.into(), trigger));
        self
    }
}

/// One named state, in any of its equivalent shorthand forms.
#[derive(Clone)]
pub enum StateDef {
    Terminal,
    Forward(StateName),
    Entry(EntryFn),
    Config(StateConfig),
}

impl StateDef {
    pub fn terminal() -> Self {
        Self::Terminal
    }

    pub fn forward(state: impl Into<StateName>) -> Self {
        Self::Forward(state.into())
    }

    pub fn entry<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<ExerciseUtils>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Outcome, ActionError>> + Send + 'static,
    {
        Self::Entry(Arc::new(move |utils| Box::pin(f(utils))))
    }
}

impl From<StateConfig> for StateDef {
    fn from(config: StateConfig) -> Self {
        Self::Config(config)
    }
}

impl From<&str> for StateDef {
    fn from(state: &str) -> Self {
        Self::forward(state)
    }
}

/// Entry behavior of a resolved state.
#[derive(Clone)]
pub(crate) enum EntryKind {
    Terminal,
    Immediate(Target),
    Run(EntryFn),
    Noop,
}

/// A resolved event subscription of a state.
#[derive(Clone)]
pub(crate) struct Binding {
    pub kind: BindingKind,
    pub action: RepoAction,
    pub trigger: Trigger,
}

#[derive(Clone)]
pub(crate) struct ResolvedState {
    pub entry: EntryKind,
    pub bindings: Vec<Binding>,
}

/// A validated exercise definition: start state, optional time limit in
/// seconds, and the resolved state map.
pub struct ExerciseConfig {
    pub(crate) start_state: StateName,
    pub(crate) time_limit: Option<f64>,
    pub(crate) states: HashMap<StateName, ResolvedState>,
}

impl std::fmt::Debug for ExerciseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExerciseConfig")
            .field("start_state", &self.start_state)
            .field("time_limit", &self.time_limit)
            .field("states", &self.states.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ExerciseConfig {
    pub fn builder() -> ExerciseConfigBuilder {
        ExerciseConfigBuilder::default()
    }

    pub fn start_state(&self) -> &str {
        &self.start_state
    }

    pub fn time_limit(&self) -> Option<f64> {
        self.time_limit
    }
}

/// Builder for [`ExerciseConfig`].
#[derive(Default)]
pub struct ExerciseConfigBuilder {
    start_state: Option<StateName>,
    time_limit: Option<f64>,
    states: Vec<(StateName, StateDef)>,
}

impl ExerciseConfigBuilder {
    pub fn start_state(mut self, state: impl Into<StateName>) -> Self {
        self.start_state = Some(state.into());
        self
    }

    /// Exercise time limit in seconds (fractions allowed).
    pub fn time_limit(mut self, seconds: f64) -> Self {
        self.time_limit = Some(seconds);
        self
    }

    pub fn state(mut self, name: impl Into<StateName>, def: impl Into<StateDef>) -> Self {
        self.states.push((name.into(), def.into()));
        self
    }

    /// Validate and resolve the configuration. Trigger keys are matched
    /// against the action vocabulary here, once, so transitions never
    /// re-inspect raw keys at run time.
    pub fn build(self) -> std::result::Result<ExerciseConfig, ConfigError> {
        if self.states.is_empty() {
            return Err(ConfigError::EmptyStateMap);
        }
        let start_state = self.start_state.ok_or(ConfigError::MissingStartState)?;

        let mut states = HashMap::with_capacity(self.states.len());
        for (name, def) in self.states {
            if states
                .insert(name.clone(), resolve_state(&name, def))
                .is_some()
            {
                return Err(ConfigError::DuplicateState(name));
            }
        }

        if !states.contains_key(&start_state) {
            return Err(ConfigError::UnknownStartState(start_state));
        }

        Ok(ExerciseConfig {
            start_state,
            time_limit: self.time_limit,
            states,
        })
    }
}

fn resolve_state(name: &str, def: StateDef) -> ResolvedState {
    match def {
        StateDef::Terminal => ResolvedState {
            entry: EntryKind::Terminal,
            bindings: Vec::new(),
        },
        StateDef::Forward(target) => ResolvedState {
            entry: EntryKind::Immediate(Target::State(target)),
            bindings: Vec::new(),
        },
        StateDef::Entry(f) => ResolvedState {
            entry: EntryKind::Run(f),
            bindings: Vec::new(),
        },
        StateDef::Config(config) => {
            let entry = match config.on_enter {
                None => EntryKind::Noop,
                Some(EntryPoint::Forward(target)) => EntryKind::Immediate(target),
                Some(EntryPoint::Run(f)) => EntryKind::Run(f),
            };
            let mut bindings = Vec::new();
            for (key, trigger) in config.triggers {
                match RepoAction::from_trigger_key(&key) {
                    Some((kind, action)) => bindings.push(Binding {
                        kind,
                        action,
                        trigger,
                    }),
                    None => {
                        debug!(state = name, key, "ignoring non-action trigger key");
                    }
                }
            }
            ResolvedState { entry, bindings }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_rejects_empty_state_map() {
        let err = ExerciseConfig::builder().start_state("a").build().unwrap_err();
        assert!(matches!(err, ConfigError::EmptyStateMap));
    }

    #[test]
    fn build_rejects_missing_start_state() {
        let err = ExerciseConfig::builder()
            .state("a", StateDef::terminal())
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingStartState));
    }

    #[test]
    fn build_rejects_unknown_start_state() {
        let err = ExerciseConfig::builder()
            .start_state("missing")
            .state("a", StateDef::terminal())
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStartState(s) if s == "missing"));
    }

    #[test]
    fn build_rejects_duplicate_states() {
        let err = ExerciseConfig::builder()
            .start_state("a")
            .state("a", StateDef::terminal())
            .state("a", StateDef::terminal())
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateState(s) if s == "a"));
    }

    #[test]
    fn recognized_trigger_keys_are_bound() {
        let config = ExerciseConfig::builder()
            .start_state("a")
            .state(
                "a",
                StateConfig::new()
                    .bind("onCommit", Trigger::forward("b"))
                    .bind("handlePush", Trigger::end()),
            )
            .state("b", StateDef::terminal())
            .build()
            .unwrap();

        let resolved = &config.states["a"];
        assert_eq!(resolved.bindings.len(), 2);
        assert_eq!(resolved.bindings[0].action, RepoAction::Commit);
        assert_eq!(resolved.bindings[0].kind, BindingKind::Listener);
        assert_eq!(resolved.bindings[1].action, RepoAction::Push);
        assert_eq!(resolved.bindings[1].kind, BindingKind::Handler);
    }

    #[test]
    fn unrecognized_trigger_keys_are_dropped() {
        let config = ExerciseConfig::builder()
            .start_state("a")
            .state(
                "a",
                StateConfig::new().bind("onSomeNonGitEvent", Trigger::forward("b")),
            )
            .state("b", StateDef::terminal())
            .build()
            .unwrap();

        assert!(config.states["a"].bindings.is_empty());
    }
}
