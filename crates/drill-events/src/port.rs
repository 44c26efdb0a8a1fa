//! The event-port contract consumed by the exercise state machine
//!
//! The port is an injected dependency (`Arc<dyn EventPort>`), never a
//! process-wide singleton, so machines under test get private, isolated
//! instances.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::action::RepoAction;

/// Identity of a repository as known to the event layer, e.g. the short
/// path `/alice/3fd2a1/rebasing.git`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoId(String);

impl RepoId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RepoId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RepoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Unique identifier for a listener subscription. Multiple listeners may
/// coexist on the same (repo, action) pair, so removal is by id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Accept/reject capability for a gateable action. Present only on events
/// delivered to a handler; calling it with `false` rejects the operation.
pub type Gate = Arc<dyn Fn(bool) + Send + Sync>;

/// A repository action delivery.
#[derive(Clone)]
pub struct RepoEvent {
    /// The repository the action happened on.
    pub repo: RepoId,
    /// Which action fired.
    pub action: RepoAction,
    /// Action-specific arguments supplied by the hook dispatcher.
    pub args: Vec<Value>,
    /// Decision point for gateable actions; `None` for listener deliveries.
    pub gate: Option<Gate>,
}

impl RepoEvent {
    pub fn new(repo: impl Into<RepoId>, action: RepoAction, args: Vec<Value>) -> Self {
        Self {
            repo: repo.into(),
            action,
            args,
            gate: None,
        }
    }

    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Resolve the gate, if any. Events without a gate ignore the decision.
    pub fn decide(&self, proceed: bool) {
        if let Some(gate) = &self.gate {
            gate(proceed);
        }
    }
}

impl fmt::Debug for RepoEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepoEvent")
            .field("repo", &self.repo)
            .field("action", &self.action)
            .field("args", &self.args)
            .field("gated", &self.gate.is_some())
            .finish()
    }
}

/// Callback invoked when a subscribed action fires.
pub type EventCallback = Arc<dyn Fn(RepoEvent) + Send + Sync>;

/// Subscription surface for named repository actions on a named repository.
///
/// Two subscription kinds with different delivery semantics:
///
/// - *listeners* are multicast: every current listener for a firing action
///   is invoked, with no control over the action's outcome;
/// - *handlers* are exclusive: one handler per (repo, action) slot, and it
///   is the single decision point for actions whose outcome can be gated.
pub trait EventPort: Send + Sync {
    /// Register a listener under a caller-generated id.
    fn add_listener(
        &self,
        id: SubscriptionId,
        repo: &RepoId,
        action: RepoAction,
        callback: EventCallback,
    );

    /// Remove a previously registered listener. Unknown ids are ignored.
    fn remove_listener(&self, id: &SubscriptionId, repo: &RepoId, action: RepoAction);

    /// Occupy or clear the handler slot for (repo, action). Passing `None`
    /// clears the slot.
    fn set_handler(&self, repo: &RepoId, action: RepoAction, callback: Option<EventCallback>);
}
