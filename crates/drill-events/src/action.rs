//! The recognized repository actions
//!
//! Actions are named in kebab-case on the wire (hook dispatcher side) and in
//! PascalCase inside exercise configuration keys (`onCommit`,
//! `handlePreReceive`). Keys that merely resemble an action key are not part
//! of the vocabulary and resolve to `None`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A repository lifecycle action an exercise state may subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepoAction {
    PrePull,
    Pull,
    PreClone,
    Clone,
    PrePush,
    Push,
    PreInfo,
    Info,
    Merge,
    PreRebase,
    PreCommit,
    Commit,
    Checkout,
    PreReceive,
    Receive,
}

/// How a state subscribes to an action: as one of many listeners, or as the
/// single handler that may gate the action's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Listener,
    Handler,
}

impl fmt::Display for RepoAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl RepoAction {
    /// The kebab-case name used by the hook dispatcher.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::PrePull => "pre-pull",
            Self::Pull => "pull",
            Self::PreClone => "pre-clone",
            Self::Clone => "clone",
            Self::PrePush => "pre-push",
            Self::Push => "push",
            Self::PreInfo => "pre-info",
            Self::Info => "info",
            Self::Merge => "merge",
            Self::PreRebase => "pre-rebase",
            Self::PreCommit => "pre-commit",
            Self::Commit => "commit",
            Self::Checkout => "checkout",
            Self::PreReceive => "pre-receive",
            Self::Receive => "receive",
        }
    }

    /// The PascalCase fragment used inside configuration trigger keys.
    pub fn key_name(self) -> &'static str {
        match self {
            Self::PrePull => "PrePull",
            Self::Pull => "Pull",
            Self::PreClone => "PreClone",
            Self::Clone => "Clone",
            Self::PrePush => "PrePush",
            Self::Push => "Push",
            Self::PreInfo => "PreInfo",
            Self::Info => "Info",
            Self::Merge => "Merge",
            Self::PreRebase => "PreRebase",
            Self::PreCommit => "PreCommit",
            Self::Commit => "Commit",
            Self::Checkout => "Checkout",
            Self::PreReceive => "PreReceive",
            Self::Receive => "Receive",
        }
    }

    /// Parse a kebab-case wire name.
    pub fn parse(s: &str) -> Option<Self> {
        Self::all().iter().copied().find(|a| a.wire_name() == s)
    }

    /// Every recognized action.
    pub fn all() -> &'static [RepoAction] {
        &[
            Self::PrePull,
            Self::Pull,
            Self::PreClone,
            Self::Clone,
            Self::PrePush,
            Self::Push,
            Self::PreInfo,
            Self::Info,
            Self::Merge,
            Self::PreRebase,
            Self::PreCommit,
            Self::Commit,
            Self::Checkout,
            Self::PreReceive,
            Self::Receive,
        ]
    }

    /// Resolve a configuration trigger key (`onCommit`, `handlePreReceive`)
    /// into its binding kind and action.
    ///
    /// Returns `None` for anything outside the recognized vocabulary, so a
    /// key like `onSomeNonGitEvent` is never bound.
    pub fn from_trigger_key(key: &str) -> Option<(BindingKind, RepoAction)> {
        let (kind, rest) = if let Some(rest) = key.strip_prefix("handle") {
            (BindingKind::Handler, rest)
        } else if let Some(rest) = key.strip_prefix("on") {
            (BindingKind::Listener, rest)
        } else {
            return None;
        };

        Self::all()
            .iter()
            .copied()
            .find(|a| a.key_name() == rest)
            .map(|a| (kind, a))
    }
}
