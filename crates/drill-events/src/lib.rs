//! Repository event plumbing for git-drill
//!
//! Exercises react to repository lifecycle actions (commits, pushes,
//! checkouts, ...). This crate defines the action vocabulary, the port
//! through which a state machine (un)binds event subscriptions, and an
//! in-memory bus implementation fed by the external hook dispatcher.

pub mod action;
pub mod bus;
pub mod port;

pub use action::{BindingKind, RepoAction};
pub use bus::EventBus;
pub use port::{EventCallback, EventPort, Gate, RepoEvent, RepoId, SubscriptionId};
