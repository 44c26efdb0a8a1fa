//! Exercise state machine for git-drill
//!
//! Multi-step exercises are declared as a map of named states. Each state
//! is terminal, forwards to another state, runs an entry action, or binds
//! event-triggered transitions to repository actions. The machine owns the
//! transition engine: it keeps exactly one state live, (un)binds event
//! subscriptions on every transition, enforces an optional wall-clock
//! deadline, and reports `step`/`halt`/`ding` notifications to its owner.
//!
//! # Architecture
//!
//! ```text
//!        session layer (external)
//!                 |
//!           drill-machine
//!            |          |
//!      drill-events  drill-git
//! ```
//!
//! The event port is injected at construction; the repository utilities
//! instance is the execution context handed to user-supplied state logic.

pub mod config;
pub mod error;
pub mod logging;
pub mod machine;
pub mod notify;

pub use config::{
    EntryPoint, ExerciseConfig, ExerciseConfigBuilder, Outcome, StateConfig, StateDef, StateName,
    Target, Trigger,
};
pub use error::{ActionError, ConfigError, MachineError, Result};
pub use machine::ExerciseMachine;
pub use notify::{Notification, ObserverId, StepData};
