//! Error types for drill-machine

/// Result type for drill-machine operations
pub type Result<T> = std::result::Result<T, MachineError>;

/// Error surfaced by a user-supplied entry or transition action. The
/// machine does not interpret these; they propagate to its owner.
pub type ActionError = Box<dyn std::error::Error + Send + Sync>;

/// Configuration errors, raised when an exercise definition is built.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("exercise configuration has no states")]
    EmptyStateMap,

    #[error("exercise configuration has no start state")]
    MissingStartState,

    #[error("start state '{0}' is not defined")]
    UnknownStartState(String),

    #[error("state '{0}' is defined more than once")]
    DuplicateState(String),
}

/// Errors raised while a machine is running.
#[derive(Debug, thiserror::Error)]
pub enum MachineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A transition referenced a state name with no definition. Fatal and
    /// not retried; distinguishes a missing definition from an intentional
    /// terminal state.
    #[error("no definition for state '{state}' (previous state: {prev})")]
    UndefinedState { state: String, prev: String },

    #[error("state action failed: {0}")]
    Action(ActionError),
}
