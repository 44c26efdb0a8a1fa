//! Shared test fixtures for the git-drill workspace.

pub mod fixture;
pub mod git;

pub use fixture::ExerciseFixture;
pub use git::run_git;
