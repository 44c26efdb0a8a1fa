//! Git access for git-drill
//!
//! Two layers: a thin async command runner that shells out to the `git`
//! binary, and [`ExerciseUtils`], the per-exercise utility object that state
//! transition logic runs against (file diffing, content matching, commit
//! authoring, shadow-branch-scoped inspection).

pub mod commit;
pub mod diff;
pub mod error;
pub mod runner;
pub mod utils;

pub use commit::{CommitSpec, FileSpec, Template};
pub use diff::{FileDiff, LineChange};
pub use error::{Error, Result};
pub use runner::git;
pub use utils::{ExerciseUtils, Needle, SHADOW_BRANCH};
