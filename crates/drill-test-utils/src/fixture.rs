//! [`ExerciseFixture`]: a real git repository paired with an exercise
//! content directory, the two paths every exercise utility instance is
//! bound to.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use crate::git::run_git;

/// A temporary exercise setup: a git repository with history on `main` and
/// an exercise content directory holding reference files.
pub struct ExerciseFixture {
    repo: TempDir,
    exercise: TempDir,
}

impl Default for ExerciseFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl ExerciseFixture {
    /// Create a repository with one initial commit on `main` and an empty
    /// exercise directory.
    ///
    /// The repository is initialised via `git2` and configured with a test
    /// identity so commits made by the git CLI succeed.
    ///
    /// # Panics
    /// Panics if any filesystem or git operation fails.
    pub fn new() -> Self {
        let repo = TempDir::new().expect("ExerciseFixture: failed to create repo tempdir");
        let exercise = TempDir::new().expect("ExerciseFixture: failed to create exercise tempdir");

        git2::Repository::init(repo.path()).expect("ExerciseFixture: failed to init repository");
        run_git(repo.path(), &["config", "user.email", "test@test.com"]);
        run_git(repo.path(), &["config", "user.name", "Test User"]);
        run_git(repo.path(), &["config", "commit.gpgsign", "false"]);

        fs::write(repo.path().join("README.md"), "# Exercise\n")
            .expect("ExerciseFixture: failed to write README.md");
        run_git(repo.path(), &["add", "."]);
        run_git(repo.path(), &["commit", "-m", "Initial commit"]);
        run_git(repo.path(), &["branch", "-M", "main"]);

        Self { repo, exercise }
    }

    pub fn repo_dir(&self) -> &Path {
        self.repo.path()
    }

    pub fn exercise_dir(&self) -> &Path {
        self.exercise.path()
    }

    /// Write a file (relative path) into the repository working tree.
    pub fn write_repo_file(&self, path: &str, contents: &str) {
        let full = self.repo.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).expect("ExerciseFixture: failed to create parent dirs");
        }
        fs::write(full, contents).expect("ExerciseFixture: failed to write repo file");
    }

    /// Write a reference file (relative path) into the exercise directory.
    pub fn write_exercise_file(&self, path: &str, contents: &str) {
        let full = self.exercise.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).expect("ExerciseFixture: failed to create parent dirs");
        }
        fs::write(full, contents).expect("ExerciseFixture: failed to write exercise file");
    }

    /// Stage everything and commit with the given message.
    pub fn commit_all(&self, message: &str) {
        run_git(self.repo.path(), &["add", "--all"]);
        run_git(self.repo.path(), &["commit", "-m", message]);
    }

    /// Resolve a revision to its full hash.
    pub fn rev_parse(&self, rev: &str) -> String {
        run_git(self.repo.path(), &["rev-parse", rev])
            .trim()
            .to_string()
    }

    /// Point a ref (e.g. a shadow ref) at the given revision.
    pub fn set_ref(&self, name: &str, rev: &str) {
        run_git(self.repo.path(), &["update-ref", name, rev]);
    }

    /// The branch the working tree currently has checked out, or `HEAD`
    /// when detached.
    pub fn current_branch(&self) -> String {
        run_git(self.repo.path(), &["rev-parse", "--abbrev-ref", "HEAD"])
            .trim()
            .to_string()
    }
}
