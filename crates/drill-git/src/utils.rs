//! Exercise repository utilities
//!
//! One [`ExerciseUtils`] instance is created per exercise machine, bound to
//! the repository working tree and the exercise content directory. Its
//! operations are the execution context handed to user-supplied state
//! transition logic.
//!
//! The shadow branch tracks the tree of the repository just before and
//! after a commit; it is maintained by the hook-handling layer and is not
//! valid after any other operation. Shadow-scoped operations here check the
//! ref out, run, and always restore the primary branch.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::warn;

use crate::commit::CommitSpec;
use crate::diff::FileDiff;
use crate::error::{Error, Result};
use crate::runner::git;

/// Hidden ref mirroring the tree around the student's latest commit.
pub const SHADOW_BRANCH: &str = "refs/drill/shadowbranch";

/// What to look for in a file or commit message.
#[derive(Debug, Clone)]
pub enum Needle {
    /// Literal substring match.
    Substring(String),
    /// Compiled regular expression match.
    Pattern(Regex),
}

impl Needle {
    pub fn matches(&self, haystack: &str) -> bool {
        match self {
            Self::Substring(s) => haystack.contains(s.as_str()),
            Self::Pattern(re) => re.is_match(haystack),
        }
    }
}

impl From<&str> for Needle {
    fn from(s: &str) -> Self {
        Self::Substring(s.to_string())
    }
}

impl From<String> for Needle {
    fn from(s: String) -> Self {
        Self::Substring(s)
    }
}

impl From<Regex> for Needle {
    fn from(re: Regex) -> Self {
        Self::Pattern(re)
    }
}

/// Content inspection and authoring operations for one exercise instance.
#[derive(Debug, Clone)]
pub struct ExerciseUtils {
    repo_dir: PathBuf,
    exercise_dir: PathBuf,
    primary_branch: String,
}

impl ExerciseUtils {
    pub fn new(repo_dir: impl Into<PathBuf>, exercise_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            exercise_dir: exercise_dir.into(),
            primary_branch: "main".to_string(),
        }
    }

    /// Override the branch restored after shadow-scoped operations.
    pub fn with_primary_branch(mut self, branch: impl Into<String>) -> Self {
        self.primary_branch = branch.into();
        self
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    pub fn exercise_dir(&self) -> &Path {
        &self.exercise_dir
    }

    /// Compare a file in the exercise repo against the reference file in the
    /// exercise directory. Resolves to `None` when the files do not differ.
    pub async fn compare_files(
        &self,
        verify_path: &str,
        reference_path: &str,
    ) -> Result<Option<FileDiff>> {
        let verified = read_file(self.repo_dir.join(verify_path)).await?;
        let reference = read_file(self.exercise_dir.join(reference_path)).await?;
        Ok(FileDiff::compute(&verified, &reference))
    }

    /// Same as [`compare_files`](Self::compare_files), against the shadow
    /// branch's tree.
    pub async fn compare_files_shadow(
        &self,
        verify_path: &str,
        reference_path: &str,
    ) -> Result<Option<FileDiff>> {
        self.with_shadow(self.compare_files(verify_path, reference_path))
            .await
    }

    /// Patch-format diff between two revisions. `from` defaults to `HEAD`;
    /// with `to` omitted, `from` is compared against its parent(s).
    pub async fn diff(&self, from: Option<&str>, to: Option<&str>) -> Result<String> {
        let mut args = vec!["-p", from.unwrap_or("HEAD")];
        if let Some(to) = to {
            args.push(to);
        }
        git(&self.repo_dir, "diff-tree", &args).await
    }

    /// Patch-format diff between a revision (default `HEAD`) and the shadow
    /// branch.
    pub async fn diff_shadow(&self, rev: Option<&str>) -> Result<String> {
        git(
            &self.repo_dir,
            "diff-tree",
            &["-p", rev.unwrap_or("HEAD"), SHADOW_BRANCH],
        )
        .await
    }

    /// Whether a repository file contains the given needle.
    pub async fn file_contains(&self, path: &str, needle: &Needle) -> Result<bool> {
        let contents = read_file(self.repo_dir.join(path)).await?;
        Ok(needle.matches(&contents))
    }

    /// Same as [`file_contains`](Self::file_contains), against the shadow
    /// branch's tree.
    pub async fn file_contains_shadow(&self, path: &str, needle: &Needle) -> Result<bool> {
        self.with_shadow(self.file_contains(path, needle)).await
    }

    /// Subject line of a commit's log message. `rev` defaults to `HEAD`.
    pub async fn commit_msg(&self, rev: Option<&str>) -> Result<String> {
        let msg = git(
            &self.repo_dir,
            "log",
            &["-n1", "--pretty=format:%s", rev.unwrap_or("HEAD")],
        )
        .await?;
        Ok(msg.trim().to_string())
    }

    /// Whether a commit's log message contains the given needle.
    pub async fn commit_msg_contains(&self, needle: &Needle, rev: Option<&str>) -> Result<bool> {
        let msg = self.commit_msg(rev).await?;
        Ok(needle.matches(&msg))
    }

    /// Split a commit message into its meaningful lines: comment lines
    /// (starting with `#`) and blank lines are dropped, the rest trimmed.
    pub fn parse_commit_msg(msg: &str) -> Vec<String> {
        msg.lines()
            .filter(|line| !line.starts_with('#') && !line.trim().is_empty())
            .map(|line| line.trim().to_string())
            .collect()
    }

    /// Whether a file exists in the repository working tree.
    ///
    /// Only "not found" maps to `false`; any other I/O failure is an error.
    pub async fn file_exists(&self, path: &str) -> Result<bool> {
        let full = self.repo_dir.join(path);
        match tokio::fs::metadata(&full).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io {
                path: full,
                source: e,
            }),
        }
    }

    /// Same as [`file_exists`](Self::file_exists), against the shadow
    /// branch's tree.
    pub async fn file_exists_shadow(&self, path: &str) -> Result<bool> {
        self.with_shadow(self.file_exists(path)).await
    }

    /// Copy the spec's files into the working tree (rendering templates) and
    /// commit them with the spec's author and date.
    pub async fn add_commit(&self, spec: &CommitSpec) -> Result<()> {
        for file in &spec.files {
            let source = self.exercise_dir.join(file.source());
            let destination = self.repo_dir.join(file.destination());

            if let Some(parent) = destination.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::Io {
                        path: parent.to_path_buf(),
                        source: e,
                    })?;
            }

            let contents = read_file(source).await?;
            let rendered = file.template().render(&contents);
            tokio::fs::write(&destination, rendered)
                .await
                .map_err(|e| Error::Io {
                    path: destination.clone(),
                    source: e,
                })?;
        }

        git(&self.repo_dir, "add", &["--all"]).await?;

        let date = spec.timestamp.to_rfc3339();
        git(
            &self.repo_dir,
            "commit",
            &[
                "-m",
                &spec.message,
                "--author",
                &spec.author,
                "--date",
                &date,
            ],
        )
        .await?;

        Ok(())
    }

    /// Run `op` with the shadow branch checked out, restoring the primary
    /// branch on every exit path.
    ///
    /// A failed restore is retried once; if the retry also fails, the whole
    /// operation resolves to [`Error::ShadowRestore`] regardless of the
    /// inner result, so a stranded working tree is never reported as
    /// success.
    async fn with_shadow<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        git(&self.repo_dir, "checkout", &[SHADOW_BRANCH]).await?;

        let result = op.await;

        if let Err(restore_err) = self.restore_primary().await {
            return Err(restore_err);
        }
        result
    }

    async fn restore_primary(&self) -> Result<()> {
        let branch = self.primary_branch.as_str();
        match git(&self.repo_dir, "checkout", &[branch]).await {
            Ok(_) => Ok(()),
            Err(first) => {
                warn!(branch, error = %first, "restoring primary branch failed, retrying");
                match git(&self.repo_dir, "checkout", &[branch]).await {
                    Ok(_) => Ok(()),
                    Err(second) => Err(Error::ShadowRestore {
                        branch: branch.to_string(),
                        source: Box::new(second),
                    }),
                }
            }
        }
    }
}

async fn read_file(path: PathBuf) -> Result<String> {
    tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| Error::Io { path, source: e })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_commit_msg_strips_comments_and_blanks() {
        let msg = "Add feature\n\n# Please enter the commit message\n#\n  details here  \n";
        assert_eq!(
            ExerciseUtils::parse_commit_msg(msg),
            vec!["Add feature".to_string(), "details here".to_string()]
        );
    }

    #[test]
    fn parse_commit_msg_of_only_comments_is_empty() {
        let msg = "# one\n# two\n\n";
        assert!(ExerciseUtils::parse_commit_msg(msg).is_empty());
    }

    #[test]
    fn substring_needle_is_literal() {
        let needle = Needle::from("a.c");
        assert!(needle.matches("xa.cx"));
        assert!(!needle.matches("abc"));
    }

    #[test]
    fn pattern_needle_is_a_regex() {
        let needle = Needle::from(Regex::new("a.c").unwrap());
        assert!(needle.matches("abc"));
        assert!(!needle.matches("ab"));
    }
}
