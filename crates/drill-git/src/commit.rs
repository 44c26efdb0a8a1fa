//! Commit authoring specifications
//!
//! A [`CommitSpec`] describes a commit the exercise fabricates in the
//! student's repository: which exercise files to copy (optionally rendered
//! through a template), the commit message, and the author identity.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use regex::Regex;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([A-Za-z0-9_]+)\}").expect("placeholder regex is valid"))
}

/// Placeholder rendering for copied files. Placeholders use the
/// `${NAME}` form; unresolved placeholders are left verbatim.
#[derive(Clone, Default)]
pub enum Template {
    /// Copy the file unchanged.
    #[default]
    None,
    /// Substitute placeholders from a value map.
    Values(HashMap<String, String>),
    /// Substitute placeholders through a render function, called once per
    /// placeholder name.
    Render(Arc<dyn Fn(&str) -> Option<String> + Send + Sync>),
}

impl Template {
    /// Build a value-map template from (name, value) pairs.
    pub fn values<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::Values(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build a render-function template.
    pub fn render_with(f: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self::Render(Arc::new(f))
    }

    /// Render `input`, replacing every `${NAME}` this template resolves.
    pub fn render(&self, input: &str) -> String {
        if matches!(self, Self::None) {
            return input.to_string();
        }
        placeholder_re()
            .replace_all(input, |caps: &regex::Captures<'_>| {
                self.lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    fn lookup(&self, name: &str) -> Option<String> {
        match self {
            Self::None => None,
            Self::Values(map) => map.get(name).cloned(),
            Self::Render(f) => f(name),
        }
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("Template::None"),
            Self::Values(map) => f.debug_tuple("Template::Values").field(map).finish(),
            Self::Render(_) => f.write_str("Template::Render(..)"),
        }
    }
}

/// One file entry in a commit specification.
#[derive(Debug, Clone)]
pub enum FileSpec {
    /// Bare relative path: copied from the exercise directory into the
    /// repository at the same relative path, unrendered.
    Path(String),
    /// Long form with distinct source/destination and optional template.
    Full {
        /// Path relative to the exercise content directory.
        source: String,
        /// Path relative to the repository root.
        destination: String,
        template: Template,
    },
}

impl FileSpec {
    pub fn path(p: impl Into<String>) -> Self {
        Self::Path(p.into())
    }

    pub fn full(
        source: impl Into<String>,
        destination: impl Into<String>,
        template: Template,
    ) -> Self {
        Self::Full {
            source: source.into(),
            destination: destination.into(),
            template,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            Self::Path(p) => p,
            Self::Full { source, .. } => source,
        }
    }

    pub fn destination(&self) -> &str {
        match self {
            Self::Path(p) => p,
            Self::Full { destination, .. } => destination,
        }
    }

    pub fn template(&self) -> &Template {
        static NONE: Template = Template::None;
        match self {
            Self::Path(_) => &NONE,
            Self::Full { template, .. } => template,
        }
    }
}

impl From<&str> for FileSpec {
    fn from(p: &str) -> Self {
        Self::path(p)
    }
}

/// Specification for a fabricated commit.
#[derive(Debug, Clone)]
pub struct CommitSpec {
    /// Commit message.
    pub message: String,
    /// Author signature in `Name <email>` form.
    pub author: String,
    /// Author/commit date.
    pub timestamp: DateTime<Utc>,
    /// Files to copy into the working tree before committing.
    pub files: Vec<FileSpec>,
}
