//! Line-level file comparison

use similar::{ChangeTag, TextDiff};

/// A single changed line, relative to the reference side of the comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum LineChange {
    /// Line present in the reference but missing from the verified file.
    Added(String),
    /// Line present in the verified file but absent from the reference.
    Removed(String),
}

/// Result of comparing a working-tree file against a reference file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileDiff {
    /// Added/removed lines, in diff order.
    pub changes: Vec<LineChange>,
    /// Similarity ratio (0.0 to 1.0).
    pub similarity: f64,
}

impl FileDiff {
    /// Compare `verified` (the student's file) against `reference`.
    ///
    /// Returns `None` when the computed diff contains no added or removed
    /// lines, which is the explicit "no difference" result.
    pub fn compute(verified: &str, reference: &str) -> Option<FileDiff> {
        if verified == reference {
            return None;
        }

        let text_diff = TextDiff::from_lines(verified, reference);
        let similarity = f64::from(text_diff.ratio());

        let mut changes = Vec::new();
        for change in text_diff.iter_all_changes() {
            match change.tag() {
                ChangeTag::Insert => {
                    changes.push(LineChange::Added(change.value().to_string()));
                }
                ChangeTag::Delete => {
                    changes.push(LineChange::Removed(change.value().to_string()));
                }
                ChangeTag::Equal => {}
            }
        }

        if changes.is_empty() {
            return None;
        }

        Some(FileDiff {
            changes,
            similarity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_content_is_no_difference() {
        assert_eq!(FileDiff::compute("a\nb\n", "a\nb\n"), None);
    }

    #[test]
    fn added_line_is_reported() {
        let diff = FileDiff::compute("line1\n", "line1\nline2\n").unwrap();
        assert!(diff
            .changes
            .iter()
            .any(|c| matches!(c, LineChange::Added(l) if l.contains("line2"))));
        assert!(diff.similarity < 1.0);
    }

    #[test]
    fn removed_line_is_reported() {
        let diff = FileDiff::compute("line1\nline2\n", "line1\n").unwrap();
        assert!(diff
            .changes
            .iter()
            .any(|c| matches!(c, LineChange::Removed(l) if l.contains("line2"))));
    }

    #[test]
    fn changed_line_is_both_removed_and_added() {
        let diff = FileDiff::compute("hello\n", "goodbye\n").unwrap();
        assert_eq!(diff.changes.len(), 2);
        assert!(matches!(&diff.changes[0], LineChange::Removed(l) if l.contains("hello")));
        assert!(matches!(&diff.changes[1], LineChange::Added(l) if l.contains("goodbye")));
    }
}
