//! `.gcloudignore` rules.
//!
//! Supported syntax:
//!
//! - blank lines and lines starting with `#` are skipped
//! - `!pattern` re-includes a previously ignored path
//! - a trailing `/` restricts the pattern to directories
//! - a leading `/`, or any `/` inside the pattern, anchors it at the source root
//! - otherwise the pattern is matched against the entry's file name at any depth
//!
//! The last matching rule decides.

use std::path::Path;

use glob::{MatchOptions, Pattern};

use crate::archive::ArchiveError;

/// File read from the source root when present.
pub const IGNORE_FILE_NAME: &str = ".gcloudignore";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
struct Rule {
    pattern: Pattern,
    negated: bool,
    dir_only: bool,
    anchored: bool,
}

/// An ordered list of ignore rules.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    rules: Vec<Rule>,
}

impl IgnoreRules {
    /// Parse rules from the text of an ignore file.
    pub fn parse(content: &str) -> Result<Self, ArchiveError> {
        let mut rules = Self::default();
        for line in content.lines() {
            rules.push(line)?;
        }
        Ok(rules)
    }

    /// Load `.gcloudignore` from `source_dir`, returning empty rules if absent.
    pub fn load(source_dir: &Path) -> Result<Self, ArchiveError> {
        let path = source_dir.join(IGNORE_FILE_NAME);
        if !path.is_file() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| ArchiveError::ReadIgnoreFile {
            path: path.clone(),
            source: e,
        })?;
        let rules = Self::parse(&content)?;
        tracing::debug!(path = %path.display(), rules = rules.len(), "loaded ignore file");
        Ok(rules)
    }

    /// Append a single rule line. Comments and blank lines are accepted and skipped.
    pub fn push(&mut self, line: &str) -> Result<(), ArchiveError> {
        let line = line.trim_end();
        if line.trim().is_empty() || line.starts_with('#') {
            return Ok(());
        }

        let (negated, rest) = match line.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, line),
        };
        let (dir_only, rest) = match rest.strip_suffix('/') {
            Some(rest) => (true, rest),
            None => (false, rest),
        };
        let (leading_slash, rest) = match rest.strip_prefix('/') {
            Some(rest) => (true, rest),
            None => (false, rest),
        };
        if rest.is_empty() {
            return Ok(());
        }

        let pattern = Pattern::new(rest).map_err(|e| ArchiveError::InvalidIgnorePattern {
            pattern: line.to_owned(),
            source: e,
        })?;

        self.rules.push(Rule {
            pattern,
            negated,
            dir_only,
            anchored: leading_slash || rest.contains('/'),
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether `relative_path` (with `/` separators) should be left out.
    pub fn is_ignored(&self, relative_path: &str, is_dir: bool) -> bool {
        let file_name = relative_path.rsplit('/').next().unwrap_or(relative_path);

        let mut ignored = false;
        for rule in &self.rules {
            if rule.dir_only && !is_dir {
                continue;
            }
            let candidate = if rule.anchored {
                relative_path
            } else {
                file_name
            };
            if rule.pattern.matches_with(candidate, MATCH_OPTIONS) {
                ignored = !rule.negated;
            }
        }
        ignored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(text: &str) -> IgnoreRules {
        IgnoreRules::parse(text).unwrap()
    }

    #[test]
    fn comments_and_blank_lines_skipped() {
        let r = rules("# comment\n\n   \nnode_modules/\n");
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn basename_pattern_matches_at_any_depth() {
        let r = rules("*.log");
        assert!(r.is_ignored("debug.log", false));
        assert!(r.is_ignored("nested/deep/debug.log", false));
        assert!(!r.is_ignored("index.js", false));
    }

    #[test]
    fn dir_only_pattern_skips_files() {
        let r = rules("build/");
        assert!(r.is_ignored("build", true));
        assert!(r.is_ignored("src/build", true));
        assert!(!r.is_ignored("build", false));
    }

    #[test]
    fn anchored_pattern_matches_only_at_root() {
        let r = rules("/secret.txt");
        assert!(r.is_ignored("secret.txt", false));
        assert!(!r.is_ignored("sub/secret.txt", false));
    }

    #[test]
    fn inner_slash_anchors_pattern() {
        let r = rules("docs/*.md");
        assert!(r.is_ignored("docs/readme.md", false));
        assert!(!r.is_ignored("other/docs/readme.md", false));
        assert!(!r.is_ignored("docs/nested/readme.md", false));
    }

    #[test]
    fn negation_reincludes() {
        let r = rules("*.json\n!package.json");
        assert!(r.is_ignored("data.json", false));
        assert!(!r.is_ignored("package.json", false));
    }

    #[test]
    fn last_match_wins() {
        let r = rules("!keep.txt\n*.txt");
        assert!(r.is_ignored("keep.txt", false));
    }

    #[test]
    fn double_star_crosses_directories() {
        let r = rules("src/**/*.test.js");
        assert!(r.is_ignored("src/a/b/c.test.js", false));
        assert!(!r.is_ignored("lib/c.test.js", false));
    }

    #[test]
    fn invalid_pattern_errors() {
        let err = IgnoreRules::parse("[unclosed").unwrap_err();
        assert!(err.to_string().contains("[unclosed"), "got: {err}");
    }
}
