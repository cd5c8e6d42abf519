//! Placeholder patterns.
//!
//! A pattern is a path-like string mixing literal segments and `{name}`
//! placeholders, e.g. `/data/{user}/{name}/videos`. Each placeholder spans
//! exactly one path segment and captures it at match time.
//!
//! The same compiled form drives filesystem discovery, live stream
//! authorization and HTTP routing.

use regex::{Captures, Regex};
use std::collections::HashMap;
use thiserror::Error;

pub const PLACEHOLDER_BEGIN: char = '{';
pub const PLACEHOLDER_END: char = '}';

/// Reserved variable holding the base name of a matched path.
pub const FILENAME_VAR: &str = "FILENAME";

/// Substrings that are never allowed in a pattern.
const DANGEROUS_SEQUENCES: [&str; 10] = [
    "%00", "%2e", "%2f", "%5c", "~", "|", ">", "<", "*", "?",
];

/// Placeholder values extracted from a matched path, keyed by name.
pub type Variables = HashMap<String, String>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("pattern cannot contain '..' (path traversal attempt)")]
    ParentTraversal,
    #[error("pattern cannot contain backslashes (use forward slashes)")]
    Backslash,
    #[error("pattern cannot contain empty segments")]
    EmptySegment,
    #[error("pattern contains potentially dangerous sequence: {0}")]
    DangerousSequence(&'static str),
    #[error("unclosed placeholder in pattern {0:?}")]
    UnclosedPlaceholder(String),
    #[error("unmatched '}}' in pattern {0:?}")]
    UnmatchedBrace(String),
    #[error("empty placeholder in pattern {0:?}")]
    EmptyPlaceholder(String),
    #[error("nested placeholders are not allowed in pattern {0:?}")]
    NestedPlaceholder(String),
    #[error("placeholder {0:?} must not span more than one path segment")]
    InvalidPlaceholder(String),
    #[error("building regexp from pattern: {0}")]
    Regex(String),
}

/// A pattern compiled into an anchored regular expression.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    source: String,
    regex: Regex,
    exact: Regex,
    var_names: Vec<String>,
    walk_root: String,
    has_filename: bool,
}

impl CompiledPattern {
    /// Validates `pattern` and compiles it.
    ///
    /// Literal text is escaped and every placeholder becomes a `([^/]+)`
    /// group. A pattern ending with a literal filename is anchored as is,
    /// any other pattern is a directory and requires at least one more path
    /// segment underneath it.
    ///
    /// The last segment names a file when it is fully literal and carries an
    /// extension (`master.m3u8`); `videos` or `{name}` name directories.
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        validate(pattern)?;

        let mut expr = String::from("^");
        let mut literal_prefix = String::new();
        let mut var_names = Vec::new();
        let mut seen_placeholder = false;
        let has_filename = names_file(pattern);

        let mut chars = pattern.chars();
        while let Some(ch) = chars.next() {
            if ch == PLACEHOLDER_BEGIN {
                seen_placeholder = true;
                let mut name = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    match inner {
                        PLACEHOLDER_END => {
                            closed = true;
                            break;
                        }
                        PLACEHOLDER_BEGIN => {
                            return Err(PatternError::NestedPlaceholder(pattern.to_string()))
                        }
                        '/' => return Err(PatternError::InvalidPlaceholder(name)),
                        other => name.push(other),
                    }
                }
                if !closed {
                    return Err(PatternError::UnclosedPlaceholder(pattern.to_string()));
                }
                if name.is_empty() {
                    return Err(PatternError::EmptyPlaceholder(pattern.to_string()));
                }
                expr.push_str("([^/]+)");
                var_names.push(name);
                continue;
            }
            if ch == PLACEHOLDER_END {
                return Err(PatternError::UnmatchedBrace(pattern.to_string()));
            }

            let mut buf = [0u8; 4];
            expr.push_str(&regex::escape(ch.encode_utf8(&mut buf)));
            if !seen_placeholder {
                literal_prefix.push(ch);
            }
        }

        let exact = format!("{}$", expr);
        if has_filename {
            expr.push('$');
        } else {
            expr.push_str("/(.+)$");
        }

        let regex = Regex::new(&expr).map_err(|e| PatternError::Regex(e.to_string()))?;
        let exact = Regex::new(&exact).map_err(|e| PatternError::Regex(e.to_string()))?;
        let walk_root = walk_root_of(&literal_prefix, seen_placeholder || has_filename);

        Ok(Self {
            source: pattern.to_string(),
            regex,
            exact,
            var_names,
            walk_root,
            has_filename,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Variable names in order of first appearance.
    pub fn var_names(&self) -> &[String] {
        &self.var_names
    }

    /// Literal directory to start a filesystem walk from.
    pub fn walk_root(&self) -> &str {
        &self.walk_root
    }

    /// `true` when the last segment of the pattern is a literal filename.
    pub fn has_filename(&self) -> bool {
        self.has_filename
    }

    /// Base name of the pattern (meaningful when [`Self::has_filename`]).
    pub fn file_name(&self) -> &str {
        base_name(&self.source)
    }

    /// Number of path separators in the pattern, used to bound directory walks.
    pub fn max_depth(&self) -> usize {
        self.source.matches('/').count()
    }

    /// Matches `candidate` and extracts its placeholder values plus the
    /// reserved [`FILENAME_VAR`].
    pub fn matches(&self, candidate: &str) -> Option<Variables> {
        self.split(candidate).map(|(vars, _)| vars)
    }

    /// Matches `candidate` against the pattern itself, without requiring
    /// anything beneath a directory pattern. No [`FILENAME_VAR`] is added.
    pub fn matches_exact(&self, candidate: &str) -> Option<Variables> {
        let candidate = candidate.replace('\\', "/");
        let caps = self.exact.captures(&candidate)?;
        self.variables(&caps)
    }

    /// Like [`Self::matches`], also returning whatever the candidate holds
    /// beneath a directory pattern (empty for filename patterns).
    pub fn split(&self, candidate: &str) -> Option<(Variables, String)> {
        let candidate = candidate.replace('\\', "/");
        let caps = self.regex.captures(&candidate)?;
        let mut vars = self.variables(&caps)?;

        if candidate.contains('/') {
            let file_name = base_name(&candidate);
            if !file_name.is_empty() && file_name != "." {
                vars.insert(FILENAME_VAR.to_string(), file_name.to_string());
            }
        }

        let rest = if self.has_filename {
            String::new()
        } else {
            caps.get(self.var_names.len() + 1)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default()
        };

        Some((vars, rest))
    }

    fn variables(&self, caps: &Captures<'_>) -> Option<Variables> {
        let mut vars = Variables::with_capacity(self.var_names.len() + 1);
        for (i, name) in self.var_names.iter().enumerate() {
            let value = caps.get(i + 1)?.as_str();
            vars.entry(name.clone())
                .or_insert_with(|| value.to_string());
        }
        Some(vars)
    }
}

/// Security checks run before any compilation.
pub fn validate(pattern: &str) -> Result<(), PatternError> {
    if pattern.contains("..") {
        return Err(PatternError::ParentTraversal);
    }
    if pattern.contains('\\') {
        return Err(PatternError::Backslash);
    }
    // A leading '/' yields one permitted empty first segment.
    if pattern.split('/').skip(1).any(str::is_empty) {
        return Err(PatternError::EmptySegment);
    }

    let lowered = pattern.to_ascii_lowercase();
    if let Some(seq) = DANGEROUS_SEQUENCES.iter().find(|seq| lowered.contains(*seq)) {
        return Err(PatternError::DangerousSequence(seq));
    }

    if pattern.contains("{{") || pattern.contains("}}") {
        return Err(PatternError::NestedPlaceholder(pattern.to_string()));
    }
    Ok(())
}

/// Last path segment of `path`, ignoring trailing separators.
pub fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

fn names_file(pattern: &str) -> bool {
    let last = base_name(pattern);
    !last.contains(PLACEHOLDER_BEGIN) && last.contains('.')
}

fn walk_root_of(literal_prefix: &str, truncate: bool) -> String {
    let dir = if truncate {
        match literal_prefix.rfind('/') {
            Some(0) => "/",
            Some(idx) => &literal_prefix[..idx],
            None => "",
        }
    } else {
        literal_prefix
    };
    super::template::clean(dir)
}
