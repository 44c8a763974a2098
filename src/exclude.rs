// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path exclusion rules.
//!
//! Exclusion rules decide which files are left out of a tree listing. Each
//! rule is a shell glob matched against the relative path of a file. A rule
//! prefixed with `!` is __negated__, i.e., it excludes everything that does
//! _not_ match it.
//!
//! A file is excluded if it matches any plain rule, or if it fails to match
//! any negated rule. Rules only ever apply to files. Directories show up in a
//! listing through the files that survive exclusion.
//!
//! Globs follow `fnmatch` semantics without flags: `*` and `?` also match the
//! `/` separator, and leading dots need no special treatment. Runs of `*` act
//! like a single `*`, and a `[` without a closing `]` is a literal character.
//!
//! Exclusion only shapes listings. Deleting an obsolete directory from a
//! target removes everything inside of it, excluded files included.

use glob::{MatchOptions, Pattern};

/// Set of exclusion rules.
#[derive(Debug, Default, Clone)]
pub struct ExcludeSet {
    rules: Vec<ExcludeRule>,
}

impl ExcludeSet {
    /// Construct new exclusion set that excludes nothing.
    pub fn none() -> Self {
        Self::default()
    }

    /// Construct new exclusion set from listing of glob rules.
    ///
    /// Rules with an empty body (`""` or a lone `"!"`) never match, and are
    /// dropped.
    ///
    /// # Errors
    ///
    /// - Return [`ExcludeError::InvalidPattern`] if a rule is not a valid glob.
    pub fn new(rules: impl IntoIterator<Item = impl AsRef<str>>) -> Result<Self> {
        let mut set = Self::none();
        for rule in rules {
            let rule = rule.as_ref();
            let (negated, body) = match rule.strip_prefix('!') {
                Some(body) => (true, body),
                None => (false, rule),
            };

            if body.is_empty() {
                continue;
            }

            let pattern =
                Pattern::new(&fnmatch_to_glob(body)).map_err(|err| ExcludeError::InvalidPattern {
                    source: err,
                    rule: rule.to_owned(),
                })?;
            set.rules.push(ExcludeRule { pattern, negated });
        }

        Ok(set)
    }

    /// Check if relative file path is excluded.
    pub fn is_excluded(&self, path: &str) -> bool {
        let options = MatchOptions::new();
        self.rules
            .iter()
            .any(|rule| rule.pattern.matches_with(path, options) != rule.negated)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Rewrite `fnmatch` pattern into the dialect of [`Pattern`].
///
/// Bracket expressions are located the same way [`Pattern::new`] locates
/// them, so every bracket that survives is one it accepts.
fn fnmatch_to_glob(body: &str) -> String {
    let chars = body.chars().collect::<Vec<_>>();
    let mut glob = String::with_capacity(body.len());
    let mut idx = 0;

    while idx < chars.len() {
        match chars[idx] {
            '*' => {
                glob.push('*');
                while chars.get(idx).is_some_and(|ch| *ch == '*') {
                    idx += 1;
                }
            }
            '[' => match bracket_end(&chars, idx) {
                Some(end) => {
                    glob.extend(&chars[idx..=end]);
                    idx = end + 1;
                }
                None => {
                    glob.push_str("[[]");
                    idx += 1;
                }
            },
            ch => {
                glob.push(ch);
                idx += 1;
            }
        }
    }

    glob
}

/// Index of `]` closing bracket expression that opens at `start`.
fn bracket_end(chars: &[char], start: usize) -> Option<usize> {
    // INVARIANT: First member of a bracket is literal, even if it is `]`.
    let first = match chars.get(start + 1) {
        Some('!') => start + 3,
        Some(_) => start + 2,
        None => return None,
    };

    chars
        .get(first..)?
        .iter()
        .position(|ch| *ch == ']')
        .map(|offset| first + offset)
}

#[derive(Debug, Clone)]
struct ExcludeRule {
    pattern: Pattern,
    negated: bool,
}

/// Exclusion rule error types.
#[derive(Debug, thiserror::Error)]
pub enum ExcludeError {
    /// Rule cannot be parsed as a glob.
    #[error("invalid exclusion rule {rule:?}")]
    InvalidPattern {
        #[source]
        source: glob::PatternError,
        rule: String,
    },
}

/// Friendly result alias :3
type Result<T, E = ExcludeError> = std::result::Result<T, E>;
