//! Filters deciding which files of a batch are attempted.
//!
//! A rule returns `true` to let a candidate through. A batch attempts a
//! file only when every rule passes it.

use std::collections::HashSet;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::BatchError;

/// What a rule sees of one batch entry.
#[derive(Debug, Clone, Copy)]
pub struct RuleCandidate<'a> {
    /// The path as given to the batch call.
    pub path: &'a str,
    /// Its last segment.
    pub name: &'a str,
}

pub trait Rule: Send + Sync {
    fn is_match(&self, candidate: &RuleCandidate<'_>) -> bool;
}

impl<F> Rule for F
where
    F: Fn(&RuleCandidate<'_>) -> bool + Send + Sync,
{
    fn is_match(&self, candidate: &RuleCandidate<'_>) -> bool {
        self(candidate)
    }
}

/// Returns `true` when every rule passes `candidate`.
pub fn passes<R: AsRef<dyn Rule>>(rules: &[R], candidate: &RuleCandidate<'_>) -> bool {
    rules.iter().all(|rule| rule.as_ref().is_match(candidate))
}

/// Whether a rule keeps what it lists or drops it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
    Whitelist,
    Blacklist,
}

impl ListMode {
    fn passes(self, listed: bool) -> bool {
        match self {
            Self::Whitelist => listed,
            Self::Blacklist => !listed,
        }
    }
}

/// Matches file extensions, case-insensitively, with or without the dot.
#[derive(Debug, Clone)]
pub struct ExtensionRule {
    mode: ListMode,
    extensions: HashSet<String>,
}

impl ExtensionRule {
    pub fn new<I, E>(mode: ListMode, extensions: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: AsRef<str>,
    {
        Self {
            mode,
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }
}

impl Rule for ExtensionRule {
    fn is_match(&self, candidate: &RuleCandidate<'_>) -> bool {
        let listed = candidate
            .name
            .rsplit_once('.')
            .is_some_and(|(_, ext)| self.extensions.contains(&ext.to_ascii_lowercase()));
        self.mode.passes(listed)
    }
}

/// Matches exact file names.
#[derive(Debug, Clone)]
pub struct NameRule {
    mode: ListMode,
    names: HashSet<String>,
}

impl NameRule {
    pub fn new<I, N>(mode: ListMode, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        Self {
            mode,
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl Rule for NameRule {
    fn is_match(&self, candidate: &RuleCandidate<'_>) -> bool {
        self.mode.passes(self.names.contains(candidate.name))
    }
}

/// Matches glob patterns. `*` stops at `/`; patterns without a `/` are
/// tried against the file name as well as the full path.
#[derive(Debug, Clone)]
pub struct GlobRule {
    mode: ListMode,
    set: GlobSet,
}

impl GlobRule {
    pub fn new<I, P>(mode: ListMode, patterns: I) -> Result<Self, BatchError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            if pattern.is_empty() {
                return Err(BatchError::Argument("empty glob pattern".into()));
            }
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()?;
            builder.add(glob);
        }
        Ok(Self {
            mode,
            set: builder.build()?,
        })
    }

    /// Single-pattern shorthand.
    pub fn pattern(mode: ListMode, pattern: &str) -> Result<Self, BatchError> {
        Self::new(mode, [pattern])
    }
}

impl Rule for GlobRule {
    fn is_match(&self, candidate: &RuleCandidate<'_>) -> bool {
        let listed = self.set.is_match(candidate.path) || self.set.is_match(candidate.name);
        self.mode.passes(listed)
    }
}
