use regex::Regex;
use tracing::debug;

use crate::error::StoreError;

/// A compiled selector pattern.
///
/// Patterns are dot-separated like selectors and may contain wildcards:
/// - `*` matches exactly one segment (one or more non-dot characters)
/// - `**` matches one or more trailing segments (must be the last token)
///
/// Matching is anchored: `a.b` does not match `a.b.c` or `x.a.b`.
///
/// # Examples
///
/// ```ignore
/// let p = Pattern::compile("a.*.c")?;
/// assert!(p.matches("a.b.c"));
/// assert!(!p.matches("a.b.d"));
///
/// let p = Pattern::compile("a.**")?;
/// assert!(p.matches("a.b.c.d"));
/// ```
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compile a pattern. A `**` anywhere but at the end is rejected.
    pub fn compile(pattern: &str) -> Result<Self, StoreError> {
        let invalid = |reason: String| StoreError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };

        if let Some(idx) = pattern.find("**") {
            if idx + 2 != pattern.len() {
                return Err(invalid("`**` must be the last token".to_string()));
            }
        }

        let mut expr = String::with_capacity(pattern.len() + 8);
        expr.push('^');
        let mut rest = pattern;
        while !rest.is_empty() {
            if let Some(tail) = rest.strip_prefix("**") {
                expr.push_str(".+");
                rest = tail;
            } else if let Some(tail) = rest.strip_prefix('*') {
                expr.push_str("[^.]+");
                rest = tail;
            } else {
                let end = rest.find('*').unwrap_or(rest.len());
                expr.push_str(&regex::escape(&rest[..end]));
                rest = &rest[end..];
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// A list of patterns compiled once, tested as a disjunction.
///
/// Malformed patterns are dropped at construction with a diagnostic; they
/// never match anything. An empty set matches nothing.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    pub fn new<S: AsRef<str>>(patterns: impl IntoIterator<Item = S>) -> Self {
        let patterns = patterns
            .into_iter()
            .filter_map(|p| match Pattern::compile(p.as_ref()) {
                Ok(pattern) => Some(pattern),
                Err(err) => {
                    debug!("PatternSet: ignoring pattern: {}", err);
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    /// True if any pattern matches `candidate`. An absent candidate never
    /// matches.
    pub fn matches(&self, candidate: Option<&str>) -> bool {
        match candidate {
            Some(c) if !c.is_empty() => self.patterns.iter().any(|p| p.matches(c)),
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// One-shot form of [`PatternSet::matches`].
pub fn matches<S: AsRef<str>>(patterns: &[S], candidate: Option<&str>) -> bool {
    PatternSet::new(patterns).matches(candidate)
}

/// Whether a write at `selector` concerns data observed at `base`.
///
/// True when the two are equal, when `selector` is an ancestor of `base`
/// or when `selector` is a descendant of `base`, always on whole-segment
/// boundaries (`a.b` is not related to `a.bc`).
pub fn is_related(selector: &str, base: &str) -> bool {
    let mut s = selector.split('.');
    let mut b = base.split('.');
    loop {
        match (s.next(), b.next()) {
            (Some(x), Some(y)) if x != y => return false,
            (Some(_), Some(_)) => continue,
            _ => return true,
        }
    }
}
