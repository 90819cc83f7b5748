//! Hierarchical skip patterns.
//!
//! A case name such as `TestGateway/Car/Range` is split on `/` (`\/` is a
//! literal slash). Each pattern is split the same way and every segment is a
//! regular expression anchored to a whole name segment. A case is skipped
//! when its name equals a pattern, or when a pattern's segments match the
//! leading segments of the name.

use regex::Regex;

use crate::error::ConfigError;

/// Split a hierarchical name on unescaped `/`.
///
/// `\/` and `\\` produce the escaped character; any other backslash is kept
/// together with the next character, so regex escapes such as `\d` survive.
pub fn split(name: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;

    for c in name.chars() {
        if escaped {
            if c != '/' && c != '\\' {
                current.push('\\');
            }
            current.push(c);
            escaped = false;
            continue;
        }

        match c {
            '/' => parts.push(std::mem::take(&mut current)),
            '\\' => escaped = true,
            _ => current.push(c),
        }
    }

    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

#[derive(Debug, Clone)]
struct Pattern {
    raw: String,
    segments: Vec<Regex>,
}

/// Precompiled skip patterns.
#[derive(Debug, Clone, Default)]
pub struct SkipFilter {
    patterns: Vec<Pattern>,
}

impl SkipFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|raw| {
                let raw = raw.as_ref();
                let segments = split(raw)
                    .iter()
                    .map(|segment| {
                        Regex::new(&format!("^(?:{segment})$")).map_err(|source| {
                            ConfigError::SkipPattern {
                                pattern: raw.to_string(),
                                source,
                            }
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Pattern {
                    raw: raw.to_string(),
                    segments,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The first pattern that skips `name`, if any.
    pub fn matching(&self, name: &str) -> Option<&str> {
        let name_parts = split(name);
        self.patterns
            .iter()
            .find(|pattern| {
                pattern.raw == name
                    || (pattern.segments.len() <= name_parts.len()
                        && pattern
                            .segments
                            .iter()
                            .zip(&name_parts)
                            .all(|(re, part)| re.is_match(part)))
            })
            .map(|pattern| pattern.raw.as_str())
    }

    pub fn is_skipped(&self, name: &str) -> bool {
        self.matching(name).is_some()
    }
}
