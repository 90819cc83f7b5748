//! # Checks
//!
//! A small predicate algebra with diagnostics. A [`Check`] is evaluated
//! against a subject and produces an [`Outcome`]; failing outcomes carry a
//! reason that names both the expected and the actual value.
//!
//! Three subject kinds are supported, each with its own leaf predicates:
//!
//! | Subject | Leaf | Used for |
//! |---------|------|----------|
//! | `str` | [`TextCheck`] | decoded bodies, single header values |
//! | `[u8]` | [`BytesCheck`] | raw bodies |
//! | `[String]` | [`ListCheck`] | header value lists |
//!
//! Combinators (`and`, `or`, `!`, hints, custom functions) work the same for
//! every subject.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::Serialize;

use crate::template::templated;

/// Result of evaluating a [`Check`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Outcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl Outcome {
    pub fn pass() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
            hint: None,
        }
    }

    /// Attach a hint. An existing hint is nested as `outer (inner)`.
    pub fn with_hint(mut self, hint: &str) -> Self {
        self.hint = Some(match self.hint.take() {
            Some(inner) => format!("{hint} ({inner})"),
            None => hint.to_string(),
        });
        self
    }

    /// Reason followed by the hint, when there is one.
    pub fn message(&self) -> String {
        let reason = self.reason.as_deref().unwrap_or_default();
        match &self.hint {
            Some(hint) => format!("{reason} ({hint})"),
            None => reason.to_string(),
        }
    }
}

/// A value kind that checks can be evaluated against.
pub trait Subject {
    type Leaf: fmt::Debug + fmt::Display + Clone + Send + Sync;

    fn evaluate_leaf(leaf: &Self::Leaf, value: &Self) -> Outcome;

    /// Human-readable rendering used in failure reasons.
    fn render(value: &Self) -> String;
}

type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;
type Verifier<T> = Arc<dyn Fn(&T) -> Outcome + Send + Sync>;

/// A composable predicate over `T`.
pub enum Check<T: ?Sized + Subject> {
    Leaf(T::Leaf),
    /// Succeeds when the function returns true.
    Custom(Predicate<T>),
    /// Delegates the whole outcome to the function, reason included.
    Verify(Verifier<T>),
    And(Vec<Check<T>>),
    Or(Vec<Check<T>>),
    Not(Box<Check<T>>),
    Hinted { hint: String, check: Box<Check<T>> },
}

impl<T: ?Sized + Subject> Check<T> {
    pub fn evaluate(&self, value: &T) -> Outcome {
        match self {
            Check::Leaf(leaf) => T::evaluate_leaf(leaf, value),
            Check::Custom(f) => {
                if f(value) {
                    Outcome::pass()
                } else {
                    Outcome::fail(format!("expected to 'f({}) = true'", T::render(value)))
                }
            }
            Check::Verify(f) => f(value),
            Check::And(checks) => {
                for check in checks {
                    let outcome = check.evaluate(value);
                    if !outcome.success {
                        return outcome;
                    }
                }
                Outcome::pass()
            }
            Check::Or(checks) => {
                if checks.is_empty() {
                    return Outcome::fail("expected at least one alternative to hold, none given");
                }
                let mut reasons = Vec::with_capacity(checks.len());
                for check in checks {
                    let outcome = check.evaluate(value);
                    if outcome.success {
                        return outcome;
                    }
                    reasons.push(outcome.message());
                }
                Outcome::fail(reasons.join(" or "))
            }
            Check::Not(check) => {
                if check.evaluate(value).success {
                    Outcome::fail(format!(
                        "expected `{check}` to fail for '{}', but it succeeded",
                        T::render(value)
                    ))
                } else {
                    Outcome::pass()
                }
            }
            Check::Hinted { hint, check } => check.evaluate(value).with_hint(hint),
        }
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Check::Custom(Arc::new(f))
    }

    pub fn verify<F>(f: F) -> Self
    where
        F: Fn(&T) -> Outcome + Send + Sync + 'static,
    {
        Check::Verify(Arc::new(f))
    }

    pub fn with_hint(self, hint: impl Into<String>) -> Self {
        Check::Hinted {
            hint: hint.into(),
            check: Box::new(self),
        }
    }

    /// Hint attached at the outermost level, if any.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Check::Hinted { hint, .. } => Some(hint),
            _ => None,
        }
    }
}

impl<T: ?Sized + Subject> std::ops::Not for Check<T> {
    type Output = Check<T>;

    fn not(self) -> Self::Output {
        Check::Not(Box::new(self))
    }
}

impl<T: ?Sized + Subject> Clone for Check<T> {
    fn clone(&self) -> Self {
        match self {
            Check::Leaf(leaf) => Check::Leaf(leaf.clone()),
            Check::Custom(f) => Check::Custom(Arc::clone(f)),
            Check::Verify(f) => Check::Verify(Arc::clone(f)),
            Check::And(checks) => Check::And(checks.clone()),
            Check::Or(checks) => Check::Or(checks.clone()),
            Check::Not(check) => Check::Not(check.clone()),
            Check::Hinted { hint, check } => Check::Hinted {
                hint: hint.clone(),
                check: check.clone(),
            },
        }
    }
}

impl<T: ?Sized + Subject> fmt::Display for Check<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::Leaf(leaf) => write!(f, "{leaf}"),
            Check::Custom(_) => write!(f, "satisfies a custom predicate"),
            Check::Verify(_) => write!(f, "passes a custom verification"),
            Check::And(checks) => write_joined(f, checks, " and "),
            Check::Or(checks) => write_joined(f, checks, " or "),
            Check::Not(check) => write!(f, "not ({check})"),
            Check::Hinted { check, .. } => write!(f, "{check}"),
        }
    }
}

fn write_joined<T: ?Sized + Subject>(
    f: &mut fmt::Formatter<'_>,
    checks: &[Check<T>],
    separator: &str,
) -> fmt::Result {
    write!(f, "(")?;
    for (i, check) in checks.iter().enumerate() {
        if i > 0 {
            write!(f, "{separator}")?;
        }
        write!(f, "{check}")?;
    }
    write!(f, ")")
}

impl<T: ?Sized + Subject> fmt::Debug for Check<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::Leaf(leaf) => f.debug_tuple("Leaf").field(leaf).finish(),
            Check::Custom(_) => f.write_str("Custom(..)"),
            Check::Verify(_) => f.write_str("Verify(..)"),
            Check::And(checks) => f.debug_tuple("And").field(checks).finish(),
            Check::Or(checks) => f.debug_tuple("Or").field(checks).finish(),
            Check::Not(check) => f.debug_tuple("Not").field(check).finish(),
            Check::Hinted { hint, check } => f
                .debug_struct("Hinted")
                .field("hint", hint)
                .field("check", check)
                .finish(),
        }
    }
}

// Text

#[derive(Debug, Clone)]
pub enum TextCheck {
    Equals(String),
    Contains(String),
    Matches(Regex),
    IsEmpty,
}

impl fmt::Display for TextCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextCheck::Equals(expected) => write!(f, "equals '{expected}'"),
            TextCheck::Contains(needle) => write!(f, "contains '{needle}'"),
            TextCheck::Matches(re) => write!(f, "matches '{}'", re.as_str()),
            TextCheck::IsEmpty => write!(f, "is empty"),
        }
    }
}

impl Subject for str {
    type Leaf = TextCheck;

    fn evaluate_leaf(leaf: &TextCheck, value: &str) -> Outcome {
        match leaf {
            TextCheck::Equals(expected) if value == expected => Outcome::pass(),
            TextCheck::Equals(expected) => {
                Outcome::fail(format!("expected '{expected}', got '{value}'"))
            }
            TextCheck::Contains(needle) if value.contains(needle.as_str()) => Outcome::pass(),
            TextCheck::Contains(needle) => Outcome::fail(format!(
                "expect to find substring '{needle}', got '{value}'"
            )),
            TextCheck::Matches(re) if re.is_match(value) => Outcome::pass(),
            TextCheck::Matches(re) => Outcome::fail(format!(
                "expected to match '{}', got '{value}'",
                re.as_str()
            )),
            TextCheck::IsEmpty if value.is_empty() => Outcome::pass(),
            TextCheck::IsEmpty => Outcome::fail(format!("expected empty string, got '{value}'")),
        }
    }

    fn render(value: &str) -> String {
        value.to_string()
    }
}

impl Check<str> {
    pub fn equals(expected: impl Into<String>) -> Self {
        Check::Leaf(TextCheck::Equals(expected.into()))
    }

    pub fn contains(needle: impl Into<String>) -> Self {
        Check::Leaf(TextCheck::Contains(needle.into()))
    }

    /// Regex search over the whole value.
    ///
    /// # Panics
    ///
    /// Panics when `pattern` is not a valid regular expression.
    pub fn matches(pattern: &str) -> Self {
        match Self::try_matches(pattern) {
            Ok(check) => check,
            Err(err) => panic!("invalid pattern `{pattern}`: {err}"),
        }
    }

    pub fn try_matches(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(|re| Check::Leaf(TextCheck::Matches(re)))
    }

    pub fn empty() -> Self {
        Check::Leaf(TextCheck::IsEmpty)
    }
}

// Bytes

#[derive(Debug, Clone)]
pub enum BytesCheck {
    Equals(Vec<u8>),
    Contains(Vec<u8>),
    /// The payload parses as JSON equal to this value.
    JsonEquals(serde_json::Value),
    IsEmpty,
}

impl fmt::Display for BytesCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BytesCheck::Equals(expected) => write!(f, "equals {}", render_bytes(expected)),
            BytesCheck::Contains(needle) => write!(f, "contains {}", render_bytes(needle)),
            BytesCheck::JsonEquals(value) => write!(f, "is JSON equal to {value}"),
            BytesCheck::IsEmpty => write!(f, "is empty"),
        }
    }
}

fn render_bytes(value: &[u8]) -> String {
    match std::str::from_utf8(value) {
        Ok(text) => format!("{text:?}"),
        Err(_) => format!("{value:?}"),
    }
}

impl Subject for [u8] {
    type Leaf = BytesCheck;

    fn evaluate_leaf(leaf: &BytesCheck, value: &[u8]) -> Outcome {
        match leaf {
            BytesCheck::Equals(expected) if value == expected.as_slice() => Outcome::pass(),
            BytesCheck::Equals(expected) => {
                match (std::str::from_utf8(expected), std::str::from_utf8(value)) {
                    (Ok(want), Ok(got)) => Outcome::fail(format!("expected {want:?}, got {got:?}")),
                    _ => Outcome::fail(format!("expected '{expected:?}', got '{value:?}'")),
                }
            }
            BytesCheck::Contains(needle) => {
                if needle.is_empty() || value.windows(needle.len()).any(|w| w == needle.as_slice())
                {
                    Outcome::pass()
                } else {
                    Outcome::fail(format!(
                        "expect to find {}, got {}",
                        render_bytes(needle),
                        render_bytes(value)
                    ))
                }
            }
            BytesCheck::JsonEquals(expected) => match serde_json::from_slice::<serde_json::Value>(value) {
                Ok(got) if &got == expected => Outcome::pass(),
                Ok(got) => Outcome::fail(format!("expected '{expected}', got '{got}'")),
                Err(err) => Outcome::fail(format!("expected a JSON document, got a parse error: {err}")),
            },
            BytesCheck::IsEmpty if value.is_empty() => Outcome::pass(),
            BytesCheck::IsEmpty => {
                Outcome::fail(format!("expected empty payload, got {} bytes", value.len()))
            }
        }
    }

    fn render(value: &[u8]) -> String {
        render_bytes(value)
    }
}

impl Check<[u8]> {
    pub fn equals(expected: impl Into<Vec<u8>>) -> Self {
        Check::Leaf(BytesCheck::Equals(expected.into()))
    }

    pub fn contains(needle: impl Into<Vec<u8>>) -> Self {
        Check::Leaf(BytesCheck::Contains(needle.into()))
    }

    pub fn json_equals(expected: serde_json::Value) -> Self {
        Check::Leaf(BytesCheck::JsonEquals(expected))
    }

    pub fn empty() -> Self {
        Check::Leaf(BytesCheck::IsEmpty)
    }
}

// Header value lists

#[derive(Debug, Clone)]
pub enum ListCheck {
    Equals(Vec<String>),
    /// Every value is present somewhere in the list, order and duplicates ignored.
    HasAll(Vec<String>),
    IsEmpty,
    /// Exactly one value, which satisfies the inner check.
    Single(Box<Check<str>>),
}

impl fmt::Display for ListCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListCheck::Equals(values) => write!(f, "equals {values:?}"),
            ListCheck::HasAll(values) => write!(f, "has {values:?}"),
            ListCheck::IsEmpty => write!(f, "is empty"),
            ListCheck::Single(check) => write!(f, "{check}"),
        }
    }
}

impl Subject for [String] {
    type Leaf = ListCheck;

    fn evaluate_leaf(leaf: &ListCheck, value: &[String]) -> Outcome {
        match leaf {
            ListCheck::Equals(expected) if value == expected.as_slice() => Outcome::pass(),
            ListCheck::Equals(expected) => {
                Outcome::fail(format!("expected '{expected:?}', got '{value:?}'"))
            }
            ListCheck::HasAll(expected) => {
                match expected.iter().find(|want| !value.contains(want)) {
                    Some(missing) => Outcome::fail(format!(
                        "expected to find '{missing}' in '{value:?}'"
                    )),
                    None => Outcome::pass(),
                }
            }
            ListCheck::IsEmpty if value.is_empty() => Outcome::pass(),
            ListCheck::IsEmpty => Outcome::fail(format!("expected empty array, got '{value:?}'")),
            ListCheck::Single(check) => match value {
                [single] => check.evaluate(single),
                _ => Outcome::fail(format!("expected one element, got {}", value.len())),
            },
        }
    }

    fn render(value: &[String]) -> String {
        format!("{value:?}")
    }
}

impl Check<[String]> {
    pub fn equals<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Check::Leaf(ListCheck::Equals(values.into_iter().map(Into::into).collect()))
    }

    pub fn has<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Check::Leaf(ListCheck::HasAll(values.into_iter().map(Into::into).collect()))
    }

    pub fn empty() -> Self {
        Check::Leaf(ListCheck::IsEmpty)
    }

    pub fn single(check: Check<str>) -> Self {
        Check::Leaf(ListCheck::Single(Box::new(check)))
    }
}

// Shorthands used by test definitions.

/// Text equality against a template resolved with `args`.
pub fn is_equal(format: &str, args: &[&dyn fmt::Display]) -> Check<str> {
    Check::<str>::equals(templated(format, args))
}

pub fn contains(format: &str, args: &[&dyn fmt::Display]) -> Check<str> {
    Check::<str>::contains(templated(format, args))
}

/// # Panics
///
/// Panics when the resolved pattern is not a valid regular expression.
pub fn matches(format: &str, args: &[&dyn fmt::Display]) -> Check<str> {
    Check::<str>::matches(&templated(format, args))
}

pub fn bytes_equal(expected: impl Into<Vec<u8>>) -> Check<[u8]> {
    Check::<[u8]>::equals(expected)
}

pub fn has<I, S>(values: I) -> Check<[String]>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Check::<[String]>::has(values)
}

pub fn uniq(check: Check<str>) -> Check<[String]> {
    Check::<[String]>::single(check)
}

pub fn and<T: ?Sized + Subject>(checks: Vec<Check<T>>) -> Check<T> {
    Check::And(checks)
}

pub fn or<T: ?Sized + Subject>(checks: Vec<Check<T>>) -> Check<T> {
    Check::Or(checks)
}

pub fn not<T: ?Sized + Subject>(check: Check<T>) -> Check<T> {
    !check
}

pub fn with_hint<T: ?Sized + Subject>(hint: impl Into<String>, check: Check<T>) -> Check<T> {
    check.with_hint(hint)
}
