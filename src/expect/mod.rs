//! # Expectations
//!
//! Builders describing the response a request should produce. Like
//! [`RequestSpec`](crate::http::RequestSpec), every setter consumes the value
//! and returns the updated one.
//!
//! ```ignore
//! expect()
//!     .status(200)
//!     .header(header("Content-Type").contains("text/plain"))
//!     .header(header("X-Ipfs-Path").hint("path header is required").exists())
//!     .body("hello\n")
//! ```

use std::fmt;
use std::ops::RangeInclusive;

use crate::check::{self, Check, ListCheck, Outcome};
use crate::http::Response;

/// A predicate over the values of one response header.
#[derive(Debug, Clone)]
pub struct HeaderExpectation {
    pub name: String,
    pub check: Option<Check<[String]>>,
    pub hint: Option<String>,
    pub negate: bool,
    /// Links to the documents defining this header's behavior.
    pub specs: Vec<String>,
}

pub fn header(name: impl Into<String>) -> HeaderExpectation {
    HeaderExpectation {
        name: name.into(),
        check: None,
        hint: None,
        negate: false,
        specs: Vec::new(),
    }
}

/// Shorthand for `header(name).equals(value)`.
pub fn header_value(name: impl Into<String>, value: impl Into<String>) -> HeaderExpectation {
    header(name).equals(value)
}

impl HeaderExpectation {
    /// Exactly one value, equal to `value`.
    pub fn equals(self, value: impl Into<String>) -> Self {
        self.check(check::uniq(Check::<str>::equals(value)))
    }

    pub fn contains(self, needle: impl Into<String>) -> Self {
        self.check(check::uniq(Check::<str>::contains(needle)))
    }

    /// # Panics
    ///
    /// Panics when `pattern` is not a valid regular expression.
    pub fn matches(self, pattern: &str) -> Self {
        self.check(check::uniq(Check::<str>::matches(pattern)))
    }

    /// Every value appears among the header's values.
    pub fn has<I, S>(self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.check(check::has(values))
    }

    pub fn is_empty(self) -> Self {
        self.check(Check::<[String]>::empty())
    }

    /// Present with at least one value.
    pub fn exists(self) -> Self {
        self.not().is_empty()
    }

    pub fn checks<F>(self, f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.check(check::uniq(Check::<str>::custom(f)))
    }

    pub fn checks_all<F>(self, f: F) -> Self
    where
        F: Fn(&[String]) -> bool + Send + Sync + 'static,
    {
        self.check(Check::<[String]>::custom(f))
    }

    pub fn check(mut self, check: Check<[String]>) -> Self {
        self.check = Some(check);
        self
    }

    /// Toggle negation of the check.
    #[allow(clippy::should_implement_trait)]
    pub fn not(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn spec(self, link: impl Into<String>) -> Self {
        self.specs([link])
    }

    /// Replace the spec links.
    pub fn specs<I, S>(mut self, links: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.specs = links.into_iter().map(Into::into).collect();
        self
    }

    /// `Some(true)` when only presence is checked, `Some(false)` when only
    /// absence is.
    fn presence(&self) -> Option<bool> {
        match &self.check {
            None => Some(!self.negate),
            Some(Check::Leaf(ListCheck::IsEmpty)) => Some(self.negate),
            Some(_) => None,
        }
    }

    /// The check actually applied, negation included. A header without an
    /// explicit check must exist.
    pub fn effective_check(&self) -> Check<[String]> {
        let (check, negate) = match &self.check {
            Some(check) => (check.clone(), self.negate),
            None => (Check::<[String]>::empty(), !self.negate),
        };
        if negate { !check } else { check }
    }

    pub fn evaluate(&self, response: &Response) -> Outcome {
        let actual = response.normalized_header(&self.name);
        let outcome = self.effective_check().evaluate(&actual);
        if outcome.success {
            return outcome;
        }

        let reason = match self.presence() {
            Some(true) => format!("Header '{}' is missing", self.name),
            Some(false) => format!("Header '{}' should be absent, got '{actual:?}'", self.name),
            None => format!("Header '{}' {}", self.name, outcome.message()),
        };
        let mut failed = Outcome::fail(reason);
        if let Some(hint) = &self.hint {
            failed = failed.with_hint(hint);
        }
        failed
    }
}

impl fmt::Display for HeaderExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "header '{}' {}", self.name, self.effective_check())?;
        if let Some(hint) = &self.hint {
            write!(f, " ({hint})")?;
        }
        Ok(())
    }
}

/// A predicate over the response body, as text or as raw bytes.
#[derive(Debug, Clone)]
pub enum BodyExpectation {
    Text(Check<str>),
    Bytes(Check<[u8]>),
}

impl BodyExpectation {
    pub fn with_hint(self, hint: impl Into<String>) -> Self {
        match self {
            BodyExpectation::Text(check) => BodyExpectation::Text(check.with_hint(hint)),
            BodyExpectation::Bytes(check) => BodyExpectation::Bytes(check.with_hint(hint)),
        }
    }

    pub fn evaluate(&self, body: &[u8]) -> Outcome {
        let outcome = match self {
            BodyExpectation::Text(check) => check.evaluate(&String::from_utf8_lossy(body)),
            BodyExpectation::Bytes(check) => check.evaluate(body),
        };
        if outcome.success {
            return outcome;
        }

        Outcome::fail(format!("Body {}", outcome.message()))
    }
}

impl fmt::Display for BodyExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyExpectation::Text(check) => write!(f, "body {check}"),
            BodyExpectation::Bytes(check) => write!(f, "body {check}"),
        }
    }
}

impl From<&str> for BodyExpectation {
    fn from(body: &str) -> Self {
        BodyExpectation::Bytes(check::bytes_equal(body))
    }
}

impl From<String> for BodyExpectation {
    fn from(body: String) -> Self {
        BodyExpectation::Bytes(check::bytes_equal(body))
    }
}

impl From<Vec<u8>> for BodyExpectation {
    fn from(body: Vec<u8>) -> Self {
        BodyExpectation::Bytes(check::bytes_equal(body))
    }
}

impl From<&[u8]> for BodyExpectation {
    fn from(body: &[u8]) -> Self {
        BodyExpectation::Bytes(check::bytes_equal(body))
    }
}

impl From<Check<str>> for BodyExpectation {
    fn from(check: Check<str>) -> Self {
        BodyExpectation::Text(check)
    }
}

impl From<Check<[u8]>> for BodyExpectation {
    fn from(check: Check<[u8]>) -> Self {
        BodyExpectation::Bytes(check)
    }
}

/// Status, header and body expectations for one response.
#[derive(Debug, Clone, Default)]
pub struct ExpectationSpec {
    /// `0` leaves the status unchecked.
    pub status: u16,
    pub status_range: Option<RangeInclusive<u16>>,
    pub headers: Vec<HeaderExpectation>,
    pub body: Option<BodyExpectation>,
    pub specs: Vec<String>,
}

pub fn expect() -> ExpectationSpec {
    ExpectationSpec::default()
}

impl ExpectationSpec {
    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Inclusive range; ignored when an exact status is also set.
    pub fn status_between(mut self, from: u16, to: u16) -> Self {
        self.status_range = Some(from..=to);
        self
    }

    pub fn header(mut self, header: HeaderExpectation) -> Self {
        self.headers.push(header);
        self
    }

    pub fn headers(mut self, headers: impl IntoIterator<Item = HeaderExpectation>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn body(mut self, body: impl Into<BodyExpectation>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Text bodies compare for equality; checks keep their own semantics.
    pub fn body_with_hint(mut self, hint: impl Into<String>, body: impl Into<BodyExpectation>) -> Self {
        let body = match body.into() {
            BodyExpectation::Bytes(Check::Leaf(check::BytesCheck::Equals(bytes))) => {
                BodyExpectation::Text(Check::<str>::equals(String::from_utf8_lossy(&bytes)))
            }
            other => other,
        };
        self.body = Some(body.with_hint(hint));
        self
    }

    pub fn spec(self, link: impl Into<String>) -> Self {
        self.specs([link])
    }

    /// Replace the spec links.
    pub fn specs<I, S>(mut self, links: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.specs = links.into_iter().map(Into::into).collect();
        self
    }

    fn collect_spec_links(&self, links: &mut Vec<String>) {
        let own = self.specs.iter();
        for link in own.chain(self.headers.iter().flat_map(|h| h.specs.iter())) {
            if !links.contains(link) {
                links.push(link.clone());
            }
        }
    }
}

impl fmt::Display for ExpectationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.status != 0 {
            writeln!(f, "status {}", self.status)?;
        } else if let Some(range) = &self.status_range {
            writeln!(f, "status between {} and {}", range.start(), range.end())?;
        }
        for header in &self.headers {
            writeln!(f, "{header}")?;
        }
        if let Some(body) = &self.body {
            writeln!(f, "{body}")?;
        }
        Ok(())
    }
}

/// Composition of expectations for one response.
#[derive(Debug, Clone)]
pub enum Expectation {
    Expect(ExpectationSpec),
    /// Every expectation holds.
    AllOf(Vec<Expectation>),
    /// At least one of the alternatives holds in full.
    AnyOf(Vec<ExpectationSpec>),
}

pub fn all_of(expectations: impl IntoIterator<Item = Expectation>) -> Expectation {
    Expectation::AllOf(expectations.into_iter().collect())
}

pub fn any_of(expectations: impl IntoIterator<Item = ExpectationSpec>) -> Expectation {
    Expectation::AnyOf(expectations.into_iter().collect())
}

impl Expectation {
    /// Every spec link attached anywhere in the expectation, first-seen order.
    pub fn spec_links(&self) -> Vec<String> {
        let mut links = Vec::new();
        self.collect_spec_links(&mut links);
        links
    }

    fn collect_spec_links(&self, links: &mut Vec<String>) {
        match self {
            Expectation::Expect(spec) => spec.collect_spec_links(links),
            Expectation::AllOf(all) => all.iter().for_each(|e| e.collect_spec_links(links)),
            Expectation::AnyOf(any) => any.iter().for_each(|spec| spec.collect_spec_links(links)),
        }
    }
}

impl From<ExpectationSpec> for Expectation {
    fn from(spec: ExpectationSpec) -> Self {
        Expectation::Expect(spec)
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::Expect(spec) => write!(f, "{spec}"),
            Expectation::AllOf(all) => {
                for (i, expectation) in all.iter().enumerate() {
                    writeln!(f, "== all of, #{i} ==")?;
                    write!(f, "{expectation}")?;
                }
                Ok(())
            }
            Expectation::AnyOf(any) => {
                for (i, spec) in any.iter().enumerate() {
                    writeln!(f, "== any of, #{i} ==")?;
                    write!(f, "{spec}")?;
                }
                Ok(())
            }
        }
    }
}

/// Requirements spanning every response of a multi-request case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponsesExpectation {
    pub payloads_are_equal: bool,
}

pub fn responses() -> ResponsesExpectation {
    ResponsesExpectation::default()
}

impl ResponsesExpectation {
    pub fn have_the_same_payload(mut self) -> Self {
        self.payloads_are_equal = true;
        self
    }
}
