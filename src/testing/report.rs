//! Failure reports.
//!
//! A report carries everything needed to diagnose a failing request without
//! re-running it: the case identity, the error or failed assertions, what
//! was asked for and what actually went over the wire.

use std::fmt;

use serde::Serialize;

use crate::expect::Expectation;
use crate::http::{RequestSpec, Response, WireRequest};

/// Bodies larger than this are summarized rather than printed.
pub const MAX_REPORTED_BODY_BYTES: usize = 8 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub name: String,
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub specs: Vec<String>,
    pub error: Option<String>,
    pub expected_request: Option<String>,
    pub actual_request: Option<String>,
    pub expected_response: Option<String>,
    pub actual_response: Option<String>,
}

impl Report {
    pub fn new(name: impl Into<String>, hint: Option<&str>) -> Self {
        Self {
            name: name.into(),
            hint: hint.map(str::to_string),
            ..Self::default()
        }
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn expected_request(mut self, spec: &RequestSpec) -> Self {
        self.expected_request = Some(
            serde_json::to_string_pretty(spec)
                .unwrap_or_else(|err| format!("error: failed to serialize request: {err}")),
        );
        self
    }

    pub fn actual_request(mut self, wire: &WireRequest) -> Self {
        self.actual_request = Some(wire.dump());
        self
    }

    /// Also lists the spec links the expectation carries.
    pub fn expected_response(mut self, expectation: &Expectation) -> Self {
        self.expected_response = Some(expectation.to_string());
        self.specs = expectation.spec_links();
        self
    }

    pub fn actual_response(mut self, response: &Response) -> Self {
        self.actual_response = Some(dump_response(response));
        self
    }
}

fn dump_response(response: &Response) -> String {
    let mut lines = vec![response.status_line()];
    for (name, value) in &response.headers {
        let value = value.to_str().unwrap_or("<binary>");
        lines.push(format!("{name}: {value}"));
    }
    lines.push(String::new());

    match response.text() {
        Some(text) if response.body.len() <= MAX_REPORTED_BODY_BYTES => lines.push(text.to_string()),
        Some(_) => lines.push(format!("<{} bytes of text>", response.body.len())),
        None => lines.push(format!("<{} bytes of binary data>", response.body.len())),
    }
    lines.join("\n")
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let or_nil = |value: &Option<String>| value.clone().unwrap_or_else(|| "nil".to_string());

        writeln!(f)?;
        writeln!(f, "Name: {}", self.name)?;
        writeln!(f, "Hint: {}", self.hint.as_deref().unwrap_or_default())?;
        if !self.specs.is_empty() {
            writeln!(f, "Specs:")?;
            for link in &self.specs {
                writeln!(f, "- {link}")?;
            }
        }
        writeln!(f)?;
        writeln!(f, "Error: {}", or_nil(&self.error))?;
        writeln!(f)?;
        writeln!(f, "Expected Request:\n{}", or_nil(&self.expected_request))?;
        writeln!(f)?;
        writeln!(f, "Actual Request:\n{}", or_nil(&self.actual_request))?;
        writeln!(f)?;
        writeln!(f, "Expected Response:\n{}", or_nil(&self.expected_response))?;
        writeln!(f)?;
        writeln!(f, "Actual Response:\n{}", or_nil(&self.actual_response))
    }
}
