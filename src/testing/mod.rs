//! # Test cases & suites
//!
//! A [`TestCase`] pairs one or more requests with the response they should
//! produce. Cases are grouped in a [`Suite`]; a case's fully qualified name
//! is `<suite>/<case>`, and case names may themselves contain `/` to nest
//! further. Skip patterns match against that full name.
//!
//! Running a suite produces a [`RunReport`] with one [`CaseResult`] per case.
//! A case whose [`Requirement`]s are not met is skipped, not failed.

pub mod range;
pub mod report;
pub mod runner;
pub mod skips;
pub mod subdomain;
pub mod validate;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::expect::{Expectation, ResponsesExpectation};
use crate::http::{RequestSpec, Response, WireRequest};
use crate::plugins::{Hooks, PluginHook};

pub use report::Report;
pub use runner::Runner;
pub use skips::SkipFilter;
pub use validate::AssertionResult;

/// Something a case needs from its environment before it can run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Requirement {
    /// A virtual-host gateway URL is configured.
    SubdomainGateway,
    /// A fixture file exists.
    File(PathBuf),
    /// A named spec is enabled for the run.
    Spec(String),
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::SubdomainGateway => f.write_str("a subdomain gateway URL"),
            Requirement::File(path) => write!(f, "fixture `{}`", path.display()),
            Requirement::Spec(name) => write!(f, "enabled spec `{name}`"),
        }
    }
}

/// Requests plus the expectations their responses must meet.
#[derive(Debug, Clone, Default)]
pub struct TestCase {
    pub name: String,
    pub hint: Option<String>,
    pub requests: Vec<RequestSpec>,
    /// Applied to every response of the case.
    pub response: Option<Expectation>,
    pub responses: ResponsesExpectation,
    pub hooks: Hooks,
    pub requires: Vec<Requirement>,
}

impl TestCase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn request(mut self, request: RequestSpec) -> Self {
        self.requests.push(request);
        self
    }

    pub fn requests(mut self, requests: impl IntoIterator<Item = RequestSpec>) -> Self {
        self.requests.extend(requests);
        self
    }

    pub fn response(mut self, expectation: impl Into<Expectation>) -> Self {
        self.response = Some(expectation.into());
        self
    }

    pub fn responses(mut self, responses: ResponsesExpectation) -> Self {
        self.responses = responses;
        self
    }

    pub fn requires(mut self, requirement: Requirement) -> Self {
        self.requires.push(requirement);
        self
    }

    pub fn hook(mut self, hook: PluginHook) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn before_request<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut WireRequest) -> Result<(), String> + Send + Sync + 'static,
    {
        self.hook(PluginHook::before_request(name, f))
    }

    pub fn after_response<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Response) -> Result<(), String> + Send + Sync + 'static,
    {
        self.hook(PluginHook::after_response(name, f))
    }
}

/// A named group of cases.
#[derive(Debug, Clone, Default)]
pub struct Suite {
    pub name: String,
    pub cases: Vec<TestCase>,
}

impl Suite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cases: Vec::new(),
        }
    }

    pub fn case(mut self, case: TestCase) -> Self {
        self.cases.push(case);
        self
    }

    pub fn cases(mut self, cases: impl IntoIterator<Item = TestCase>) -> Self {
        self.cases.extend(cases);
        self
    }

    pub fn full_name(&self, case: &TestCase) -> String {
        if self.name.is_empty() {
            case.name.clone()
        } else {
            format!("{}/{}", self.name, case.name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Passed,
    Failed,
    Skipped(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseResult {
    pub name: String,
    pub status: CaseStatus,
    pub assertions: Vec<AssertionResult>,
    /// One report per failing request, plus one for cross-response failures.
    pub reports: Vec<Report>,
    pub duration_ms: u128,
}

impl CaseResult {
    pub fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CaseStatus::Skipped(reason.into()),
            assertions: Vec::new(),
            reports: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == CaseStatus::Passed
    }

    pub fn failed(&self) -> bool {
        self.status == CaseStatus::Failed
    }
}

/// Execution mode for the suite runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    Serial,
    #[default]
    Parallel,
}

/// Summary of a suite run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub suite: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u128,
    pub results: Vec<CaseResult>,
}

impl RunReport {
    pub fn new(suite: impl Into<String>, results: Vec<CaseResult>, duration_ms: u128) -> Self {
        let passed = results.iter().filter(|r| r.passed()).count();
        let failed = results.iter().filter(|r| r.failed()).count();
        Self {
            suite: suite.into(),
            total: results.len(),
            passed,
            failed,
            skipped: results.len() - passed - failed,
            duration_ms,
            results,
        }
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }
}
