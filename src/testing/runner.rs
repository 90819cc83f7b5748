//! Suite execution.
//!
//! Each case is its own task: its requests are prepared up front (so an
//! authoring mistake fails the case before anything is sent), then sent one
//! after another and validated. Cases run concurrently, bounded by the
//! configured parallelism.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::report::Report;
use super::skips::SkipFilter;
use super::validate::{AssertionResult, validate_expectation, validate_payloads};
use super::{CaseResult, CaseStatus, Requirement, RunMode, RunReport, Suite, TestCase};
use crate::check::Outcome;
use crate::config::Config;
use crate::error::{AuthoringError, ConfigError};
use crate::http::{Dispatcher, Response, WireRequest};
use crate::specs::SpecFilter;

#[derive(Debug, Clone)]
pub struct Runner {
    dispatcher: Dispatcher,
    skips: SkipFilter,
    parallelism: usize,
    subdomain_gateway: bool,
    specs: SpecFilter,
}

enum Scheduled {
    Done(CaseResult),
    Spawned(String, JoinHandle<CaseResult>),
}

impl Runner {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            dispatcher: Dispatcher::new(config)?,
            skips: SkipFilter::new(&config.skips)?,
            parallelism: config.parallelism,
            subdomain_gateway: config.subdomain_gateway_url.is_some(),
            specs: config.spec_filter()?,
        })
    }

    pub fn mode(mut self, mode: RunMode) -> Self {
        if mode == RunMode::Serial {
            self.parallelism = 1;
        }
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn run_suite(&self, suite: &Suite) -> RunReport {
        let started = Instant::now();
        info!(
            suite = %suite.name,
            cases = suite.cases.len(),
            parallelism = self.parallelism,
            "running suite"
        );

        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut scheduled = Vec::with_capacity(suite.cases.len());

        for case in &suite.cases {
            let name = suite.full_name(case);
            if let Some(pattern) = self.skips.matching(&name) {
                info!(case = %name, pattern, "skipping case");
                let reason = format!("matches skip pattern `{pattern}`");
                scheduled.push(Scheduled::Done(CaseResult::skipped(name, reason)));
                continue;
            }
            match self.unmet_requirement(case) {
                Ok(Some(missing)) => {
                    warn!(case = %name, requirement = %missing, "requirement not met, skipping case");
                    let reason = format!("requires {missing}");
                    scheduled.push(Scheduled::Done(CaseResult::skipped(name, reason)));
                    continue;
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(case = %name, error = %err, "authoring error, nothing sent");
                    let message = err.to_string();
                    let result = finish(
                        &name,
                        vec![AssertionResult::new("Requirement", Outcome::fail(&message))],
                        vec![Report::new(&name, case.hint.as_deref()).error(message)],
                        Instant::now(),
                    );
                    scheduled.push(Scheduled::Done(result));
                    continue;
                }
            }

            let runner = self.clone();
            let case = case.clone();
            let semaphore = semaphore.clone();
            let task_name = name.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                runner.run_case(&task_name, &case).await
            });
            scheduled.push(Scheduled::Spawned(name, handle));
        }

        let mut results = Vec::with_capacity(scheduled.len());
        for entry in scheduled {
            let result = match entry {
                Scheduled::Done(result) => result,
                Scheduled::Spawned(name, handle) => match handle.await {
                    Ok(result) => result,
                    Err(err) => {
                        warn!(case = %name, error = %err, "case crashed");
                        let message = format!("case crashed: {err}");
                        CaseResult {
                            name: name.clone(),
                            status: CaseStatus::Failed,
                            assertions: vec![AssertionResult::new("Case", Outcome::fail(&message))],
                            reports: vec![Report::new(name, None).error(message)],
                            duration_ms: 0,
                        }
                    }
                },
            };
            results.push(result);
        }

        let report = RunReport::new(&suite.name, results, started.elapsed().as_millis());
        info!(
            suite = %report.suite,
            passed = report.passed,
            failed = report.failed,
            skipped = report.skipped,
            duration_ms = report.duration_ms as u64,
            "suite finished"
        );
        report
    }

    /// Run one case under `name`, regardless of skip patterns.
    pub async fn run_case(&self, name: &str, case: &TestCase) -> CaseResult {
        let started = Instant::now();
        let hint = case.hint.as_deref();
        let base_report = |index: usize| {
            let mut report = Report::new(name, hint);
            if let Some(spec) = case.requests.get(index) {
                report = report.expected_request(spec);
            }
            if let Some(expectation) = &case.response {
                report = report.expected_response(expectation);
            }
            report
        };

        let wires = match self.prepare(case) {
            Ok(wires) => wires,
            Err((index, err)) => {
                warn!(case = %name, error = %err, "authoring error, nothing sent");
                let message = err.to_string();
                return finish(
                    name,
                    vec![AssertionResult::new("Request", Outcome::fail(&message))],
                    vec![base_report(index).error(message)],
                    started,
                );
            }
        };

        let multiple = wires.len() > 1;
        let mut assertions = Vec::new();
        let mut reports = Vec::new();
        let mut bodies: Vec<Option<Bytes>> = Vec::with_capacity(wires.len());

        for (index, wire) in wires.iter().enumerate() {
            let label = |name: &str| {
                if multiple {
                    format!("Request {}/{name}", index + 1)
                } else {
                    name.to_string()
                }
            };

            let response = match self.exchange(case, wire).await {
                Ok(response) => response,
                Err(message) => {
                    warn!(case = %name, url = %wire.url, error = %message, "request failed");
                    assertions.push(AssertionResult::new(label("Request"), Outcome::fail(&message)));
                    reports.push(base_report(index).error(message).actual_request(wire));
                    bodies.push(None);
                    continue;
                }
            };

            if let Some(expectation) = &case.response {
                let results = validate_expectation(expectation, &response);
                let failures: Vec<String> = results
                    .iter()
                    .filter(|result| !result.passed())
                    .map(|result| result.outcome.message())
                    .collect();
                if !failures.is_empty() {
                    debug!(case = %name, failures = failures.len(), "response did not match");
                    reports.push(
                        base_report(index)
                            .error(failures.join("\n"))
                            .actual_request(wire)
                            .actual_response(&response),
                    );
                }
                assertions.extend(
                    results
                        .into_iter()
                        .map(|result| AssertionResult::new(label(&result.name), result.outcome)),
                );
            }
            bodies.push(Some(response.body));
        }

        if bodies.iter().all(Option::is_some) {
            let bodies: Vec<&[u8]> = bodies.iter().flatten().map(|body| &body[..]).collect();
            for result in validate_payloads(&case.responses, &bodies) {
                if !result.passed() {
                    reports.push(Report::new(name, hint).error(result.outcome.message()));
                }
                assertions.push(result);
            }
        }

        finish(name, assertions, reports, started)
    }

    /// The first requirement the environment does not meet. Naming a spec
    /// the catalog does not know is an authoring error.
    fn unmet_requirement<'a>(
        &self,
        case: &'a TestCase,
    ) -> Result<Option<&'a Requirement>, AuthoringError> {
        for requirement in &case.requires {
            let met = match requirement {
                Requirement::SubdomainGateway => self.subdomain_gateway,
                Requirement::File(path) => path.exists(),
                Requirement::Spec(name) => self
                    .specs
                    .is_enabled(name)
                    .ok_or_else(|| AuthoringError::UnknownSpec(name.clone()))?,
            };
            if !met {
                return Ok(Some(requirement));
            }
        }
        Ok(None)
    }

    /// Every wire request of the case, before-request hooks applied. The
    /// error carries the index of the offending request.
    fn prepare(&self, case: &TestCase) -> Result<Vec<WireRequest>, (usize, AuthoringError)> {
        if case.requests.is_empty() {
            return Err((0, AuthoringError::NoRequest));
        }
        if case.responses.payloads_are_equal && case.requests.len() < 2 {
            return Err((0, AuthoringError::SinglePayload(case.requests.len())));
        }

        case.requests
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                let mut wire = self.dispatcher.prepare(spec).map_err(|err| (index, err))?;
                case.hooks
                    .run_before_request(&mut wire)
                    .map_err(|err| (index, err))?;
                Ok(wire)
            })
            .collect()
    }

    async fn exchange(&self, case: &TestCase, wire: &WireRequest) -> Result<Response, String> {
        let mut response = self
            .dispatcher
            .send(wire)
            .await
            .map_err(|err| err.to_string())?;
        case.hooks
            .run_after_response(&mut response)
            .map_err(|err| err.to_string())?;
        Ok(response)
    }
}

fn finish(
    name: &str,
    assertions: Vec<AssertionResult>,
    reports: Vec<Report>,
    started: Instant,
) -> CaseResult {
    let status = if assertions.iter().all(AssertionResult::passed) {
        CaseStatus::Passed
    } else {
        CaseStatus::Failed
    };

    match status {
        CaseStatus::Passed => info!(case = %name, "passed"),
        _ => {
            for report in &reports {
                warn!(case = %name, "failed:{report}");
            }
        }
    }

    CaseResult {
        name: name.to_string(),
        status,
        assertions,
        reports,
        duration_ms: started.elapsed().as_millis(),
    }
}
