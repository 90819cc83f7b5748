//! Response validation.
//!
//! Every declared expectation is evaluated; nothing stops at the first
//! mismatch, so one run reports the complete set of deviations.

use serde::Serialize;

use crate::check::Outcome;
use crate::expect::{Expectation, ExpectationSpec, ResponsesExpectation};
use crate::http::Response;

/// One evaluated assertion: `Status code`, `Header <name>`, `Body`, ...
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssertionResult {
    pub name: String,
    pub outcome: Outcome,
}

impl AssertionResult {
    pub fn new(name: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            name: name.into(),
            outcome,
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome.success
    }
}

pub fn validate_response(expected: &ExpectationSpec, res: &Response) -> Vec<AssertionResult> {
    let mut results = Vec::new();

    if expected.status != 0 {
        let outcome = if res.status == expected.status {
            Outcome::pass()
        } else {
            Outcome::fail(format!(
                "Status code is not {}. It is {}",
                expected.status, res.status
            ))
        };
        results.push(AssertionResult::new("Status code", outcome));
    } else if let Some(range) = &expected.status_range {
        let outcome = if range.contains(&res.status) {
            Outcome::pass()
        } else {
            Outcome::fail(format!(
                "Status code is not between {} and {}. It is {}",
                range.start(),
                range.end(),
                res.status
            ))
        };
        results.push(AssertionResult::new("Status code", outcome));
    }

    for header in &expected.headers {
        results.push(AssertionResult::new(
            format!("Header {}", header.name),
            header.evaluate(res),
        ));
    }

    if let Some(body) = &expected.body {
        results.push(AssertionResult::new("Body", body.evaluate(&res.body)));
    }

    results
}

pub fn validate_expectation(expected: &Expectation, res: &Response) -> Vec<AssertionResult> {
    match expected {
        Expectation::Expect(spec) => validate_response(spec, res),
        Expectation::AllOf(all) => all
            .iter()
            .enumerate()
            .flat_map(|(i, expectation)| {
                validate_expectation(expectation, res)
                    .into_iter()
                    .map(move |result| AssertionResult::new(format!("#{i} {}", result.name), result.outcome))
            })
            .collect(),
        Expectation::AnyOf(any) => vec![validate_any_of(any, res)],
    }
}

fn validate_any_of(options: &[ExpectationSpec], res: &Response) -> AssertionResult {
    let mut failures = Vec::with_capacity(options.len());

    for (i, option) in options.iter().enumerate() {
        let failed: Vec<String> = validate_response(option, res)
            .into_iter()
            .filter(|result| !result.passed())
            .map(|result| result.outcome.message())
            .collect();
        if failed.is_empty() {
            return AssertionResult::new("Any of", Outcome::pass());
        }
        failures.push(format!("option #{i}: {}", failed.join("; ")));
    }

    let mut reason = String::from("none of the response options were valid");
    for failure in failures {
        reason.push_str("\n  ");
        reason.push_str(&failure);
    }
    AssertionResult::new("Any of", Outcome::fail(reason))
}

/// Cross-response requirements. Each body is compared with the first one.
pub fn validate_payloads(expected: &ResponsesExpectation, bodies: &[&[u8]]) -> Vec<AssertionResult> {
    if !expected.payloads_are_equal || bodies.len() < 2 {
        return Vec::new();
    }

    let first = bodies[0];
    let mismatches: Vec<AssertionResult> = bodies
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, body)| **body != first)
        .map(|(i, body)| {
            AssertionResult::new(
                "Payloads",
                Outcome::fail(format!(
                    "Responses are not equal\n==== Request 1 ====\n\n{}\n\n==== Request {} ====\n\n{}\n",
                    String::from_utf8_lossy(first),
                    i + 1,
                    String::from_utf8_lossy(body)
                )),
            )
        })
        .collect();

    if mismatches.is_empty() {
        vec![AssertionResult::new("Payloads", Outcome::pass())]
    } else {
        mismatches
    }
}
