//! # Suite documents
//!
//! The JSON form of a suite, for running cases without writing Rust:
//!
//! ```json
//! {
//!   "name": "TestPlainText",
//!   "cases": [
//!     {
//!       "name": "GET plain file",
//!       "hint": "files are served as is",
//!       "request": { "path": "/ipfs/bafy/hello.txt" },
//!       "response": {
//!         "status": 200,
//!         "headers": {
//!           "Content-Type": { "contains": "text/plain" },
//!           "Etag": { "exists": true }
//!         },
//!         "body": "hello\n"
//!       }
//!     }
//!   ]
//! }
//! ```
//!
//! A header given as a plain string must equal that value; a body given as a
//! plain string must equal those bytes. `"requires": ["subdomainGateway",
//! {"file": "fixtures/x.car"}, {"spec": "path-gateway"}]` skips the case when
//! a prerequisite is missing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::check::{self, Check};
use crate::error::AuthoringError;
use crate::expect::{BodyExpectation, ExpectationSpec, HeaderExpectation, expect, header, responses};
use crate::http::RequestSpec;
use crate::testing::{Requirement, Suite, TestCase};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteDocument {
    pub name: String,
    #[serde(default)]
    pub cases: Vec<CaseDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaseDocument {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub requests: Vec<RequestSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseDocument>,
    /// Every response must carry the same bytes.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub same_payload: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<Requirement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResponseDocument {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_between: Option<[u16; 2]>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, HeaderDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderDocument {
    Equals(String),
    Check(HeaderCheckDocument),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeaderCheckDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equals: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matches: Option<String>,
    /// `true`: present; `false`: absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BodyDocument {
    Equals(String),
    Check(BodyCheckDocument),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BodyCheckDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equals: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matches: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub empty: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

fn text_pattern(pattern: &str) -> Result<Check<str>, AuthoringError> {
    Check::<str>::try_matches(pattern).map_err(|err| AuthoringError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: err.to_string(),
    })
}

impl SuiteDocument {
    pub fn into_suite(self) -> Result<Suite, AuthoringError> {
        let cases = self
            .cases
            .into_iter()
            .map(CaseDocument::into_case)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Suite::new(self.name).cases(cases))
    }
}

impl CaseDocument {
    pub fn into_case(self) -> Result<TestCase, AuthoringError> {
        let mut case = TestCase::new(self.name)
            .requests(self.request)
            .requests(self.requests);
        if let Some(hint) = self.hint {
            case = case.hint(hint);
        }
        if let Some(response) = self.response {
            case = case.response(response.into_expectation()?);
        }
        if self.same_payload {
            case = case.responses(responses().have_the_same_payload());
        }
        for requirement in self.requires {
            case = case.requires(requirement);
        }
        Ok(case)
    }
}

impl ResponseDocument {
    pub fn into_expectation(self) -> Result<ExpectationSpec, AuthoringError> {
        let mut spec = expect().status(self.status);
        if let Some([from, to]) = self.status_between {
            spec = spec.status_between(from, to);
        }
        for (name, document) in self.headers {
            spec = spec.header(document.into_expectation(name)?);
        }
        if let Some(body) = self.body {
            spec = spec.body(body.into_expectation()?);
        }
        Ok(spec)
    }
}

impl HeaderDocument {
    pub fn into_expectation(self, name: String) -> Result<HeaderExpectation, AuthoringError> {
        let document = match self {
            HeaderDocument::Equals(value) => return Ok(header(name).equals(value)),
            HeaderDocument::Check(document) => document,
        };

        let mut checks: Vec<Check<[String]>> = Vec::new();
        if let Some(value) = document.equals {
            checks.push(check::uniq(Check::<str>::equals(value)));
        }
        if let Some(needle) = document.contains {
            checks.push(check::uniq(Check::<str>::contains(needle)));
        }
        if let Some(pattern) = document.matches {
            checks.push(check::uniq(text_pattern(&pattern)?));
        }
        match document.exists {
            Some(true) => checks.push(!Check::<[String]>::empty()),
            Some(false) => checks.push(Check::<[String]>::empty()),
            None => {}
        }

        let mut expectation = match checks.len() {
            0 => header(name),
            1 => header(name).check(checks.remove(0)),
            _ => header(name).check(check::and(checks)),
        };
        if let Some(hint) = document.hint {
            expectation = expectation.hint(hint);
        }
        Ok(expectation)
    }
}

impl BodyDocument {
    pub fn into_expectation(self) -> Result<BodyExpectation, AuthoringError> {
        let document = match self {
            BodyDocument::Equals(text) => return Ok(BodyExpectation::from(text)),
            BodyDocument::Check(document) => document,
        };

        let mut checks: Vec<Check<[u8]>> = Vec::new();
        if let Some(expected) = document.equals {
            checks.push(Check::<[u8]>::equals(expected));
        }
        if let Some(needle) = document.contains {
            checks.push(Check::<[u8]>::contains(needle));
        }
        if let Some(pattern) = document.matches {
            let text = text_pattern(&pattern)?;
            checks.push(Check::<[u8]>::verify(move |body: &[u8]| {
                text.evaluate(&String::from_utf8_lossy(body))
            }));
        }
        if let Some(value) = document.json {
            checks.push(Check::<[u8]>::json_equals(value));
        }
        if document.empty {
            checks.push(Check::<[u8]>::empty());
        }

        let body = BodyExpectation::from(check::and(checks));
        Ok(match document.hint {
            Some(hint) => body.with_hint(hint),
            None => body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expect::Expectation;
    use crate::http::Response;
    use crate::testing::validate::validate_expectation;
    use bytes::Bytes;
    use reqwest::header::{HeaderMap, HeaderValue};

    const SUITE: &str = r#"{
        "name": "TestPlainText",
        "cases": [
            {
                "name": "GET plain file",
                "hint": "files are served as is",
                "request": { "path": "/ipfs/bafy/hello.txt", "headers": { "Accept": "text/plain" } },
                "response": {
                    "status": 200,
                    "headers": {
                        "Content-Type": { "contains": "text/plain", "hint": "sniffed" },
                        "Etag": { "exists": true },
                        "X-Debug": { "exists": false },
                        "Cache-Control": "public"
                    },
                    "body": "hello\n"
                }
            },
            {
                "name": "Same bytes",
                "requests": [
                    { "path": "/ipfs/bafy/hello.txt" },
                    { "url": "http://bafy.ipfs.localhost:8080/hello.txt" }
                ],
                "samePayload": true,
                "requires": ["subdomainGateway"]
            }
        ]
    }"#;

    fn response(body: &'static [u8]) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/plain; charset=utf-8"));
        headers.insert("etag", HeaderValue::from_static("\"bafy\""));
        headers.insert("cache-control", HeaderValue::from_static("public"));
        Response {
            status: 200,
            version: "HTTP/1.1".into(),
            headers,
            body: Bytes::from_static(body),
        }
    }

    #[test]
    fn loads_cases_from_json() {
        let document: SuiteDocument = serde_json::from_str(SUITE).unwrap();
        let suite = document.into_suite().unwrap();

        assert_eq!(suite.name, "TestPlainText");
        assert_eq!(suite.cases.len(), 2);
        assert_eq!(suite.full_name(&suite.cases[0]), "TestPlainText/GET plain file");
        assert_eq!(suite.cases[0].requests[0].header_value("accept"), Some("text/plain"));
        assert_eq!(suite.cases[1].requests.len(), 2);
        assert!(suite.cases[1].responses.payloads_are_equal);
        assert!(suite.cases[1].response.is_none());
        assert_eq!(suite.cases[1].requires, vec![Requirement::SubdomainGateway]);
        assert!(suite.cases[0].requires.is_empty());
    }

    #[test]
    fn converted_expectations_validate_responses() {
        let document: SuiteDocument = serde_json::from_str(SUITE).unwrap();
        let suite = document.into_suite().unwrap();
        let expectation = suite.cases[0].response.clone().unwrap();

        let passed = |res: &Response| validate_expectation(&expectation, res).iter().all(|r| r.passed());
        assert!(passed(&response(b"hello\n")));
        assert!(!passed(&response(b"hello")));

        let mut debug = response(b"hello\n");
        debug.headers.insert("x-debug", HeaderValue::from_static("1"));
        assert!(!passed(&debug));
    }

    #[test]
    fn body_checks_combine() {
        let body = BodyDocument::Check(BodyCheckDocument {
            contains: Some("\"a\"".into()),
            json: Some(serde_json::json!({"a": 1})),
            ..BodyCheckDocument::default()
        })
        .into_expectation()
        .unwrap();
        assert!(body.evaluate(br#"{ "a": 1 }"#).success);
        assert!(!body.evaluate(br#"{ "a": 2 }"#).success);

        let matches = BodyDocument::Check(BodyCheckDocument {
            matches: Some("^hel+o$".into()),
            hint: Some("greeting".into()),
            ..BodyCheckDocument::default()
        })
        .into_expectation()
        .unwrap();
        assert!(matches.evaluate(b"hello").success);
        assert!(matches.evaluate(b"bye").message().ends_with("(greeting)"));
    }

    #[test]
    fn invalid_patterns_are_authoring_errors() {
        let err = HeaderDocument::Check(HeaderCheckDocument {
            matches: Some("(".into()),
            ..HeaderCheckDocument::default()
        })
        .into_expectation("Etag".into())
        .unwrap_err();
        assert!(matches!(err, AuthoringError::InvalidPattern { .. }));
    }

    #[test]
    fn status_ranges_convert() {
        let document: ResponseDocument = serde_json::from_str(r#"{"statusBetween": [300, 399]}"#).unwrap();
        let spec = document.into_expectation().unwrap();
        assert_eq!(spec.status, 0);
        assert_eq!(spec.status_range, Some(300..=399));
        let rendered = Expectation::from(spec).to_string();
        assert!(rendered.contains("status between 300 and 399"));
    }
}
