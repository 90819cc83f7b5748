//! Error types for the conformance engine.
//!
//! The taxonomy follows how a failure should be treated by the runner:
//!
//! | Type | Raised when | Effect |
//! |------|-------------|--------|
//! | [`TemplateError`] | a template does not match its arguments | authoring error |
//! | [`AuthoringError`] | a request or case is malformed | fails the case before any network call |
//! | [`TransportError`] | connecting, reading or timing out | fails that one request |
//! | [`ConfigError`] | configuration or suite input is unusable | affected cases are skipped |
//!
//! Assertion mismatches are not errors: they are failing
//! [`Outcome`](crate::check::Outcome)s collected by the validator.

use std::time::Duration;

use thiserror::Error;

/// A template did not line up with the arguments it was given.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("not enough arguments for format string: {format}")]
    NotEnoughArguments { format: String },

    #[error("too many arguments for format string: {format} ({left} left)")]
    TooManyArguments { format: String, left: usize },

    #[error("malformed placeholder `{span}` in format string: {format}")]
    MalformedSpan { format: String, span: String },
}

/// The test author described something that cannot be executed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthoringError {
    #[error("both 'url' and 'path' are set")]
    BothUrlAndPath,

    #[error("neither 'url' nor 'path' is set")]
    NeitherUrlNorPath,

    #[error("when no full URL is used the path must start with '/', got `{0}`")]
    RelativePath(String),

    #[error("test case declares no request")]
    NoRequest,

    #[error("proxy tunnel requires a proxy")]
    TunnelWithoutProxy,

    #[error("redirects cannot be followed through a proxy tunnel")]
    RedirectThroughTunnel,

    #[error("comparing payloads needs at least two requests, got {0}")]
    SinglePayload(usize),

    #[error("unknown spec `{0}`")]
    UnknownSpec(String),

    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid HTTP method `{0}`")]
    InvalidMethod(String),

    #[error("invalid header `{name}`: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid byte range `{range}`: {reason}")]
    InvalidRange { range: String, reason: String },

    #[error("before-request hook failed: {0}")]
    Hook(String),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// The call could not be completed; validation of that request is abandoned.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("querying {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("querying {url} timed out after {}ms", timeout.as_millis())]
    Timeout { url: String, timeout: Duration },

    #[error("proxy {proxy} refused to open a tunnel: {status}")]
    TunnelRefused { proxy: String, status: String },

    #[error("malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    #[error("failed to read response body from {url}: {message}")]
    Body { url: String, message: String },

    #[error("after-response hook failed: {0}")]
    Hook(String),
}

/// Configuration or suite input that prevents cases from running at all.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key} `{value}`: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("invalid skip pattern `{pattern}`: {source}")]
    SkipPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to read `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write `{path}`: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse `{path}`: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Crate-level error, for callers that do not care which layer failed.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Authoring(#[from] AuthoringError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
