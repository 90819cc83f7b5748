//! # Hooks
//!
//! Per-case extension points run around each request:
//!
//! - [`HookEvent::BeforeRequest`] receives the outgoing [`WireRequest`] and
//!   may change it. A failure here is an authoring error and nothing is sent.
//! - [`HookEvent::AfterResponse`] receives the [`Response`] before
//!   validation. A failure abandons validation of that request.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{AuthoringError, TransportError};
use crate::http::{Response, WireRequest};

/// Lifecycle event at which a hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    BeforeRequest,
    AfterResponse,
}

type BeforeRequestFn = Arc<dyn Fn(&mut WireRequest) -> Result<(), String> + Send + Sync>;
type AfterResponseFn = Arc<dyn Fn(&mut Response) -> Result<(), String> + Send + Sync>;

#[derive(Clone)]
enum HookAction {
    BeforeRequest(BeforeRequestFn),
    AfterResponse(AfterResponseFn),
}

/// A named hook attached to a test case.
#[derive(Clone)]
pub struct PluginHook {
    pub name: String,
    pub enabled: bool,
    action: HookAction,
}

impl PluginHook {
    pub fn before_request<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut WireRequest) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            enabled: true,
            action: HookAction::BeforeRequest(Arc::new(f)),
        }
    }

    pub fn after_response<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Response) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            enabled: true,
            action: HookAction::AfterResponse(Arc::new(f)),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn event(&self) -> HookEvent {
        match self.action {
            HookAction::BeforeRequest(_) => HookEvent::BeforeRequest,
            HookAction::AfterResponse(_) => HookEvent::AfterResponse,
        }
    }
}

impl fmt::Debug for PluginHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHook")
            .field("name", &self.name)
            .field("event", &self.event())
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Hooks of one case, run in registration order.
#[derive(Debug, Clone, Default)]
pub struct Hooks {
    hooks: Vec<PluginHook>,
}

impl Hooks {
    pub fn push(&mut self, hook: PluginHook) {
        self.hooks.push(hook);
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn run_before_request(&self, wire: &mut WireRequest) -> Result<(), AuthoringError> {
        for hook in self.hooks.iter().filter(|h| h.enabled) {
            if let HookAction::BeforeRequest(f) = &hook.action {
                debug!(hook = %hook.name, url = %wire.url, "running before-request hook");
                f(wire).map_err(|err| AuthoringError::Hook(format!("{}: {err}", hook.name)))?;
            }
        }
        Ok(())
    }

    pub fn run_after_response(&self, response: &mut Response) -> Result<(), TransportError> {
        for hook in self.hooks.iter().filter(|h| h.enabled) {
            if let HookAction::AfterResponse(f) = &hook.action {
                debug!(hook = %hook.name, status = response.status, "running after-response hook");
                f(response).map_err(|err| TransportError::Hook(format!("{}: {err}", hook.name)))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::http::{Dispatcher, request};
    use bytes::Bytes;
    use reqwest::header::{HeaderMap, HeaderValue};

    fn wire() -> WireRequest {
        Dispatcher::new(&Config::default())
            .unwrap()
            .prepare(&request().path("/ipfs/bafy"))
            .unwrap()
    }

    fn response() -> Response {
        Response {
            status: 200,
            version: "HTTP/1.1".into(),
            headers: HeaderMap::new(),
            body: Bytes::from_static(b"hello"),
        }
    }

    #[test]
    fn before_request_hooks_mutate_the_wire_request() {
        let mut hooks = Hooks::default();
        hooks.push(PluginHook::before_request("accept raw", |wire| {
            wire.headers
                .insert("accept", HeaderValue::from_static("application/vnd.ipld.raw"));
            Ok(())
        }));

        let mut wire = wire();
        hooks.run_before_request(&mut wire).unwrap();
        assert_eq!(wire.headers["accept"], "application/vnd.ipld.raw");
    }

    #[test]
    fn failing_hooks_name_themselves() {
        let mut hooks = Hooks::default();
        hooks.push(PluginHook::before_request("sign", |_| Err("missing key".into())));

        let err = hooks.run_before_request(&mut wire()).unwrap_err();
        assert_eq!(err, AuthoringError::Hook("sign: missing key".into()));
    }

    #[test]
    fn disabled_hooks_do_not_run() {
        let mut hooks = Hooks::default();
        hooks.push(PluginHook::before_request("boom", |_| Err("ran".into())).disabled());
        assert!(hooks.run_before_request(&mut wire()).is_ok());
    }

    #[test]
    fn after_response_hooks_see_only_responses() {
        let mut hooks = Hooks::default();
        hooks.push(PluginHook::before_request("ignored", |_| Err("wrong event".into())));
        hooks.push(PluginHook::after_response("uppercase", |res| {
            res.body = Bytes::from(res.body.to_ascii_uppercase());
            Ok(())
        }));

        let mut res = response();
        hooks.run_after_response(&mut res).unwrap();
        assert_eq!(&res.body[..], b"HELLO");
        assert_eq!(hooks.hooks[0].event(), HookEvent::BeforeRequest);
        assert_eq!(hooks.hooks[1].event(), HookEvent::AfterResponse);
    }
}
