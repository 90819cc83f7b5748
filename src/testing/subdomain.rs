//! Subdomain cases, three ways.
//!
//! A case written against a virtual host (`http://bafy.ipfs.example.com/`)
//! can reach a gateway directly with a `Host` header, through the gateway
//! acting as a forward proxy, or through a `CONNECT` tunnel it opens.
//! [`unwrap_subdomain_tests`] turns each such case into those three.

use reqwest::Url;

use super::TestCase;
use crate::error::AuthoringError;
use crate::http::RequestSpec;

const DIRECT: &str = "direct HTTP";
const DIRECT_HINT: &str = "direct HTTP request (hostname in URL, raw IP in Host header)";
const PROXY: &str = "HTTP proxy";
const PROXY_HINT: &str = "HTTP proxy (hostname is passed via URL)";
const TUNNEL: &str = "HTTP proxy tunneling via CONNECT";
const TUNNEL_HINT: &str = "HTTP proxy tunneling via CONNECT";

/// Every request of every case must carry an absolute `url`.
pub fn unwrap_subdomain_tests(
    cases: impl IntoIterator<Item = TestCase>,
    gateway_url: &str,
) -> Result<Vec<TestCase>, AuthoringError> {
    let gateway = Url::parse(gateway_url).map_err(|err| AuthoringError::InvalidUrl {
        url: gateway_url.to_string(),
        reason: err.to_string(),
    })?;

    let mut unwrapped = Vec::new();
    for case in cases {
        let targets = case
            .requests
            .iter()
            .map(target)
            .collect::<Result<Vec<_>, _>>()?;

        unwrapped.push(variant(&case, &targets, DIRECT, DIRECT_HINT, |spec, url| {
            let mut direct = gateway.clone();
            direct.set_path(url.path());
            direct.set_query(url.query());
            spec.url(direct.as_str()).header("Host", authority(url))
        }));
        unwrapped.push(variant(&case, &targets, PROXY, PROXY_HINT, |spec, _| {
            spec.proxy(gateway_url)
        }));
        unwrapped.push(variant(&case, &targets, TUNNEL, TUNNEL_HINT, |spec, url| {
            spec.proxy(gateway_url)
                .with_proxy_tunnel()
                .header("Host", authority(url))
        }));
    }
    Ok(unwrapped)
}

fn target(spec: &RequestSpec) -> Result<Url, AuthoringError> {
    let raw = match (&spec.url, &spec.path) {
        (Some(url), _) => url,
        (None, path) => {
            return Err(AuthoringError::InvalidUrl {
                url: path.clone().unwrap_or_default(),
                reason: "subdomain cases need an absolute URL".to_string(),
            });
        }
    };
    Url::parse(raw).map_err(|err| AuthoringError::InvalidUrl {
        url: raw.clone(),
        reason: err.to_string(),
    })
}

/// Host plus the port when it is not the scheme default.
fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

fn variant<F>(case: &TestCase, targets: &[Url], label: &str, note: &str, rewrite: F) -> TestCase
where
    F: Fn(RequestSpec, &Url) -> RequestSpec,
{
    let mut case = case.clone();
    case.name = format!("{} ({label})", case.name);
    case.hint = Some(match case.hint.as_deref() {
        Some(hint) if !hint.is_empty() => format!("{hint}\n{note}"),
        _ => note.to_string(),
    });
    case.requests = std::mem::take(&mut case.requests)
        .into_iter()
        .zip(targets)
        .map(|(spec, url)| rewrite(spec, url))
        .collect();
    case
}
