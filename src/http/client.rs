use std::fmt::Write as _;
use std::net::SocketAddr;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, HOST, USER_AGENT};
use reqwest::{Client, Proxy, Url};
use tracing::debug;

use super::method::HttpMethod;
use super::request::{RequestSpec, Transport};
use super::response::Response;
use super::tunnel;
use crate::config::Config;
use crate::error::{AuthoringError, ConfigError, TransportError};

pub const DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// The request as it goes out on the wire. Before-request hooks receive it
/// mutably.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    pub transport: Transport,
    pub follow_redirects: bool,
}

impl WireRequest {
    /// `Host` header when set, otherwise the URL authority.
    pub fn host(&self) -> String {
        self.headers
            .get(HOST)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| authority(&self.url))
    }

    /// Text rendering of the request, as sent.
    pub fn dump(&self) -> String {
        let target = match self.transport {
            Transport::ForwardProxy(_) => self.url.to_string(),
            _ => origin_form(&self.url),
        };
        let mut out = format!("{} {} HTTP/1.1\r\n", self.method, target);
        if !self.headers.contains_key(HOST) {
            let _ = write!(out, "Host: {}\r\n", self.host());
        }
        for (name, value) in &self.headers {
            let _ = write!(out, "{}: {}\r\n", name, String::from_utf8_lossy(value.as_bytes()));
        }
        out.push_str("\r\n");
        if let Some(body) = &self.body {
            out.push_str(&String::from_utf8_lossy(body));
        }
        out
    }
}

pub(crate) fn origin_form(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

pub(crate) fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

pub fn build_headers<'a, I>(input: I) -> Result<HeaderMap, AuthoringError>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut headers = HeaderMap::new();

    for (key, value) in input {
        if key.is_empty() {
            continue;
        }

        let header_name = HeaderName::from_bytes(key.as_bytes()).map_err(|err| {
            AuthoringError::InvalidHeader {
                name: key.clone(),
                reason: err.to_string(),
            }
        })?;
        let header_value =
            HeaderValue::from_str(value).map_err(|err| AuthoringError::InvalidHeader {
                name: key.clone(),
                reason: err.to_string(),
            })?;
        headers.insert(header_name, header_value);
    }

    Ok(headers)
}

/// Turns request specs into wire requests and sends them.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    gateway: Url,
    subdomain_host: Option<String>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            gateway: config.gateway()?,
            subdomain_host: config.subdomain_host()?,
            timeout: config.timeout(),
        })
    }

    pub fn gateway(&self) -> &Url {
        &self.gateway
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn prepare(&self, spec: &RequestSpec) -> Result<WireRequest, AuthoringError> {
        let url = spec.resolve_url(self.gateway.as_str())?;
        let mut headers = build_headers(&spec.headers)?;
        if !headers.contains_key(USER_AGENT) {
            headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        }

        Ok(WireRequest {
            method: spec.method,
            url,
            headers,
            body: spec.body.clone(),
            transport: spec.transport(),
            follow_redirects: spec.follow_redirects,
        })
    }

    /// Send one request and read its body, bounded by the configured timeout.
    pub async fn send(&self, wire: &WireRequest) -> Result<Response, TransportError> {
        debug!(method = %wire.method, url = %wire.url, transport = ?wire.transport, "querying");

        let exchange = async {
            match &wire.transport {
                Transport::Tunnel(proxy) if wire.url.scheme() == "http" => {
                    tunnel::send(proxy, wire).await
                }
                _ => self.send_with_client(wire).await,
            }
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                url: wire.url.to_string(),
                timeout: self.timeout,
            }),
        }
    }

    async fn send_with_client(&self, wire: &WireRequest) -> Result<Response, TransportError> {
        let client = self.build_client(wire).await?;
        let url = wire.url.to_string();

        let mut request = client
            .request(wire.method.into(), wire.url.clone())
            .headers(wire.headers.clone());
        if let Some(body) = &wire.body {
            request = request.body(body.clone());
        }

        let response = request.send().await.map_err(|err| TransportError::Request {
            url: url.clone(),
            message: err.to_string(),
        })?;

        let status = response.status().as_u16();
        let version = format!("{:?}", response.version());
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|err| TransportError::Body {
            url,
            message: err.to_string(),
        })?;

        Ok(Response {
            status,
            version,
            headers,
            body,
        })
    }

    /// One client per request mode, so redirect policy and pooled
    /// connections never leak between differently configured calls.
    async fn build_client(&self, wire: &WireRequest) -> Result<Client, TransportError> {
        let redirect = if wire.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        };

        let mut builder = Client::builder().redirect(redirect).http1_only();

        match &wire.transport {
            Transport::Direct => {
                builder = builder.no_proxy();
                if let Some(host) = wire.url.host_str().filter(|h| self.dials_gateway(h)) {
                    let addr = self.gateway_addr().await?;
                    debug!(host, %addr, "dialing gateway for virtual host");
                    builder = builder.resolve(host, addr);
                }
            }
            Transport::ForwardProxy(proxy) | Transport::Tunnel(proxy) => {
                let proxy = Proxy::all(proxy.as_str())
                    .map_err(|err| TransportError::Client(format!("invalid proxy URL: {err}")))?;
                builder = builder.proxy(proxy);
                if matches!(wire.transport, Transport::Tunnel(_)) {
                    builder = builder.danger_accept_invalid_certs(true);
                }
            }
        }

        builder
            .build()
            .map_err(|err| TransportError::Client(err.to_string()))
    }

    /// Subdomains of the virtual-host gateway and of `localhost` are served
    /// by the primary gateway.
    fn dials_gateway(&self, host: &str) -> bool {
        if self.gateway.host_str() == Some(host) {
            return false;
        }
        let under = |base: &str| host == base || host.ends_with(&format!(".{base}"));
        under("localhost") || self.subdomain_host.as_deref().is_some_and(under)
    }

    async fn gateway_addr(&self) -> Result<SocketAddr, TransportError> {
        let host = self.gateway.host_str().unwrap_or("127.0.0.1");
        let port = self.gateway.port_or_known_default().unwrap_or(80);
        let lookup = |message: String| TransportError::Request {
            url: self.gateway.to_string(),
            message,
        };

        tokio::net::lookup_host((host, port))
            .await
            .map_err(|err| lookup(err.to_string()))?
            .next()
            .ok_or_else(|| lookup(format!("no address found for {host}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::request;

    fn dispatcher(subdomain: Option<&str>) -> Dispatcher {
        let config = Config {
            gateway_url: "http://127.0.0.1:8080".into(),
            subdomain_gateway_url: subdomain.map(str::to_string),
            ..Config::default()
        };
        Dispatcher::new(&config).unwrap()
    }

    #[test]
    fn prepare_sets_default_user_agent() {
        let wire = dispatcher(None).prepare(&request().path("/ipfs/x")).unwrap();
        assert_eq!(wire.headers[USER_AGENT], DEFAULT_USER_AGENT);
        assert_eq!(wire.url.as_str(), "http://127.0.0.1:8080/ipfs/x");

        let wire = dispatcher(None)
            .prepare(&request().path("/").header("User-Agent", "custom"))
            .unwrap();
        assert_eq!(wire.headers[USER_AGENT], "custom");
    }

    #[test]
    fn prepare_rejects_invalid_headers() {
        let err = dispatcher(None)
            .prepare(&request().path("/").header("Bad Header", "x"))
            .unwrap_err();
        assert!(matches!(err, AuthoringError::InvalidHeader { name, .. } if name == "Bad Header"));
    }

    #[test]
    fn host_header_wins_over_url_authority() {
        let d = dispatcher(None);
        let wire = d.prepare(&request().path("/ipfs/x")).unwrap();
        assert_eq!(wire.host(), "127.0.0.1:8080");

        let wire = d
            .prepare(&request().path("/").header("Host", "bafy.ipfs.example.com"))
            .unwrap();
        assert_eq!(wire.host(), "bafy.ipfs.example.com");
        assert!(wire.dump().starts_with("GET / HTTP/1.1\r\n"));
        assert!(wire.dump().contains("host: bafy.ipfs.example.com\r\n"));
    }

    #[test]
    fn forward_proxy_dump_uses_absolute_form() {
        let wire = dispatcher(None)
            .prepare(
                &request()
                    .url("http://example.com/ipfs/x?format=raw")
                    .proxy("http://127.0.0.1:3128"),
            )
            .unwrap();
        assert!(wire.dump().starts_with("GET http://example.com/ipfs/x?format=raw HTTP/1.1\r\n"));
        assert!(wire.dump().contains("Host: example.com\r\n"));
    }

    #[test]
    fn virtual_hosts_dial_the_gateway() {
        let d = dispatcher(Some("http://example.com"));
        assert!(d.dials_gateway("bafy.ipfs.example.com"));
        assert!(d.dials_gateway("example.com"));
        assert!(d.dials_gateway("bafy.ipfs.localhost"));
        assert!(!d.dials_gateway("notexample.com"));
        assert!(!d.dials_gateway("127.0.0.1"));

        let d = dispatcher(None);
        assert!(!d.dials_gateway("bafy.ipfs.example.com"));
    }
}
