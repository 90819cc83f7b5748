use std::collections::BTreeMap;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use super::method::HttpMethod;
use crate::error::AuthoringError;

/// How a request reaches its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Direct,
    /// Absolute-form request line sent to the proxy, which fetches the target.
    ForwardProxy(String),
    /// `CONNECT` to the proxy, then the request over the opened pipe.
    Tunnel(String),
}

/// Description of one HTTP call.
///
/// Every builder method consumes and returns the spec, so a variant is made
/// by cloning first: `base.clone().header("Range", "bytes=0-9")` leaves
/// `base` untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestSpec {
    pub method: HttpMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub use_proxy_tunnel: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub follow_redirects: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", with = "text_body")]
    pub body: Option<Vec<u8>>,
}

pub fn request() -> RequestSpec {
    RequestSpec::default()
}

impl RequestSpec {
    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Path joined to the configured base URL. Must start with `/`.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Absolute URL used verbatim.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Append a query parameter. Repeated keys keep every value.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.entry(key.into()).or_default().push(value.into());
        self
    }

    /// Set a header, replacing any value already set under the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|k, _| !k.eq_ignore_ascii_case(&name));
        self.headers.insert(name, value.into());
        self
    }

    pub fn headers<I, K, V>(self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        headers
            .into_iter()
            .fold(self, |spec, (name, value)| spec.header(name, value))
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_proxy_tunnel(mut self) -> Self {
        self.use_proxy_tunnel = true;
        self
    }

    /// Not available through a proxy tunnel; [`validate`](Self::validate)
    /// rejects the combination.
    pub fn follow_redirects(mut self) -> Self {
        self.follow_redirects = true;
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Report authoring mistakes before anything is sent.
    pub fn validate(&self) -> Result<(), AuthoringError> {
        let url = self.url.as_deref().filter(|u| !u.is_empty());
        let path = self.path.as_deref().filter(|p| !p.is_empty());
        match (url, path) {
            (Some(_), Some(_)) => return Err(AuthoringError::BothUrlAndPath),
            (None, None) => return Err(AuthoringError::NeitherUrlNorPath),
            (None, Some(path)) if !path.starts_with('/') => {
                return Err(AuthoringError::RelativePath(path.to_string()));
            }
            _ => {}
        }

        if self.use_proxy_tunnel && self.proxy.as_deref().is_none_or(str::is_empty) {
            return Err(AuthoringError::TunnelWithoutProxy);
        }
        if self.use_proxy_tunnel && self.follow_redirects {
            return Err(AuthoringError::RedirectThroughTunnel);
        }
        Ok(())
    }

    pub fn transport(&self) -> Transport {
        match self.proxy.as_deref().filter(|p| !p.is_empty()) {
            Some(proxy) if self.use_proxy_tunnel => Transport::Tunnel(proxy.to_string()),
            Some(proxy) => Transport::ForwardProxy(proxy.to_string()),
            None => Transport::Direct,
        }
    }

    /// Final target: the full URL, or `base` (trailing `/` trimmed) plus the
    /// path, with query parameters appended.
    pub fn resolve_url(&self, base: &str) -> Result<Url, AuthoringError> {
        self.validate()?;

        let raw = match (&self.url, &self.path) {
            (Some(url), _) if !url.is_empty() => url.clone(),
            (_, Some(path)) => format!("{}{}", base.trim_end_matches('/'), path),
            _ => return Err(AuthoringError::NeitherUrlNorPath),
        };

        let mut url = Url::parse(&raw).map_err(|err| AuthoringError::InvalidUrl {
            url: raw.clone(),
            reason: err.to_string(),
        })?;

        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, values) in &self.query {
                for value in values {
                    pairs.append_pair(key, value);
                }
            }
        }

        Ok(url)
    }
}

/// Bodies travel as text in suite files and reports.
mod text_body {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match body {
            Some(bytes) => serializer.serialize_str(&String::from_utf8_lossy(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        Ok(Option::<String>::deserialize(deserializer)?.map(String::into_bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_get_without_redirects() {
        let spec = request().path("/");
        assert_eq!(spec.method, HttpMethod::Get);
        assert!(!spec.follow_redirects);
        assert_eq!(spec.transport(), Transport::Direct);
    }

    #[test]
    fn variants_do_not_alias_the_base() {
        let base = request()
            .path("/ipfs/bafy")
            .header("Accept", "text/plain")
            .query("format", "raw")
            .body("payload");

        let variant = base
            .clone()
            .header("Range", "bytes=0-1")
            .query("format", "car")
            .body("other");

        assert_eq!(base.header_value("range"), None);
        assert_eq!(base.query["format"], vec!["raw"]);
        assert_eq!(base.body.as_deref(), Some(&b"payload"[..]));
        assert_eq!(variant.header_value("Range"), Some("bytes=0-1"));
        assert_eq!(variant.query["format"], vec!["raw", "car"]);
    }

    #[test]
    fn header_names_are_last_write_wins_case_insensitively() {
        let spec = request().header("accept", "a").header("Accept", "b");
        assert_eq!(spec.headers.len(), 1);
        assert_eq!(spec.header_value("ACCEPT"), Some("b"));
    }

    #[test]
    fn url_and_path_are_exclusive() {
        let both = request().url("http://example.com/").path("/x");
        assert_eq!(both.validate(), Err(AuthoringError::BothUrlAndPath));
        assert_eq!(request().validate(), Err(AuthoringError::NeitherUrlNorPath));
        assert_eq!(
            request().path("ipfs/x").validate(),
            Err(AuthoringError::RelativePath("ipfs/x".into()))
        );
    }

    #[test]
    fn tunnel_requires_a_proxy() {
        let spec = request().url("http://example.com/").with_proxy_tunnel();
        assert_eq!(spec.validate(), Err(AuthoringError::TunnelWithoutProxy));

        let spec = spec.proxy("http://127.0.0.1:3128");
        assert!(spec.validate().is_ok());
        assert_eq!(spec.transport(), Transport::Tunnel("http://127.0.0.1:3128".into()));
    }

    #[test]
    fn tunnel_does_not_follow_redirects() {
        let spec = request()
            .url("http://example.com/")
            .proxy("http://127.0.0.1:3128")
            .with_proxy_tunnel()
            .follow_redirects();
        assert_eq!(spec.validate(), Err(AuthoringError::RedirectThroughTunnel));
        assert!(request().url("http://example.com/").proxy("http://127.0.0.1:3128").follow_redirects().validate().is_ok());
    }

    #[test]
    fn resolves_path_against_base() {
        let spec = request().path("/ipfs/bafy/").query("format", "car").query("a", "b c");
        let url = spec.resolve_url("http://127.0.0.1:8080/").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/ipfs/bafy/?a=b+c&format=car");
    }

    #[test]
    fn full_url_is_used_verbatim() {
        let spec = request().url("http://bafy.ipfs.example.com/index.html");
        let url = spec.resolve_url("http://127.0.0.1:8080").unwrap();
        assert_eq!(url.as_str(), "http://bafy.ipfs.example.com/index.html");
    }

    #[test]
    fn invalid_urls_are_authoring_errors() {
        let err = request().url("not a url").resolve_url("").unwrap_err();
        assert!(matches!(err, AuthoringError::InvalidUrl { .. }));
    }

    #[test]
    fn deserializes_suite_form() {
        let spec: RequestSpec = serde_json::from_str(
            r#"{
                "method": "HEAD",
                "path": "/ipfs/bafy",
                "headers": {"Accept": "application/vnd.ipld.raw"},
                "query": {"format": ["raw"]},
                "body": "hi"
            }"#,
        )
        .unwrap();
        assert_eq!(spec.method, HttpMethod::Head);
        assert_eq!(spec.header_value("accept"), Some("application/vnd.ipld.raw"));
        assert_eq!(spec.body.as_deref(), Some(&b"hi"[..]));

        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["body"], "hi");
        assert!(json.get("useProxyTunnel").is_none());
    }
}
