use bytes::Bytes;
use reqwest::header::HeaderMap;

/// A fully read response. The body is read once at dispatch time so
/// validation, hooks and reports all see the same bytes.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub version: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    /// Every value of `name`, in the order received.
    pub fn header_values(&self, name: &str) -> Vec<String> {
        self.headers
            .get_all(name)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .collect()
    }

    /// Header values as validation sees them: several header lines are
    /// merged into a single comma-separated value.
    pub fn normalized_header(&self, name: &str) -> Vec<String> {
        let values = self.header_values(name);
        if values.len() <= 1 {
            return values;
        }
        let joined = values.join(",");
        let merged: Vec<&str> = joined
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();
        vec![merged.join(", ")]
    }

    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    pub fn status_line(&self) -> String {
        let reason = reqwest::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|status| status.canonical_reason())
            .unwrap_or("Unknown");
        format!("{} {} {}", self.version, self.status, reason)
    }
}
