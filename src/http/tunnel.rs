//! Plain-HTTP requests through a `CONNECT` tunnel.
//!
//! The client library only tunnels `https` targets, so for `http` targets the
//! handshake and the HTTP/1.1 exchange are done by hand over the socket.

use bytes::Bytes;
use reqwest::Url;
use reqwest::header::{CONTENT_LENGTH, CONNECTION, HOST, HeaderMap, HeaderName, HeaderValue, TRANSFER_ENCODING};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use super::client::{WireRequest, authority, origin_form};
use super::response::Response;
use crate::error::TransportError;

pub const MAX_HEADER_SIZE: usize = 65_536;

pub async fn send(proxy: &str, wire: &WireRequest) -> Result<Response, TransportError> {
    let url = wire.url.to_string();
    let proxy_url =
        Url::parse(proxy).map_err(|err| TransportError::Client(format!("invalid proxy URL: {err}")))?;
    let proxy_addr = format!(
        "{}:{}",
        proxy_url.host_str().unwrap_or_default(),
        proxy_url.port_or_known_default().unwrap_or(80)
    );
    let target = format!(
        "{}:{}",
        wire.url.host_str().unwrap_or_default(),
        wire.url.port_or_known_default().unwrap_or(80)
    );

    let io_error = |err: std::io::Error| TransportError::Request {
        url: url.clone(),
        message: err.to_string(),
    };

    let mut stream = TcpStream::connect(&proxy_addr).await.map_err(io_error)?;
    let handshake = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n\r\n");
    stream.write_all(handshake.as_bytes()).await.map_err(io_error)?;

    let mut buf = Vec::new();
    let head_end = read_head(&mut stream, &mut buf, proxy).await?;
    let (status_line, status, _, _) = parse_head(&buf[..head_end], proxy)?;
    if status != 200 {
        return Err(TransportError::TunnelRefused {
            proxy: proxy.to_string(),
            status: status_line,
        });
    }
    debug!(proxy, target, "tunnel established");
    let leftover = buf.split_off(head_end + 4);

    stream
        .write_all(&encode_request(wire))
        .await
        .map_err(io_error)?;

    read_response(&mut stream, leftover, &url, wire.method.is_bodiless_response()).await
}

fn encode_request(wire: &WireRequest) -> Vec<u8> {
    let mut head = format!("{} {} HTTP/1.1\r\n", wire.method, origin_form(&wire.url));
    if !wire.headers.contains_key(HOST) {
        head.push_str(&format!("Host: {}\r\n", authority(&wire.url)));
    }
    for (name, value) in &wire.headers {
        if name == CONNECTION || name == CONTENT_LENGTH {
            continue;
        }
        head.push_str(name.as_str());
        head.push_str(": ");
        head.push_str(&String::from_utf8_lossy(value.as_bytes()));
        head.push_str("\r\n");
    }
    let body = wire.body.as_deref().unwrap_or_default();
    if !body.is_empty() {
        head.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    head.push_str("Connection: close\r\n\r\n");

    let mut out = head.into_bytes();
    out.extend_from_slice(body);
    out
}

fn find_head_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

async fn read_more<R: AsyncRead + Unpin>(
    stream: &mut R,
    buf: &mut Vec<u8>,
    url: &str,
) -> Result<usize, TransportError> {
    let mut chunk = [0u8; 8192];
    let n = stream
        .read(&mut chunk)
        .await
        .map_err(|err| TransportError::Body {
            url: url.to_string(),
            message: err.to_string(),
        })?;
    buf.extend_from_slice(&chunk[..n]);
    Ok(n)
}

async fn read_head<R: AsyncRead + Unpin>(
    stream: &mut R,
    buf: &mut Vec<u8>,
    url: &str,
) -> Result<usize, TransportError> {
    loop {
        if let Some(end) = find_head_end(buf) {
            return Ok(end);
        }
        if buf.len() > MAX_HEADER_SIZE {
            return Err(malformed(url, "headers too large"));
        }
        if read_more(stream, buf, url).await? == 0 {
            return Err(malformed(url, "connection closed before headers were complete"));
        }
    }
}

fn malformed(url: &str, reason: impl Into<String>) -> TransportError {
    TransportError::MalformedResponse {
        url: url.to_string(),
        reason: reason.into(),
    }
}

/// Status line, status code, version and headers of a response head.
fn parse_head(head: &[u8], url: &str) -> Result<(String, u16, String, HeaderMap), TransportError> {
    let text = std::str::from_utf8(head).map_err(|_| malformed(url, "invalid header encoding"))?;
    let mut lines = text.split("\r\n");
    let status_line = lines.next().unwrap_or_default().to_string();

    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default().to_string();
    if !version.starts_with("HTTP/") {
        return Err(malformed(url, format!("invalid status line `{status_line}`")));
    }
    let status: u16 = parts
        .next()
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| malformed(url, format!("invalid status line `{status_line}`")))?;

    let mut headers = HeaderMap::new();
    for line in lines {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| malformed(url, format!("invalid header line `{line}`")))?;
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|err| malformed(url, err.to_string()))?;
        let value = HeaderValue::from_str(value.trim()).map_err(|err| malformed(url, err.to_string()))?;
        headers.append(name, value);
    }

    Ok((status_line, status, version, headers))
}

enum Framing {
    Empty,
    Length(usize),
    Chunked,
    UntilClose,
}

async fn read_response<R: AsyncRead + Unpin>(
    stream: &mut R,
    mut buf: Vec<u8>,
    url: &str,
    bodiless: bool,
) -> Result<Response, TransportError> {
    let head_end = read_head(stream, &mut buf, url).await?;
    let (_, status, version, headers) = parse_head(&buf[..head_end], url)?;
    let mut body = buf.split_off(head_end + 4);

    let chunked = headers
        .get(TRANSFER_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"));
    let length = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok());

    let framing = if bodiless || status < 200 || status == 204 || status == 304 {
        Framing::Empty
    } else if chunked {
        Framing::Chunked
    } else if let Some(length) = length {
        Framing::Length(length)
    } else {
        Framing::UntilClose
    };

    match framing {
        Framing::Empty => body.clear(),
        Framing::Length(length) => {
            while body.len() < length {
                if read_more(stream, &mut body, url).await? == 0 {
                    return Err(TransportError::Body {
                        url: url.to_string(),
                        message: format!("connection closed after {} of {length} bytes", body.len()),
                    });
                }
            }
            body.truncate(length);
        }
        Framing::Chunked => loop {
            if let Some(decoded) = decode_chunked(&body).map_err(|reason| malformed(url, reason))? {
                body = decoded;
                break;
            }
            if read_more(stream, &mut body, url).await? == 0 {
                return Err(TransportError::Body {
                    url: url.to_string(),
                    message: "connection closed inside chunked body".into(),
                });
            }
        },
        Framing::UntilClose => while read_more(stream, &mut body, url).await? > 0 {},
    }

    Ok(Response {
        status,
        version,
        headers,
        body: Bytes::from(body),
    })
}

/// Decode a chunked body. `Ok(None)` means more data is needed.
fn decode_chunked(data: &[u8]) -> Result<Option<Vec<u8>>, String> {
    let mut out = Vec::new();
    let mut pos = 0;

    loop {
        let Some(line_len) = data[pos..].windows(2).position(|w| w == b"\r\n") else {
            return Ok(None);
        };
        let line = std::str::from_utf8(&data[pos..pos + line_len])
            .map_err(|_| "invalid chunk size encoding".to_string())?;
        let size_text = line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_text, 16)
            .map_err(|_| format!("invalid chunk size `{size_text}`"))?;
        pos += line_len + 2;

        if size == 0 {
            // trailers, then an empty line
            loop {
                let Some(len) = data[pos..].windows(2).position(|w| w == b"\r\n") else {
                    return Ok(None);
                };
                pos += len + 2;
                if len == 0 {
                    return Ok(Some(out));
                }
            }
        }

        if data.len() < pos + size + 2 {
            return Ok(None);
        }
        out.extend_from_slice(&data[pos..pos + size]);
        if &data[pos + size..pos + size + 2] != b"\r\n" {
            return Err("chunk is not terminated by CRLF".into());
        }
        pos += size + 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::method::HttpMethod;
    use crate::http::request::Transport;

    #[test]
    fn decodes_chunked_bodies() {
        let data = b"4\r\nWiki\r\n5;ext=1\r\npedia\r\n0\r\nX-Trailer: yes\r\n\r\n";
        assert_eq!(decode_chunked(data).unwrap().unwrap(), b"Wikipedia");
        assert_eq!(decode_chunked(b"4\r\nWi").unwrap(), None);
        assert_eq!(decode_chunked(b"0\r\n").unwrap(), None);
        assert!(decode_chunked(b"zz\r\n").is_err());
    }

    #[test]
    fn parses_status_and_repeated_headers() {
        let head = b"HTTP/1.1 206 Partial Content\r\nVary: Accept\r\nvary: Origin";
        let (line, status, version, headers) = parse_head(head, "http://x/").unwrap();
        assert_eq!(line, "HTTP/1.1 206 Partial Content");
        assert_eq!(status, 206);
        assert_eq!(version, "HTTP/1.1");
        assert_eq!(headers.get_all("vary").iter().count(), 2);

        assert!(parse_head(b"garbage", "http://x/").is_err());
    }

    #[tokio::test]
    async fn reads_length_delimited_response() {
        let raw: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello trailing";
        let mut reader = raw;
        let res = read_response(&mut reader, Vec::new(), "http://x/", false).await.unwrap();
        assert_eq!(res.status, 200);
        assert_eq!(&res.body[..], b"hello");
    }

    #[tokio::test]
    async fn reads_until_close_and_skips_head_bodies() {
        let raw: &[u8] = b"HTTP/1.1 200 OK\r\n\r\nall of it";
        let mut reader = raw;
        let res = read_response(&mut reader, Vec::new(), "http://x/", false).await.unwrap();
        assert_eq!(&res.body[..], b"all of it");

        let raw: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n";
        let mut reader = raw;
        let res = read_response(&mut reader, Vec::new(), "http://x/", true).await.unwrap();
        assert!(res.body.is_empty());
    }

    #[tokio::test]
    async fn short_bodies_are_transport_errors() {
        let raw: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc";
        let mut reader = raw;
        let err = read_response(&mut reader, Vec::new(), "http://x/", false).await.unwrap_err();
        assert!(matches!(err, TransportError::Body { .. }));
    }

    #[test]
    fn encodes_origin_form_with_host() {
        let mut headers = HeaderMap::new();
        headers.insert("accept", HeaderValue::from_static("text/plain"));
        let wire = WireRequest {
            method: HttpMethod::Post,
            url: Url::parse("http://example.com:8080/a?b=c").unwrap(),
            headers,
            body: Some(b"xy".to_vec()),
            transport: Transport::Tunnel("http://127.0.0.1:3128".into()),
            follow_redirects: false,
        };
        let encoded = String::from_utf8(encode_request(&wire)).unwrap();
        assert!(encoded.starts_with("POST /a?b=c HTTP/1.1\r\nHost: example.com:8080\r\n"));
        assert!(encoded.contains("accept: text/plain\r\n"));
        assert!(encoded.ends_with("Content-Length: 2\r\nConnection: close\r\n\r\nxy"));
    }
}
