//! HTTP client construction, SSE parsing, and auth utilities.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::error::SyllabusError;

/// Build an HTTP client. Callers own it and pass it to providers.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, SyllabusError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(10)
        .build()
        .map_err(SyllabusError::Network)
}

/// Build default headers for a Bearer-token API.
pub fn bearer_headers(api_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
        headers.insert(AUTHORIZATION, val);
    }
    headers
}

/// A decoded SSE line.
#[derive(Debug, PartialEq, Eq)]
pub enum SseLine<'a> {
    Data(&'a str),
    Done,
    /// Blank lines, comments, and non-data fields.
    Skip,
}

/// Classify one SSE line.
pub fn parse_sse_line(line: &str) -> SseLine<'_> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return SseLine::Skip;
    }
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        SseLine::Done
    } else {
        SseLine::Data(data)
    }
}

/// Pop the next complete line from a byte buffer.
pub fn next_line(buffer: &mut Vec<u8>) -> Option<String> {
    let end = buffer.iter().position(|b| *b == b'\n')?;
    let line: Vec<u8> = buffer.drain(..=end).collect();
    Some(String::from_utf8_lossy(&line).into_owned())
}

/// Map a non-success HTTP status to an error.
pub fn status_to_error(status: u16, body: &str) -> SyllabusError {
    match status {
        401 | 403 => SyllabusError::Authentication(body.to_string()),
        429 => SyllabusError::RateLimited {
            retry_after_ms: extract_retry_after(body),
        },
        _ => SyllabusError::api(status, body),
    }
}

fn extract_retry_after(body: &str) -> Option<u64> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("retry_after"))
                .and_then(|r| r.as_f64())
                .map(|s| (s * 1000.0) as u64)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_lines() {
        assert_eq!(parse_sse_line("data: {\"a\":1}\r"), SseLine::Data("{\"a\":1}"));
        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(parse_sse_line(": keep-alive"), SseLine::Skip);
        assert_eq!(parse_sse_line("event: message"), SseLine::Skip);
        assert_eq!(parse_sse_line(""), SseLine::Skip);
    }

    #[test]
    fn next_line_keeps_partial_tail() {
        let mut buffer = b"data: one\ndata: tw".to_vec();
        assert_eq!(next_line(&mut buffer).as_deref(), Some("data: one\n"));
        assert_eq!(next_line(&mut buffer), None);
        assert_eq!(buffer, b"data: tw".to_vec());
    }

    #[test]
    fn next_line_does_not_split_multibyte_chars() {
        let mut buffer = "data: caf".as_bytes().to_vec();
        buffer.extend_from_slice(&[0xC3]);
        assert_eq!(next_line(&mut buffer), None);
        buffer.extend_from_slice(&[0xA9, b'\n']);
        assert_eq!(next_line(&mut buffer).as_deref(), Some("data: café\n"));
    }

    #[test]
    fn rate_limit_reads_retry_after() {
        let err = status_to_error(429, r#"{"error":{"retry_after":1.5}}"#);
        assert!(matches!(
            err,
            SyllabusError::RateLimited {
                retry_after_ms: Some(1500)
            }
        ));
    }
}
