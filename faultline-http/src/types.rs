use std::time::Duration;

use bytes::Bytes;

use crate::RequestBody;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
    /// Response headers (lowercased header names). Multiple values are joined with ", ".
    pub headers: Vec<(String, String)>,
}

impl HttpResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Lossy UTF-8 prefix of the body, at most `max_chars` characters.
    #[must_use]
    pub fn body_snippet(&self, max_chars: usize) -> String {
        String::from_utf8_lossy(&self.body)
            .chars()
            .take(max_chars)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: http::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: http::Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::empty(),
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(http::Method::GET, url)
    }

    pub fn post(url: impl Into<String>, body: impl Into<RequestBody>) -> Self {
        Self::new(http::Method::POST, url).body(body)
    }

    /// POST with a JSON-encoded body and `content-type: application/json`.
    pub fn post_json<T: serde::Serialize + ?Sized>(
        url: impl Into<String>,
        value: &T,
    ) -> crate::Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::post(url, body).header("content-type", "application/json"))
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn bearer(self, token: &str) -> Self {
        self.header("authorization", format!("Bearer {token}"))
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Request an inclusive byte range (`Range: bytes=start-end`).
    #[must_use]
    pub fn range(self, start: u64, end_inclusive: u64) -> Self {
        self.header("range", format!("bytes={start}-{end_inclusive}"))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn builders_accumulate_headers() {
        let req = HttpRequest::get("http://localhost/a")
            .bearer("tok")
            .range(0, 1023)
            .timeout(Some(Duration::from_secs(2)));

        assert_eq!(req.method, http::Method::GET);
        assert_eq!(
            req.headers,
            vec![
                ("authorization".to_string(), "Bearer tok".to_string()),
                ("range".to_string(), "bytes=0-1023".to_string()),
            ]
        );
        assert_eq!(req.timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn post_json_sets_content_type() {
        let req = HttpRequest::post_json(
            "http://localhost/login",
            &serde_json::json!({"email": "a@b.c", "password": "x"}),
        )
        .unwrap();

        assert_eq!(req.method, http::Method::POST);
        assert!(
            req.headers
                .iter()
                .any(|(k, v)| k == "content-type" && v == "application/json")
        );
        let decoded: serde_json::Value = serde_json::from_slice(&req.body.to_bytes()).unwrap();
        assert_eq!(decoded["email"], "a@b.c");
    }

    #[test]
    fn response_helpers() {
        let res = HttpResponse {
            status: 206,
            body: Bytes::from_static("héllo world".as_bytes()),
            headers: vec![("content-range".to_string(), "bytes 0-10/11".to_string())],
        };
        assert!(res.is_success());
        assert_eq!(res.header("Content-Range"), Some("bytes 0-10/11"));
        assert_eq!(res.body_snippet(5), "héllo");
    }
}
