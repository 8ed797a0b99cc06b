//! HTTP client for the UI Bridge runner.
//!
//! The runner serves three path families: `/ui-bridge/control/*` (its own
//! webview), `/ui-bridge/sdk/*` (an SDK-integrated app it is connected to)
//! and `/extension/*` (the legacy browser-extension bridge). This module only
//! moves JSON over HTTP and classifies failures; it never looks inside the
//! payloads.

use std::fmt;
use std::time::{Duration, Instant};

use serde_json::Value;
use url::Url;

use crate::config::RunnerConfig;
use crate::error::{Error, Result};

/// HTTP verbs the runner API uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET, no body.
    Get,
    /// POST with a JSON body.
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => f.write_str("GET"),
            HttpMethod::Post => f.write_str("POST"),
        }
    }
}

/// A single call to the runner.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Already-encoded path, starting with `/`.
    pub path: String,
    /// JSON body for POST requests.
    pub body: Option<Value>,
    /// Per-request timeout; `None` uses the client default.
    pub timeout: Option<Duration>,
}

impl BackendRequest {
    /// GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            body: None,
            timeout: None,
        }
    }

    /// POST request with a JSON body.
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            body: Some(body),
            timeout: None,
        }
    }

    /// Set a per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Decoded runner response.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResponse {
    /// HTTP status code (always 2xx; other statuses become errors).
    pub status: u16,
    /// Decoded JSON body; `null` for an empty body.
    pub body: Value,
}

/// Something that can answer runner requests.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// Issue one request. Never retries.
    async fn request(&self, request: BackendRequest) -> Result<BackendResponse>;
}

/// [`Backend`] speaking HTTP to a live runner.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: Url,
    default_timeout: Duration,
}

impl HttpBackend {
    /// Create a client for the configured runner.
    pub fn new(config: &RunnerConfig) -> Result<Self> {
        let base = config.base_url();
        let base_url = Url::parse(&base)
            .map_err(|e| Error::Internal(format!("invalid runner address {base}: {e}")))?;

        // The runner is on this machine (or the WSL host); never route it
        // through a proxy picked up from the environment.
        let http = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            default_timeout: config.timeout,
        })
    }

    /// Runner base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn classify(err: reqwest::Error, url: &Url, timeout: Duration) -> Error {
        if err.is_timeout() {
            Error::BackendTimeout {
                url: url.to_string(),
                timeout,
            }
        } else if err.is_body() || err.is_decode() {
            Error::BackendProtocolError(err.to_string())
        } else {
            // Connection refused, DNS failure, reset before a response.
            Error::BackendUnreachable {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

#[async_trait::async_trait]
impl Backend for HttpBackend {
    async fn request(&self, request: BackendRequest) -> Result<BackendResponse> {
        let url = self
            .base_url
            .join(&request.path)
            .map_err(|e| Error::Internal(format!("invalid runner path {}: {e}", request.path)))?;
        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let started = Instant::now();

        let builder = match request.method {
            HttpMethod::Get => self.http.get(url.clone()),
            HttpMethod::Post => {
                let body = request
                    .body
                    .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
                self.http.post(url.clone()).json(&body)
            }
        };

        let response = builder
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::classify(e, &url, timeout))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Self::classify(e, &url, timeout))?;

        tracing::debug!(
            method = %request.method,
            path = %request.path,
            status = status.as_u16(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Runner responded"
        );

        if !status.is_success() {
            return Err(Error::BackendError {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        Ok(BackendResponse {
            status: status.as_u16(),
            body: decode_body(&bytes)?,
        })
    }
}

/// Decode a 2xx body. Empty bodies (e.g. 204) decode as `null`.
pub fn decode_body(bytes: &[u8]) -> Result<Value> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(bytes).map_err(|e| {
        let preview: String = String::from_utf8_lossy(bytes).chars().take(200).collect();
        Error::BackendProtocolError(format!("{e} (body starts with {preview:?})"))
    })
}

#[cfg(test)]
pub(crate) mod fake {
    //! Recording in-memory backend for unit tests.

    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::Value;

    use super::{Backend, BackendRequest, BackendResponse};
    use crate::error::Result;

    type Handler = Box<dyn Fn(&BackendRequest) -> Result<BackendResponse> + Send + Sync>;

    pub(crate) struct FakeBackend {
        handler: Handler,
        delay: Option<Duration>,
        requests: Mutex<Vec<BackendRequest>>,
    }

    impl FakeBackend {
        pub(crate) fn with(
            handler: impl Fn(&BackendRequest) -> Result<BackendResponse> + Send + Sync + 'static,
        ) -> Self {
            Self {
                handler: Box::new(handler),
                delay: None,
                requests: Mutex::new(Vec::new()),
            }
        }

        /// Answers every request with `200` and `body`.
        pub(crate) fn ok(body: Value) -> Self {
            Self::with(move |_| {
                Ok(BackendResponse {
                    status: 200,
                    body: body.clone(),
                })
            })
        }

        pub(crate) fn delayed(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub(crate) fn requests(&self) -> Vec<BackendRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub(crate) fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl Backend for FakeBackend {
        async fn request(&self, request: BackendRequest) -> Result<BackendResponse> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            (self.handler)(&request)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_body_decodes_as_null() {
        assert_eq!(decode_body(b"").unwrap(), Value::Null);
        assert_eq!(decode_body(b"  \n").unwrap(), Value::Null);
    }

    #[test]
    fn json_body_is_preserved() {
        let body = decode_body(br#"{"success": true, "data": {"elements": []}}"#).unwrap();
        assert_eq!(body, json!({"success": true, "data": {"elements": []}}));
    }

    #[test]
    fn html_body_is_protocol_error() {
        let err = decode_body(b"<html>502 Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, Error::BackendProtocolError(_)));
        assert!(err.to_string().contains("<html>"));
    }

    #[test]
    fn request_builders() {
        let req = BackendRequest::post("/ui-bridge/sdk/connect", json!({"url": "http://localhost:3001"}))
            .with_timeout(Duration::from_secs(2));
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.timeout, Some(Duration::from_secs(2)));
        assert_eq!(BackendRequest::get("/health").body, None);
        assert_eq!(HttpMethod::Get.to_string(), "GET");
    }

    #[test]
    fn http_backend_uses_configured_address() {
        let config = RunnerConfig::new(Some("127.0.0.1".into()), 9876);
        let backend = HttpBackend::new(&config).unwrap();
        assert_eq!(backend.base_url().as_str(), "http://127.0.0.1:9876/");
    }
}
