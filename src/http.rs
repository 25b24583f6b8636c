use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap};
use serde_json::Value as JsonValue;

use crate::{
    ApiResponse, Payload, Query, Result, SmartQueueError, Transport, TransportOptions,
};

/// Environment variable holding the proxy origin, e.g. `http://localhost:3000`.
pub const ENV_BASE_URL: &str = "SMART_QUEUE_BASE_URL";
/// Optional environment variable holding a bearer token.
pub const ENV_TOKEN: &str = "SMART_QUEUE_TOKEN";

const FALLBACK_ERROR: &str = "Request failed";

/// Formats an API path into the same-origin proxy URL.
///
/// Example: `("http://localhost:3000", "ext/events/summary/")` →
/// `"http://localhost:3000/api/osm/ext/events/summary/"`
pub fn proxy_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/api/osm/{}",
        base_url.trim().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[derive(Clone)]
/// [`Transport`] that calls the OSM proxy over HTTP.
///
/// It performs exactly one HTTP exchange per call; pacing and retries are
/// the queue's job.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    authorization: Option<String>,
    options: TransportOptions,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field(
                "authorization",
                &self.authorization.as_ref().map(|_| "<redacted>"),
            )
            .field("options", &self.options)
            .finish()
    }
}

impl HttpTransport {
    /// Creates a transport that relies on ambient credentials (cookies held
    /// by the proxy) and sends no `Authorization` header.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            authorization: None,
            options: TransportOptions::default(),
        }
    }

    /// Creates a transport from a bearer token.
    ///
    /// If the token is missing the `Bearer ` prefix, it is added automatically.
    pub fn new_bearer(base_url: impl Into<String>, token: impl AsRef<str>) -> Self {
        let mut transport = Self::new(base_url);
        transport.authorization = Some(normalize_bearer_authorization(token.as_ref()));
        transport
    }

    /// Creates a transport from environment variables.
    ///
    /// Reads:
    /// - `SMART_QUEUE_BASE_URL`: proxy origin (required)
    /// - `SMART_QUEUE_TOKEN`: bearer token (optional)
    ///
    /// # Example
    ///
    /// ```no_run
    /// use smart_queue::HttpTransport;
    ///
    /// let transport = HttpTransport::from_env().expect("missing SMART_QUEUE_BASE_URL");
    /// ```
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var(ENV_BASE_URL).map_err(|_| {
            SmartQueueError::Config(format!("missing {ENV_BASE_URL} environment variable"))
        })?;
        if base_url.trim().is_empty() {
            return Err(SmartQueueError::Config(format!(
                "{ENV_BASE_URL} is set but empty"
            )));
        }

        match std::env::var(ENV_TOKEN) {
            Ok(token) if !token.trim().is_empty() => Ok(Self::new_bearer(base_url, token)),
            _ => Ok(Self::new(base_url)),
        }
    }

    /// Applies transport options such as the request timeout.
    pub fn with_options(mut self, opts: TransportOptions) -> Self {
        self.options = opts;
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(method, proxy_url(&self.base_url, path))
            .timeout(Duration::from_millis(self.options.timeout_ms));
        if let Some(authorization) = &self.authorization {
            builder = builder.header(header::AUTHORIZATION, authorization);
        }
        builder
    }

    fn with_json_body(
        builder: reqwest::RequestBuilder,
        body: Option<&JsonValue>,
    ) -> reqwest::RequestBuilder {
        let builder = builder.header(header::CONTENT_TYPE, "application/json");
        match body {
            Some(body) => builder.json(body),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<ApiResponse> {
        let response = builder.send().await.map_err(SmartQueueError::Transport)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(SmartQueueError::Transport)?;

        let payload = decode_payload(status.is_success(), &body)?;
        Ok(ApiResponse {
            status: status.as_u16(),
            headers,
            payload,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str, query: &Query) -> Result<ApiResponse> {
        let mut builder = self.request(reqwest::Method::GET, path);
        if !query.is_empty() {
            builder = builder.query(query.pairs());
        }
        self.send(builder).await
    }

    async fn post(
        &self,
        path: &str,
        body: Option<&JsonValue>,
        headers: &HeaderMap,
    ) -> Result<ApiResponse> {
        let builder = Self::with_json_body(self.request(reqwest::Method::POST, path), body)
            .headers(headers.clone());
        self.send(builder).await
    }

    async fn put(&self, path: &str, body: Option<&JsonValue>) -> Result<ApiResponse> {
        let builder = Self::with_json_body(self.request(reqwest::Method::PUT, path), body);
        self.send(builder).await
    }

    async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.send(self.request(reqwest::Method::DELETE, path)).await
    }
}

fn decode_payload(success: bool, body: &str) -> Result<Payload> {
    let trimmed = body.trim();
    let parsed = if trimmed.is_empty() {
        Ok(JsonValue::Null)
    } else {
        serde_json::from_str::<JsonValue>(trimmed)
    };

    if success {
        return parsed.map(Payload::Data).map_err(|err| {
            SmartQueueError::Decode(format!("invalid response JSON: {err}; body: {body}"))
        });
    }

    Ok(match parsed {
        Ok(data) => {
            let message = data
                .get("error")
                .and_then(JsonValue::as_str)
                .unwrap_or(FALLBACK_ERROR)
                .to_owned();
            Payload::Failure {
                message,
                data: Some(data),
            }
        }
        Err(_) => Payload::Failure {
            message: if trimmed.is_empty() {
                FALLBACK_ERROR.to_owned()
            } else {
                trimmed.to_owned()
            },
            data: None,
        },
    })
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
