use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::{Result, SmartQueueError};

/// Outcome carried by a settled transport call.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// Successful response body.
    Data(JsonValue),
    /// Upstream reported an error; `data` keeps the raw body when there was one.
    Failure {
        message: String,
        data: Option<JsonValue>,
    },
}

/// A settled response from the transport.
///
/// The queue only inspects `status`, `headers` and the failure text; every
/// other status is handed back to the caller unchanged.
#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub payload: Payload,
}

impl ApiResponse {
    /// Builds a `200` response with the given body.
    pub fn ok(data: JsonValue) -> Self {
        Self::with_data(200, data)
    }

    pub fn with_data(status: u16, data: JsonValue) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            payload: Payload::Data(data),
        }
    }

    /// Builds an error response without a body.
    pub fn failure(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            payload: Payload::Failure {
                message: message.into(),
                data: None,
            },
        }
    }

    /// Adds a header. Invalid names or values are skipped.
    pub fn with_header(mut self, name: &str, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value.as_ref()),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Response body, whether the call succeeded or not.
    pub fn data(&self) -> Option<&JsonValue> {
        match &self.payload {
            Payload::Data(data) => Some(data),
            Payload::Failure { data, .. } => data.as_ref(),
        }
    }

    /// Upstream error text, if the call failed.
    pub fn error(&self) -> Option<&str> {
        match &self.payload {
            Payload::Data(_) => None,
            Payload::Failure { message, .. } => Some(message),
        }
    }

    /// Case-insensitive header lookup returning the value as text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Deserializes a successful body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        match &self.payload {
            Payload::Data(data) => serde_json::from_value(data.clone())
                .map_err(|err| SmartQueueError::Decode(format!("unexpected response shape: {err}"))),
            Payload::Failure { message, .. } => Err(SmartQueueError::Http {
                status: self.status,
                message: message.clone(),
            }),
        }
    }

    /// `403` carrying the upstream block signal.
    pub(crate) fn is_blocked(&self) -> bool {
        if self.status != 403 {
            return false;
        }
        self.headers.contains_key("x-blocked")
            || self
                .error()
                .is_some_and(|message| message.to_ascii_lowercase().contains("blocked"))
    }
}
