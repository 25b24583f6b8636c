use std::fmt;

use reqwest::header::HeaderMap;
use serde_json::Value as JsonValue;

/// HTTP verb of a queued request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered query parameters for a GET request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Query(Vec<(String, String)>);

impl Query {
    /// Builds query parameters from key/value pairs, keeping their order.
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }

    /// Form-urlencoded representation without the leading `?`.
    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.0.iter())
            .finish()
    }
}

impl From<()> for Query {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

impl From<Vec<(String, String)>> for Query {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Query {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Self::new(pairs)
    }
}

/// Everything the transport needs to perform one call.
///
/// Replayed unchanged on every attempt while at the head of the queue.
#[derive(Clone, Debug)]
pub struct RequestSpec {
    pub method: Method,
    /// Path relative to the upstream API root, e.g. `ext/events/summary/`.
    pub path: String,
    pub query: Query,
    pub body: Option<JsonValue>,
    /// Header overrides. Only sent with POST.
    pub headers: HeaderMap,
}

impl RequestSpec {
    pub fn get(path: impl Into<String>, query: impl Into<Query>) -> Self {
        Self::new(Method::Get, path.into(), query.into(), None, HeaderMap::new())
    }

    pub fn post(path: impl Into<String>, body: Option<JsonValue>, headers: HeaderMap) -> Self {
        Self::new(Method::Post, path.into(), Query::default(), body, headers)
    }

    pub fn put(path: impl Into<String>, body: Option<JsonValue>) -> Self {
        Self::new(Method::Put, path.into(), Query::default(), body, HeaderMap::new())
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path.into(), Query::default(), None, HeaderMap::new())
    }

    fn new(
        method: Method,
        path: String,
        query: Query,
        body: Option<JsonValue>,
        headers: HeaderMap,
    ) -> Self {
        Self {
            method,
            path,
            query,
            body,
            headers,
        }
    }

    /// Path plus encoded query, as used in log lines.
    pub fn full_path(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query.to_query_string())
        }
    }
}
