use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::Value as JsonValue;

use crate::{ApiResponse, Method, Query, RequestSpec, Result};

/// Performs the actual network calls on behalf of the queue.
///
/// A settled [`ApiResponse`] means the server answered, whatever the status.
/// An `Err` means the call never completed and is treated as a transient
/// network failure: the queue retries it with backoff.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn get(&self, path: &str, query: &Query) -> Result<ApiResponse>;

    async fn post(
        &self,
        path: &str,
        body: Option<&JsonValue>,
        headers: &HeaderMap,
    ) -> Result<ApiResponse>;

    async fn put(&self, path: &str, body: Option<&JsonValue>) -> Result<ApiResponse>;

    async fn delete(&self, path: &str) -> Result<ApiResponse>;
}

/// Routes a queued request to the matching verb.
pub(crate) async fn dispatch<T>(transport: &T, spec: &RequestSpec) -> Result<ApiResponse>
where
    T: Transport + ?Sized,
{
    match spec.method {
        Method::Get => transport.get(&spec.path, &spec.query).await,
        Method::Post => {
            transport
                .post(&spec.path, spec.body.as_ref(), &spec.headers)
                .await
        }
        Method::Put => transport.put(&spec.path, spec.body.as_ref()).await,
        Method::Delete => transport.delete(&spec.path).await,
    }
}
