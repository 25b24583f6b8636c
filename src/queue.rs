use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tokio::sync::{oneshot, watch};
use tokio::time::{sleep, Instant};

use crate::{
    rate_limit::{pacing_delay, RateLimitInfo},
    transport::{self, Transport},
    ApiResponse, MockTransport, Query, QueueOptions, RequestSpec, Result, SmartQueueError,
};

const BLOCKED_MESSAGE: &str =
    "CRITICAL: Application is BLOCKED by OSM. Please stop testing and wait.";
const UNAUTHORIZED_FALLBACK: &str = "Authentication failed after refresh.";

type Reply = oneshot::Sender<Result<ApiResponse>>;

/// Single-flight, rate-limit-aware request queue.
///
/// Requests are executed strictly one at a time in enqueue order. Before
/// every attempt the queue enforces a minimum spacing, pauses when the
/// server-advertised quota is nearly spent, and honors any pending
/// `Retry-After`. Network failures are retried with linear backoff; `429`
/// responses are retried after the server's pause.
///
/// Construct one per upstream at the composition root and share it by
/// cloning; clones drive the same queue.
///
/// ```no_run
/// use smart_queue::{HttpTransport, SmartQueue};
///
/// # async fn run() -> smart_queue::Result<()> {
/// let queue = SmartQueue::new(HttpTransport::new("http://localhost:3000"));
/// let startup = queue.get("ext/generic/startup", [("action", "getData")]).await?;
/// println!("{}", startup.status);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SmartQueue {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    mock: Arc<MockTransport>,
    options: QueueOptions,
    state: Mutex<State>,
    mock_mode: AtomicBool,
    next_id: AtomicU64,
    idle: watch::Sender<bool>,
}

struct State {
    queue: VecDeque<QueuedRequest>,
    processing: bool,
    rate_limit: RateLimitInfo,
    last_dispatch: Option<Instant>,
}

struct QueuedRequest {
    id: u64,
    spec: Arc<RequestSpec>,
    reply: Reply,
    retries: usize,
    rate_limited: usize,
}

/// What the loop does after an attempt settles.
enum Flow {
    Continue,
    Backoff(Duration),
    Stop,
}

impl fmt::Debug for SmartQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("SmartQueue")
            .field("options", &self.inner.options)
            .field("queued", &state.queue.len())
            .field("processing", &state.processing)
            .field("rate_limit", &state.rate_limit)
            .field("mock_mode", &self.is_mock_mode())
            .finish()
    }
}

impl SmartQueue {
    /// Creates a queue with default pacing and retry options.
    pub fn new<T: Transport>(transport: T) -> Self {
        SmartQueueBuilder::new(transport).build()
    }

    /// Creates a queue with custom options.
    pub fn with_options<T: Transport>(transport: T, options: QueueOptions) -> Self {
        SmartQueueBuilder::new(transport).options(options).build()
    }

    /// Creates a builder for custom configuration.
    pub fn builder<T: Transport>(transport: T) -> SmartQueueBuilder {
        SmartQueueBuilder::new(transport)
    }

    /// Queues a GET request.
    ///
    /// The request is enqueued immediately; the returned future only waits
    /// for its outcome. Must be called within a Tokio runtime.
    pub fn get(&self, path: impl Into<String>, query: impl Into<Query>) -> PendingResponse {
        self.enqueue(RequestSpec::get(path, query))
    }

    /// Queues a POST request with a JSON body.
    pub fn post(&self, path: impl Into<String>, body: Option<JsonValue>) -> PendingResponse {
        self.enqueue(RequestSpec::post(path, body, HeaderMap::new()))
    }

    /// Queues a POST request with header overrides.
    pub fn post_with_headers(
        &self,
        path: impl Into<String>,
        body: Option<JsonValue>,
        headers: HeaderMap,
    ) -> PendingResponse {
        self.enqueue(RequestSpec::post(path, body, headers))
    }

    /// Queues a PUT request with a JSON body.
    pub fn put(&self, path: impl Into<String>, body: Option<JsonValue>) -> PendingResponse {
        self.enqueue(RequestSpec::put(path, body))
    }

    /// Queues a DELETE request.
    pub fn delete(&self, path: impl Into<String>) -> PendingResponse {
        self.enqueue(RequestSpec::delete(path))
    }

    /// Queues a GET request and decodes a successful body into `T`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: impl Into<String>,
        query: impl Into<Query>,
    ) -> Result<T> {
        self.get(path, query).await?.json()
    }

    /// Appends a request to the tail and starts processing if idle.
    pub fn enqueue(&self, spec: RequestSpec) -> PendingResponse {
        let (reply, rx) = oneshot::channel();
        let spec = Arc::new(spec);

        if self.is_mock_mode() {
            self.respond_from_mock(spec, reply);
            return PendingResponse { rx };
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let start = {
            let mut state = self.inner.lock();
            debug_log!(
                request_id = id,
                method = %spec.method,
                path = %spec.full_path(),
                queued = state.queue.len() + 1,
                "request enqueued"
            );
            state.queue.push_back(QueuedRequest {
                id,
                spec,
                reply,
                retries: 0,
                rate_limited: 0,
            });
            if state.processing {
                false
            } else {
                state.processing = true;
                self.inner.idle.send_replace(false);
                true
            }
        };

        if start {
            tokio::spawn(Arc::clone(&self.inner).process());
        }

        PendingResponse { rx }
    }

    /// Switches between the real transport and mock fixtures.
    pub fn set_mock_mode(&self, enabled: bool) {
        self.inner.mock_mode.store(enabled, Ordering::Release);
        debug_log!(enabled, "mock mode toggled");
    }

    pub fn is_mock_mode(&self) -> bool {
        self.inner.mock_mode.load(Ordering::Acquire)
    }

    /// Number of requests waiting, including the one in flight.
    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_processing(&self) -> bool {
        self.inner.lock().processing
    }

    /// Snapshot of the last observed quota state.
    pub fn rate_limit(&self) -> RateLimitInfo {
        self.inner.lock().rate_limit.clone()
    }

    pub fn options(&self) -> &QueueOptions {
        &self.inner.options
    }

    /// Resolves once the queue is empty and no processing loop is running.
    pub async fn wait_for_idle(&self) {
        let mut idle = self.inner.idle.subscribe();
        let _ = idle.wait_for(|idle| *idle).await;
    }

    fn respond_from_mock(&self, spec: Arc<RequestSpec>, reply: Reply) {
        let mock = Arc::clone(&self.inner.mock);
        let latency = Duration::from_millis(self.inner.options.mock_latency_ms);
        debug_log!(method = %spec.method, path = %spec.full_path(), "serving from mock fixtures");
        tokio::spawn(async move {
            sleep(latency).await;
            let _ = reply.send(transport::dispatch(mock.as_ref(), &spec).await);
        });
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The processing loop. Only one instance runs per queue; `enqueue`
    /// spawns it when it flips `processing` from false to true.
    async fn process(self: Arc<Self>) {
        loop {
            let (id, spec) = {
                let mut state = self.lock();
                match state.queue.front() {
                    Some(head) => (head.id, Arc::clone(&head.spec)),
                    None => {
                        state.processing = false;
                        self.idle.send_replace(true);
                        debug_log!("queue drained");
                        return;
                    }
                }
            };

            self.wait_for_turn().await;

            debug_log!(request_id = id, method = %spec.method, path = %spec.full_path(), "dispatching request");
            self.lock().last_dispatch = Some(Instant::now());
            let outcome = transport::dispatch(self.transport.as_ref(), &spec).await;

            let flow = match outcome {
                Ok(response) => self.settle(response),
                Err(err) => self.fail(err),
            };

            match flow {
                Flow::Continue => {}
                Flow::Backoff(delay) => sleep(delay).await,
                Flow::Stop => return,
            }
        }
    }

    /// Pacing, quota gate, then `Retry-After` gate.
    async fn wait_for_turn(&self) {
        let options = &self.options;
        let buffer = Duration::from_millis(options.rate_limit_buffer_ms);

        let last = self.lock().last_dispatch;
        let min_interval = Duration::from_millis(options.min_interval_ms);
        if let Some(delay) = pacing_delay(last, min_interval, Instant::now()) {
            debug_log!(delay_ms = delay.as_millis() as u64, "throttling before next request");
            sleep(delay).await;
        }

        let quota = {
            let state = self.lock();
            state
                .rate_limit
                .quota_delay(options.rate_limit_threshold, buffer, Instant::now())
                .map(|delay| (delay, state.rate_limit.remaining))
        };
        if let Some((delay, _remaining)) = quota {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                delay_ms = delay.as_millis() as u64,
                remaining = _remaining,
                "quota nearly exhausted, pausing until reset"
            );
            sleep(delay).await;
        }

        let retry_after = self.lock().rate_limit.take_retry_after(buffer);
        if let Some(delay) = retry_after {
            debug_log!(delay_ms = delay.as_millis() as u64, "honoring Retry-After");
            sleep(delay).await;
        }
    }

    /// Handles a response the transport managed to settle.
    fn settle(&self, response: ApiResponse) -> Flow {
        let mut state = self.lock();
        if state.rate_limit.update_from_headers(&response.headers) {
            debug_log!(
                limit = state.rate_limit.limit,
                remaining = state.rate_limit.remaining,
                "rate limit info updated"
            );
        }

        if response.is_blocked() {
            #[cfg(feature = "tracing")]
            tracing::error!(
                pending = state.queue.len(),
                "application is blocked upstream, aborting all pending requests"
            );
            let flushed: Vec<QueuedRequest> = state.queue.drain(..).collect();
            state.processing = false;
            self.idle.send_replace(true);
            drop(state);

            let mut flushed = flushed.into_iter();
            if let Some(head) = flushed.next() {
                let _ = head
                    .reply
                    .send(Err(SmartQueueError::Blocked(BLOCKED_MESSAGE.to_owned())));
            }
            for request in flushed {
                let _ = request.reply.send(Err(SmartQueueError::Aborted));
            }
            return Flow::Stop;
        }

        if response.status == 429 {
            let cap = self.options.max_rate_limited_attempts;
            let Some(head) = state.queue.front_mut() else {
                return Flow::Continue;
            };
            head.rate_limited += 1;
            let attempts = head.rate_limited;
            #[cfg(feature = "tracing")]
            tracing::warn!(request_id = head.id, attempts, "received 429, retrying after pause");

            if cap.is_some_and(|cap| attempts >= cap) {
                if let Some(head) = state.queue.pop_front() {
                    drop(state);
                    let _ = head.reply.send(Err(SmartQueueError::RateLimited { attempts }));
                }
            }
            return Flow::Continue;
        }

        let Some(head) = state.queue.pop_front() else {
            return Flow::Continue;
        };

        if response.status == 401 {
            debug_log!(request_id = head.id, "received 401 after refresh attempt, rejecting");
            state.rate_limit = RateLimitInfo::exhausted();
            drop(state);
            let message = response.error().unwrap_or(UNAUTHORIZED_FALLBACK).to_owned();
            let _ = head.reply.send(Err(SmartQueueError::Unauthorized(message)));
            return Flow::Continue;
        }

        drop(state);
        debug_log!(request_id = head.id, status = response.status, "request settled");
        let _ = head.reply.send(Ok(response));
        Flow::Continue
    }

    /// Handles a network-level failure: retry with linear backoff or give up.
    fn fail(&self, err: SmartQueueError) -> Flow {
        let mut state = self.lock();
        let max_retries = self.options.max_retries;
        let Some(head) = state.queue.front_mut() else {
            return Flow::Continue;
        };

        if head.retries < max_retries {
            head.retries += 1;
            let retries = head.retries;
            debug_log!(request_id = head.id, attempt = retries, error = %err, "request failed, retrying");
            let delay = self
                .options
                .retry_backoff_ms
                .saturating_mul(retries as u64);
            return Flow::Backoff(Duration::from_millis(delay));
        }

        if let Some(head) = state.queue.pop_front() {
            drop(state);
            debug_log!(request_id = head.id, error = %err, "retries exhausted");
            let _ = head.reply.send(Err(err));
        }
        Flow::Continue
    }
}

/// Builder for configuring a [`SmartQueue`].
pub struct SmartQueueBuilder {
    transport: Arc<dyn Transport>,
    mock: MockTransport,
    options: QueueOptions,
    mock_mode: bool,
}

impl SmartQueueBuilder {
    pub fn new<T: Transport>(transport: T) -> Self {
        Self::from_shared(Arc::new(transport))
    }

    /// Uses a transport that is already shared elsewhere.
    pub fn from_shared(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            mock: MockTransport::with_default_fixtures(),
            options: QueueOptions::default(),
            mock_mode: false,
        }
    }

    #[must_use]
    pub fn options(mut self, options: QueueOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the fixtures served in mock mode.
    #[must_use]
    pub fn mock_transport(mut self, mock: MockTransport) -> Self {
        self.mock = mock;
        self
    }

    /// Starts the queue in mock mode.
    #[must_use]
    pub fn mock_mode(mut self, enabled: bool) -> Self {
        self.mock_mode = enabled;
        self
    }

    pub fn build(self) -> SmartQueue {
        let (idle, _) = watch::channel(true);
        SmartQueue {
            inner: Arc::new(Inner {
                transport: self.transport,
                mock: Arc::new(self.mock),
                options: self.options,
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    processing: false,
                    rate_limit: RateLimitInfo::default(),
                    last_dispatch: None,
                }),
                mock_mode: AtomicBool::new(self.mock_mode),
                next_id: AtomicU64::new(1),
                idle,
            }),
        }
    }
}

/// Outcome of a queued request.
///
/// Resolves when the request's own attempt sequence concludes. Dropping it
/// does not remove the request from the queue.
#[must_use = "the request is queued regardless; await this to observe its outcome"]
#[derive(Debug)]
pub struct PendingResponse {
    rx: oneshot::Receiver<Result<ApiResponse>>,
}

impl Future for PendingResponse {
    type Output = Result<ApiResponse>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|settled| settled.unwrap_or_else(|_| Err(SmartQueueError::Aborted)))
    }
}
