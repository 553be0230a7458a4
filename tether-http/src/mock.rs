//! Scripted in-memory transport
//!
//! Replies are keyed by `"METHOD:URL"`. Each key holds a queue of replies;
//! the last one is sticky and answers every further call. Unscripted
//! requests fail like an unreachable host.

use crate::client::HttpTransport;
use crate::errors::HttpError;
use crate::types::{HttpMethod, HttpRequest, HttpResponse};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
enum Outcome {
    Respond {
        status: u16,
        body: String,
        headers: HashMap<String, String>,
    },
    Fail(HttpError),
    Hang,
}

/// One scripted reply
#[derive(Debug, Clone)]
pub struct MockReply {
    outcome: Outcome,
    delay: Duration,
}

impl MockReply {
    pub fn status(status: u16) -> Self {
        Self::text(status, "")
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Respond {
                status,
                body: body.into(),
                headers: HashMap::new(),
            },
            delay: Duration::ZERO,
        }
    }

    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self::text(status, body.to_string())
    }

    pub fn connection_refused() -> Self {
        Self::error(HttpError::Connect("connection refused".to_string()))
    }

    pub fn error(error: HttpError) -> Self {
        Self {
            outcome: Outcome::Fail(error),
            delay: Duration::ZERO,
        }
    }

    /// Never answers; the caller's own deadline decides
    pub fn hang() -> Self {
        Self {
            outcome: Outcome::Hang,
            delay: Duration::ZERO,
        }
    }

    /// Add a response header. Names are stored lowercase, as reqwest reports them.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        if let Outcome::Respond { headers, .. } = &mut self.outcome {
            headers.insert(name.to_ascii_lowercase(), value.into());
        }
        self
    }

    /// Delay the reply by `delay` on the tokio clock
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A request observed by the mock
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub timeout: Option<Duration>,
    pub at: Instant,
}

#[derive(Debug, Default)]
pub struct MockTransport {
    replies: Mutex<HashMap<String, VecDeque<MockReply>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

fn key(method: HttpMethod, url: &str) -> String {
    format!("{}:{}", method.as_str(), url)
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for `method url`
    pub fn on(&self, method: HttpMethod, url: &str, reply: MockReply) -> &Self {
        self.replies
            .lock()
            .entry(key(method, url))
            .or_default()
            .push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, method: HttpMethod, url: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.method == method && call.url == url)
            .cloned()
            .collect()
    }

    fn next_reply(&self, method: HttpMethod, url: &str) -> Option<MockReply> {
        let mut replies = self.replies.lock();
        let queue = replies.get_mut(&key(method, url))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.calls.lock().push(RecordedCall {
            method: request.method,
            url: request.url.clone(),
            headers: request.headers.clone(),
            body: request.body.clone(),
            timeout: request.timeout,
            at: Instant::now(),
        });

        let Some(reply) = self.next_reply(request.method, &request.url) else {
            debug!("No mock reply for {} {}", request.method, request.url);
            return Err(HttpError::Connect(format!(
                "no route to {} (unscripted)",
                request.url
            )));
        };

        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }

        match reply.outcome {
            Outcome::Respond { status, body, headers } => Ok(HttpResponse {
                status,
                headers,
                body,
            }),
            Outcome::Fail(error) => Err(error),
            Outcome::Hang => std::future::pending().await,
        }
    }
}
