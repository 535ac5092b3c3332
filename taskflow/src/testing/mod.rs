//! Test doubles and protocol fixtures.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::errors::TaskflowError;
use crate::transport::{HttpRequest, Transport};

type Responder = Box<dyn Fn(&HttpRequest) -> Result<Value, TaskflowError> + Send + Sync>;

/// A scripted transport that records every request it sees.
pub struct MockTransport {
    responder: Responder,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    /// Scripts responses with a closure.
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&HttpRequest) -> Result<Value, TaskflowError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Serves `pages` as one paginated endpoint: the request's `page`
    /// parameter selects the page, and every envelope reports the full
    /// page count.
    #[must_use]
    pub fn paginated(pages: Vec<Value>) -> Self {
        let total_pages = pages.len() as u64;
        Self::new(move |request| {
            let page = requested_page(request);
            let data = pages
                .get(usize::try_from(page).unwrap_or(usize::MAX))
                .cloned()
                .unwrap_or_else(|| json!([]));
            Ok(page_envelope(data, total_pages))
        })
    }

    /// Fails every request with a transport error.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(move |request| {
            Err(TaskflowError::transport(&request.url, message.clone()))
        })
    }

    /// Every request seen so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests seen so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> Result<Value, TaskflowError> {
        self.requests.lock().push(request.clone());
        (self.responder)(&request)
    }
}

/// The page number a request asks for, read from its body or query string.
/// Requests without a `page` parameter ask for page 0.
#[must_use]
pub fn requested_page(request: &HttpRequest) -> u64 {
    if let Some(page) = request
        .body
        .as_ref()
        .and_then(|body| body.get("page"))
        .and_then(Value::as_u64)
    {
        return page;
    }
    request
        .url
        .split(['?', '&'])
        .find_map(|pair| pair.strip_prefix("page="))
        .and_then(|page| page.parse().ok())
        .unwrap_or(0)
}

/// Builds a success envelope for one page of a paginated endpoint.
#[must_use]
pub fn page_envelope(data: Value, total_pages: u64) -> Value {
    json!({
        "metadata": {"pagination": {"totalPages": total_pages}},
        "result": {"data": data},
    })
}

/// Builds a success envelope for an unpaginated endpoint.
#[must_use]
pub fn single_envelope(result: Value) -> Value {
    json!({"metadata": {}, "result": result})
}

/// Builds an envelope reporting an asynchronous job in `status`.
#[must_use]
pub fn job_envelope(status: &str, job_id: &str) -> Value {
    json!({
        "metadata": {"asynchStatus": {"status": status, "asynchId": job_id}},
        "result": {},
    })
}
