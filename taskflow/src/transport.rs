//! The HTTP transport seam.
//!
//! The graph never talks to the network directly; call and connection nodes
//! go through the [`Transport`] trait, allowing scripted implementations in
//! tests. [`HttpTransport`] is the default, backed by `reqwest`.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::TaskflowError;

/// HTTP method for an outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
}

impl HttpMethod {
    /// The lowercase wire form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::Put => "put",
            Self::Delete => "delete",
        }
    }

    /// Parses a method name, case-insensitively.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text.to_ascii_lowercase().as_str() {
            "get" => Some(Self::Get),
            "post" => Some(Self::Post),
            "put" => Some(Self::Put),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    /// Whether requests with this method carry their parameters as a JSON
    /// body rather than a query string.
    #[must_use]
    pub fn has_body(self) -> bool {
        matches!(self, Self::Post | Self::Put)
    }
}

/// A fully-formed outgoing request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// The HTTP method.
    pub method: HttpMethod,
    /// The absolute URL, query string included.
    pub url: String,
    /// JSON body, present only for body-carrying methods.
    pub body: Option<Value>,
}

/// Protocol for executing remote requests.
///
/// Implementations return the parsed JSON body of the response. The HTTP
/// status is deliberately not part of the contract: the protocol reports
/// failures inside its envelope, and a body that fails to parse as JSON
/// surfaces as a transport error.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Executes the request and parses the response body as JSON.
    async fn execute(&self, request: HttpRequest) -> Result<Value, TaskflowError>;
}

/// Default transport backed by a shared `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport with a fresh client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: HttpRequest) -> Result<Value, TaskflowError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };
        let mut builder = self
            .client
            .request(method, &request.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json;charset=utf-8");
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        let response = builder
            .send()
            .await
            .map_err(|err| TaskflowError::transport(&request.url, err.to_string()))?;
        response
            .json()
            .await
            .map_err(|err| TaskflowError::transport(&request.url, err.to_string()))
    }
}
