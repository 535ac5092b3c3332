//! Call descriptors: where a call goes and with what parameters.

use serde_json::{Map, Value};

/// How a call node publishes paginated results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallBehavior {
    /// Fan out: one child task per returned item, pages streamed as they
    /// arrive.
    Fork,
    /// Flatten: every page's data concatenated into one logical result,
    /// published once the final page lands.
    Batch,
}

/// The outcome of a descriptor function: a relative URL and its parameters.
///
/// Parameters are sent as a query string or a JSON body depending on the
/// HTTP method. Two reserved keys are interpreted by the call node:
/// `pageRange` (`[start, end]`, inclusive; stripped from the outgoing
/// request) and `HTTPMethod` (overrides the node's method; forwarded to the
/// server as-is).
#[derive(Debug, Clone, Default)]
pub struct CallDescriptor {
    /// Path relative to the connection's base URL.
    pub url: String,
    /// Request parameters, scalar- or sequence-valued.
    pub params: Map<String, Value>,
}

impl CallDescriptor {
    /// Creates a descriptor for `url` with no parameters.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            params: Map::new(),
        }
    }

    /// Adds one parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Bounds which pages are fetched (inclusive on both ends).
    #[must_use]
    pub fn with_page_range(self, start: u64, end: u64) -> Self {
        self.with_param("pageRange", Value::Array(vec![start.into(), end.into()]))
    }
}
