//! Outgoing request preparation: token injection, reserved parameters, and
//! query-string encoding.

use serde_json::{Map, Value};

use super::descriptor::CallDescriptor;
use crate::connection::ConnectionState;
use crate::transport::{HttpMethod, HttpRequest};

/// Renders parameters as `?k=v&k2=v2`. Sequence values join their elements
/// with a literal encoded comma; no other encoding is performed.
#[must_use]
pub fn format_query(params: &Map<String, Value>) -> String {
    let mut query = String::new();
    for (name, value) in params {
        query.push(if query.is_empty() { '?' } else { '&' });
        query.push_str(name);
        query.push('=');
        match value {
            Value::Array(items) => {
                let joined: Vec<String> = items.iter().map(render_scalar).collect();
                query.push_str(&joined.join("%2C"));
            }
            other => query.push_str(&render_scalar(other)),
        }
    }
    query
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// One logical call's request state. Mutable because a pending
/// asynchronous job rewrites it: once redirected to the job's status URL,
/// every later page of the same call keeps that routing.
#[derive(Debug, Clone)]
pub(crate) struct PreparedCall {
    base_url: String,
    url: String,
    params: Map<String, Value>,
    method: HttpMethod,
    /// Inclusive page bounds requested by the caller.
    pub(crate) page_range: (u64, u64),
}

impl PreparedCall {
    /// Applies token injection and reserved-parameter handling to a
    /// descriptor.
    pub(crate) fn prepare(
        descriptor: CallDescriptor,
        default_method: HttpMethod,
        connection: &ConnectionState,
    ) -> Self {
        let CallDescriptor { url, mut params } = descriptor;
        if let Some(token) = connection.access_token() {
            params.insert("access_token".to_string(), Value::String(token));
        }
        let page_range = params
            .remove("pageRange")
            .map_or((0, u64::MAX), parse_page_range);
        // HTTPMethod overrides the node's method but stays in the outgoing
        // parameters, which is what servers actually receive.
        let method = params
            .get("HTTPMethod")
            .and_then(Value::as_str)
            .and_then(HttpMethod::parse)
            .unwrap_or(default_method);
        Self {
            base_url: connection.server().to_string(),
            url,
            params,
            method,
            page_range,
        }
    }

    /// Switches this call to the job's status URL: GET, no parameters, no
    /// body.
    pub(crate) fn redirect_to_job(&mut self, job_id: &str) {
        if let Some(query_start) = self.url.find('?') {
            self.url.truncate(query_start);
        }
        self.url = format!("{}/{job_id}", self.url);
        self.params = Map::new();
        self.method = HttpMethod::Get;
    }

    /// Builds the request for one page. Page 0 sends no `page` parameter.
    pub(crate) fn request_for_page(&self, page: u64) -> HttpRequest {
        let mut params = self.params.clone();
        if page > 0 {
            params.insert("page".to_string(), Value::from(page));
        }
        if self.method.has_body() {
            HttpRequest {
                method: self.method,
                url: format!("{}{}", self.base_url, self.url),
                body: Some(Value::Object(params)),
            }
        } else {
            HttpRequest {
                method: self.method,
                url: format!("{}{}{}", self.base_url, self.url, format_query(&params)),
                body: None,
            }
        }
    }
}

fn parse_page_range(value: Value) -> (u64, u64) {
    let bounds = value.as_array().cloned().unwrap_or_default();
    let start = bounds.first().and_then(Value::as_u64).unwrap_or(0);
    let end = bounds.get(1).and_then(Value::as_u64).unwrap_or(u64::MAX);
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ServerConfig;
    use crate::version::ProtocolVersion;
    use serde_json::json;
    use std::sync::Arc;

    fn connection() -> ConnectionState {
        let config = ServerConfig::new("https://example.org/api");
        ConnectionState::new(
            config.base_url,
            ProtocolVersion::default(),
            config.transport,
            config.poll_interval,
        )
    }

    fn descriptor() -> CallDescriptor {
        CallDescriptor::new("/traits").with_param("pageSize", 10)
    }

    #[test]
    fn test_format_query_scalars_and_sequences() {
        let mut params = Map::new();
        params.insert("name".to_string(), json!("alpha"));
        params.insert("n".to_string(), json!(3));
        params.insert("tags".to_string(), json!(["x", "y", "z"]));
        // serde_json maps iterate in key order.
        assert_eq!(format_query(&params), "?n=3&name=alpha&tags=x%2Cy%2Cz");
    }

    #[test]
    fn test_format_query_empty_is_empty() {
        assert_eq!(format_query(&Map::new()), "");
    }

    #[test]
    fn test_get_request_renders_query() {
        let call = PreparedCall::prepare(descriptor(), HttpMethod::Get, &connection());
        let request = call.request_for_page(0);
        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.url, "https://example.org/api/traits?pageSize=10");
        assert!(request.body.is_none());
    }

    #[test]
    fn test_page_parameter_only_after_page_zero() {
        let call = PreparedCall::prepare(descriptor(), HttpMethod::Get, &connection());
        assert!(!call.request_for_page(0).url.contains("page="));
        assert!(call.request_for_page(2).url.contains("page=2"));
    }

    #[test]
    fn test_post_request_carries_json_body() {
        let call = PreparedCall::prepare(descriptor(), HttpMethod::Post, &connection());
        let request = call.request_for_page(1);
        assert_eq!(request.url, "https://example.org/api/traits");
        assert_eq!(request.body, Some(json!({"pageSize": 10, "page": 1})));
    }

    #[test]
    fn test_page_range_is_stripped() {
        let call = PreparedCall::prepare(
            descriptor().with_page_range(1, 3),
            HttpMethod::Get,
            &connection(),
        );
        assert_eq!(call.page_range, (1, 3));
        assert!(!call.request_for_page(1).url.contains("pageRange"));
    }

    #[test]
    fn test_method_override_is_honored_but_forwarded() {
        let call = PreparedCall::prepare(
            descriptor().with_param("HTTPMethod", "put"),
            HttpMethod::Get,
            &connection(),
        );
        let request = call.request_for_page(0);
        assert_eq!(request.method, HttpMethod::Put);
        assert_eq!(request.body, Some(json!({"HTTPMethod": "put", "pageSize": 10})));
    }

    #[test]
    fn test_access_token_injection() {
        let state = connection();
        state.set_auth(Some(json!({"access_token": "tok"})));
        let call = PreparedCall::prepare(descriptor(), HttpMethod::Get, &state);
        assert!(call.request_for_page(0).url.contains("access_token=tok"));
    }

    #[test]
    fn test_job_redirect_rewrites_routing() {
        let mut call = PreparedCall::prepare(descriptor(), HttpMethod::Post, &connection());
        call.redirect_to_job("job-42");
        let request = call.request_for_page(0);
        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.url, "https://example.org/api/traits/job-42");
        assert!(request.body.is_none());

        // Later pages keep the job routing.
        let request = call.request_for_page(1);
        assert_eq!(request.url, "https://example.org/api/traits/job-42?page=1");
    }
}
