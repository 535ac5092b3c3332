//! Graph origins: the root seed and server connections.

use std::sync::Arc;

use serde_json::Value;

use super::node::{Node, NodeKind};
use crate::connection::{ConnectionState, ServerConfig};
use crate::core::{Task, TaskKey};
use crate::errors::TaskflowError;
use crate::transport::{HttpMethod, HttpRequest};

/// Creates the graph origin: a zero-parent node holding one completed seed
/// task. Everything else hangs off this node.
#[must_use]
pub fn root() -> Node {
    let node = Node::new(NodeKind::Root, Vec::new(), None);
    let key = TaskKey::index(0);
    node.add_task(Task::new(key.clone()));
    node.complete_task(&key, Value::Object(serde_json::Map::new()));
    node
}

impl Node {
    /// Connects this branch to a server.
    ///
    /// With auth parameters configured, a one-time `POST {server}/token`
    /// exchange runs first and its JSON response is stored verbatim as the
    /// connection's auth state; nothing is forwarded downstream until the
    /// exchange resolves (late-subscribe replay then delivers everything
    /// the parent published in the meantime). An auth failure is reported
    /// through [`Node::fail`] and the stream still forwards afterwards —
    /// only the missing token affects later calls. Without a catch hook the
    /// failure aborts the branch before anything forwards.
    ///
    /// Requires a tokio runtime when auth parameters are configured.
    pub fn server(&self, config: ServerConfig) -> Node {
        let ServerConfig {
            base_url,
            version,
            auth_params,
            transport,
            poll_interval,
        } = config;
        let state = Arc::new(ConnectionState::new(
            base_url,
            version,
            transport,
            poll_interval,
        ));
        let node = Node::new(
            NodeKind::Connection,
            vec![self.clone()],
            Some(Arc::clone(&state)),
        );
        match auth_params {
            None => {
                state.set_auth(None);
                node.forward_from(self);
            }
            Some(params) => {
                let parent = self.clone();
                let child = node.clone();
                tokio::spawn(async move {
                    let url = format!("{}/token", state.server());
                    let request = HttpRequest {
                        method: HttpMethod::Post,
                        url: url.clone(),
                        body: Some(params),
                    };
                    match state.transport().execute(request).await {
                        Ok(auth) => state.set_auth(Some(auth)),
                        Err(error) => {
                            tracing::warn!(url = %url, error = %error, "authentication exchange failed");
                            child.fail(&TaskflowError::auth(&url, error.to_string()));
                            state.set_auth(None);
                        }
                    }
                    child.forward_from(&parent);
                });
            }
        }
        node
    }

    /// Forwards every parent result unchanged.
    fn forward_from(&self, parent: &Node) {
        let child = self.clone();
        parent.add_async_hook(Arc::new(move |datum, key| {
            child.add_task(Task::new(key.clone()));
            child.complete_task(key, datum.clone());
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[test]
    fn test_root_publishes_one_seed_task() {
        let node = root();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        node.each(move |result, key| {
            sink.lock().push((key.clone(), result.clone()));
        });

        let seen = seen.lock().clone();
        assert_eq!(seen, vec![(TaskKey::index(0), json!({}))]);
        assert!(node.is_finished());
    }

    #[test]
    fn test_root_is_its_own_key_origin() {
        let node = root();
        assert!(node.key_origin().same_node(&node));
    }

    #[test]
    fn test_server_without_auth_forwards_immediately() {
        let node = root().server(ServerConfig::new("https://example.org/api/"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        node.each(move |result, _key| {
            sink.lock().push(result.clone());
        });

        assert_eq!(seen.lock().clone(), vec![json!({})]);
        let connection = node.connection().unwrap();
        assert_eq!(connection.server(), "https://example.org/api");
        assert_eq!(connection.auth(), None);
    }

    #[test]
    fn test_connection_does_not_anchor_keys() {
        let origin = root();
        let connected = origin.server(ServerConfig::new("https://example.org"));
        assert!(connected.key_origin().same_node(&origin));
    }
}
