//! The terminal remote-call node: dispatch, the async page driver, and
//! registry-based invocation.

use std::sync::Arc;

use serde_json::Value;

use super::descriptor::{CallBehavior, CallDescriptor};
use super::paginator::{PageOutcome, Paginator};
use super::protocol::Metadata;
use super::request::PreparedCall;
use crate::connection::ConnectionState;
use crate::core::TaskKey;
use crate::errors::TaskflowError;
use crate::graph::{Node, NodeKind};
use crate::transport::HttpMethod;
use crate::version::OperationRegistry;

impl Node {
    /// Attaches a terminal remote-call stage.
    ///
    /// The descriptor builds one call per dispatch from `(datum, key)`.
    /// With `multicall` set, the stage hooks the parent's per-item stream
    /// and runs one paginated call per item, their page sequences
    /// interleaving freely; otherwise it hooks the parent's finish, and the
    /// descriptor receives the key-ordered result list as its datum under
    /// key `0`.
    ///
    /// Requires a tokio runtime: each logical call drives its pages on a
    /// spawned task.
    pub fn call<F>(
        &self,
        behavior: CallBehavior,
        method: HttpMethod,
        descriptor: F,
        multicall: bool,
    ) -> Node
    where
        F: Fn(&Value, &TaskKey) -> CallDescriptor + Send + Sync + 'static,
    {
        let node = Node::new(NodeKind::Call(behavior), vec![self.clone()], self.connection());
        let dispatch = CallDispatch {
            node: node.clone(),
            behavior,
            method,
            descriptor: Arc::new(descriptor),
        };
        if multicall {
            self.add_async_hook(Arc::new(move |datum, key| {
                dispatch.dispatch(datum, key.clone());
            }));
        } else {
            self.add_finish_hook(Arc::new(move |results| {
                dispatch.dispatch(&Value::Array(results.to_vec()), TaskKey::index(0));
            }));
        }
        node
    }

    /// Resolves `name` in the registry, applies the version gate (a
    /// warning, never a refusal), and delegates to [`Node::call`].
    pub fn invoke(
        &self,
        registry: &OperationRegistry,
        name: &str,
    ) -> Result<Node, TaskflowError> {
        let operation = registry
            .get(name)
            .ok_or_else(|| TaskflowError::UnknownOperation {
                name: name.to_string(),
            })?;
        let connection = self.connection().ok_or(TaskflowError::NoConnection)?;
        operation.warn_if_gated(connection.version());
        let descriptor = operation.descriptor();
        Ok(self.call(
            operation.behavior(),
            operation.method(),
            move |datum, key| descriptor(datum, key),
            operation.is_multicall(),
        ))
    }
}

struct CallDispatch {
    node: Node,
    behavior: CallBehavior,
    method: HttpMethod,
    descriptor: Arc<dyn Fn(&Value, &TaskKey) -> CallDescriptor + Send + Sync>,
}

impl CallDispatch {
    fn dispatch(&self, datum: &Value, key: TaskKey) {
        let Some(connection) = self.node.connection() else {
            self.node.fail(&TaskflowError::NoConnection);
            return;
        };
        let call = PreparedCall::prepare((self.descriptor)(datum, &key), self.method, &connection);
        let paginator = Paginator::new(self.behavior, key, call.page_range);
        // Synchronously, before any I/O: the sentry is what keeps this node
        // unfinished while the call is in flight.
        paginator.register_first_sentry(&self.node);
        tokio::spawn(drive(self.node.clone(), connection, call, paginator));
    }
}

/// Drives one logical call: fetch pages in strictly increasing order,
/// polling through pending asynchronous jobs, until the paginator closes
/// the call.
async fn drive(
    node: Node,
    connection: Arc<ConnectionState>,
    mut call: PreparedCall,
    mut paginator: Paginator,
) {
    loop {
        let Some(envelope) = fetch_page(&node, &connection, &mut call, paginator.page()).await
        else {
            paginator.abort(&node);
            return;
        };
        match paginator.absorb(&node, envelope) {
            PageOutcome::Continue => {}
            PageOutcome::Done => return,
        }
    }
}

/// Fetches one page, polling through any pending asynchronous job. `None`
/// means the fetch failed and the failure was routed to the node's catch
/// hooks.
async fn fetch_page(
    node: &Node,
    connection: &ConnectionState,
    call: &mut PreparedCall,
    page: u64,
) -> Option<Value> {
    loop {
        let request = call.request_for_page(page);
        tracing::debug!(url = %request.url, page, "fetching page");
        let envelope = match connection.transport().execute(request).await {
            Ok(envelope) => envelope,
            Err(error) => {
                node.fail(&error);
                return None;
            }
        };
        let metadata = Metadata::from_envelope(&envelope);
        if let Some(job_id) = metadata.pending_job() {
            tracing::debug!(job_id, "asynchronous job pending, polling status");
            call.redirect_to_job(job_id);
            tokio::time::sleep(connection.poll_interval()).await;
            continue;
        }
        return Some(envelope);
    }
}
