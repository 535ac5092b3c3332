//! The fan-in node: correlating results from multiple parents by key.

use std::sync::Arc;

use super::node::{Node, NodeKind};
use crate::errors::TaskflowError;

impl Node {
    /// Correlates this branch with `others` by key, producing one join task
    /// per key with a result slot per parent in argument order.
    ///
    /// All parents must share a compatible key origin: either the same
    /// origin node, or every parent re-keyed through a user-defined key
    /// node. Anything else is a construction-time error — auto-generated
    /// namespaces from different ancestors have nothing to correlate on.
    ///
    /// When a parent finishes without having emitted a key the other
    /// parents produced, that slot is force-filled with `null`, so the join
    /// always completes.
    pub fn join(&self, others: &[&Node]) -> Result<Node, TaskflowError> {
        let mut parents = Vec::with_capacity(1 + others.len());
        parents.push(self.clone());
        parents.extend(others.iter().map(|other| (*other).clone()));

        let origin = parents[0].key_origin();
        let different_origins = parents
            .iter()
            .any(|parent| !parent.key_origin().same_node(&origin));
        let all_user_keyed = parents
            .iter()
            .all(|parent| parent.key_origin().kind() == NodeKind::Key);
        if different_origins && !all_user_keyed {
            return Err(TaskflowError::JoinKeyOrigin);
        }

        let arity = parents.len();
        let node = Node::new(NodeKind::Join, parents.clone(), self.connection());
        for (ordinal, parent) in parents.iter().enumerate() {
            let child = node.clone();
            parent.add_async_hook(Arc::new(move |datum, key| {
                child.record_join_result(key, ordinal, arity, datum.clone());
            }));
            let child = node.clone();
            parent.add_finish_hook(Arc::new(move |_results| {
                child.release_join_slot(ordinal);
            }));
        }
        Ok(node)
    }
}
