//! Transformation nodes: filter, key, map, reduce, fork, and data.
//!
//! Each constructor wraps one parent, installs a hook at construction, and
//! eagerly republishes transformed results — nothing buffers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;

use super::node::{Node, NodeKind};
use crate::core::{Task, TaskKey};

impl Node {
    /// Transforms each parent result, key unchanged.
    pub fn map<F>(&self, map_fn: F) -> Node
    where
        F: Fn(&Value, &TaskKey) -> Value + Send + Sync + 'static,
    {
        let node = Node::new(NodeKind::Map, vec![self.clone()], self.connection());
        let child = node.clone();
        self.add_async_hook(Arc::new(move |datum, key| {
            child.add_task(Task::new(key.clone()));
            child.complete_task(key, map_fn(datum, key));
        }));
        node
    }

    /// Admits only results matching the predicate, under the same key.
    ///
    /// A filter that never admits anything holds no tasks, so normal
    /// completion detection would never re-check it; it marks itself
    /// finished once the parent's stream dries up.
    pub fn filter<F>(&self, predicate: F) -> Node
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        let node = Node::new(NodeKind::Filter, vec![self.clone()], self.connection());
        let child = node.clone();
        self.add_async_hook(Arc::new(move |datum, key| {
            if predicate(datum) {
                child.add_task(Task::new(key.clone()));
                child.complete_task(key, datum.clone());
            } else if child.task_count() == 0 {
                child.check_finished(true);
            }
        }));
        node
    }

    /// Re-keys each result via `(datum, previous_key) → new_key`, starting
    /// a user-defined key namespace. Always admits.
    pub fn keys<F>(&self, key_fn: F) -> Node
    where
        F: Fn(&Value, &TaskKey) -> TaskKey + Send + Sync + 'static,
    {
        let node = Node::new(NodeKind::Key, vec![self.clone()], self.connection());
        let child = node.clone();
        self.add_async_hook(Arc::new(move |datum, key| {
            let new_key = key_fn(datum, key);
            child.add_task(Task::new(new_key.clone()));
            child.complete_task(&new_key, datum.clone());
        }));
        node
    }

    /// Folds the parent's key-ordered results into a single task once the
    /// parent finishes.
    pub fn reduce<F>(&self, reduce_fn: F, seed: Value) -> Node
    where
        F: Fn(Value, &Value) -> Value + Send + Sync + 'static,
    {
        self.reduce_node(move |results| {
            results.iter().fold(seed.clone(), |acc, value| reduce_fn(acc, value))
        })
    }

    /// Collapses the parent's key-ordered results into a single task
    /// holding the ordered list.
    pub fn gather(&self) -> Node {
        self.reduce_node(|results| Value::Array(results.to_vec()))
    }

    fn reduce_node<F>(&self, fold: F) -> Node
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        let node = Node::new(NodeKind::Reduce, vec![self.clone()], self.connection());
        let key = TaskKey::index(0);
        node.add_task(Task::new(key.clone()));
        let child = node.clone();
        self.add_finish_hook(Arc::new(move |results| {
            child.complete_task(&key, fold(results));
        }));
        node
    }

    /// Expands each parent result into zero or more child results, each
    /// under a fresh composite key pairing a node-wide ordinal with the
    /// unforked parent key.
    pub fn fork<F>(&self, fork_fn: F) -> Node
    where
        F: Fn(&Value) -> Vec<Value> + Send + Sync + 'static,
    {
        let node = Node::new(NodeKind::Fork, vec![self.clone()], self.connection());
        let child = node.clone();
        let next_ordinal = AtomicU64::new(0);
        self.add_async_hook(Arc::new(move |datum, key| {
            // Register every child task before publishing any: the finished
            // flag is monotonic, and a publish mid-registration could latch
            // it while siblings are still missing from the map.
            let staged: Vec<(TaskKey, Value)> = fork_fn(datum)
                .into_iter()
                .map(|new_datum| {
                    let ordinal = next_ordinal.fetch_add(1, Ordering::SeqCst);
                    (TaskKey::composite(ordinal, key), new_datum)
                })
                .collect();
            for (task_key, _) in &staged {
                child.add_task(Task::new(task_key.clone()));
            }
            for (task_key, new_datum) in staged {
                child.complete_task(&task_key, new_datum);
            }
        }));
        node
    }

    /// Seeds index-keyed tasks from a literal sequence, released once the
    /// parent finishes.
    pub fn data<I>(&self, items: I) -> Node
    where
        I: IntoIterator<Item = Value>,
    {
        let node = Node::new(NodeKind::Data, vec![self.clone()], self.connection());
        let staged: Vec<(TaskKey, Value)> = items
            .into_iter()
            .enumerate()
            .map(|(n, datum)| (TaskKey::index(n as u64), datum))
            .collect();
        for (key, _) in &staged {
            node.add_task(Task::new(key.clone()));
        }
        let child = node.clone();
        self.add_finish_hook(Arc::new(move |_results| {
            if staged.is_empty() {
                // Same hole the filter guard covers: with no tasks of its
                // own, nothing downstream ever re-checks this node.
                child.check_finished(true);
                return;
            }
            for (key, datum) in &staged {
                child.complete_task(key, datum.clone());
            }
        }));
        node
    }
}
