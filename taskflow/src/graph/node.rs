//! The node base: keyed tasks, hook registries, and completion detection.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::call::CallBehavior;
use crate::connection::ConnectionState;
use crate::core::{Task, TaskKey};
use crate::errors::TaskflowError;

/// Per-result subscriber: receives `(result, key)` for every completed task.
pub(crate) type AsyncHook = dyn Fn(&Value, &TaskKey) + Send + Sync;
/// One-shot finish subscriber: receives every result in key order.
pub(crate) type FinishHook = dyn Fn(&[Value]) + Send + Sync;
/// Failure subscriber: receives the error and the failing node.
pub(crate) type CatchHook = dyn Fn(&TaskflowError, &Node) + Send + Sync;

/// What a node does, which also determines whether it anchors a key
/// namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Zero-parent graph origin holding the seed task.
    Root,
    /// Index-keyed literal seed released on parent finish.
    Data,
    /// Server connection and one-time authentication gate.
    Connection,
    /// Conditional pass-through.
    Filter,
    /// User-defined re-keying.
    Key,
    /// Per-item transformation, key unchanged.
    Map,
    /// Parent-finish fold into a single task.
    Reduce,
    /// Per-item fan-out under fresh composite keys.
    Fork,
    /// Fan-in correlating multiple parents by key.
    Join,
    /// Terminal remote-call stage.
    Call(CallBehavior),
}

impl NodeKind {
    /// Whether this node starts a fresh key namespace. Fork-behavior calls
    /// mint their own composite keys, so they anchor one too; batch calls
    /// reuse the parent's key and do not.
    fn anchors_keys(self) -> bool {
        matches!(
            self,
            Self::Key | Self::Fork | Self::Reduce | Self::Data | Self::Call(CallBehavior::Fork)
        )
    }
}

struct NodeState {
    tasks: BTreeMap<TaskKey, Task>,
    async_hooks: Vec<Arc<AsyncHook>>,
    finish_hooks: Vec<Arc<FinishHook>>,
    catch_hooks: Vec<Arc<CatchHook>>,
    finished: bool,
    ran_finish_hooks: bool,
}

impl NodeState {
    /// Every completed result, in key order. The task map is ordered by the
    /// keys' string-style comparison, so iteration order is delivery order.
    fn sorted_results(&self) -> Vec<Value> {
        self.tasks
            .values()
            .map(|task| task.result().unwrap_or(Value::Null))
            .collect()
    }
}

pub(crate) struct NodeInner {
    kind: NodeKind,
    parents: Vec<Node>,
    connection: Option<Arc<ConnectionState>>,
    state: Mutex<NodeState>,
}

/// One stage in the transformation graph.
///
/// A node owns a keyed task map and three hook registries: async hooks
/// (per result), finish hooks (once, key-ordered), and catch hooks
/// (failures). Handles are cheap to clone and share the same stage.
///
/// The graph is cooperative: all bookkeeping is synchronous, and the node's
/// lock is never held across hook dispatch, so hooks are free to mutate
/// child nodes (every transformation relies on exactly that).
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    pub(crate) fn new(
        kind: NodeKind,
        parents: Vec<Node>,
        connection: Option<Arc<ConnectionState>>,
    ) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                kind,
                parents,
                connection,
                state: Mutex::new(NodeState {
                    tasks: BTreeMap::new(),
                    async_hooks: Vec::new(),
                    finish_hooks: Vec::new(),
                    catch_hooks: Vec::new(),
                    finished: false,
                    ran_finish_hooks: false,
                }),
            }),
        }
    }

    /// What this node does.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.inner.kind
    }

    /// The connection state this branch carries, if any ancestor connected
    /// it to a server.
    #[must_use]
    pub fn connection(&self) -> Option<Arc<ConnectionState>> {
        self.inner.connection.clone()
    }

    /// Whether every ancestor is finished and every held task is complete.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.check_finished(false)
    }

    pub(crate) fn same_node(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Registers a task under its key. Re-adding a key overwrites.
    pub(crate) fn add_task(&self, task: Task) {
        let mut state = self.inner.state.lock();
        state.tasks.insert(task.key().clone(), task);
    }

    pub(crate) fn task_count(&self) -> usize {
        self.inner.state.lock().tasks.len()
    }

    /// Completes the task under `key` and publishes its result.
    pub(crate) fn complete_task(&self, key: &TaskKey, result: Value) {
        {
            let mut state = self.inner.state.lock();
            if let Some(task) = state.tasks.get_mut(key) {
                task.complete(result);
            }
        }
        self.publish(key);
    }

    /// Moves a task to a new key, preserving its state.
    pub(crate) fn rekey_task(&self, old: &TaskKey, new: TaskKey) {
        let mut state = self.inner.state.lock();
        if let Some(mut task) = state.tasks.remove(old) {
            task.set_key(new.clone());
            state.tasks.insert(new, task);
        }
    }

    /// Synchronously dispatches the completed result under `key` to every
    /// async hook, then re-evaluates completion.
    pub(crate) fn publish(&self, key: &TaskKey) {
        let dispatch = {
            let state = self.inner.state.lock();
            state.tasks.get(key).and_then(Task::result).map(|result| {
                (state.async_hooks.clone(), result)
            })
        };
        if let Some((hooks, result)) = dispatch {
            for hook in hooks {
                hook(&result, key);
            }
        }
        self.check_finished(true);
    }

    /// Registers a per-result hook and immediately replays every
    /// already-complete task through it, in key order — late subscribers
    /// miss nothing.
    pub(crate) fn add_async_hook(&self, hook: Arc<AsyncHook>) {
        let replay: Vec<(TaskKey, Value)> = {
            let mut state = self.inner.state.lock();
            state.async_hooks.push(Arc::clone(&hook));
            state
                .tasks
                .iter()
                .filter_map(|(key, task)| task.result().map(|result| (key.clone(), result)))
                .collect()
        };
        for (key, result) in replay {
            hook(&result, &key);
        }
    }

    /// Registers a finish hook. If the finish hooks already ran, the new
    /// hook fires immediately with the key-ordered results.
    pub(crate) fn add_finish_hook(&self, hook: Arc<FinishHook>) {
        let replay = {
            let mut state = self.inner.state.lock();
            state.finish_hooks.push(Arc::clone(&hook));
            state.ran_finish_hooks.then(|| state.sorted_results())
        };
        if let Some(results) = replay {
            hook(&results);
        }
    }

    pub(crate) fn add_catch_hook(&self, hook: Arc<CatchHook>) {
        self.inner.state.lock().catch_hooks.push(hook);
    }

    /// Recomputes the finished flag: every ancestor finished (recursively,
    /// on demand) and every held task complete. The flag is monotonic. When
    /// `run_hooks` is set and the node is finished, fires the one-shot
    /// finish hooks with the key-ordered results.
    ///
    /// The on-demand ancestor walk is load-bearing: a parent's final
    /// publish reaches descendants while the parent's own latch has not run
    /// yet, and the walk observes it finished anyway.
    pub(crate) fn check_finished(&self, run_hooks: bool) -> bool {
        let mut finished = self.inner.state.lock().finished;
        if !finished {
            let parents_finished = self
                .inner
                .parents
                .iter()
                .all(|parent| parent.check_finished(false));
            let mut state = self.inner.state.lock();
            if parents_finished && state.tasks.values().all(Task::is_complete) {
                state.finished = true;
            }
            finished = state.finished;
        }
        if run_hooks && finished {
            let pending = {
                let mut state = self.inner.state.lock();
                if state.ran_finish_hooks {
                    None
                } else {
                    state.ran_finish_hooks = true;
                    Some((state.finish_hooks.clone(), state.sorted_results()))
                }
            };
            if let Some((hooks, results)) = pending {
                for hook in hooks {
                    hook(&results);
                }
            }
        }
        finished
    }

    /// Routes a failure to this node's catch hooks. With none registered
    /// the branch is unrecoverable: the failure is logged and the current
    /// branch aborts.
    pub fn fail(&self, reason: &TaskflowError) {
        let hooks = self.inner.state.lock().catch_hooks.clone();
        if hooks.is_empty() {
            tracing::error!(error = %reason, "unhandled pipeline failure");
            panic!("unhandled pipeline failure: {reason}");
        }
        for hook in hooks {
            hook(reason, self);
        }
    }

    /// The ancestor anchoring this branch's key namespace: the nearest
    /// root, user-defined key node, fork node, reduce node, data node, or
    /// fork-behavior call node, walking first parents upward.
    #[must_use]
    pub fn key_origin(&self) -> Node {
        if self.inner.parents.is_empty() || self.inner.kind.anchors_keys() {
            self.clone()
        } else {
            self.inner.parents[0].key_origin()
        }
    }

    /// Looks up or creates the join task under `key` and records `datum` at
    /// the parent's ordinal, publishing if that completed the task.
    pub(crate) fn record_join_result(
        &self,
        key: &TaskKey,
        ordinal: usize,
        arity: usize,
        datum: Value,
    ) {
        let completed = {
            let mut state = self.inner.state.lock();
            let task = state
                .tasks
                .entry(key.clone())
                .or_insert_with(|| Task::new_join(key.clone(), arity));
            task.record_slot(ordinal, datum);
            task.is_complete()
        };
        if completed {
            self.publish(key);
        }
    }

    /// Sweeps incomplete join tasks after a parent finished, force-filling
    /// that parent's slot with null and publishing any task this completed
    /// — a join never hangs on a parent that finished without emitting a
    /// matching key.
    pub(crate) fn release_join_slot(&self, ordinal: usize) {
        let completed: Vec<TaskKey> = {
            let mut state = self.inner.state.lock();
            let mut completed = Vec::new();
            for (key, task) in &mut state.tasks {
                if !task.is_complete() {
                    task.fill_missing_slot(ordinal);
                    if task.is_complete() {
                        completed.push(key.clone());
                    }
                }
            }
            completed
        };
        for key in completed {
            self.publish(&key);
        }
    }

    /// Subscribes to every result this node publishes. Already-published
    /// results are replayed immediately.
    pub fn each<F>(&self, hook: F) -> Node
    where
        F: Fn(&Value, &TaskKey) + Send + Sync + 'static,
    {
        self.add_async_hook(Arc::new(hook));
        self.clone()
    }

    /// Subscribes to this node's one-shot finish, receiving every result in
    /// key order. On an already-finished node the hook fires immediately.
    pub fn all<F>(&self, hook: F) -> Node
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.add_finish_hook(Arc::new(hook));
        self.clone()
    }

    /// Registers an error handler for failures on this node. Without one, a
    /// failure here aborts the branch.
    pub fn on_error<F>(&self, hook: F) -> Node
    where
        F: Fn(&TaskflowError, &Node) + Send + Sync + 'static,
    {
        self.add_catch_hook(Arc::new(hook));
        self.clone()
    }

    /// Waits for this node to finish and returns its key-ordered results.
    ///
    /// Both hooks register before the returned future is polled, and the
    /// catch hook means failures on this node resolve the future as `Err`
    /// instead of aborting the branch.
    pub fn collect(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Value>, TaskflowError>> {
        let (sender, receiver) = tokio::sync::oneshot::channel();
        let sender = Arc::new(Mutex::new(Some(sender)));
        let on_finish = Arc::clone(&sender);
        self.all(move |results| {
            if let Some(sender) = on_finish.lock().take() {
                let _ = sender.send(Ok(results.to_vec()));
            }
        });
        self.on_error(move |error, _node| {
            if let Some(sender) = sender.lock().take() {
                let _ = sender.send(Err(error.clone()));
            }
        });
        async move { receiver.await.unwrap_or(Err(TaskflowError::BranchAborted)) }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Node")
            .field("kind", &self.inner.kind)
            .field("parents", &self.inner.parents.len())
            .field("tasks", &state.tasks.len())
            .field("finished", &state.finished)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn bare_node() -> Node {
        Node::new(NodeKind::Root, Vec::new(), None)
    }

    fn publish_indexed(node: &Node, n: u64, value: Value) {
        let key = TaskKey::index(n);
        node.add_task(Task::new(key.clone()));
        node.complete_task(&key, value);
    }

    #[test]
    fn test_publish_reaches_registered_hooks() {
        let node = bare_node();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        node.each(move |result, key| {
            sink.lock().push((key.clone(), result.clone()));
        });

        publish_indexed(&node, 0, json!("a"));
        assert_eq!(seen.lock().as_slice(), &[(TaskKey::index(0), json!("a"))]);
    }

    #[test]
    fn test_late_async_hook_replays_completed_tasks() {
        let node = bare_node();
        publish_indexed(&node, 0, json!("a"));
        publish_indexed(&node, 1, json!("b"));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        node.each(move |result, _key| {
            sink.lock().push(result.clone());
        });
        assert_eq!(seen.lock().as_slice(), &[json!("a"), json!("b")]);
    }

    #[test]
    fn test_finish_hooks_fire_once_with_sorted_results() {
        let node = bare_node();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&delivered);
        node.all(move |results| {
            counter.fetch_add(1, Ordering::SeqCst);
            *sink.lock() = results.to_vec();
        });

        // Keys 0..=10 so string ordering ("10" before "2") is observable.
        for n in 0..=10 {
            node.add_task(Task::new(TaskKey::index(n)));
        }
        for n in 0..=10 {
            node.complete_task(&TaskKey::index(n), json!(n));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let delivered = delivered.lock().clone();
        assert_eq!(delivered[0], json!(0));
        assert_eq!(delivered[1], json!(1));
        assert_eq!(delivered[2], json!(10));
        assert_eq!(delivered[3], json!(2));

        // Further checks never rerun the hooks.
        node.check_finished(true);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_finish_hook_on_finished_node_fires_immediately() {
        let node = bare_node();
        publish_indexed(&node, 0, json!("done"));

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        node.all(move |results| {
            assert_eq!(results, &[json!("done")]);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_incomplete_task_blocks_finish() {
        let node = bare_node();
        node.add_task(Task::new(TaskKey::index(0)));
        assert!(!node.check_finished(true));

        node.complete_task(&TaskKey::index(0), json!(1));
        assert!(node.check_finished(false));
    }

    #[test]
    fn test_unfinished_parent_blocks_child() {
        let parent = bare_node();
        parent.add_task(Task::new(TaskKey::index(0)));

        let child = Node::new(NodeKind::Map, vec![parent.clone()], None);
        assert!(!child.check_finished(false));

        parent.complete_task(&TaskKey::index(0), json!(1));
        assert!(child.check_finished(false));
    }

    #[test]
    fn test_fail_routes_to_catch_hooks() {
        let node = bare_node();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        node.on_error(move |error, _node| {
            sink.lock().push(error.to_string());
        });

        node.fail(&TaskflowError::NoConnection);
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    #[should_panic(expected = "unhandled pipeline failure")]
    fn test_fail_without_hooks_aborts() {
        bare_node().fail(&TaskflowError::NoConnection);
    }

    #[test]
    fn test_rekey_task_moves_state() {
        let node = bare_node();
        node.add_task(Task::new(TaskKey::text("old")));
        node.rekey_task(&TaskKey::text("old"), TaskKey::text("new"));
        node.complete_task(&TaskKey::text("new"), json!(1));
        assert!(node.check_finished(false));
        assert_eq!(node.task_count(), 1);
    }

    #[tokio::test]
    async fn test_collect_resolves_on_finish() {
        let node = bare_node();
        publish_indexed(&node, 0, json!("x"));
        let results = node.collect().await.unwrap();
        assert_eq!(results, vec![json!("x")]);
    }

    #[tokio::test]
    async fn test_collect_resolves_on_failure() {
        let node = bare_node();
        node.add_task(Task::new(TaskKey::index(0)));
        let pending = node.collect();
        node.fail(&TaskflowError::NoConnection);
        assert!(matches!(pending.await, Err(TaskflowError::NoConnection)));
    }
}
