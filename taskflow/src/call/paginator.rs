//! The pagination state machine for one logical call.
//!
//! A [`Paginator`] owns everything one call accumulates across pages: the
//! detected response shape, the fork-key counter, the merged batch body,
//! and the key of the sentry task currently holding the node open. The
//! async driver in [`super::node`] feeds it one successful envelope at a
//! time and follows the outcome it returns.

use serde_json::Value;

use super::descriptor::CallBehavior;
use super::protocol::{attach_back_reference, Metadata};
use crate::core::{Task, TaskKey};
use crate::graph::Node;

/// What the driver should do after a page is absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PageOutcome {
    /// Fetch the next page.
    Continue,
    /// The call is closed.
    Done,
}

/// Response shape, locked in on the first successful page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Paginated,
    Single,
}

pub(crate) struct Paginator {
    behavior: CallBehavior,
    unforked_key: TaskKey,
    last_page_cap: u64,
    page: u64,
    shape: Option<Shape>,
    forked_key: u64,
    merged: Option<Value>,
    sentry_key: TaskKey,
}

impl Paginator {
    pub(crate) fn new(
        behavior: CallBehavior,
        unforked_key: TaskKey,
        page_range: (u64, u64),
    ) -> Self {
        Self {
            behavior,
            sentry_key: unforked_key.clone(),
            unforked_key,
            last_page_cap: page_range.1,
            page: page_range.0,
            shape: None,
            forked_key: 0,
            merged: None,
        }
    }

    /// The page the next fetch should request.
    pub(crate) fn page(&self) -> u64 {
        self.page
    }

    /// Registers the first sentry task, keyed by the unforked parent key.
    ///
    /// This must run synchronously at dispatch, before any I/O: the
    /// incomplete sentry is what keeps the call node unfinished while the
    /// call is in flight.
    pub(crate) fn register_first_sentry(&self, node: &Node) {
        node.add_task(Task::new(self.sentry_key.clone()));
    }

    /// Closes the call after a failed fetch. The sentry completes with a
    /// null result so downstream completion detection is not blocked.
    pub(crate) fn abort(&self, node: &Node) {
        node.complete_task(&self.sentry_key, Value::Null);
    }

    /// Absorbs one successful page, publishing its results on `node`.
    pub(crate) fn absorb(&mut self, node: &Node, envelope: Value) -> PageOutcome {
        let metadata = Metadata::from_envelope(&envelope);
        let shape = *self.shape.get_or_insert_with(|| {
            if envelope
                .pointer("/result/data")
                .is_some_and(Value::is_array)
            {
                Shape::Paginated
            } else {
                Shape::Single
            }
        });

        if shape == Shape::Single {
            let mut result = envelope.get("result").cloned().unwrap_or(Value::Null);
            attach_back_reference(&mut result, &envelope);
            node.complete_task(&self.sentry_key, result);
            return PageOutcome::Done;
        }

        let final_page = metadata
            .total_pages()
            .saturating_sub(1)
            .min(self.last_page_cap);
        let has_next = self.page < final_page;

        match self.behavior {
            CallBehavior::Fork => self.absorb_fork(node, &envelope, has_next),
            CallBehavior::Batch => self.absorb_batch(node, envelope, has_next),
        }

        if has_next {
            self.page += 1;
            PageOutcome::Continue
        } else {
            PageOutcome::Done
        }
    }

    fn absorb_fork(&mut self, node: &Node, envelope: &Value, has_next: bool) {
        // The next page's sentry must exist before this page's results
        // publish: the finished flag is monotonic, and between pages the
        // task map would otherwise be all-complete.
        let page_sentry = self.sentry_key.clone();
        if has_next {
            let next = TaskKey::page_sentry(self.page + 1, &self.unforked_key);
            node.add_task(Task::new(next.clone()));
            self.sentry_key = next;
        }

        let items = envelope
            .pointer("/result/data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let Some((closing_item, rest)) = items.split_last() else {
            // A paginated page with no items still closes through its
            // sentry.
            node.complete_task(&page_sentry, Value::Null);
            return;
        };

        for item in rest {
            let key = TaskKey::composite(self.forked_key, &self.unforked_key);
            self.forked_key += 1;
            let mut item = item.clone();
            attach_back_reference(&mut item, envelope);
            node.add_task(Task::new(key.clone()));
            node.complete_task(&key, item);
        }

        // The page's last item closes through the sentry, re-keyed past
        // every item published above.
        let closing_key = TaskKey::composite(self.forked_key, &self.unforked_key);
        self.forked_key += 1;
        node.rekey_task(&page_sentry, closing_key.clone());
        let mut closing_item = closing_item.clone();
        attach_back_reference(&mut closing_item, envelope);
        node.complete_task(&closing_key, closing_item);
    }

    fn absorb_batch(&mut self, node: &Node, envelope: Value, has_next: bool) {
        match self.merged.as_mut() {
            None => {
                let mut merged = envelope;
                // The merged body outlives any one page; its pagination
                // block no longer describes it.
                if let Some(metadata) = merged.get_mut("metadata").and_then(Value::as_object_mut) {
                    metadata.remove("pagination");
                }
                let metadata = merged.get("metadata").cloned();
                if let Some(Value::Object(result)) = merged.get_mut("result") {
                    let mut response = serde_json::Map::new();
                    if let Some(metadata) = metadata {
                        response.insert("metadata".to_string(), metadata);
                    }
                    result.insert("__response".to_string(), Value::Object(response));
                }
                self.merged = Some(merged);
            }
            Some(merged) => {
                let incoming = envelope
                    .pointer("/result/data")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                if let Some(data) = merged
                    .pointer_mut("/result/data")
                    .and_then(Value::as_array_mut)
                {
                    data.extend(incoming);
                }
            }
        }

        if !has_next {
            let result = self
                .merged
                .take()
                .and_then(|mut merged| merged.get_mut("result").map(Value::take))
                .unwrap_or(Value::Null);
            node.complete_task(&self.sentry_key, result);
        }
    }
}
