//! Keyed units of eventual data.

use serde_json::Value;

use super::TaskKey;

/// A single keyed unit of eventual data with its completion state.
///
/// Created incomplete by the producing node and completed exactly once;
/// subscribers read the result any number of times afterwards. Join tasks
/// accumulate one partial result per parent ordinal instead of a single
/// value.
#[derive(Debug, Clone)]
pub struct Task {
    key: TaskKey,
    body: TaskBody,
}

#[derive(Debug, Clone)]
enum TaskBody {
    /// Produced by a single parent.
    Single(Option<Value>),
    /// Fan-in accumulator with one slot per parent ordinal.
    Join(Vec<Option<Value>>),
}

impl Task {
    /// Creates an incomplete single-result task.
    #[must_use]
    pub fn new(key: TaskKey) -> Self {
        Self {
            key,
            body: TaskBody::Single(None),
        }
    }

    /// Creates a join task with one empty slot per parent ordinal.
    #[must_use]
    pub fn new_join(key: TaskKey, arity: usize) -> Self {
        Self {
            key,
            body: TaskBody::Join(vec![None; arity]),
        }
    }

    /// The key this task is filed under.
    #[must_use]
    pub fn key(&self) -> &TaskKey {
        &self.key
    }

    pub(crate) fn set_key(&mut self, key: TaskKey) {
        self.key = key;
    }

    /// Whether the result (or every join slot) has been set.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        match &self.body {
            TaskBody::Single(result) => result.is_some(),
            TaskBody::Join(slots) => slots.iter().all(Option::is_some),
        }
    }

    /// Completes a single-result task. A join task ignores this; its
    /// completion is driven slot by slot.
    pub fn complete(&mut self, result: Value) {
        if let TaskBody::Single(slot) = &mut self.body {
            *slot = Some(result);
        }
    }

    /// Records a parent's partial result at its ordinal.
    pub fn record_slot(&mut self, ordinal: usize, value: Value) {
        if let TaskBody::Join(slots) = &mut self.body {
            if let Some(slot) = slots.get_mut(ordinal) {
                *slot = Some(value);
            }
        }
    }

    /// Force-fills an empty slot with the null sentinel, for parents that
    /// finished without emitting this task's key. Occupied slots are left
    /// alone.
    pub fn fill_missing_slot(&mut self, ordinal: usize) {
        if let TaskBody::Join(slots) = &mut self.body {
            if let Some(slot @ None) = slots.get_mut(ordinal) {
                *slot = Some(Value::Null);
            }
        }
    }

    /// The completed result: the stored value for single tasks, the slot
    /// array in parent-ordinal order for join tasks. `None` until complete.
    #[must_use]
    pub fn result(&self) -> Option<Value> {
        match &self.body {
            TaskBody::Single(result) => result.clone(),
            TaskBody::Join(slots) => {
                if slots.iter().all(Option::is_some) {
                    Some(Value::Array(
                        slots.iter().map(|s| s.clone().unwrap_or(Value::Null)).collect(),
                    ))
                } else {
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_task_completes_once() {
        let mut task = Task::new(TaskKey::index(0));
        assert!(!task.is_complete());
        assert_eq!(task.result(), None);

        task.complete(json!({"id": 1}));
        assert!(task.is_complete());
        assert_eq!(task.result(), Some(json!({"id": 1})));
    }

    #[test]
    fn test_single_task_can_complete_with_null() {
        let mut task = Task::new(TaskKey::index(0));
        task.complete(Value::Null);
        assert!(task.is_complete());
        assert_eq!(task.result(), Some(Value::Null));
    }

    #[test]
    fn test_join_task_completes_when_all_slots_fill() {
        let mut task = Task::new_join(TaskKey::index(1), 2);
        task.record_slot(0, json!("a"));
        assert!(!task.is_complete());

        task.record_slot(1, json!("b"));
        assert!(task.is_complete());
        assert_eq!(task.result(), Some(json!(["a", "b"])));
    }

    #[test]
    fn test_fill_missing_slot_uses_null_sentinel() {
        let mut task = Task::new_join(TaskKey::index(2), 2);
        task.record_slot(0, json!("only"));
        task.fill_missing_slot(1);
        assert!(task.is_complete());
        assert_eq!(task.result(), Some(json!(["only", null])));
    }

    #[test]
    fn test_fill_missing_slot_keeps_occupied_slots() {
        let mut task = Task::new_join(TaskKey::index(3), 2);
        task.record_slot(0, json!("kept"));
        task.fill_missing_slot(0);
        task.fill_missing_slot(1);
        assert_eq!(task.result(), Some(json!(["kept", null])));
    }
}
