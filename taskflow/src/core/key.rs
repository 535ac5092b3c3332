//! Task keys and their ordering.

use std::fmt;

/// Identifier for a task within a node's task map.
///
/// Keys render to strings, and their ordering is the rendered string's
/// ordering. Finish hooks deliver results sorted this way, so `"10"` sorts
/// before `"2"` even when every key in play is numeric. Downstream reduce
/// and fork stages depend on that delivery order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskKey(String);

impl TaskKey {
    /// Key for the `n`th item of an index-keyed sequence.
    #[must_use]
    pub fn index(n: u64) -> Self {
        Self(n.to_string())
    }

    /// Key from arbitrary text, for user-defined key namespaces.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Composite key pairing a forked child ordinal with the unforked
    /// parent key. The pairing is what keeps forked keys globally unique
    /// when several parent items fork concurrently.
    #[must_use]
    pub fn composite(child: u64, parent: &TaskKey) -> Self {
        Self(format!("{child}.{}", parent.0))
    }

    /// Placeholder key for a page's in-flight sentry task. The first page
    /// of a call uses the bare parent key instead; later pages need a
    /// distinct placeholder until the sentry is re-keyed.
    #[must_use]
    pub(crate) fn page_sentry(page: u64, parent: &TaskKey) -> Self {
        Self(format!("SENTRY{page}.{}", parent.0))
    }

    /// The rendered form of this key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskKey {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

impl From<String> for TaskKey {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl From<u64> for TaskKey {
    fn from(n: u64) -> Self {
        Self::index(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_key_renders_decimal() {
        assert_eq!(TaskKey::index(0).as_str(), "0");
        assert_eq!(TaskKey::index(42).as_str(), "42");
    }

    #[test]
    fn test_composite_key_pairs_child_and_parent() {
        let parent = TaskKey::index(3);
        let key = TaskKey::composite(7, &parent);
        assert_eq!(key.as_str(), "7.3");
    }

    #[test]
    fn test_ordering_is_string_style_not_numeric() {
        // "10" < "2" lexicographically; numeric ordering would disagree.
        assert!(TaskKey::index(10) < TaskKey::index(2));
        assert!(TaskKey::index(1) < TaskKey::index(10));
    }

    #[test]
    fn test_composite_keys_do_not_collide() {
        // 1 paired with "23" must differ from 12 paired with "3".
        let a = TaskKey::composite(1, &TaskKey::text("23"));
        let b = TaskKey::composite(12, &TaskKey::text("3"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_page_sentry_key_is_page_scoped() {
        let parent = TaskKey::index(0);
        assert_ne!(
            TaskKey::page_sentry(1, &parent),
            TaskKey::page_sentry(2, &parent)
        );
    }
}
