//! Protocol versioning and the version-gated operation registry.
//!
//! Operations registered here carry the protocol versions that introduced,
//! deprecated, and removed them. [`crate::graph::Node::invoke`] compares the
//! connection's active version against these bounds and logs a warning when
//! the operation falls outside them, then delegates to the call node either
//! way — the gate warns, it does not block.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::call::{CallBehavior, CallDescriptor};
use crate::core::TaskKey;
use crate::transport::HttpMethod;

/// A `major.minor` protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolVersion {
    major: u16,
    minor: u16,
}

impl ProtocolVersion {
    /// Creates a version from its parts.
    #[must_use]
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Parses `"1.2"` or `"v1.2"`; a bare `"2"` reads as `2.0`.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim().trim_start_matches(['v', 'V']);
        let mut parts = text.splitn(2, '.');
        let major = parts.next()?.parse().ok()?;
        let minor = match parts.next() {
            Some(minor) => minor.parse().ok()?,
            None => 0,
        };
        Some(Self { major, minor })
    }

    /// Whether this version is strictly older than `other`.
    #[must_use]
    pub fn predates(self, other: Self) -> bool {
        self < other
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::new(1, 2)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Descriptor closure shared by a registered operation.
pub type DescriptorFn = Arc<dyn Fn(&Value, &TaskKey) -> CallDescriptor + Send + Sync>;

/// Why an operation is gated at a given protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionGate {
    /// The active version predates the operation's introduction.
    Unintroduced {
        /// Version that introduces the operation.
        introduced: ProtocolVersion,
    },
    /// The active version is at or past the operation's deprecation.
    Deprecated {
        /// Version that deprecated the operation.
        deprecated: ProtocolVersion,
    },
    /// The active version is past the operation's removal.
    Removed {
        /// Version that removed the operation.
        removed: ProtocolVersion,
    },
}

/// A protocol operation: its call shape plus version bounds.
#[derive(Clone)]
pub struct Operation {
    name: String,
    method: HttpMethod,
    behavior: CallBehavior,
    multicall: bool,
    descriptor: DescriptorFn,
    introduced: Option<ProtocolVersion>,
    deprecated: Option<ProtocolVersion>,
    removed: Option<ProtocolVersion>,
}

impl Operation {
    /// Creates an operation with no version bounds, attached to the
    /// parent's finish (batch dispatch).
    pub fn new<F>(
        name: impl Into<String>,
        method: HttpMethod,
        behavior: CallBehavior,
        descriptor: F,
    ) -> Self
    where
        F: Fn(&Value, &TaskKey) -> CallDescriptor + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            method,
            behavior,
            multicall: false,
            descriptor: Arc::new(descriptor),
            introduced: None,
            deprecated: None,
            removed: None,
        }
    }

    /// Dispatches one call per parent item instead of one per finish.
    #[must_use]
    pub fn with_multicall(mut self, multicall: bool) -> Self {
        self.multicall = multicall;
        self
    }

    /// Sets the version that introduced the operation.
    #[must_use]
    pub fn with_introduced(mut self, version: ProtocolVersion) -> Self {
        self.introduced = Some(version);
        self
    }

    /// Sets the version that deprecated the operation.
    #[must_use]
    pub fn with_deprecated(mut self, version: ProtocolVersion) -> Self {
        self.deprecated = Some(version);
        self
    }

    /// Sets the version that removed the operation.
    #[must_use]
    pub fn with_removed(mut self, version: ProtocolVersion) -> Self {
        self.removed = Some(version);
        self
    }

    /// The operation name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The HTTP method calls use by default.
    #[must_use]
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// How results fan out.
    #[must_use]
    pub fn behavior(&self) -> CallBehavior {
        self.behavior
    }

    /// Whether the operation dispatches per parent item.
    #[must_use]
    pub fn is_multicall(&self) -> bool {
        self.multicall
    }

    /// The descriptor closure.
    #[must_use]
    pub fn descriptor(&self) -> DescriptorFn {
        Arc::clone(&self.descriptor)
    }

    /// Evaluates the version gate for an active protocol version.
    ///
    /// At most one bound fires, checked in introduction/deprecation/removal
    /// order.
    #[must_use]
    pub fn gate(&self, active: ProtocolVersion) -> Option<VersionGate> {
        if let Some(introduced) = self.introduced {
            if active.predates(introduced) {
                return Some(VersionGate::Unintroduced { introduced });
            }
        }
        if let Some(deprecated) = self.deprecated {
            if !active.predates(deprecated) {
                return Some(VersionGate::Deprecated { deprecated });
            }
        }
        if let Some(removed) = self.removed {
            if removed.predates(active) {
                return Some(VersionGate::Removed { removed });
            }
        }
        None
    }

    /// Logs the gate outcome for an active version, if any bound fires.
    pub(crate) fn warn_if_gated(&self, active: ProtocolVersion) {
        match self.gate(active) {
            Some(VersionGate::Unintroduced { introduced }) => {
                tracing::warn!(
                    operation = %self.name,
                    active = %active,
                    introduced = %introduced,
                    "operation is unintroduced before {introduced}"
                );
            }
            Some(VersionGate::Deprecated { deprecated }) => {
                tracing::warn!(
                    operation = %self.name,
                    active = %active,
                    deprecated = %deprecated,
                    "operation is deprecated since {deprecated}"
                );
            }
            Some(VersionGate::Removed { removed }) => {
                tracing::warn!(
                    operation = %self.name,
                    active = %active,
                    removed = %removed,
                    "operation was removed in {removed}"
                );
            }
            None => {}
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("behavior", &self.behavior)
            .field("multicall", &self.multicall)
            .field("introduced", &self.introduced)
            .field("deprecated", &self.deprecated)
            .field("removed", &self.removed)
            .finish_non_exhaustive()
    }
}

/// Static registry mapping operation names to their call shape and version
/// bounds.
#[derive(Debug, Clone, Default)]
pub struct OperationRegistry {
    operations: HashMap<String, Operation>,
}

impl OperationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an operation under its name, replacing any previous entry.
    pub fn register(&mut self, operation: Operation) {
        self.operations
            .insert(operation.name().to_string(), operation);
    }

    /// Looks up an operation by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.operations.get(name)
    }

    /// Number of registered operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operation() -> Operation {
        Operation::new("traits", HttpMethod::Get, CallBehavior::Fork, |_, _| {
            CallDescriptor::new("/traits")
        })
    }

    #[test]
    fn test_parse_accepts_v_prefix_and_bare_major() {
        assert_eq!(ProtocolVersion::parse("1.2"), Some(ProtocolVersion::new(1, 2)));
        assert_eq!(ProtocolVersion::parse("v1.3"), Some(ProtocolVersion::new(1, 3)));
        assert_eq!(ProtocolVersion::parse("2"), Some(ProtocolVersion::new(2, 0)));
        assert_eq!(ProtocolVersion::parse("nonsense"), None);
    }

    #[test]
    fn test_predates_orders_major_then_minor() {
        assert!(ProtocolVersion::new(1, 2).predates(ProtocolVersion::new(1, 3)));
        assert!(ProtocolVersion::new(1, 9).predates(ProtocolVersion::new(2, 0)));
        assert!(!ProtocolVersion::new(2, 0).predates(ProtocolVersion::new(1, 9)));
        assert!(!ProtocolVersion::new(1, 2).predates(ProtocolVersion::new(1, 2)));
    }

    #[test]
    fn test_display_renders_major_dot_minor() {
        assert_eq!(ProtocolVersion::new(1, 3).to_string(), "1.3");
    }

    #[test]
    fn test_gate_unintroduced() {
        let op = operation().with_introduced(ProtocolVersion::new(2, 0));
        assert_eq!(
            op.gate(ProtocolVersion::new(1, 2)),
            Some(VersionGate::Unintroduced {
                introduced: ProtocolVersion::new(2, 0)
            })
        );
        assert_eq!(op.gate(ProtocolVersion::new(2, 0)), None);
    }

    #[test]
    fn test_gate_deprecated_at_or_past_bound() {
        let op = operation().with_deprecated(ProtocolVersion::new(1, 3));
        assert_eq!(op.gate(ProtocolVersion::new(1, 2)), None);
        assert_eq!(
            op.gate(ProtocolVersion::new(1, 3)),
            Some(VersionGate::Deprecated {
                deprecated: ProtocolVersion::new(1, 3)
            })
        );
    }

    #[test]
    fn test_gate_removed_strictly_past_bound() {
        let op = operation().with_removed(ProtocolVersion::new(2, 0));
        assert_eq!(op.gate(ProtocolVersion::new(2, 0)), None);
        assert_eq!(
            op.gate(ProtocolVersion::new(2, 1)),
            Some(VersionGate::Removed {
                removed: ProtocolVersion::new(2, 0)
            })
        );
    }

    #[test]
    fn test_gate_checks_introduction_first() {
        let op = operation()
            .with_introduced(ProtocolVersion::new(1, 3))
            .with_deprecated(ProtocolVersion::new(1, 0));
        // Unintroduced wins even though the deprecation bound also matches.
        assert!(matches!(
            op.gate(ProtocolVersion::new(1, 2)),
            Some(VersionGate::Unintroduced { .. })
        ));
    }

    #[test]
    fn test_registry_round_trip() {
        let mut registry = OperationRegistry::new();
        assert!(registry.is_empty());

        registry.register(operation());
        assert_eq!(registry.len(), 1);
        assert!(registry.get("traits").is_some());
        assert!(registry.get("markers").is_none());
    }
}
