//! # Taskflow
//!
//! A fluent task-propagation graph for composing chained, asynchronous
//! operations over keyed data, ending in paginated calls against a
//! versioned JSON data-exchange protocol.
//!
//! - **Keyed task graph**: map/filter/key/reduce/fork/join stages exchange
//!   results through publish/subscribe hooks, with exact replay for late
//!   subscribers.
//! - **Completion detection**: finish hooks fire once, after every ancestor
//!   and every locally held task completes, across arbitrary fan-out and
//!   fan-in topologies.
//! - **Paginated calls**: the terminal stage pages through results in
//!   order, fans out or merges pages, polls server-side asynchronous jobs,
//!   and injects the connection's access token.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use serde_json::json;
//! use taskflow::prelude::*;
//!
//! let traits = root()
//!     .server(ServerConfig::new("https://example.org/api"))
//!     .data(vec![json!({"traitDbId": "t1"}), json!({"traitDbId": "t2"})])
//!     .call(CallBehavior::Fork, HttpMethod::Get, |datum, _key| {
//!         CallDescriptor::new("/traits").with_param("traitDbId", datum["traitDbId"].clone())
//!     }, true);
//!
//! let results = traits.collect().await?;
//! ```
//!
//! The graph is cooperative and single-threaded by design: all hook
//! dispatch and completion bookkeeping is synchronous, and concurrency
//! only arises from overlapping in-flight calls. Run it on tokio's
//! current-thread flavor.

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod call;
pub mod connection;
pub mod core;
pub mod errors;
pub mod graph;
pub mod testing;
pub mod transport;
pub mod version;


/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::call::{CallBehavior, CallDescriptor};
    pub use crate::connection::{ConnectionState, ServerConfig};
    pub use crate::core::{Task, TaskKey};
    pub use crate::errors::TaskflowError;
    pub use crate::graph::{root, Node, NodeKind};
    pub use crate::transport::{HttpMethod, HttpRequest, HttpTransport, Transport};
    pub use crate::version::{Operation, OperationRegistry, ProtocolVersion};
}
