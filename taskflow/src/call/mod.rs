//! The terminal remote-call stage: descriptors, the response envelope
//! protocol, the pagination state machine, and the call node itself.

mod descriptor;
mod node;
mod paginator;
mod protocol;
mod request;

pub use descriptor::{CallBehavior, CallDescriptor};
pub use protocol::{AsynchStatus, Metadata, Pagination, JOB_FINISHED};
pub use request::format_query;
