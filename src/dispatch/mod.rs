//! Pull-based task dispatch
//!
//! This module implements the dispatch protocol between one coordinator and
//! a fixed set of workers.
//!
//! # Architecture
//!
//! - **Coordinator**: owns the task counter, answers work requests in
//!   arrival order, and stops every worker exactly once
//! - **Worker service**: requests, executes, and implicitly acknowledges
//!   tasks by requesting the next one
//! - **Protocol**: message definitions, framing, and stream helpers
//!
//! # Modules
//!
//! - `protocol`: message definitions and serialization
//! - `coordinator`: dispatch loop and connection pumps
//! - `worker`: worker service and request/execute loop

pub mod coordinator;
pub mod protocol;
pub mod worker;

// Re-export key types
pub use coordinator::{dispatch_loop, Coordinator, DispatchReport, WorkRequest};
pub use protocol::{
    deserialize_message, read_message, serialize_message, write_message, GetMessage, Message,
    TaskMessage, MAX_MESSAGE_SIZE, PROTOCOL_VERSION,
};
pub use worker::{work_loop, WorkerService};
