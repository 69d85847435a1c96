//! Registry daemon: single-writer ledger task + Unix socket server.

mod error;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use protocol::{
    request_apply, request_compact, request_events, request_query, request_status, request_stop,
    send_request, subscribe, DaemonRequest, DaemonResponse, Subscription,
};
pub use runtime::{run, start_blocking, SharedRegistry};
