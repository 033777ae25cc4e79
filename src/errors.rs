//! Errors and operation-outcome codes for the router core.
//!
//! Split in two, mirroring the teacher's own split between `pool::errors` (operational,
//! `Display`-only errors returned from a hot path) and the aggregate `thiserror::Error`
//! enum in `errors.rs`: [`Status`] is the *expected* outcome vocabulary of router
//! operations (admission decisions, not-found); [`Error`] models failures that are
//! exceptional.

use thiserror::Error;

/// Outcome of a router operation, per spec §6.
///
/// Deliberately not `std::error::Error` — a `Status` is a normal return value, not an
/// exceptional condition. Operations that can fail for reasons other than a routing
/// decision (storage allocation, backend connect) return `Result<_, Error>` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
    ErrorNotFound,
    ErrorLimit,
    ErrorLimitRoute,
}

impl Status {
    pub fn is_ok(self) -> bool {
        matches!(self, Status::Ok)
    }
}

/// Exceptional failures surfaced by the router core.
#[derive(Debug, Error)]
pub enum Error {
    #[error("backend driver failed to allocate a new server connection: {0}")]
    ServerAllocation(String),

    #[error("failed to copy the storage handle for an in-flight cancel")]
    StorageCopy,

    #[error("backend driver failed to close connection for server {0}")]
    BackendClose(String),
}
