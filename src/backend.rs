//! Collaborator traits the router calls out to, but never implements itself —
//! the protocol, backend-connect and I/O-scheduling layers are explicitly out
//! of scope (spec §1, §6).
//!
//! Grounded on the teacher's own split between `pool` (orchestration) and
//! `server::Server`/`app::startup` (actually talking to Postgres): this crate
//! keeps the orchestration and abstracts the rest behind traits instead of
//! depending on `tokio_postgres`/TLS/auth directly.

use crate::errors::Error;
use crate::rule::StorageHandle;
use crate::types::{IoHandle, ServerId, ServerKey};

/// Opens and closes real backend connections. The router calls this during
/// `attach` (to allocate) and `close`/`expire`/`gc` (to tear down); it never
/// speaks the wire protocol itself (spec §1 Out of scope, §4.6).
pub trait BackendDriver: Send + Sync {
    /// Open a new connection to `storage` and hand back the key the backend
    /// reports, plus the worker-attachable I/O handle for that connection, if
    /// any (spec §4.6 `attach`). The I/O handle is what
    /// `IoScheduler::attach`/`detach` later migrate across workers; a driver
    /// with nothing worker-attachable (e.g. a test double) may return `None`.
    fn connect(&self, storage: &StorageHandle) -> Result<(ServerKey, Option<IoHandle>), Error>;

    /// Send a cancellation request for `key` over a fresh, short-lived
    /// connection to `storage` (spec §4.6 `cancel`). Does not touch the
    /// router's own state.
    fn connect_cancel(&self, storage: &StorageHandle, key: ServerKey) -> Result<(), Error>;

    /// Tear down the connection identified by `id`/`key` (spec §4.6 `close`).
    fn close_connection(&self, id: &ServerId, key: ServerKey) -> Result<(), Error>;
}

/// Mints identifiers for newly allocated servers. A separate trait from
/// `BackendDriver` because id generation (a counter, a UUID source) has
/// nothing to do with how a connection is actually opened.
pub trait IdGenerator: Send + Sync {
    fn next_server_id(&self) -> ServerId;
}

/// Multi-worker I/O-handle reassignment (spec §1 "single-worker vs
/// multi-worker", §6). In single-worker mode there is nothing to do and
/// implementations may make both methods no-ops.
pub trait IoScheduler: Send + Sync {
    /// Attach `io` to whichever worker should now own it (spec §4.6 `attach`).
    fn attach(&self, io: &IoHandle);

    /// Detach `io` from its current worker (spec §4.6 `detach`).
    fn detach(&self, io: &IoHandle);
}

#[cfg(test)]
pub mod support {
    //! In-memory mocks for the three collaborator traits, grounded on the
    //! teacher's `Mock*` test doubles in `auth/tests.rs`. Shared by every
    //! module's test suite that needs a `Router`.

    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    #[derive(Default)]
    pub struct MockBackend {
        pub fail_connect: std::sync::atomic::AtomicBool,
        next_key: AtomicU64,
    }

    impl BackendDriver for MockBackend {
        fn connect(&self, _storage: &StorageHandle) -> Result<(ServerKey, Option<IoHandle>), Error> {
            if self.fail_connect.load(Ordering::Relaxed) {
                return Err(Error::ServerAllocation("mock connect failure".into()));
            }
            let key = self.next_key.fetch_add(1, Ordering::Relaxed) as i64;
            let io = IoHandle(std::sync::Arc::from(format!("mock-io-{key}").as_str()));
            Ok((ServerKey(key), Some(io)))
        }

        fn connect_cancel(&self, _storage: &StorageHandle, _key: ServerKey) -> Result<(), Error> {
            Ok(())
        }

        fn close_connection(&self, _id: &ServerId, _key: ServerKey) -> Result<(), Error> {
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct MockIdGenerator {
        next: AtomicU64,
    }

    impl IdGenerator for MockIdGenerator {
        fn next_server_id(&self) -> ServerId {
            let n = self.next.fetch_add(1, Ordering::Relaxed);
            ServerId(std::sync::Arc::from(format!("mock-srv-{n}").as_str()))
        }
    }

    /// Counts calls rather than no-opping so tests can confirm the
    /// multi-worker attach/detach path in `Router::attach`/`detach`/`close`
    /// actually fires instead of silently never running.
    #[derive(Default)]
    pub struct MockIoScheduler {
        pub attach_count: AtomicU64,
        pub detach_count: AtomicU64,
    }

    impl IoScheduler for MockIoScheduler {
        fn attach(&self, _io: &IoHandle) {
            self.attach_count.fetch_add(1, Ordering::Relaxed);
        }
        fn detach(&self, _io: &IoHandle) {
            self.detach_count.fetch_add(1, Ordering::Relaxed);
        }
    }
}
