//! Small value types shared across the router core.
//!
//! Mirrors the role of the teacher's `pool::types` module (a home for the plain
//! data shapes the pool and its callers pass around) without sharing its content —
//! this crate's pool shape is a router/route/rule triple, not a bb8-style object pool.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

/// Identifies a client as assigned by the protocol layer; stable for the life of
/// the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u64);

/// The client's wire cancellation key (PostgreSQL process id + secret folded into
/// one opaque value by the protocol layer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientKey(pub i64);

/// Identifies a server object. Generated by the injected [`crate::backend::IdGenerator`]
/// when a server is allocated, never reused afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerId(pub Arc<str>);

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The server's own wire key, handed to the client as the `BackendKeyData` and
/// later matched against during `cancel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerKey(pub i64);

/// `(database, user)` pulled from the client's startup packet by the (out-of-scope)
/// protocol layer. Kept as raw bytes rather than `String` because the wire values are
/// not guaranteed UTF-8 until the startup handshake validates them, and `RouteId`
/// equality must be a byte-exact comparison (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Startup {
    pub database: Bytes,
    pub user: Bytes,
}

impl Startup {
    pub fn new(database: impl Into<Bytes>, user: impl Into<Bytes>) -> Self {
        Startup {
            database: database.into(),
            user: user.into(),
        }
    }
}

/// `{database, user}` identifying a route. Two ids are equal iff both byte strings
/// match exactly (spec §3). May differ from the client's own `Startup` when the
/// matched rule carries `storage_db`/`storage_user` overrides.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteId {
    pub database: Bytes,
    pub user: Bytes,
}

impl RouteId {
    pub fn from_startup(startup: &Startup) -> Self {
        RouteId {
            database: startup.database.clone(),
            user: startup.user.clone(),
        }
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}",
            String::from_utf8_lossy(&self.user),
            String::from_utf8_lossy(&self.database)
        )
    }
}

/// Opaque worker-attachable I/O resource. The router never reads or writes through
/// it; it only hands it to the injected [`crate::backend::IoScheduler`] so the
/// worker loop that owns the real socket can be switched when a server crosses
/// from one worker to another in multi-worker mode.
#[derive(Debug, Clone)]
pub struct IoHandle(pub Arc<str>);

/// Opaque per-object handle carried for the caller's own bookkeeping (e.g. a
/// connection-task identifier). The router stores and forwards it but never
/// inspects it.
pub type GlobalHandle = Arc<dyn Any + Send + Sync>;
