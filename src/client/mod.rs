//! Client runtime for the gossip directory service.
//!
//! [`GossipClient`] is a cheap-to-clone handle around one session. The
//! session owns the transport, the lifecycle state machine, the request
//! correlator, the local roster and the cached directory of remote games.
//! The frame reader and the timers hold weak references, so dropping every
//! handle tears the session down.

use std::sync::{Mutex, MutexGuard, PoisonError};

mod connection;
mod messaging;
mod reconcile;
mod runtime;

pub(crate) use connection::TeardownReason;
pub(crate) use reconcile::{Delta, apply_delta};
pub(crate) use runtime::ClientInner;
pub use runtime::GossipClient;

/// Lock a session mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
