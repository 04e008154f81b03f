//! Contract for the user-space futex engine.
//!
//! The engine itself lives outside this crate; the emulator only forwards
//! to it. Lock and condition-variable words are 32-bit atomics in guest
//! memory.

use std::sync::atomic::AtomicU32;

use crate::abi::Errno;
use crate::abi::Event;
use crate::abi::Scope;
use crate::abi::Subscription;
use crate::abi::Tid;

/// The operations the emulator requires from a futex engine.
pub trait FutexEngine: Send + Sync {
    /// Wakes up to `nwaiters` threads waiting on a condition variable.
    fn condvar_signal(
        &self,
        condvar: &AtomicU32,
        scope: Scope,
        nwaiters: u32,
    ) -> Result<(), Errno>;

    /// Releases a lock owned by `tid`, waking a waiting thread if any.
    fn lock_unlock(&self, tid: Tid, lock: &AtomicU32, scope: Scope) -> Result<(), Errno>;

    /// Offers an event-wait subscription vector to the engine.
    ///
    /// Returns `true` iff every subscription was a futex kind and was
    /// fully processed, in which case `events` holds the results. On
    /// `false` the engine has done nothing and the caller handles the
    /// vector itself.
    fn poll(
        &self,
        tid: Tid,
        subscriptions: &[Subscription<'_>],
        events: &mut Vec<Event>,
    ) -> bool;
}

/// A futex engine for embedders whose guests never use futex-based
/// synchronization: every operation reports `ENOSYS` and no subscription
/// is ever claimed.
#[derive(Debug, Default)]
pub struct NullFutex;

impl FutexEngine for NullFutex {
    fn condvar_signal(
        &self,
        _condvar: &AtomicU32,
        _scope: Scope,
        _nwaiters: u32,
    ) -> Result<(), Errno> {
        Err(Errno::ENOSYS)
    }

    fn lock_unlock(&self, _tid: Tid, _lock: &AtomicU32, _scope: Scope) -> Result<(), Errno> {
        Err(Errno::ENOSYS)
    }

    fn poll(
        &self,
        _tid: Tid,
        _subscriptions: &[Subscription<'_>],
        _events: &mut Vec<Event>,
    ) -> bool {
        false
    }
}
