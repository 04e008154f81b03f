//! Subscriptions accepted by the event-wait entry point and the events it
//! produces.

use std::sync::atomic::AtomicU32;

use super::errno::Errno;
use super::flags::ClockFlags;
use super::types::ClockId;
use super::types::Fd;
use super::types::Scope;
use super::types::Timestamp;

/// One condition a caller wants to wait for.
#[derive(Debug, Clone, Copy)]
pub struct Subscription<'a> {
    /// Opaque value echoed in the resulting event.
    pub userdata: u64,
    /// The condition itself.
    pub kind: SubscriptionKind<'a>,
}

/// The condition payload of a [`Subscription`].
#[derive(Debug, Clone, Copy)]
pub enum SubscriptionKind<'a> {
    /// A point in time or duration on one of the ABI clocks.
    Clock {
        /// The clock the timeout is measured on.
        clock_id: ClockId,
        /// Deadline or duration in nanoseconds, depending on `flags`.
        timeout: Timestamp,
        /// Requested wakeup precision. Advisory only.
        precision: Timestamp,
        /// Absolute/relative selection.
        flags: ClockFlags,
    },
    /// The handle has data available for reading.
    FdRead {
        /// The handle to watch.
        fd: Fd,
    },
    /// The handle accepts writes without blocking.
    FdWrite {
        /// The handle to watch.
        fd: Fd,
    },
    /// A read lock on a futex-backed lock was acquired.
    LockRdlock {
        /// The lock word.
        lock: &'a AtomicU32,
        /// Sharing scope of the lock word.
        scope: Scope,
    },
    /// A write lock on a futex-backed lock was acquired.
    LockWrlock {
        /// The lock word.
        lock: &'a AtomicU32,
        /// Sharing scope of the lock word.
        scope: Scope,
    },
    /// A condition variable was signalled and the paired lock reacquired.
    Condvar {
        /// The condition variable word.
        condvar: &'a AtomicU32,
        /// The lock word released while waiting.
        lock: &'a AtomicU32,
        /// Sharing scope of the condition variable.
        condvar_scope: Scope,
        /// Sharing scope of the lock.
        lock_scope: Scope,
    },
}

impl SubscriptionKind<'_> {
    /// The event type a subscription of this kind produces.
    pub fn event_type(&self) -> EventType {
        match self {
            SubscriptionKind::Clock { .. } => EventType::Clock,
            SubscriptionKind::FdRead { .. } => EventType::FdRead,
            SubscriptionKind::FdWrite { .. } => EventType::FdWrite,
            SubscriptionKind::LockRdlock { .. } => EventType::LockRdlock,
            SubscriptionKind::LockWrlock { .. } => EventType::LockWrlock,
            SubscriptionKind::Condvar { .. } => EventType::Condvar,
        }
    }
}

/// Discriminates event records; echoes the subscription that produced the
/// event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum EventType {
    Clock = 1,
    Condvar = 2,
    FdRead = 3,
    FdWrite = 4,
    LockRdlock = 5,
    LockWrlock = 6,
}

/// Payload of an fd-read/fd-write event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FdEvent {
    /// Bytes available for reading, or zero for write events.
    pub nbytes: u64,
    /// The peer hung up.
    pub hangup: bool,
}

/// One observed condition, produced in response to a [`Subscription`].
#[derive(Debug, Clone, Copy)]
pub struct Event {
    /// The `userdata` of the subscription that produced this event.
    pub userdata: u64,
    /// The type of the subscription that produced this event.
    pub typ: EventType,
    /// Set if the subscription failed rather than fired.
    pub error: Option<Errno>,
    /// Byte count and hangup state for fd events.
    pub fd_readwrite: FdEvent,
}

impl Event {
    /// An event reporting that the subscribed condition occurred.
    pub fn fired(userdata: u64, typ: EventType) -> Event {
        Event {
            userdata,
            typ,
            error: None,
            fd_readwrite: FdEvent::default(),
        }
    }

    /// An event reporting a per-subscription failure.
    pub fn failed(userdata: u64, typ: EventType, error: Errno) -> Event {
        Event {
            userdata,
            typ,
            error: Some(error),
            fd_readwrite: FdEvent::default(),
        }
    }

    /// A readiness event for an fd subscription.
    pub fn fd_ready(userdata: u64, typ: EventType, nbytes: u64, hangup: bool) -> Event {
        Event {
            userdata,
            typ,
            error: None,
            fd_readwrite: FdEvent { nbytes, hangup },
        }
    }
}
