//! The emulated process and its threads.
//!
//! A [`Process`] bundles the handle table with the external collaborators
//! the emulator consumes by contract. A [`Thread`] is the per-thread view
//! of it: the shared state plus the thread's identifier. All system call
//! entry points are methods on [`Thread`], so the ambient state the
//! original ABI keeps in thread-locals is threaded through explicitly.

use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use crate::abi::Tid;
use crate::fd::table::FdTable;
use crate::futex::FutexEngine;

/// Allocator for thread identifiers. Provided by the embedder; identifiers
/// must be unique for the lifetime of the process.
pub trait TidPool: Send + Sync {
    /// Hands out the next thread identifier.
    fn allocate(&self) -> Tid;
}

/// A simple counter-backed [`TidPool`].
#[derive(Debug)]
pub struct SequentialTids(AtomicU32);

impl SequentialTids {
    /// Creates a pool that hands out 1, 2, 3, …
    pub fn new() -> SequentialTids {
        SequentialTids(AtomicU32::new(1))
    }
}

impl Default for SequentialTids {
    fn default() -> SequentialTids {
        SequentialTids::new()
    }
}

impl TidPool for SequentialTids {
    fn allocate(&self) -> Tid {
        Tid(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// Per-thread setup performed in a newly spawned worker before the guest
/// entry point runs, typically binding guest thread-local storage.
pub trait TlsBootstrap: Send + Sync {
    /// Called on the new thread, after its context is installed and
    /// before guest code runs.
    fn init(&self, thread: &Thread);
}

/// A [`TlsBootstrap`] that does nothing.
#[derive(Debug, Default)]
pub struct NoBootstrap;

impl TlsBootstrap for NoBootstrap {
    fn init(&self, _thread: &Thread) {}
}

pub(crate) struct Shared {
    pub(crate) table: FdTable,
    pub(crate) futex: Box<dyn FutexEngine>,
    pub(crate) tids: Box<dyn TidPool>,
    pub(crate) bootstrap: Box<dyn TlsBootstrap>,
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared").field("table", &self.table).finish_non_exhaustive()
    }
}

/// One emulated process: a handle table shared by all of its threads,
/// plus the external collaborators.
#[derive(Debug, Clone)]
pub struct Process {
    shared: Arc<Shared>,
}

impl Process {
    /// Creates a process with no thread-local bootstrap hook.
    pub fn new(futex: Box<dyn FutexEngine>, tids: Box<dyn TidPool>) -> Process {
        Process::with_bootstrap(futex, tids, Box::new(NoBootstrap))
    }

    /// Creates a process with a bootstrap hook that runs on every newly
    /// spawned thread.
    pub fn with_bootstrap(
        futex: Box<dyn FutexEngine>,
        tids: Box<dyn TidPool>,
        bootstrap: Box<dyn TlsBootstrap>,
    ) -> Process {
        Process {
            shared: Arc::new(Shared {
                table: FdTable::new(),
                futex,
                tids,
                bootstrap,
            }),
        }
    }

    /// The process's handle table, for seeding stdio and preopened
    /// directories before guest code runs.
    pub fn table(&self) -> &FdTable {
        &self.shared.table
    }

    /// Creates the context for the process's first thread.
    pub fn initial_thread(&self) -> Thread {
        Thread {
            tid: self.shared.tids.allocate(),
            shared: Arc::clone(&self.shared),
        }
    }
}

/// The system call surface, bound to one thread of one emulated process.
#[derive(Debug)]
pub struct Thread {
    pub(crate) shared: Arc<Shared>,
    pub(crate) tid: Tid,
}

impl Thread {
    /// This thread's identifier.
    pub fn tid(&self) -> Tid {
        self.tid
    }

    pub(crate) fn table(&self) -> &FdTable {
        &self.shared.table
    }
}

/// Unwind payload used by `thread_exit` to terminate a worker without
/// taking the whole process down.
pub(crate) struct ThreadExit;
