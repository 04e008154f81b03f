//! Emulation of a capability-oriented operating system ABI (CapABI) on
//! top of a conventional POSIX host.
//!
//! Guest programs name resources only by integer handles and by byte
//! strings interpreted relative to directory handles. Each entry point
//! translates a guest call into one or more host calls while enforcing
//! per-handle right sets, confinement to each directory handle's
//! subtree, and the ABI's concurrency and lifetime contracts.
//!
//! The embedder creates a [`Process`], seeds its handle table with
//! preopened host descriptors, and drives guest code through [`Thread`],
//! which carries the entire system call surface as methods:
//!
//! ```no_run
//! use capabi::{Fd, Process, NullFutex, SequentialTids};
//!
//! let process = Process::new(Box::new(NullFutex), Box::new(SequentialTids::new()));
//! process.table().insert_existing(Fd(0), 0); // stdin
//! let thread = process.initial_thread();
//! let mut buf = [0u8; 128];
//! let n = thread.file_readlink(Fd(3), b"some/link", &mut buf);
//! # let _ = n;
//! ```
//!
//! The futex engine, thread-id allocation, and guest thread-local
//! bootstrap are consumed through the [`FutexEngine`], [`TidPool`], and
//! [`TlsBootstrap`] contracts; this crate does not implement them.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod abi;
mod calls;
mod fd;
mod futex;
mod path;
mod poll;
mod process;
mod time;

pub use crate::abi::Errno;
pub use crate::abi::Event;
pub use crate::abi::Fd;
pub use crate::abi::Rights;
pub use crate::abi::Subscription;
pub use crate::abi::Tid;
pub use crate::calls::proc::ThreadEntry;
pub use crate::calls::sock::SockRecvOut;
pub use crate::fd::table::FdTable;
pub use crate::futex::FutexEngine;
pub use crate::futex::NullFutex;
pub use crate::process::NoBootstrap;
pub use crate::process::Process;
pub use crate::process::SequentialTids;
pub use crate::process::Thread;
pub use crate::process::TidPool;
pub use crate::process::TlsBootstrap;
