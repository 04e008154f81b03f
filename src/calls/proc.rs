//! Process- and thread-level entry points: clocks, randomness, signals,
//! futex forwarding, and worker thread lifecycle.

use std::mem::MaybeUninit;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::AtomicU32;

use log::error;
use rand::RngCore;

use super::host_int;
use crate::abi::ClockId;
use crate::abi::Errno;
use crate::abi::Scope;
use crate::abi::Signal;
use crate::abi::Tid;
use crate::abi::Timestamp;
use crate::process::Thread;
use crate::process::ThreadExit;
use crate::time::host_clockid;
use crate::time::timestamp_from_timespec;

/// A guest thread's entry point. It must terminate through
/// [`Thread::thread_exit`]; returning aborts the process.
pub type ThreadEntry = Box<dyn FnOnce(Thread, usize) + Send + 'static>;

impl Thread {
    /// Reports the resolution of a clock.
    pub fn clock_res_get(&self, clock_id: ClockId) -> Result<Timestamp, Errno> {
        let mut ts = MaybeUninit::<libc::timespec>::uninit();
        host_int(unsafe { libc::clock_getres(host_clockid(clock_id), ts.as_mut_ptr()) })?;
        Ok(timestamp_from_timespec(&unsafe { ts.assume_init() }))
    }

    /// Reads a clock. `precision` is advisory and currently unused.
    pub fn clock_time_get(
        &self,
        clock_id: ClockId,
        _precision: Timestamp,
    ) -> Result<Timestamp, Errno> {
        let mut ts = MaybeUninit::<libc::timespec>::uninit();
        host_int(unsafe { libc::clock_gettime(host_clockid(clock_id), ts.as_mut_ptr()) })?;
        Ok(timestamp_from_timespec(&unsafe { ts.assume_init() }))
    }

    /// Wakes threads waiting on a condition variable.
    pub fn condvar_signal(
        &self,
        condvar: &AtomicU32,
        scope: Scope,
        nwaiters: u32,
    ) -> Result<(), Errno> {
        self.shared.futex.condvar_signal(condvar, scope, nwaiters)
    }

    /// Releases a futex-backed lock held by this thread.
    pub fn lock_unlock(&self, lock: &AtomicU32, scope: Scope) -> Result<(), Errno> {
        self.shared.futex.lock_unlock(self.tid, lock, scope)
    }

    /// Terminates the emulated process with the given exit code.
    pub fn proc_exit(&self, rval: u32) -> ! {
        std::process::exit(rval as i32)
    }

    /// Delivers a signal to the emulated process itself.
    pub fn proc_raise(&self, sig: Signal) -> Result<(), Errno> {
        let nsig = match sig {
            Signal::Abrt => libc::SIGABRT,
            Signal::Alrm => libc::SIGALRM,
            Signal::Bus => libc::SIGBUS,
            Signal::Chld => libc::SIGCHLD,
            Signal::Cont => libc::SIGCONT,
            Signal::Fpe => libc::SIGFPE,
            Signal::Hup => libc::SIGHUP,
            Signal::Ill => libc::SIGILL,
            Signal::Int => libc::SIGINT,
            Signal::Kill => libc::SIGKILL,
            Signal::Pipe => libc::SIGPIPE,
            Signal::Quit => libc::SIGQUIT,
            Signal::Segv => libc::SIGSEGV,
            Signal::Stop => libc::SIGSTOP,
            Signal::Sys => libc::SIGSYS,
            Signal::Term => libc::SIGTERM,
            Signal::Trap => libc::SIGTRAP,
            Signal::Tstp => libc::SIGTSTP,
            Signal::Ttin => libc::SIGTTIN,
            Signal::Ttou => libc::SIGTTOU,
            Signal::Urg => libc::SIGURG,
            Signal::Usr1 => libc::SIGUSR1,
            Signal::Usr2 => libc::SIGUSR2,
            Signal::Vtalrm => libc::SIGVTALRM,
            Signal::Xcpu => libc::SIGXCPU,
            Signal::Xfsz => libc::SIGXFSZ,
        };
        host_int(unsafe { libc::raise(nsig) }).map(drop)
    }

    /// Fills a buffer with cryptographically secure random bytes.
    pub fn random_get(&self, buf: &mut [u8]) {
        rand::rng().fill_bytes(buf);
    }

    /// Spawns a detached worker thread sharing this thread's handle
    /// table. The worker installs its context, runs the bootstrap hook,
    /// and hands control to `entry`.
    pub fn thread_create(
        &self,
        entry: ThreadEntry,
        argument: usize,
        stack_size: usize,
    ) -> Result<Tid, Errno> {
        let tid = self.shared.tids.allocate();
        let thread = Thread {
            shared: Arc::clone(&self.shared),
            tid,
        };

        let mut builder = std::thread::Builder::new().name(format!("guest-{}", tid));
        if stack_size > 0 {
            builder = builder.stack_size(stack_size);
        }
        builder
            .spawn(move || {
                thread.shared.bootstrap.init(&thread);
                let result = panic::catch_unwind(AssertUnwindSafe(move || entry(thread, argument)));
                match result {
                    Ok(()) => {
                        // Entry points hand control back through
                        // thread_exit, never by returning.
                        error!("guest thread entry point returned");
                        std::process::abort();
                    }
                    Err(payload) if payload.downcast_ref::<ThreadExit>().is_some() => {}
                    Err(payload) => panic::resume_unwind(payload),
                }
            })
            .map_err(|err| Errno::from_host(err.raw_os_error().unwrap_or(libc::EAGAIN)))?;
        Ok(tid)
    }

    /// Terminates this worker thread, first releasing `lock` so a joiner
    /// can observe the exit.
    pub fn thread_exit(self, lock: &AtomicU32, scope: Scope) -> ! {
        let _ = self.shared.futex.lock_unlock(self.tid, lock, scope);
        panic::panic_any(ThreadExit)
    }

    /// Yields the processor to another runnable thread.
    pub fn thread_yield(&self) -> Result<(), Errno> {
        host_int(unsafe { libc::sched_yield() }).map(drop)
    }
}
