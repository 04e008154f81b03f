//! The event-wait multiplexer.
//!
//! One entry point accepts a heterogeneous subscription vector and
//! produces a matching event vector. Futex subscriptions are offered to
//! the futex engine first; a lone clock subscription becomes a host
//! sleep; everything else is served by host poll with at most one
//! relative clock subscription acting as the timeout.

use std::sync::Arc;

use crate::abi::ClockFlags;
use crate::abi::ClockId;
use crate::abi::Errno;
use crate::abi::Event;
use crate::abi::EventType;
use crate::abi::Subscription;
use crate::abi::SubscriptionKind;
use crate::abi::Timestamp;
use crate::fd::object::FdObject;
use crate::process::Thread;
#[cfg(target_os = "linux")]
use crate::time::host_clockid;
use crate::time::timespec_from_timestamp;

impl Thread {
    /// Waits for the first of the subscribed conditions.
    ///
    /// `events` is cleared and refilled; it never ends up with more
    /// events than there were subscriptions. Per-subscription failures
    /// are reported inside the corresponding event, not as an error of
    /// the call itself.
    pub fn poll(
        &self,
        subscriptions: &[Subscription<'_>],
        events: &mut Vec<Event>,
    ) -> Result<(), Errno> {
        events.clear();

        // Futex-kind vectors are handled entirely by the futex engine.
        if self.shared.futex.poll(self.tid, subscriptions, events) {
            return Ok(());
        }

        // A single clock subscription is a sleep, not a poll.
        if let [sub] = subscriptions {
            if let SubscriptionKind::Clock {
                clock_id,
                timeout,
                flags,
                ..
            } = sub.kind
            {
                let mut event = Event::fired(sub.userdata, EventType::Clock);
                if let Err(err) = self.sleep(clock_id, timeout, flags) {
                    event.error = Some(err);
                }
                events.push(event);
                return Ok(());
            }
        }

        self.poll_fds(subscriptions, events)
    }

    #[cfg(target_os = "linux")]
    fn sleep(&self, clock_id: ClockId, timeout: Timestamp, flags: ClockFlags) -> Result<(), Errno> {
        let ts = timespec_from_timestamp(timeout);
        let ret = unsafe {
            libc::clock_nanosleep(
                host_clockid(clock_id),
                if flags.contains(ClockFlags::ABSTIME) {
                    libc::TIMER_ABSTIME
                } else {
                    0
                },
                &ts,
                std::ptr::null_mut(),
            )
        };
        // clock_nanosleep reports errors directly instead of via errno.
        if ret != 0 {
            return Err(Errno::from_host(ret));
        }
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    fn sleep(&self, clock_id: ClockId, timeout: Timestamp, flags: ClockFlags) -> Result<(), Errno> {
        match clock_id {
            ClockId::Monotonic | ClockId::Realtime => {}
            _ => return Err(Errno::ENOTSUP),
        }
        if flags.contains(ClockFlags::ABSTIME) {
            // No clock-selecting absolute sleep on this host: sleep in
            // slices of the remaining delta, re-reading the clock so
            // early wakeups and realtime steps are absorbed.
            loop {
                let now = self.clock_time_get(clock_id, 0)?;
                if now >= timeout {
                    return Ok(());
                }
                let ts = timespec_from_timestamp(timeout - now);
                unsafe { libc::nanosleep(&ts, std::ptr::null_mut()) };
            }
        }
        let ts = timespec_from_timestamp(timeout);
        unsafe { libc::nanosleep(&ts, std::ptr::null_mut()) };
        Ok(())
    }

    fn poll_fds(
        &self,
        subscriptions: &[Subscription<'_>],
        events: &mut Vec<Event>,
    ) -> Result<(), Errno> {
        let n = subscriptions.len();
        let mut objects: Vec<Option<Arc<FdObject>>> = Vec::with_capacity(n);
        let mut pollfds: Vec<libc::pollfd> = Vec::with_capacity(n);
        let mut clock: Option<(u64, Timestamp)> = None;

        const IDLE: libc::pollfd = libc::pollfd {
            fd: -1,
            events: 0,
            revents: 0,
        };

        // Convert subscriptions to pollfd entries, referencing every
        // object so the descriptors stay open across the host poll.
        {
            let slots = self.table().read();
            for sub in subscriptions {
                match sub.kind {
                    SubscriptionKind::FdRead { fd } | SubscriptionKind::FdWrite { fd } => {
                        let typ = sub.kind.event_type();
                        match slots.entry(fd, crate::abi::Rights::POLL_FD_READWRITE,
                            crate::abi::Rights::empty())
                        {
                            Ok(entry) => {
                                pollfds.push(libc::pollfd {
                                    fd: entry.object.host_fd(),
                                    events: if typ == EventType::FdRead {
                                        libc::POLLRDNORM
                                    } else {
                                        libc::POLLWRNORM
                                    },
                                    revents: 0,
                                });
                                objects.push(Some(Arc::clone(&entry.object)));
                            }
                            Err(err) => {
                                // Missing handle or rights: report
                                // immediately and keep the slot inert.
                                objects.push(None);
                                pollfds.push(IDLE);
                                events.push(Event::failed(sub.userdata, typ, err));
                            }
                        }
                    }
                    SubscriptionKind::Clock { timeout, flags, .. }
                        if clock.is_none() && !flags.contains(ClockFlags::ABSTIME) =>
                    {
                        // The single relative clock acts as the timeout.
                        objects.push(None);
                        pollfds.push(IDLE);
                        clock = Some((sub.userdata, timeout));
                    }
                    _ => {
                        // Absolute or surplus clocks and futex kinds are
                        // not pollable here.
                        objects.push(None);
                        pollfds.push(IDLE);
                        events.push(Event::failed(
                            sub.userdata,
                            sub.kind.event_type(),
                            Errno::ENOSYS,
                        ));
                    }
                }
            }
        }

        let timeout_ms: libc::c_int = if !events.is_empty() {
            0
        } else if let Some((_, timeout)) = clock {
            std::cmp::min(timeout / 1_000_000, libc::c_int::MAX as u64) as libc::c_int
        } else {
            -1
        };
        let ret = unsafe { libc::poll(pollfds.as_mut_ptr(), n as libc::nfds_t, timeout_ms) };

        if ret < 0 {
            return Err(Errno::last_host());
        }
        if ret == 0 && events.is_empty() {
            if let Some((userdata, _)) = clock {
                events.push(Event::fired(userdata, EventType::Clock));
            }
            return Ok(());
        }

        for (i, sub) in subscriptions.iter().enumerate() {
            let pfd = &pollfds[i];
            if pfd.fd < 0 || pfd.revents == 0 {
                continue;
            }
            let typ = sub.kind.event_type();
            let nbytes = if typ == EventType::FdRead {
                bytes_available(pfd.fd)
            } else {
                0
            };
            if pfd.revents & libc::POLLNVAL != 0 {
                // A referenced descriptor cannot normally go invalid, but
                // some hosts report this for pipes at end-of-file.
                #[cfg(target_os = "macos")]
                events.push(Event::fd_ready(sub.userdata, typ, nbytes, true));
                #[cfg(not(target_os = "macos"))]
                events.push(Event::failed(sub.userdata, typ, Errno::EBADF));
            } else if pfd.revents & libc::POLLERR != 0 {
                events.push(Event::failed(sub.userdata, typ, Errno::EIO));
            } else if pfd.revents & libc::POLLHUP != 0 {
                events.push(Event::fd_ready(sub.userdata, typ, nbytes, true));
            } else if pfd.revents & (libc::POLLRDNORM | libc::POLLWRNORM) != 0 {
                events.push(Event::fd_ready(sub.userdata, typ, nbytes, false));
            }
        }
        drop(objects);
        Ok(())
    }
}

/// Bytes queued for reading on a descriptor, zero if the host will not
/// say.
fn bytes_available(fd: libc::c_int) -> u64 {
    let mut len: libc::c_int = 0;
    if unsafe { libc::ioctl(fd, libc::FIONREAD, &raw mut len) } == 0 {
        len as u64
    } else {
        0
    }
}
