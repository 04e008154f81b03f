//! The event-wait multiplexer and worker thread lifecycle.

use std::io::IoSlice;
use std::io::IoSliceMut;
use std::time::Duration;
use std::time::Instant;

use capabi::abi::ClockFlags;
use capabi::abi::ClockId;
use capabi::abi::EventType;
use capabi::abi::FdStatFlags;
use capabi::abi::FileType;
use capabi::abi::Scope;
use capabi::abi::SubscriptionKind;
use capabi::{Errno, Event, Fd, NullFutex, Process, Rights, SequentialTids, Subscription, Thread};

fn new_thread() -> (Process, Thread) {
    let process = Process::new(Box::new(NullFutex), Box::new(SequentialTids::new()));
    let thread = process.initial_thread();
    (process, thread)
}

fn clock_sub(userdata: u64, ns: u64) -> Subscription<'static> {
    Subscription {
        userdata,
        kind: SubscriptionKind::Clock {
            clock_id: ClockId::Monotonic,
            timeout: ns,
            precision: 0,
            flags: ClockFlags::empty(),
        },
    }
}

#[test]
fn lone_clock_subscription_sleeps() {
    let (_process, thread) = new_thread();
    let mut events = Vec::new();

    let start = Instant::now();
    thread.poll(&[clock_sub(7, 50_000_000)], &mut events).unwrap();
    assert!(start.elapsed() >= Duration::from_millis(50));

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].userdata, 7);
    assert_eq!(events[0].typ, EventType::Clock);
    assert!(events[0].error.is_none());
}

#[test]
fn data_beats_the_timeout() {
    let (_process, thread) = new_thread();
    let (a, b) = thread.fd_create2(FileType::SocketStream).unwrap();

    thread.fd_write(b, &[IoSlice::new(b"!")]).unwrap();

    let mut events = Vec::new();
    thread
        .poll(
            &[
                Subscription {
                    userdata: 1,
                    kind: SubscriptionKind::FdRead { fd: a },
                },
                clock_sub(2, 50_000_000),
            ],
            &mut events,
        )
        .unwrap();

    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.userdata, 1);
    assert_eq!(event.typ, EventType::FdRead);
    assert!(event.error.is_none());
    assert_eq!(event.fd_readwrite.nbytes, 1);
    assert!(!event.fd_readwrite.hangup);
}

#[test]
fn timeout_fires_when_nothing_happens() {
    let (_process, thread) = new_thread();
    let (a, _b) = thread.fd_create2(FileType::SocketStream).unwrap();

    let start = Instant::now();
    let mut events = Vec::new();
    thread
        .poll(
            &[
                Subscription {
                    userdata: 1,
                    kind: SubscriptionKind::FdRead { fd: a },
                },
                clock_sub(2, 50_000_000),
            ],
            &mut events,
        )
        .unwrap();
    assert!(start.elapsed() >= Duration::from_millis(50));

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].userdata, 2);
    assert_eq!(events[0].typ, EventType::Clock);
}

#[test]
fn hangup_is_reported_with_pending_bytes() {
    let (_process, thread) = new_thread();
    let (a, b) = thread.fd_create2(FileType::SocketStream).unwrap();

    thread.fd_write(b, &[IoSlice::new(b"bye")]).unwrap();
    thread.fd_close(b).unwrap();

    let mut events = Vec::new();
    thread
        .poll(
            &[Subscription {
                userdata: 9,
                kind: SubscriptionKind::FdRead { fd: a },
            }],
            &mut events,
        )
        .unwrap();

    assert_eq!(events.len(), 1);
    assert!(events[0].error.is_none());
    // Buffered data is still readable after the peer hung up.
    assert_eq!(events[0].fd_readwrite.nbytes, 3);
}

#[test]
fn rights_failures_become_immediate_events() {
    let (_process, thread) = new_thread();
    let (a, _b) = thread.fd_create2(FileType::SocketStream).unwrap();

    // Strip the polling right from the handle.
    let mut stat = thread.fd_stat_get(a).unwrap();
    stat.rights_base -= Rights::POLL_FD_READWRITE;
    thread.fd_stat_put(a, &stat, FdStatFlags::RIGHTS).unwrap();

    let mut events = Vec::new();
    thread
        .poll(
            &[
                Subscription {
                    userdata: 1,
                    kind: SubscriptionKind::FdRead { fd: a },
                },
                Subscription {
                    userdata: 2,
                    kind: SubscriptionKind::FdRead { fd: Fd(4242) },
                },
            ],
            &mut events,
        )
        .unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].error, Some(Errno::ENOTCAPABLE));
    assert_eq!(events[1].error, Some(Errno::EBADF));
}

#[test]
fn futex_subscriptions_are_not_pollable_without_an_engine() {
    let (_process, thread) = new_thread();
    let lock = std::sync::atomic::AtomicU32::new(0);

    let mut events = Vec::new();
    thread
        .poll(
            &[
                Subscription {
                    userdata: 5,
                    kind: SubscriptionKind::LockWrlock {
                        lock: &lock,
                        scope: Scope::Private,
                    },
                },
                clock_sub(6, 1_000_000),
            ],
            &mut events,
        )
        .unwrap();

    // The futex subscription errors immediately; the clock does not fire.
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].userdata, 5);
    assert_eq!(events[0].error, Some(Errno::ENOSYS));
}

#[test]
fn spawned_thread_shares_the_handle_table() {
    let (_process, thread) = new_thread();
    let (a, b) = thread.fd_create2(FileType::SocketStream).unwrap();

    let tid = thread
        .thread_create(
            Box::new(move |worker: Thread, arg: usize| {
                assert_eq!(arg, 17);
                // The worker sees the same handles as its parent.
                worker.fd_write(b, &[IoSlice::new(b"hi")]).unwrap();
                let lock = std::sync::atomic::AtomicU32::new(0);
                worker.thread_exit(&lock, Scope::Private);
            }),
            17,
            0,
        )
        .unwrap();
    assert!(tid.0 > 0);

    let mut events: Vec<Event> = Vec::new();
    thread
        .poll(
            &[
                Subscription {
                    userdata: 1,
                    kind: SubscriptionKind::FdRead { fd: a },
                },
                clock_sub(2, 2_000_000_000),
            ],
            &mut events,
        )
        .unwrap();
    assert_eq!(events[0].typ, EventType::FdRead);

    let mut buf = [0u8; 2];
    let n = thread.fd_read(a, &mut [IoSliceMut::new(&mut buf)]).unwrap();
    assert_eq!((n, &buf), (2, b"hi"));
}
