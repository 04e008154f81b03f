//! Subtree confinement through the public system call surface.

use std::fs;
use std::path::Path;

use capabi::abi::FdFlags;
use capabi::abi::FdStat;
use capabi::abi::FileType;
use capabi::abi::LookupFlags;
use capabi::abi::OpenFlags;
use capabi::abi::UnlinkFlags;
use capabi::{Errno, Fd, NullFutex, Process, Rights, SequentialTids, Thread};

const ROOT: Fd = Fd(3);

fn process_with_root(root: &Path) -> (Process, Thread) {
    let process = Process::new(Box::new(NullFutex), Box::new(SequentialTids::new()));
    let fd = nix::fcntl::open(
        root.as_os_str(),
        nix::fcntl::OFlag::O_RDONLY | nix::fcntl::OFlag::O_DIRECTORY,
        nix::sys::stat::Mode::empty(),
    )
    .unwrap();
    use std::os::fd::IntoRawFd;
    assert!(process.table().insert_existing(ROOT, fd.into_raw_fd()));
    let thread = process.initial_thread();
    (process, thread)
}

fn read_stat() -> FdStat {
    FdStat {
        filetype: FileType::Unknown,
        flags: FdFlags::empty(),
        rights_base: Rights::FD_READ | Rights::FILE_STAT_FGET,
        rights_inheriting: Rights::empty(),
    }
}

#[test]
fn opens_inside_the_subtree() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("sub/ok"), b"hello").unwrap();
    let (_process, thread) = process_with_root(dir.path());

    let fd = thread
        .file_open(
            ROOT,
            LookupFlags::empty(),
            b"sub/ok",
            OpenFlags::empty(),
            &read_stat(),
        )
        .unwrap();
    let stat = thread.file_stat_fget(fd).unwrap();
    assert_eq!(stat.filetype, FileType::RegularFile);
    assert_eq!(stat.size, 5);
    thread.fd_close(fd).unwrap();
}

#[test]
fn dotdot_cannot_leave_the_subtree() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    let (_process, thread) = process_with_root(dir.path());

    for path in [&b"../etc/passwd"[..], b"sub/../.."] {
        assert_eq!(
            thread
                .file_open(ROOT, LookupFlags::empty(), path, OpenFlags::empty(), &read_stat())
                .err(),
            Some(Errno::ENOTCAPABLE),
            "{}",
            String::from_utf8_lossy(path)
        );
    }
}

#[test]
fn absolute_symlink_cannot_escape() {
    let dir = tempfile::tempdir().unwrap();
    std::os::unix::fs::symlink("/etc", dir.path().join("bad")).unwrap();
    let (_process, thread) = process_with_root(dir.path());

    assert_eq!(
        thread
            .file_open(
                ROOT,
                LookupFlags::SYMLINK_FOLLOW,
                b"bad/passwd",
                OpenFlags::empty(),
                &read_stat(),
            )
            .err(),
        Some(Errno::ENOTCAPABLE)
    );

    // The link itself is still addressable without following it.
    let mut buf = [0u8; 64];
    let n = thread.file_readlink(ROOT, b"bad", &mut buf).unwrap();
    assert_eq!(&buf[..n], b"/etc");
}

#[test]
fn stat_and_unlink_stay_confined() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("victim"), b"x").unwrap();
    let (_process, thread) = process_with_root(dir.path());

    assert_eq!(
        thread
            .file_stat_get(ROOT, LookupFlags::empty(), b"../victim")
            .err(),
        Some(Errno::ENOTCAPABLE)
    );
    thread
        .file_unlink(ROOT, b"victim", UnlinkFlags::empty())
        .unwrap();
    assert!(!dir.path().join("victim").exists());
}

#[test]
fn directory_create_rename_and_remove() {
    let dir = tempfile::tempdir().unwrap();
    let (_process, thread) = process_with_root(dir.path());

    thread
        .file_create(ROOT, b"fresh", FileType::Directory)
        .unwrap();
    assert!(dir.path().join("fresh").is_dir());
    // Only directories can be created through this entry point.
    assert_eq!(
        thread.file_create(ROOT, b"nope", FileType::RegularFile).err(),
        Some(Errno::EINVAL)
    );

    thread
        .file_rename(ROOT, b"fresh", ROOT, b"renamed")
        .unwrap();
    assert!(dir.path().join("renamed").is_dir());

    // Removing a directory requires the REMOVEDIR flag.
    assert_eq!(
        thread
            .file_unlink(ROOT, b"renamed", UnlinkFlags::empty())
            .err(),
        Some(Errno::EPERM)
    );
    thread
        .file_unlink(ROOT, b"renamed", UnlinkFlags::REMOVEDIR)
        .unwrap();
    assert!(!dir.path().join("renamed").exists());
}

#[test]
fn symlink_and_link_inside_the_subtree() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("orig"), b"data").unwrap();
    let (_process, thread) = process_with_root(dir.path());

    thread.file_symlink(b"orig", ROOT, b"alias").unwrap();
    let stat = thread
        .file_stat_get(ROOT, LookupFlags::SYMLINK_FOLLOW, b"alias")
        .unwrap();
    assert_eq!(stat.filetype, FileType::RegularFile);
    let stat = thread
        .file_stat_get(ROOT, LookupFlags::empty(), b"alias")
        .unwrap();
    assert_eq!(stat.filetype, FileType::SymbolicLink);

    thread
        .file_link(ROOT, LookupFlags::empty(), b"orig", ROOT, b"hard")
        .unwrap();
    let stat = thread
        .file_stat_get(ROOT, LookupFlags::empty(), b"hard")
        .unwrap();
    assert_eq!(stat.nlink, 2);
}
