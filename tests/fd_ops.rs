//! Handle-level operations through the public surface: I/O round trips,
//! rights narrowing, duplication, directory iteration.

use std::fs;
use std::io::IoSlice;
use std::io::IoSliceMut;
use std::path::Path;

use capabi::abi::ClockId;
use capabi::abi::FdFlags;
use capabi::abi::FdStat;
use capabi::abi::FdStatFlags;
use capabi::abi::FileStatFlags;
use capabi::abi::FileType;
use capabi::abi::LookupFlags;
use capabi::abi::OpenFlags;
use capabi::abi::Whence;
use capabi::abi::DIRCOOKIE_START;
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

fn rw_stat() -> FdStat {
    FdStat {
        filetype: FileType::Unknown,
        flags: FdFlags::empty(),
        rights_base: Rights::FD_READ
            | Rights::FD_WRITE
            | Rights::FD_SEEK
            | Rights::FD_TELL
            | Rights::FILE_STAT_FGET
            | Rights::FILE_STAT_FPUT_SIZE,
        rights_inheriting: Rights::empty(),
    }
}

#[test]
fn write_seek_read_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let (_process, thread) = process_with_root(dir.path());

    let fd = thread
        .file_open(
            ROOT,
            LookupFlags::empty(),
            b"data",
            OpenFlags::CREAT,
            &rw_stat(),
        )
        .unwrap();

    let n = thread
        .fd_write(fd, &[IoSlice::new(b"hello "), IoSlice::new(b"world")])
        .unwrap();
    assert_eq!(n, 11);

    assert_eq!(thread.fd_seek(fd, 0, Whence::Set).unwrap(), 0);
    let mut a = [0u8; 6];
    let mut b = [0u8; 5];
    let n = thread
        .fd_read(fd, &mut [IoSliceMut::new(&mut a), IoSliceMut::new(&mut b)])
        .unwrap();
    assert_eq!(n, 11);
    assert_eq!(&a, b"hello ");
    assert_eq!(&b, b"world");

    // Tell-only seek works without the seek right being exercised.
    assert_eq!(thread.fd_seek(fd, 0, Whence::Cur).unwrap(), 11);
}

#[test]
fn positional_io_leaves_the_offset_alone() {
    let dir = tempfile::tempdir().unwrap();
    let (_process, thread) = process_with_root(dir.path());

    let fd = thread
        .file_open(
            ROOT,
            LookupFlags::empty(),
            b"data",
            OpenFlags::CREAT,
            &rw_stat(),
        )
        .unwrap();
    thread
        .fd_pwrite(fd, &[IoSlice::new(b"abc"), IoSlice::new(b"def")], 2)
        .unwrap();
    assert_eq!(thread.fd_seek(fd, 0, Whence::Cur).unwrap(), 0);

    let mut buf = [0u8; 4];
    let n = thread
        .fd_pread(fd, &mut [IoSliceMut::new(&mut buf)], 4)
        .unwrap();
    assert_eq!(n, 4);
    assert_eq!(&buf, b"cdef");

    assert_eq!(
        thread.fd_pread(fd, &mut [], 0).err(),
        Some(Errno::EINVAL)
    );
}

#[test]
fn rights_narrow_but_never_widen() {
    let dir = tempfile::tempdir().unwrap();
    let (_process, thread) = process_with_root(dir.path());

    let fd = thread
        .file_open(
            ROOT,
            LookupFlags::empty(),
            b"data",
            OpenFlags::CREAT,
            &rw_stat(),
        )
        .unwrap();

    let mut narrowed = thread.fd_stat_get(fd).unwrap();
    narrowed.rights_base = Rights::FD_READ;
    narrowed.rights_inheriting = Rights::empty();
    thread
        .fd_stat_put(fd, &narrowed, FdStatFlags::RIGHTS)
        .unwrap();

    assert_eq!(
        thread.fd_write(fd, &[IoSlice::new(b"x")]).err(),
        Some(Errno::ENOTCAPABLE)
    );

    let mut widened = narrowed;
    widened.rights_base = Rights::FD_READ | Rights::FD_WRITE;
    assert_eq!(
        thread.fd_stat_put(fd, &widened, FdStatFlags::RIGHTS).err(),
        Some(Errno::ENOTCAPABLE)
    );
}

#[test]
fn open_reports_the_inferred_type_and_clipped_rights() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("plain"), b"x").unwrap();
    let (_process, thread) = process_with_root(dir.path());

    // Ask for directory rights on a regular file; the grant is clipped
    // to what the type supports.
    let mut stat = rw_stat();
    stat.rights_base |= Rights::FILE_READDIR;
    let fd = thread
        .file_open(ROOT, LookupFlags::empty(), b"plain", OpenFlags::empty(), &stat)
        .unwrap();
    let got = thread.fd_stat_get(fd).unwrap();
    assert_eq!(got.filetype, FileType::RegularFile);
    assert!(!got.rights_base.contains(Rights::FILE_READDIR));
    assert!(got.rights_base.contains(Rights::FD_READ));
}

#[test]
fn dup_and_replace_share_the_open_file() {
    let dir = tempfile::tempdir().unwrap();
    let (_process, thread) = process_with_root(dir.path());

    let fd = thread
        .file_open(
            ROOT,
            LookupFlags::empty(),
            b"data",
            OpenFlags::CREAT,
            &rw_stat(),
        )
        .unwrap();
    let dup = thread.fd_dup(fd).unwrap();

    // Closing the original keeps the resource alive through the dup.
    thread.fd_write(fd, &[IoSlice::new(b"abc")]).unwrap();
    thread.fd_close(fd).unwrap();
    let mut buf = [0u8; 3];
    let n = thread
        .fd_pread(dup, &mut [IoSliceMut::new(&mut buf)], 0)
        .unwrap();
    assert_eq!((n, &buf), (3, b"abc"));
    thread.fd_close(dup).unwrap();
}

#[test]
fn truncate_via_stat_fput() {
    let dir = tempfile::tempdir().unwrap();
    let (_process, thread) = process_with_root(dir.path());

    let fd = thread
        .file_open(
            ROOT,
            LookupFlags::empty(),
            b"data",
            OpenFlags::CREAT,
            &rw_stat(),
        )
        .unwrap();
    thread.fd_write(fd, &[IoSlice::new(b"0123456789")]).unwrap();

    let mut stat = thread.file_stat_fget(fd).unwrap();
    stat.size = 4;
    thread
        .file_stat_fput(fd, &stat, FileStatFlags::SIZE)
        .unwrap();
    assert_eq!(thread.file_stat_fget(fd).unwrap().size, 4);

    // Mixing size and time updates is rejected.
    assert_eq!(
        thread
            .file_stat_fput(fd, &stat, FileStatFlags::SIZE | FileStatFlags::MTIM_NOW)
            .err(),
        Some(Errno::EINVAL)
    );
}

/// Parses the dirent records produced by `file_readdir`.
fn parse_dirents(buf: &[u8]) -> Vec<(u64, String)> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos + 24 <= buf.len() {
        let next = u64::from_ne_bytes(buf[pos..pos + 8].try_into().unwrap());
        let namlen = u32::from_ne_bytes(buf[pos + 16..pos + 20].try_into().unwrap()) as usize;
        if pos + 24 + namlen > buf.len() {
            break;
        }
        let name = String::from_utf8(buf[pos + 24..pos + 24 + namlen].to_vec()).unwrap();
        out.push((next, name));
        pos += 24 + namlen;
    }
    out
}

#[test]
fn readdir_cursor_resumes_where_it_left_off() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a", "b", "c", "d"] {
        fs::write(dir.path().join(name), b"").unwrap();
    }
    let (_process, thread) = process_with_root(dir.path());

    let dirfd = thread
        .file_open(
            ROOT,
            LookupFlags::empty(),
            b".",
            OpenFlags::DIRECTORY,
            &FdStat {
                filetype: FileType::Unknown,
                flags: FdFlags::empty(),
                rights_base: Rights::FILE_READDIR,
                rights_inheriting: Rights::empty(),
            },
        )
        .unwrap();

    let mut buf = vec![0u8; 4096];
    let used = thread
        .file_readdir(dirfd, &mut buf, DIRCOOKIE_START)
        .unwrap();
    let all = parse_dirents(&buf[..used]);
    // ".", "..", plus the four files.
    assert_eq!(all.len(), 6);

    // Resume from the cookie in the middle and collect the remainder.
    let (cookie, _) = all[2];
    let used = thread.file_readdir(dirfd, &mut buf, cookie).unwrap();
    let rest = parse_dirents(&buf[..used]);
    assert_eq!(rest.len(), 3);
    assert_eq!(
        rest.iter().map(|(_, n)| n.clone()).collect::<Vec<_>>(),
        all[3..].iter().map(|(_, n)| n.clone()).collect::<Vec<_>>()
    );

    // Rewinding to the start produces the full listing again.
    let used = thread
        .file_readdir(dirfd, &mut buf, DIRCOOKIE_START)
        .unwrap();
    assert_eq!(parse_dirents(&buf[..used]).len(), 6);
}

#[test]
fn monotonic_clock_never_runs_backwards() {
    let dir = tempfile::tempdir().unwrap();
    let (_process, thread) = process_with_root(dir.path());

    assert!(thread.clock_res_get(ClockId::Monotonic).unwrap() > 0);
    let a = thread.clock_time_get(ClockId::Monotonic, 0).unwrap();
    let b = thread.clock_time_get(ClockId::Monotonic, 0).unwrap();
    assert!(b >= a);
}
