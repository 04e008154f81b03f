//! Confined path resolution.
//!
//! System calls that operate on pathnames name their target as a pair of
//! a directory handle and a path interpreted relative to it. Resolution
//! produces a short-lived [`PathAccess`] lease: a host directory
//! descriptor plus a residual pathname that is guaranteed to stay at or
//! below the handle's subtree.
//!
//! On hosts without per-descriptor confinement the resolver walks the
//! path one component at a time, opening intermediate directories with
//! symlink following disabled and expanding symlinks in user space, so
//! `..` and absolute symlink targets can be rejected before the host
//! kernel ever sees them.
//!
//! Known limitation: between the resolver returning the final component
//! and the caller acting on it, a concurrent rename on the host
//! filesystem can swap that component for a symbolic link pointing
//! outside the subtree. Resolution is not atomic with the operation.

use std::ffi::CStr;
use std::ffi::CString;
use std::os::unix::io::RawFd;
use std::sync::Arc;

use log::debug;
use memchr::memchr;

use crate::abi::Errno;
use crate::abi::Fd;
use crate::abi::LookupFlags;
use crate::abi::Rights;
use crate::fd::object::FdObject;
use crate::fd::table::FdTable;

/// Maximum depth of the intermediate directory descriptor stack.
#[cfg(not(target_os = "freebsd"))]
const DIR_STACK_LIMIT: usize = 128;
/// Maximum number of symlink targets pending expansion at once.
#[cfg(not(target_os = "freebsd"))]
const SYMLINK_STACK_LIMIT: usize = 32;
/// Total symlink expansions allowed for one lookup.
#[cfg(not(target_os = "freebsd"))]
const EXPANSION_LIMIT: u32 = 128;

/// A lease on a location inside a directory handle's subtree, held for
/// the duration of one system call.
#[derive(Debug)]
pub(crate) struct PathAccess {
    dirfd: RawFd,
    path: CString,
    follow: bool,
    owns_dirfd: bool,
    object: Arc<FdObject>,
}

impl PathAccess {
    /// The host directory descriptor the residual path is relative to.
    pub(crate) fn dirfd(&self) -> RawFd {
        self.dirfd
    }

    /// The residual pathname. A trailing slash is preserved so host calls
    /// still fail with `ENOTDIR` where they should.
    pub(crate) fn path(&self) -> &CStr {
        &self.path
    }

    /// Whether the host call may follow a symlink in the final component.
    /// Always false when resolution was emulated: the requested expansion
    /// has already been performed, so the host call must not repeat it.
    pub(crate) fn follow(&self) -> bool {
        self.follow
    }
}

impl Drop for PathAccess {
    fn drop(&mut self) {
        if self.owns_dirfd {
            unsafe { libc::close(self.dirfd) };
        }
        // The object reference drops with the lease.
    }
}

/// Resolves `(dirfd, path)` into a lease, requiring `need_base` and
/// `need_inheriting` on the directory handle.
///
/// `needs_final_component` is set by callers that will create or remove
/// the final component and therefore need its name back even when the
/// path carries a trailing slash.
pub(crate) fn path_get(
    table: &FdTable,
    dirfd: Fd,
    flags: LookupFlags,
    upath: &[u8],
    need_base: Rights,
    need_inheriting: Rights,
    needs_final_component: bool,
) -> Result<PathAccess, Errno> {
    if memchr(0, upath).is_some() {
        return Err(Errno::EINVAL);
    }
    let object = table.get(dirfd, need_base, need_inheriting)?;
    let follow = flags.contains(LookupFlags::SYMLINK_FOLLOW);

    #[cfg(target_os = "freebsd")]
    {
        // Capsicum constrains lookups to the descriptor's subtree for us;
        // hand the path to the host verbatim.
        let _ = needs_final_component;
        return Ok(PathAccess {
            dirfd: object.host_fd(),
            path: CString::new(upath).expect("NUL checked above"),
            follow,
            owns_dirfd: false,
            object,
        });
    }

    #[cfg(not(target_os = "freebsd"))]
    {
        let handle_fd = object.host_fd();
        let mut dirs: Vec<RawFd> = Vec::new();
        match walk(handle_fd, follow, needs_final_component, upath.to_vec(), &mut dirs) {
            Ok(residual) => {
                // Keep the top of the directory stack for the lease and
                // close the intermediates.
                let (dirfd, owns_dirfd) = match dirs.pop() {
                    Some(top) => {
                        for fd in dirs.drain(..) {
                            unsafe { libc::close(fd) };
                        }
                        (top, true)
                    }
                    None => (handle_fd, false),
                };
                Ok(PathAccess {
                    dirfd,
                    path: CString::new(residual).expect("components are NUL free"),
                    follow: false,
                    owns_dirfd,
                    object,
                })
            }
            Err(err) => {
                for fd in dirs.drain(..) {
                    unsafe { libc::close(fd) };
                }
                Err(err)
            }
        }
    }
}

/// [`path_get`] without symlink following on the final component.
pub(crate) fn path_get_nofollow(
    table: &FdTable,
    dirfd: Fd,
    upath: &[u8],
    need_base: Rights,
    need_inheriting: Rights,
    needs_final_component: bool,
) -> Result<PathAccess, Errno> {
    path_get(
        table,
        dirfd,
        LookupFlags::empty(),
        upath,
        need_base,
        need_inheriting,
        needs_final_component,
    )
}

/// One pending pathname string and a cursor into it.
#[cfg(not(target_os = "freebsd"))]
struct PathElem {
    buf: Vec<u8>,
    pos: usize,
}

#[cfg(not(target_os = "freebsd"))]
impl PathElem {
    fn new(buf: Vec<u8>) -> PathElem {
        PathElem { buf, pos: 0 }
    }

    fn exhausted(&self) -> bool {
        self.pos >= self.buf.len()
    }
}

/// The emulated component walk. Pushed directory descriptors accumulate
/// in `dirs`; the caller closes them on both success and failure.
#[cfg(not(target_os = "freebsd"))]
fn walk(
    handle_fd: RawFd,
    follow: bool,
    needs_final_component: bool,
    input: Vec<u8>,
    dirs: &mut Vec<RawFd>,
) -> Result<Vec<u8>, Errno> {
    let mut paths = vec![PathElem::new(input)];
    let mut expansions = 0u32;

    loop {
        // Split the next component off the top pathname. A component
        // followed by one or more slashes must name a directory.
        let top = paths.last_mut().expect("path stack never empties");
        let rest = &top.buf[top.pos..];
        let name_len = memchr(b'/', rest).unwrap_or(rest.len());
        let name_end = top.pos + name_len;
        let ends_with_slashes = name_end < top.buf.len();
        let name = top.buf[top.pos..name_end].to_vec();
        let mut next = name_end;
        while next < top.buf.len() && top.buf[next] == b'/' {
            next += 1;
        }
        top.pos = next;

        let cur_dir = dirs.last().copied().unwrap_or(handle_fd);

        if name.is_empty() {
            // A leading slash would escape the subtree; an empty path
            // names nothing.
            return Err(if ends_with_slashes {
                Errno::ENOTCAPABLE
            } else {
                Errno::ENOENT
            });
        } else if name == b"." {
            // Skip.
        } else if name == b".." {
            match dirs.pop() {
                Some(fd) => unsafe {
                    libc::close(fd);
                },
                None => {
                    debug!("lookup attempted to escape above its directory handle");
                    return Err(Errno::ENOTCAPABLE);
                }
            }
        } else if paths.len() > 1
            || !paths.last().expect("non-empty").exhausted()
            || (ends_with_slashes && !needs_final_component)
        {
            // An intermediate component, or a final one that must be a
            // directory: descend into it with symlink following disabled.
            let cname = CString::new(name).expect("components are NUL free");
            let newdir = unsafe {
                libc::openat(
                    cur_dir,
                    cname.as_ptr(),
                    libc::O_RDONLY | libc::O_DIRECTORY | libc::O_NOFOLLOW,
                )
            };
            if newdir != -1 {
                if dirs.len() + 1 == DIR_STACK_LIMIT {
                    unsafe { libc::close(newdir) };
                    return Err(Errno::ENAMETOOLONG);
                }
                dirs.push(newdir);
            } else {
                // EMLINK is what some hosts report instead of ELOOP when
                // refusing to follow a symlink.
                let errno = Errno::last_host();
                if errno != Errno::ELOOP && errno != Errno::EMLINK {
                    return Err(errno);
                }
                let target = read_link_at(cur_dir, &cname)?;
                push_symlink(&mut paths, &mut expansions, target, ends_with_slashes)?;
                continue;
            }
        } else {
            // The final component. Expand it if the caller asked for
            // symlink following or a trailing slash demands a directory.
            if ends_with_slashes || follow {
                let cname = CString::new(name.clone()).expect("components are NUL free");
                match read_link_at(cur_dir, &cname) {
                    Ok(target) => {
                        push_symlink(&mut paths, &mut expansions, target, ends_with_slashes)?;
                        continue;
                    }
                    // Not a symlink, or nothing there: hand the name to
                    // the caller's host call as is.
                    Err(Errno::EINVAL) | Err(Errno::ENOENT) => {}
                    Err(err) => return Err(err),
                }
            }
            let mut residual = name;
            if ends_with_slashes {
                residual.push(b'/');
            }
            return Ok(residual);
        }

        if paths.last().expect("non-empty").exhausted() {
            if paths.len() == 1 {
                // Nothing left to process; paths like "." or "a/.." end
                // here, as do trailing slashes the caller does not care
                // about.
                return Ok(b".".to_vec());
            }
            // A symlink finished expanding; resume the original path.
            paths.pop();
        }
    }
}

/// Queues a symlink target for expansion, bounding both the total number
/// of expansions and the depth of unfinished targets.
#[cfg(not(target_os = "freebsd"))]
fn push_symlink(
    paths: &mut Vec<PathElem>,
    expansions: &mut u32,
    mut target: Vec<u8>,
    ends_with_slashes: bool,
) -> Result<(), Errno> {
    *expansions += 1;
    if *expansions == EXPANSION_LIMIT {
        return Err(Errno::ELOOP);
    }
    if paths.last().expect("non-empty").exhausted() {
        // The current pathname finished; the target replaces it outright.
        paths.pop();
    } else if paths.len() == SYMLINK_STACK_LIMIT {
        return Err(Errno::ELOOP);
    }
    // Keep a trailing slash so a target that is not a directory still
    // fails with ENOTDIR.
    if ends_with_slashes {
        target.push(b'/');
    }
    paths.push(PathElem::new(target));
    Ok(())
}

/// Reads a symlink target relative to a directory descriptor, growing the
/// buffer until the full target fits.
#[cfg(not(target_os = "freebsd"))]
fn read_link_at(dirfd: RawFd, name: &CStr) -> Result<Vec<u8>, Errno> {
    let mut len = 32usize;
    loop {
        let mut buf = vec![0u8; len];
        let ret = unsafe { libc::readlinkat(dirfd, name.as_ptr(), buf.as_mut_ptr().cast(), len) };
        if ret < 0 {
            return Err(Errno::last_host());
        }
        let n = ret as usize;
        if n + 1 < len {
            buf.truncate(n);
            return Ok(buf);
        }
        len *= 2;
    }
}

#[cfg(all(test, not(target_os = "freebsd")))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::ffi::OsStrExt;

    fn table_with_root(root: &std::path::Path) -> (FdTable, Fd) {
        let cpath = CString::new(root.as_os_str().as_bytes()).unwrap();
        let host = unsafe { libc::open(cpath.as_ptr(), libc::O_RDONLY | libc::O_DIRECTORY) };
        assert!(host >= 0);
        let table = FdTable::new();
        assert!(table.insert_existing(Fd(3), host));
        (table, Fd(3))
    }

    fn resolve(
        table: &FdTable,
        fd: Fd,
        flags: LookupFlags,
        path: &[u8],
    ) -> Result<PathAccess, Errno> {
        path_get(table, fd, flags, path, Rights::empty(), Rights::empty(), false)
    }

    #[test]
    fn resolves_inside_the_subtree() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/ok"), b"x").unwrap();
        let (table, fd) = table_with_root(dir.path());

        let pa = resolve(&table, fd, LookupFlags::empty(), b"sub/ok").unwrap();
        assert_eq!(pa.path().to_bytes(), b"ok");
        assert!(!pa.follow());
    }

    #[test]
    fn rejects_escapes() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let (table, fd) = table_with_root(dir.path());

        for path in [&b"../etc/passwd"[..], b"sub/../..", b"/etc/passwd"] {
            assert_eq!(
                resolve(&table, fd, LookupFlags::empty(), path).err(),
                Some(Errno::ENOTCAPABLE),
                "{}",
                String::from_utf8_lossy(path)
            );
        }
        assert_eq!(
            resolve(&table, fd, LookupFlags::empty(), b"").err(),
            Some(Errno::ENOENT)
        );
    }

    #[test]
    fn dotdot_inside_the_subtree_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        let (table, fd) = table_with_root(dir.path());

        let pa = resolve(&table, fd, LookupFlags::empty(), b"a/b/..").unwrap();
        assert_eq!(pa.path().to_bytes(), b".");
    }

    #[test]
    fn absolute_symlink_target_cannot_escape() {
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink("/etc", dir.path().join("bad")).unwrap();
        let (table, fd) = table_with_root(dir.path());

        assert_eq!(
            resolve(&table, fd, LookupFlags::SYMLINK_FOLLOW, b"bad/passwd").err(),
            Some(Errno::ENOTCAPABLE)
        );
        assert_eq!(
            resolve(&table, fd, LookupFlags::SYMLINK_FOLLOW, b"bad").err(),
            Some(Errno::ENOTCAPABLE)
        );
        // Without following, the link itself is addressable.
        let pa = resolve(&table, fd, LookupFlags::empty(), b"bad").unwrap();
        assert_eq!(pa.path().to_bytes(), b"bad");
    }

    #[test]
    fn relative_symlinks_expand_in_place() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("real")).unwrap();
        fs::write(dir.path().join("real/file"), b"x").unwrap();
        std::os::unix::fs::symlink("real", dir.path().join("alias")).unwrap();
        let (table, fd) = table_with_root(dir.path());

        let pa = resolve(&table, fd, LookupFlags::empty(), b"alias/file").unwrap();
        assert_eq!(pa.path().to_bytes(), b"file");
    }

    #[test]
    fn symlink_cycles_are_detected() {
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink("loop2", dir.path().join("loop1")).unwrap();
        std::os::unix::fs::symlink("loop1", dir.path().join("loop2")).unwrap();
        let (table, fd) = table_with_root(dir.path());

        assert_eq!(
            resolve(&table, fd, LookupFlags::SYMLINK_FOLLOW, b"loop1").err(),
            Some(Errno::ELOOP)
        );
    }

    #[test]
    fn trailing_slash_is_preserved_for_the_host() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("file"), b"x").unwrap();
        let (table, fd) = table_with_root(dir.path());

        let pa = path_get(
            &table,
            fd,
            LookupFlags::empty(),
            b"file/",
            Rights::empty(),
            Rights::empty(),
            true,
        )
        .unwrap();
        assert_eq!(pa.path().to_bytes(), b"file/");
    }
}
