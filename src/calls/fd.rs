//! Entry points operating on plain handles: I/O, duplication, seeking,
//! descriptor state.

use std::ffi::CString;
use std::io::IoSlice;
use std::io::IoSliceMut;

use rand::Rng;

use super::host_int;
use super::host_len;
use super::iovec_mut_ptr;
use super::iovec_ptr;
use crate::abi::Errno;
use crate::abi::Fd;
use crate::abi::FdFlags;
use crate::abi::FdStat;
use crate::abi::FdStatFlags;
use crate::abi::FileType;
use crate::abi::Rights;
use crate::abi::Whence;
use crate::process::Thread;

impl Thread {
    /// Removes a handle from the table. The backing resource is torn
    /// down once the last outstanding reference drops.
    pub fn fd_close(&self, fd: Fd) -> Result<(), Errno> {
        self.table().close(fd)
    }

    /// Creates a handle that is not derived from any other, currently
    /// only anonymous shared memory.
    pub fn fd_create1(&self, filetype: FileType) -> Result<Fd, Errno> {
        match filetype {
            FileType::SharedMemory => {
                // No anonymous shm_open on this host; create under a
                // random name and unlink immediately.
                let host_fd = loop {
                    let name = format!("/anon{}", rand::rng().random::<u32>());
                    let cname = CString::new(name).expect("no interior NUL");
                    let fd = unsafe {
                        libc::shm_open(
                            cname.as_ptr(),
                            libc::O_RDWR | libc::O_EXCL | libc::O_CREAT,
                            0o700,
                        )
                    };
                    if fd < 0 {
                        let err = Errno::last_host();
                        if err == Errno::EEXIST {
                            continue;
                        }
                        return Err(err);
                    }
                    unsafe { libc::shm_unlink(cname.as_ptr()) };
                    break fd;
                };
                self.table().insert_host_fd(
                    host_fd,
                    FileType::SharedMemory,
                    Rights::SHARED_MEMORY_BASE,
                    Rights::SHARED_MEMORY_INHERITING,
                )
            }
            _ => Err(Errno::EINVAL),
        }
    }

    /// Creates a connected pair of handles; both table slots become
    /// visible atomically.
    pub fn fd_create2(&self, filetype: FileType) -> Result<(Fd, Fd), Errno> {
        use nix::sys::socket::AddressFamily;
        use nix::sys::socket::SockFlag;
        use nix::sys::socket::SockType;
        use std::os::fd::IntoRawFd;

        let socktype = match filetype {
            FileType::SocketDgram => SockType::Datagram,
            FileType::SocketStream => SockType::Stream,
            _ => return Err(Errno::EINVAL),
        };
        let (a, b) = nix::sys::socket::socketpair(
            AddressFamily::Unix,
            socktype,
            None,
            SockFlag::empty(),
        )
        .map_err(|err| Errno::from_host(err as i32))?;
        self.table().insert_host_pair(
            (a.into_raw_fd(), b.into_raw_fd()),
            filetype,
            (Rights::SOCKET_BASE, Rights::SOCKET_BASE),
            Rights::SOCKET_INHERITING,
        )
    }

    /// Flushes file data to disk.
    pub fn fd_datasync(&self, fd: Fd) -> Result<(), Errno> {
        let object = self.table().get(fd, Rights::FD_DATASYNC, Rights::empty())?;
        #[cfg(any(target_os = "linux", target_os = "freebsd"))]
        let ret = unsafe { libc::fdatasync(object.host_fd()) };
        #[cfg(not(any(target_os = "linux", target_os = "freebsd")))]
        let ret = unsafe { libc::fsync(object.host_fd()) };
        host_int(ret).map(drop)
    }

    /// Duplicates a handle into a fresh slot with the same rights.
    pub fn fd_dup(&self, from: Fd) -> Result<Fd, Errno> {
        self.table().dup(from)
    }

    /// Reads into a vector of buffers from the current offset.
    pub fn fd_read(&self, fd: Fd, iovs: &mut [IoSliceMut<'_>]) -> Result<usize, Errno> {
        let object = self.table().get(fd, Rights::FD_READ, Rights::empty())?;
        let len = unsafe {
            libc::readv(object.host_fd(), iovec_mut_ptr(iovs), iovs.len() as libc::c_int)
        };
        host_len(len)
    }

    /// Reads into a vector of buffers at an explicit offset, leaving the
    /// file offset untouched.
    pub fn fd_pread(
        &self,
        fd: Fd,
        iovs: &mut [IoSliceMut<'_>],
        offset: u64,
    ) -> Result<usize, Errno> {
        if iovs.is_empty() {
            return Err(Errno::EINVAL);
        }
        let object = self
            .table()
            .get(fd, Rights::FD_READ | Rights::FD_SEEK, Rights::empty())?;

        #[cfg(any(target_os = "linux", target_os = "freebsd"))]
        {
            let len = unsafe {
                libc::preadv(
                    object.host_fd(),
                    iovec_mut_ptr(iovs),
                    iovs.len() as libc::c_int,
                    offset as libc::off_t,
                )
            };
            host_len(len)
        }

        #[cfg(not(any(target_os = "linux", target_os = "freebsd")))]
        {
            // The host has no vectored positional read: read through a
            // single buffer and scatter the result.
            if iovs.len() == 1 {
                let len = unsafe {
                    libc::pread(
                        object.host_fd(),
                        iovs[0].as_mut_ptr().cast(),
                        iovs[0].len(),
                        offset as libc::off_t,
                    )
                };
                return host_len(len);
            }
            let total: usize = iovs.iter().map(|iov| iov.len()).sum();
            let mut buf = vec![0u8; total];
            let len = unsafe {
                libc::pread(
                    object.host_fd(),
                    buf.as_mut_ptr().cast(),
                    total,
                    offset as libc::off_t,
                )
            };
            let len = host_len(len)?;
            let mut filled = 0;
            for iov in iovs.iter_mut() {
                if filled >= len {
                    break;
                }
                let n = std::cmp::min(iov.len(), len - filled);
                iov[..n].copy_from_slice(&buf[filled..filled + n]);
                filled += n;
            }
            Ok(len)
        }
    }

    /// Writes a vector of buffers at the current offset.
    pub fn fd_write(&self, fd: Fd, iovs: &[IoSlice<'_>]) -> Result<usize, Errno> {
        let object = self.table().get(fd, Rights::FD_WRITE, Rights::empty())?;
        let len = unsafe {
            libc::writev(
                object.host_fd(),
                iovec_ptr(iovs),
                iovs.len() as libc::c_int,
            )
        };
        host_len(len)
    }

    /// Writes a vector of buffers at an explicit offset, leaving the file
    /// offset untouched.
    pub fn fd_pwrite(&self, fd: Fd, iovs: &[IoSlice<'_>], offset: u64) -> Result<usize, Errno> {
        if iovs.is_empty() {
            return Err(Errno::EINVAL);
        }
        let object = self
            .table()
            .get(fd, Rights::FD_WRITE | Rights::FD_SEEK, Rights::empty())?;

        #[cfg(any(target_os = "linux", target_os = "freebsd"))]
        {
            let len = unsafe {
                libc::pwritev(
                    object.host_fd(),
                    iovec_ptr(iovs),
                    iovs.len() as libc::c_int,
                    offset as libc::off_t,
                )
            };
            host_len(len)
        }

        #[cfg(not(any(target_os = "linux", target_os = "freebsd")))]
        {
            // No vectored positional write: gather into one buffer first.
            if iovs.len() == 1 {
                let len = unsafe {
                    libc::pwrite(
                        object.host_fd(),
                        iovs[0].as_ptr().cast(),
                        iovs[0].len(),
                        offset as libc::off_t,
                    )
                };
                return host_len(len);
            }
            let mut buf = Vec::with_capacity(iovs.iter().map(|iov| iov.len()).sum());
            for iov in iovs {
                buf.extend_from_slice(iov);
            }
            let len = unsafe {
                libc::pwrite(
                    object.host_fd(),
                    buf.as_ptr().cast(),
                    buf.len(),
                    offset as libc::off_t,
                )
            };
            host_len(len)
        }
    }

    /// Makes `to` refer to the object named by `from`, atomically
    /// replacing whatever `to` named before.
    pub fn fd_replace(&self, from: Fd, to: Fd) -> Result<(), Errno> {
        self.table().replace(from, to)
    }

    /// Moves the file offset. Querying the current position (`Cur` with a
    /// zero offset) only needs the tell right.
    pub fn fd_seek(&self, fd: Fd, offset: i64, whence: Whence) -> Result<u64, Errno> {
        let nwhence = match whence {
            Whence::Cur => libc::SEEK_CUR,
            Whence::End => libc::SEEK_END,
            Whence::Set => libc::SEEK_SET,
        };
        let needed = if offset == 0 && whence == Whence::Cur {
            Rights::FD_TELL
        } else {
            Rights::FD_SEEK | Rights::FD_TELL
        };
        let object = self.table().get(fd, needed, Rights::empty())?;
        let ret = unsafe { libc::lseek(object.host_fd(), offset as libc::off_t, nwhence) };
        if ret < 0 {
            return Err(Errno::last_host());
        }
        Ok(ret as u64)
    }

    /// Reports the handle's type, rights, and current descriptor flags.
    pub fn fd_stat_get(&self, fd: Fd) -> Result<FdStat, Errno> {
        let (object, rights_base, rights_inheriting) =
            self.table()
                .get_with_rights(fd, Rights::empty(), Rights::empty())?;
        let fl = host_int(unsafe { libc::fcntl(object.host_fd(), libc::F_GETFL) })?;

        let mut flags = FdFlags::empty();
        if fl & libc::O_APPEND != 0 {
            flags |= FdFlags::APPEND;
        }
        if fl & libc::O_DSYNC != 0 {
            flags |= FdFlags::DSYNC;
        }
        if fl & libc::O_NONBLOCK != 0 {
            flags |= FdFlags::NONBLOCK;
        }
        #[cfg(target_os = "linux")]
        if fl & libc::O_RSYNC != 0 {
            flags |= FdFlags::RSYNC;
        }
        if fl & libc::O_SYNC != 0 {
            flags |= FdFlags::SYNC;
        }
        Ok(FdStat {
            filetype: object.filetype(),
            flags,
            rights_base,
            rights_inheriting,
        })
    }

    /// Replaces descriptor flags or narrows the handle's rights,
    /// depending on `which`.
    pub fn fd_stat_put(&self, fd: Fd, stat: &FdStat, which: FdStatFlags) -> Result<(), Errno> {
        if which == FdStatFlags::FLAGS {
            let mut noflags = 0;
            if stat.flags.contains(FdFlags::APPEND) {
                noflags |= libc::O_APPEND;
            }
            if stat.flags.contains(FdFlags::DSYNC) {
                noflags |= libc::O_DSYNC;
            }
            if stat.flags.contains(FdFlags::NONBLOCK) {
                noflags |= libc::O_NONBLOCK;
            }
            if stat.flags.contains(FdFlags::RSYNC) {
                #[cfg(target_os = "linux")]
                {
                    noflags |= libc::O_RSYNC;
                }
                #[cfg(not(target_os = "linux"))]
                {
                    noflags |= libc::O_SYNC;
                }
            }
            if stat.flags.contains(FdFlags::SYNC) {
                noflags |= libc::O_SYNC;
            }

            let object = self
                .table()
                .get(fd, Rights::FD_STAT_PUT_FLAGS, Rights::empty())?;
            host_int(unsafe { libc::fcntl(object.host_fd(), libc::F_SETFL, noflags) }).map(drop)
        } else if which == FdStatFlags::RIGHTS {
            self.table()
                .restrict(fd, stat.rights_base, stat.rights_inheriting)
        } else {
            Err(Errno::EINVAL)
        }
    }

    /// Flushes file data and metadata to disk.
    pub fn fd_sync(&self, fd: Fd) -> Result<(), Errno> {
        let object = self.table().get(fd, Rights::FD_SYNC, Rights::empty())?;
        host_int(unsafe { libc::fsync(object.host_fd()) }).map(drop)
    }
}
