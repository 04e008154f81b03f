//! Entry points operating on pathnames below directory handles, plus the
//! stat family and directory iteration.

use std::ffi::CStr;
use std::ffi::CString;
use std::mem::MaybeUninit;

use zerocopy::IntoBytes;

use super::host_int;
use crate::abi::Advice;
use crate::abi::DIRCOOKIE_START;
use crate::abi::DirCookie;
use crate::abi::Dirent;
use crate::abi::Errno;
use crate::abi::Fd;
use crate::abi::FdFlags;
use crate::abi::FdStat;
use crate::abi::FileStat;
use crate::abi::FileStatFlags;
use crate::abi::FileType;
use crate::abi::LookupFlags;
use crate::abi::OpenFlags;
use crate::abi::Rights;
use crate::abi::UnlinkFlags;
use crate::fd::infer::determine_type_rights;
use crate::path::path_get;
use crate::path::path_get_nofollow;
use crate::process::Thread;
use crate::time::timespec_from_timestamp;
use crate::time::timestamp_from_timespec;

const TIME_FLAGS: FileStatFlags = FileStatFlags::ATIM
    .union(FileStatFlags::ATIM_NOW)
    .union(FileStatFlags::MTIM)
    .union(FileStatFlags::MTIM_NOW);

impl Thread {
    /// Announces an expected access pattern for a file region.
    pub fn file_advise(&self, fd: Fd, offset: u64, len: u64, advice: Advice) -> Result<(), Errno> {
        #[cfg(any(target_os = "linux", target_os = "freebsd"))]
        {
            let nadvice = match advice {
                Advice::DontNeed => libc::POSIX_FADV_DONTNEED,
                Advice::NoReuse => libc::POSIX_FADV_NOREUSE,
                Advice::Normal => libc::POSIX_FADV_NORMAL,
                Advice::Random => libc::POSIX_FADV_RANDOM,
                Advice::Sequential => libc::POSIX_FADV_SEQUENTIAL,
                Advice::WillNeed => libc::POSIX_FADV_WILLNEED,
            };
            let object = self.table().get(fd, Rights::FILE_ADVISE, Rights::empty())?;
            let ret = unsafe {
                libc::posix_fadvise(
                    object.host_fd(),
                    offset as libc::off_t,
                    len as libc::off_t,
                    nadvice,
                )
            };
            if ret != 0 {
                return Err(Errno::from_host(ret));
            }
            Ok(())
        }
        #[cfg(not(any(target_os = "linux", target_os = "freebsd")))]
        {
            // Advice can safely be ignored where the host has no
            // posix_fadvise; still validate the handle and its rights.
            let _ = (offset, len, advice);
            self.table()
                .get(fd, Rights::FILE_ADVISE, Rights::empty())
                .map(drop)
        }
    }

    /// Preallocates space so writes in the region cannot fail for lack of
    /// it.
    pub fn file_allocate(&self, fd: Fd, offset: u64, len: u64) -> Result<(), Errno> {
        let object = self
            .table()
            .get(fd, Rights::FILE_ALLOCATE, Rights::empty())?;
        #[cfg(any(target_os = "linux", target_os = "freebsd"))]
        {
            let ret = unsafe {
                libc::posix_fallocate(object.host_fd(), offset as libc::off_t, len as libc::off_t)
            };
            if ret != 0 {
                return Err(Errno::from_host(ret));
            }
            Ok(())
        }
        #[cfg(not(any(target_os = "linux", target_os = "freebsd")))]
        {
            // Without posix_fallocate, at least grow the file to the
            // requested size. This cannot be done free of races.
            let mut sb = MaybeUninit::<libc::stat>::uninit();
            host_int(unsafe { libc::fstat(object.host_fd(), sb.as_mut_ptr()) })?;
            let sb = unsafe { sb.assume_init() };
            if (sb.st_size as u64) < offset + len {
                host_int(unsafe {
                    libc::ftruncate(object.host_fd(), (offset + len) as libc::off_t)
                })?;
            }
            Ok(())
        }
    }

    /// Creates a filesystem object below a directory handle. Directories
    /// are the only type that can be created this way.
    pub fn file_create(&self, dirfd: Fd, path: &[u8], filetype: FileType) -> Result<(), Errno> {
        match filetype {
            FileType::Directory => {
                let pa = path_get_nofollow(
                    self.table(),
                    dirfd,
                    path,
                    Rights::FILE_CREATE_DIRECTORY,
                    Rights::empty(),
                    true,
                )?;
                host_int(unsafe { libc::mkdirat(pa.dirfd(), pa.path().as_ptr(), 0o777) })
                    .map(drop)
            }
            _ => Err(Errno::EINVAL),
        }
    }

    /// Creates a hard link. Both paths are resolved and held for the
    /// duration of the call.
    pub fn file_link(
        &self,
        src_dir: Fd,
        src_flags: LookupFlags,
        src_path: &[u8],
        new_dir: Fd,
        new_path: &[u8],
    ) -> Result<(), Errno> {
        let pa1 = path_get(
            self.table(),
            src_dir,
            src_flags,
            src_path,
            Rights::FILE_LINK_SOURCE,
            Rights::empty(),
            false,
        )?;
        let pa2 = path_get_nofollow(
            self.table(),
            new_dir,
            new_path,
            Rights::FILE_LINK_TARGET,
            Rights::empty(),
            true,
        )?;

        let mut ret = unsafe {
            libc::linkat(
                pa1.dirfd(),
                pa1.path().as_ptr(),
                pa2.dirfd(),
                pa2.path().as_ptr(),
                if pa1.follow() { libc::AT_SYMLINK_FOLLOW } else { 0 },
            )
        };
        if ret < 0 && Errno::last_host() == Errno::ENOTSUP && !pa1.follow() {
            // Some hosts refuse hard links to symlinks; duplicate the
            // link instead.
            if let Ok(target) = read_link_target(pa1.dirfd(), pa1.path()) {
                ret = unsafe { libc::symlinkat(target.as_ptr(), pa2.dirfd(), pa2.path().as_ptr()) };
            }
        }
        host_int(ret).map(drop)
    }

    /// Opens a file below a directory handle, deriving a new handle whose
    /// rights are the requested ones clipped to what the resulting file
    /// type can support.
    pub fn file_open(
        &self,
        dirfd: Fd,
        dirflags: LookupFlags,
        path: &[u8],
        oflags: OpenFlags,
        stat: &FdStat,
    ) -> Result<Fd, Errno> {
        let rights_base = stat.rights_base;
        let rights_inheriting = stat.rights_inheriting;

        // Pick the host access mode that can satisfy the requested
        // rights.
        let read = rights_base
            .intersects(Rights::FD_READ | Rights::FILE_READDIR | Rights::MEM_MAP_EXEC);
        let write = rights_base.intersects(
            Rights::FD_DATASYNC
                | Rights::FD_WRITE
                | Rights::FILE_ALLOCATE
                | Rights::FILE_STAT_FPUT_SIZE,
        );
        let mut noflags = if write {
            if read { libc::O_RDWR } else { libc::O_WRONLY }
        } else {
            libc::O_RDONLY
        };

        // Rights that must be present on the directory handle.
        let mut needed_base = Rights::FILE_OPEN;
        let mut needed_inheriting = rights_base | rights_inheriting;

        if oflags.contains(OpenFlags::CREAT) {
            noflags |= libc::O_CREAT;
            needed_base |= Rights::FILE_CREATE_FILE;
        }
        if oflags.contains(OpenFlags::DIRECTORY) {
            noflags |= libc::O_DIRECTORY;
        }
        if oflags.contains(OpenFlags::EXCL) {
            noflags |= libc::O_EXCL;
        }
        if oflags.contains(OpenFlags::TRUNC) {
            noflags |= libc::O_TRUNC;
            needed_inheriting |= Rights::FILE_STAT_FPUT_SIZE;
        }

        if stat.flags.contains(FdFlags::APPEND) {
            noflags |= libc::O_APPEND;
        }
        if stat.flags.contains(FdFlags::DSYNC) {
            noflags |= libc::O_DSYNC;
            needed_inheriting |= Rights::FD_DATASYNC;
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
            needed_inheriting |= Rights::FD_SYNC;
        }
        if stat.flags.contains(FdFlags::SYNC) {
            noflags |= libc::O_SYNC;
            needed_inheriting |= Rights::FD_SYNC;
        }
        if write && noflags & (libc::O_APPEND | libc::O_TRUNC) == 0 {
            needed_inheriting |= Rights::FD_SEEK;
        }

        let pa = path_get(
            self.table(),
            dirfd,
            dirflags,
            path,
            needed_base,
            needed_inheriting,
            oflags.contains(OpenFlags::CREAT),
        )?;
        if !pa.follow() {
            noflags |= libc::O_NOFOLLOW;
        }

        let new_fd = unsafe { libc::openat(pa.dirfd(), pa.path().as_ptr(), noflags, 0o777) };
        if new_fd < 0 {
            let err = Errno::last_host();
            if err == Errno::ENXIO {
                // Some hosts report "no such device or address" when
                // opening a socket; the ABI wants "not supported" there.
                let mut sb = MaybeUninit::<libc::stat>::uninit();
                let ret = unsafe {
                    libc::fstatat(
                        pa.dirfd(),
                        pa.path().as_ptr(),
                        sb.as_mut_ptr(),
                        if pa.follow() { 0 } else { libc::AT_SYMLINK_NOFOLLOW },
                    )
                };
                let is_socket = ret == 0
                    && unsafe { sb.assume_init() }.st_mode & libc::S_IFMT == libc::S_IFSOCK;
                return Err(if is_socket { Errno::ENOTSUP } else { Errno::ENXIO });
            }
            // Hosts that report EMLINK for a refused symlink mean ELOOP.
            if !pa.follow() && err == Errno::EMLINK {
                return Err(Errno::ELOOP);
            }
            return Err(err);
        }
        drop(pa);

        // Clip the requested rights to what the opened file can support.
        let (filetype, max_base, max_inheriting) = match determine_type_rights(new_fd) {
            Ok(t) => t,
            Err(err) => {
                unsafe { libc::close(new_fd) };
                return Err(err);
            }
        };
        self.table().insert_host_fd(
            new_fd,
            filetype,
            rights_base & max_base,
            rights_inheriting & max_inheriting,
        )
    }

    /// Reads directory entries into `buf` starting at `cookie`, returning
    /// the number of bytes written. Entries that do not fit are
    /// truncated; a full buffer means the caller should come back with
    /// the last entry's `next` cookie.
    pub fn file_readdir(&self, fd: Fd, buf: &mut [u8], cookie: DirCookie) -> Result<usize, Errno> {
        let object = self.table().get(fd, Rights::FILE_READDIR, Rights::empty())?;

        let mut state = object.dir_state();
        let dp = state.ensure_stream(object.host_fd())?;

        if state.cookie != cookie {
            if cookie == DIRCOOKIE_START {
                unsafe { libc::rewinddir(dp) };
            } else {
                unsafe { libc::seekdir(dp, cookie as libc::c_long) };
            }
            state.cookie = cookie;
        }

        let mut used = 0;
        while used < buf.len() {
            nix::errno::Errno::clear();
            let entry = unsafe { libc::readdir(dp) };
            if entry.is_null() {
                let err = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
                if err == 0 || used > 0 {
                    break;
                }
                return Err(Errno::from_host(err));
            }
            state.cookie = unsafe { libc::telldir(dp) } as DirCookie;

            let entry = unsafe { &*entry };
            let name = unsafe { CStr::from_ptr(entry.d_name.as_ptr()) }.to_bytes();
            let header = Dirent::new(
                state.cookie,
                entry.d_ino as u64,
                name.len() as u32,
                filetype_from_dirent(entry.d_type),
            );
            readdir_put(buf, &mut used, header.as_bytes());
            readdir_put(buf, &mut used, name);
        }
        Ok(used)
    }

    /// Reads a symlink target into `buf`, truncating silently, and
    /// returns the number of bytes stored.
    pub fn file_readlink(&self, fd: Fd, path: &[u8], buf: &mut [u8]) -> Result<usize, Errno> {
        let pa = path_get_nofollow(
            self.table(),
            fd,
            path,
            Rights::FILE_READLINK,
            Rights::empty(),
            false,
        )?;

        // Some hosts insist on a positive buffer size; substitute a
        // scratch byte when the caller passed none.
        let mut scratch = [0u8; 1];
        let (ptr, len) = if buf.is_empty() {
            (scratch.as_mut_ptr(), scratch.len())
        } else {
            (buf.as_mut_ptr(), buf.len())
        };
        let ret = unsafe { libc::readlinkat(pa.dirfd(), pa.path().as_ptr(), ptr.cast(), len) };
        if ret < 0 {
            return Err(Errno::last_host());
        }
        Ok(std::cmp::min(ret as usize, buf.len()))
    }

    /// Renames a file from one confined location to another.
    pub fn file_rename(
        &self,
        old_dir: Fd,
        old_path: &[u8],
        new_dir: Fd,
        new_path: &[u8],
    ) -> Result<(), Errno> {
        let pa1 = path_get_nofollow(
            self.table(),
            old_dir,
            old_path,
            Rights::FILE_RENAME_SOURCE,
            Rights::empty(),
            true,
        )?;
        let pa2 = path_get_nofollow(
            self.table(),
            new_dir,
            new_path,
            Rights::FILE_RENAME_TARGET,
            Rights::empty(),
            true,
        )?;
        let ret = unsafe {
            libc::renameat(
                pa1.dirfd(),
                pa1.path().as_ptr(),
                pa2.dirfd(),
                pa2.path().as_ptr(),
            )
        };
        if ret < 0 {
            // Some hosts report EBUSY where EINVAL describes the problem.
            let err = Errno::last_host();
            return Err(if err == Errno::EBUSY { Errno::EINVAL } else { err });
        }
        Ok(())
    }

    /// Reports the attributes of the file behind a handle.
    pub fn file_stat_fget(&self, fd: Fd) -> Result<FileStat, Errno> {
        let object = self
            .table()
            .get(fd, Rights::FILE_STAT_FGET, Rights::empty())?;
        let mut sb = MaybeUninit::<libc::stat>::uninit();
        host_int(unsafe { libc::fstat(object.host_fd(), sb.as_mut_ptr()) })?;
        let mut stat = filestat_from_host(&unsafe { sb.assume_init() });
        // The handle knows its type more precisely than the mode bits do.
        stat.filetype = object.filetype();
        Ok(stat)
    }

    /// Truncates the file or updates its timestamps through a handle.
    /// Size and time updates are mutually exclusive.
    pub fn file_stat_fput(
        &self,
        fd: Fd,
        stat: &FileStat,
        flags: FileStatFlags,
    ) -> Result<(), Errno> {
        if flags.contains(FileStatFlags::SIZE) {
            if !(flags - FileStatFlags::SIZE).is_empty() {
                return Err(Errno::EINVAL);
            }
            let object = self
                .table()
                .get(fd, Rights::FILE_STAT_FPUT_SIZE, Rights::empty())?;
            host_int(unsafe { libc::ftruncate(object.host_fd(), stat.size as libc::off_t) })
                .map(drop)
        } else if flags.intersects(TIME_FLAGS) {
            if !(flags - TIME_FLAGS).is_empty() {
                return Err(Errno::EINVAL);
            }
            let object = self
                .table()
                .get(fd, Rights::FILE_STAT_FPUT_TIMES, Rights::empty())?;
            let times = utimens_args(stat, flags);
            host_int(unsafe { libc::futimens(object.host_fd(), times.as_ptr()) }).map(drop)
        } else {
            Err(Errno::EINVAL)
        }
    }

    /// Reports the attributes of a file below a directory handle.
    pub fn file_stat_get(
        &self,
        dirfd: Fd,
        flags: LookupFlags,
        path: &[u8],
    ) -> Result<FileStat, Errno> {
        let pa = path_get(
            self.table(),
            dirfd,
            flags,
            path,
            Rights::FILE_STAT_GET,
            Rights::empty(),
            false,
        )?;
        let mut sb = MaybeUninit::<libc::stat>::uninit();
        host_int(unsafe {
            libc::fstatat(
                pa.dirfd(),
                pa.path().as_ptr(),
                sb.as_mut_ptr(),
                if pa.follow() { 0 } else { libc::AT_SYMLINK_NOFOLLOW },
            )
        })?;
        let sb = unsafe { sb.assume_init() };
        let mut stat = filestat_from_host(&sb);
        stat.filetype = filetype_from_mode(sb.st_mode);
        Ok(stat)
    }

    /// Updates the timestamps of a file below a directory handle.
    pub fn file_stat_put(
        &self,
        dirfd: Fd,
        flags: LookupFlags,
        path: &[u8],
        stat: &FileStat,
        fsflags: FileStatFlags,
    ) -> Result<(), Errno> {
        if !(fsflags - TIME_FLAGS).is_empty() {
            return Err(Errno::EINVAL);
        }
        let pa = path_get(
            self.table(),
            dirfd,
            flags,
            path,
            Rights::FILE_STAT_PUT_TIMES,
            Rights::empty(),
            false,
        )?;
        let times = utimens_args(stat, fsflags);
        host_int(unsafe {
            libc::utimensat(
                pa.dirfd(),
                pa.path().as_ptr(),
                times.as_ptr(),
                if pa.follow() { 0 } else { libc::AT_SYMLINK_NOFOLLOW },
            )
        })
        .map(drop)
    }

    /// Creates a symbolic link below a directory handle.
    pub fn file_symlink(&self, target: &[u8], dirfd: Fd, path: &[u8]) -> Result<(), Errno> {
        let target = CString::new(target).map_err(|_| Errno::EINVAL)?;
        let pa = path_get_nofollow(
            self.table(),
            dirfd,
            path,
            Rights::FILE_SYMLINK,
            Rights::empty(),
            true,
        )?;
        host_int(unsafe { libc::symlinkat(target.as_ptr(), pa.dirfd(), pa.path().as_ptr()) })
            .map(drop)
    }

    /// Removes a file or, with [`UnlinkFlags::REMOVEDIR`], a directory.
    pub fn file_unlink(&self, dirfd: Fd, path: &[u8], flags: UnlinkFlags) -> Result<(), Errno> {
        let pa = path_get_nofollow(
            self.table(),
            dirfd,
            path,
            Rights::FILE_UNLINK,
            Rights::empty(),
            true,
        )?;
        let ret = unsafe {
            libc::unlinkat(
                pa.dirfd(),
                pa.path().as_ptr(),
                if flags.contains(UnlinkFlags::REMOVEDIR) {
                    libc::AT_REMOVEDIR
                } else {
                    0
                },
            )
        };
        if ret < 0 {
            // Removing a directory without REMOVEDIR is a permission
            // problem in ABI terms, not EISDIR.
            let err = Errno::last_host();
            return Err(if err == Errno::EISDIR { Errno::EPERM } else { err });
        }
        Ok(())
    }
}

/// Copies as much of `elem` as still fits into `buf`.
fn readdir_put(buf: &mut [u8], used: &mut usize, elem: &[u8]) {
    let avail = buf.len() - *used;
    let n = std::cmp::min(avail, elem.len());
    buf[*used..*used + n].copy_from_slice(&elem[..n]);
    *used += n;
}

fn filetype_from_dirent(d_type: u8) -> FileType {
    match d_type {
        libc::DT_BLK => FileType::BlockDevice,
        libc::DT_CHR => FileType::CharacterDevice,
        libc::DT_DIR => FileType::Directory,
        libc::DT_FIFO => FileType::SocketStream,
        libc::DT_LNK => FileType::SymbolicLink,
        libc::DT_REG => FileType::RegularFile,
        // Not necessarily a stream socket, but the closest type the ABI
        // can report without another stat.
        libc::DT_SOCK => FileType::SocketStream,
        _ => FileType::Unknown,
    }
}

fn filetype_from_mode(mode: libc::mode_t) -> FileType {
    match mode & libc::S_IFMT {
        libc::S_IFBLK => FileType::BlockDevice,
        libc::S_IFCHR => FileType::CharacterDevice,
        libc::S_IFDIR => FileType::Directory,
        libc::S_IFIFO => FileType::SocketStream,
        libc::S_IFLNK => FileType::SymbolicLink,
        libc::S_IFREG => FileType::RegularFile,
        // The exact socket type cannot be determined from a stat.
        libc::S_IFSOCK => FileType::SocketStream,
        _ => FileType::Unknown,
    }
}

fn filestat_from_host(sb: &libc::stat) -> FileStat {
    FileStat {
        dev: sb.st_dev as u64,
        ino: sb.st_ino as u64,
        filetype: FileType::Unknown,
        nlink: sb.st_nlink as u32,
        size: sb.st_size as u64,
        atim: timestamp_from_timespec(&libc::timespec {
            tv_sec: sb.st_atime,
            tv_nsec: sb.st_atime_nsec,
        }),
        mtim: timestamp_from_timespec(&libc::timespec {
            tv_sec: sb.st_mtime,
            tv_nsec: sb.st_mtime_nsec,
        }),
        ctim: timestamp_from_timespec(&libc::timespec {
            tv_sec: sb.st_ctime,
            tv_nsec: sb.st_ctime_nsec,
        }),
    }
}

/// Converts requested timestamps and flags into the argument pair for
/// futimens/utimensat, using the host's omit/now sentinels for absent
/// bits.
fn utimens_args(stat: &FileStat, flags: FileStatFlags) -> [libc::timespec; 2] {
    let pick = |set: FileStatFlags, now: FileStatFlags, value| {
        if flags.contains(now) {
            libc::timespec {
                tv_sec: 0,
                tv_nsec: libc::UTIME_NOW,
            }
        } else if flags.contains(set) {
            timespec_from_timestamp(value)
        } else {
            libc::timespec {
                tv_sec: 0,
                tv_nsec: libc::UTIME_OMIT,
            }
        }
    };
    [
        pick(FileStatFlags::ATIM, FileStatFlags::ATIM_NOW, stat.atim),
        pick(FileStatFlags::MTIM, FileStatFlags::MTIM_NOW, stat.mtim),
    ]
}

/// Reads a symlink target for the hard-link fallback.
fn read_link_target(dirfd: libc::c_int, path: &CStr) -> Result<CString, Errno> {
    let mut len = 64usize;
    loop {
        let mut buf = vec![0u8; len];
        let ret =
            unsafe { libc::readlinkat(dirfd, path.as_ptr(), buf.as_mut_ptr().cast(), len) };
        if ret < 0 {
            return Err(Errno::last_host());
        }
        let n = ret as usize;
        if n < len {
            buf.truncate(n);
            return CString::new(buf).map_err(|_| Errno::EINVAL);
        }
        len *= 2;
    }
}
