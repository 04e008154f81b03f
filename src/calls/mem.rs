//! Memory mapping entry points.
//!
//! These operate on raw guest addresses and are `unsafe` for the same
//! reason `mmap` itself is: the caller vouches that the addresses do not
//! alias memory the Rust side cares about.

use libc::c_void;

use super::host_int;
use crate::abi::Advice;
use crate::abi::Errno;
use crate::abi::Fd;
use crate::abi::MapFlags;
use crate::abi::MemProt;
use crate::abi::Rights;
use crate::abi::SyncFlags;
use crate::process::Thread;

/// Translates protection bits, rejecting simultaneously writable and
/// executable mappings.
fn prot_to_host(prot: MemProt) -> Result<libc::c_int, Errno> {
    if prot.contains(MemProt::WRITE) && prot.contains(MemProt::EXEC) {
        return Err(Errno::ENOTSUP);
    }
    let mut nprot = 0;
    if prot.contains(MemProt::READ) {
        nprot |= libc::PROT_READ;
    }
    if prot.contains(MemProt::WRITE) {
        nprot |= libc::PROT_WRITE;
    }
    if prot.contains(MemProt::EXEC) {
        nprot |= libc::PROT_EXEC;
    }
    Ok(nprot)
}

impl Thread {
    /// Announces an expected access pattern for a memory region.
    ///
    /// # Safety
    ///
    /// `addr..addr+len` must be a mapped region.
    pub unsafe fn mem_advise(
        &self,
        addr: *mut c_void,
        len: usize,
        advice: Advice,
    ) -> Result<(), Errno> {
        let nadvice = match advice {
            Advice::DontNeed => libc::POSIX_MADV_DONTNEED,
            Advice::Normal => libc::POSIX_MADV_NORMAL,
            Advice::Random => libc::POSIX_MADV_RANDOM,
            Advice::Sequential => libc::POSIX_MADV_SEQUENTIAL,
            Advice::WillNeed => libc::POSIX_MADV_WILLNEED,
            // There is no memory equivalent of noreuse advice.
            Advice::NoReuse => return Err(Errno::EINVAL),
        };
        let ret = unsafe { libc::posix_madvise(addr, len, nadvice) };
        if ret != 0 {
            return Err(Errno::from_host(ret));
        }
        Ok(())
    }

    /// Maps memory, either anonymous (the handle must be the reserved
    /// invalid value and the offset zero) or backed by a mappable handle.
    ///
    /// # Safety
    ///
    /// As for `mmap`: a fixed mapping may replace existing mappings at
    /// `addr`.
    pub unsafe fn mem_map(
        &self,
        addr: *mut c_void,
        len: usize,
        prot: MemProt,
        flags: MapFlags,
        fd: Fd,
        offset: u64,
    ) -> Result<*mut c_void, Errno> {
        let nprot = prot_to_host(prot)?;
        let mut nflags = 0;
        if flags.contains(MapFlags::FIXED) {
            nflags |= libc::MAP_FIXED;
        }
        match (
            flags.contains(MapFlags::PRIVATE),
            flags.contains(MapFlags::SHARED),
        ) {
            (true, false) => nflags |= libc::MAP_PRIVATE,
            (false, true) => nflags |= libc::MAP_SHARED,
            _ => return Err(Errno::EINVAL),
        }

        let ret = if flags.contains(MapFlags::ANON) {
            if fd != Fd::INVALID || offset != 0 {
                return Err(Errno::EINVAL);
            }
            unsafe { libc::mmap(addr, len, nprot, nflags | libc::MAP_ANON, -1, 0) }
        } else {
            // The backing handle must grant mapping with the requested
            // protection.
            let mut needed = Rights::MEM_MAP;
            if prot.contains(MemProt::EXEC) {
                needed |= Rights::MEM_MAP_EXEC;
            }
            let object = self.table().get(fd, needed, Rights::empty())?;
            unsafe {
                libc::mmap(
                    addr,
                    len,
                    nprot,
                    nflags,
                    object.host_fd(),
                    offset as libc::off_t,
                )
            }
        };
        if ret == libc::MAP_FAILED {
            return Err(Errno::last_host());
        }
        Ok(ret)
    }

    /// Changes the protection of a mapped region.
    ///
    /// # Safety
    ///
    /// `addr..addr+len` must be a mapped region.
    pub unsafe fn mem_protect(
        &self,
        addr: *mut c_void,
        len: usize,
        prot: MemProt,
    ) -> Result<(), Errno> {
        let nprot = prot_to_host(prot)?;
        host_int(unsafe { libc::mprotect(addr, len, nprot) }).map(drop)
    }

    /// Writes modified pages of a shared mapping back to their file.
    ///
    /// # Safety
    ///
    /// `addr..addr+len` must be a mapped region.
    pub unsafe fn mem_sync(
        &self,
        addr: *mut c_void,
        len: usize,
        flags: SyncFlags,
    ) -> Result<(), Errno> {
        let mut nflags = match (
            flags.contains(SyncFlags::ASYNC),
            flags.contains(SyncFlags::SYNC),
        ) {
            (true, false) => libc::MS_ASYNC,
            (false, true) => libc::MS_SYNC,
            _ => return Err(Errno::EINVAL),
        };
        if flags.contains(SyncFlags::INVALIDATE) {
            nflags |= libc::MS_INVALIDATE;
        }
        host_int(unsafe { libc::msync(addr, len, nflags) }).map(drop)
    }

    /// Removes a mapping.
    ///
    /// # Safety
    ///
    /// `addr..addr+len` must be a mapped region no longer in use.
    pub unsafe fn mem_unmap(&self, addr: *mut c_void, len: usize) -> Result<(), Errno> {
        host_int(unsafe { libc::munmap(addr, len) }).map(drop)
    }
}
