//! The system call surface.
//!
//! Every entry point follows the same shape: validate argument shape,
//! acquire a lease (a table lookup or a path lease), issue the host
//! call, translate the error, release the lease. Leases are guard
//! values, so release happens on every path.

pub(crate) mod fd;
pub(crate) mod file;
pub(crate) mod mem;
pub(crate) mod proc;
pub(crate) mod sock;

use std::io::IoSlice;
use std::io::IoSliceMut;

use crate::abi::Errno;

/// Checks the return value of a host call returning an int.
pub(crate) fn host_int(ret: libc::c_int) -> Result<libc::c_int, Errno> {
    if ret < 0 { Err(Errno::last_host()) } else { Ok(ret) }
}

/// Checks the return value of a host call returning a byte count.
pub(crate) fn host_len(ret: libc::ssize_t) -> Result<usize, Errno> {
    if ret < 0 {
        Err(Errno::last_host())
    } else {
        Ok(ret as usize)
    }
}

// IoSlice and IoSliceMut are guaranteed ABI compatible with iovec.

pub(crate) fn iovec_ptr(iov: &[IoSlice<'_>]) -> *const libc::iovec {
    iov.as_ptr().cast()
}

pub(crate) fn iovec_mut_ptr(iov: &mut [IoSliceMut<'_>]) -> *mut libc::iovec {
    iov.as_mut_ptr().cast()
}
