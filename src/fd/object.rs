//! The reference-counted kernel object a handle points at.

use std::os::unix::io::RawFd;

use parking_lot::Mutex;
use parking_lot::MutexGuard;

use crate::abi::DIRCOOKIE_START;
use crate::abi::DirCookie;
use crate::abi::Errno;
use crate::abi::FileType;

/// A handle's backing object.
///
/// Shared ownership is expressed with `Arc`: every table slot and every
/// in-flight lookup holds one reference, and the host resources are torn
/// down when the last reference drops.
#[derive(Debug)]
pub(crate) struct FdObject {
    filetype: FileType,
    /// The host descriptor. Negative means the object is virtual and has
    /// no host descriptor behind it.
    number: RawFd,
    /// Directory state, meaningful only for directory-typed objects.
    dir: Mutex<DirState>,
}

/// Lazily opened directory stream plus its read cursor.
#[derive(Debug)]
pub(crate) struct DirState {
    stream: Option<DirStream>,
    pub(crate) cookie: DirCookie,
}

/// An open host directory stream.
///
/// Closing the stream also closes the descriptor it was opened over, so
/// an object that has one never closes its descriptor separately.
#[derive(Debug)]
pub(crate) struct DirStream(*mut libc::DIR);

// The stream is only touched under the owning object's mutex.
unsafe impl Send for DirStream {}

impl FdObject {
    pub(crate) fn new(filetype: FileType, number: RawFd) -> FdObject {
        FdObject {
            filetype,
            number,
            dir: Mutex::new(DirState {
                stream: None,
                cookie: DIRCOOKIE_START,
            }),
        }
    }

    pub(crate) fn filetype(&self) -> FileType {
        self.filetype
    }

    /// The underlying host descriptor.
    ///
    /// # Panics
    ///
    /// Panics if the object is virtual.
    pub(crate) fn host_fd(&self) -> RawFd {
        assert!(
            self.number >= 0,
            "host descriptor requested for a virtual handle"
        );
        self.number
    }

    /// The underlying host descriptor, or `None` for a virtual object.
    pub(crate) fn try_host_fd(&self) -> Option<RawFd> {
        (self.number >= 0).then_some(self.number)
    }

    /// Locks and returns the directory state.
    pub(crate) fn dir_state(&self) -> MutexGuard<'_, DirState> {
        self.dir.lock()
    }
}

impl DirState {
    /// Returns the directory stream, opening it over `host_fd` on first
    /// use and placing the cursor at the start of the directory.
    pub(crate) fn ensure_stream(&mut self, host_fd: RawFd) -> Result<*mut libc::DIR, Errno> {
        if let Some(ref stream) = self.stream {
            return Ok(stream.0);
        }
        let dp = unsafe { libc::fdopendir(host_fd) };
        if dp.is_null() {
            return Err(Errno::last_host());
        }
        self.stream = Some(DirStream(dp));
        self.cookie = DIRCOOKIE_START;
        Ok(dp)
    }
}

impl Drop for FdObject {
    fn drop(&mut self) {
        let state = self.dir.get_mut();
        if state.stream.is_none() && self.number >= 0 {
            unsafe { libc::close(self.number) };
        }
        // Otherwise the stream's own drop closes the descriptor.
    }
}

impl Drop for DirStream {
    fn drop(&mut self) {
        unsafe { libc::closedir(self.0) };
    }
}
