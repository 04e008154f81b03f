//! Socket entry points, including SCM_RIGHTS translation between host
//! control messages and the ABI's inline descriptor vectors.

use std::io::IoSlice;
use std::io::IoSliceMut;
use std::mem;
use std::ptr;
use std::sync::Arc;

use smallvec::SmallVec;

use super::iovec_mut_ptr;
use super::iovec_ptr;
use crate::abi::Errno;
use crate::abi::Fd;
use crate::abi::RecvFlags;
use crate::abi::RecvOutFlags;
use crate::abi::Rights;
use crate::abi::ShutdownFlags;
use crate::fd::infer::determine_type_rights;
use crate::fd::object::FdObject;
use crate::process::Thread;

/// What `sock_recv` delivered.
#[derive(Debug, Clone, Copy, Default)]
pub struct SockRecvOut {
    /// Bytes of regular data received.
    pub datalen: usize,
    /// Handles installed into the leading slots of the caller's fd
    /// buffer. Slots whose descriptor could not be installed hold
    /// [`Fd::INVALID`].
    pub nfds: usize,
    /// Truncation indicators.
    pub flags: RecvOutFlags,
}

impl Thread {
    /// Receives data and, optionally, descriptors from a socket.
    /// Delivered descriptors are installed as new handles with their
    /// inferred maximal rights.
    pub fn sock_recv(
        &self,
        sock: Fd,
        data: &mut [IoSliceMut<'_>],
        fds: &mut [Fd],
        flags: RecvFlags,
    ) -> Result<SockRecvOut, Errno> {
        let mut nflags = 0;
        if flags.contains(RecvFlags::PEEK) {
            nflags |= libc::MSG_PEEK;
        }
        if flags.contains(RecvFlags::WAITALL) {
            nflags |= libc::MSG_WAITALL;
        }

        let mut hdr: libc::msghdr = unsafe { mem::zeroed() };
        hdr.msg_iov = iovec_mut_ptr(data);
        hdr.msg_iovlen = data.len() as _;

        // Room for one SCM_RIGHTS message holding the requested number of
        // descriptors.
        let mut control = Vec::new();
        if !fds.is_empty() {
            let space = unsafe {
                libc::CMSG_SPACE((fds.len() * size_of::<libc::c_int>()) as libc::c_uint)
            };
            control = vec![0u8; space as usize];
            hdr.msg_control = control.as_mut_ptr().cast();
            hdr.msg_controllen = control.len() as _;
        }

        let object = self.table().get(sock, Rights::FD_READ, Rights::empty())?;
        let datalen = unsafe { libc::recvmsg(object.host_fd(), &mut hdr, nflags) };
        drop(object);
        if datalen < 0 {
            return Err(Errno::last_host());
        }

        // Install every delivered descriptor; ones that cannot be
        // installed are closed and reported as the invalid handle.
        let mut nfds = 0;
        unsafe {
            let mut chdr = libc::CMSG_FIRSTHDR(&hdr);
            while !chdr.is_null() {
                if (*chdr).cmsg_level == libc::SOL_SOCKET && (*chdr).cmsg_type == libc::SCM_RIGHTS
                {
                    let count = ((*chdr).cmsg_len as usize - libc::CMSG_LEN(0) as usize)
                        / size_of::<libc::c_int>();
                    let data_ptr = libc::CMSG_DATA(chdr);
                    for i in 0..count {
                        let host_fd = ptr::read_unaligned(
                            data_ptr.add(i * size_of::<libc::c_int>()) as *const libc::c_int,
                        );
                        let slot = match determine_type_rights(host_fd) {
                            Ok((filetype, base, inheriting)) => self
                                .table()
                                .insert_host_fd(host_fd, filetype, base, inheriting)
                                .unwrap_or(Fd::INVALID),
                            Err(_) => {
                                libc::close(host_fd);
                                Fd::INVALID
                            }
                        };
                        if nfds < fds.len() {
                            fds[nfds] = slot;
                            nfds += 1;
                        }
                    }
                }
                chdr = libc::CMSG_NXTHDR(&mut hdr, chdr);
            }
        }

        let mut out_flags = RecvOutFlags::empty();
        if hdr.msg_flags & libc::MSG_CTRUNC != 0 {
            out_flags |= RecvOutFlags::FDS_TRUNCATED;
        }
        if hdr.msg_flags & libc::MSG_TRUNC != 0 {
            out_flags |= RecvOutFlags::DATA_TRUNCATED;
        }
        Ok(SockRecvOut {
            datalen: datalen as usize,
            nfds,
            flags: out_flags,
        })
    }

    /// Sends data and, optionally, handles over a socket. Every handle's
    /// object is kept referenced until the host call finishes.
    pub fn sock_send(&self, sock: Fd, data: &[IoSlice<'_>], fds: &[Fd]) -> Result<usize, Errno> {
        let mut hdr: libc::msghdr = unsafe { mem::zeroed() };
        hdr.msg_iov = iovec_ptr(data).cast_mut();
        hdr.msg_iovlen = data.len() as _;

        let mut control = Vec::new();
        let mut objects: SmallVec<[Arc<FdObject>; 4]> = SmallVec::new();
        if !fds.is_empty() {
            let space = unsafe {
                libc::CMSG_SPACE((fds.len() * size_of::<libc::c_int>()) as libc::c_uint)
            };
            control = vec![0u8; space as usize];
            hdr.msg_control = control.as_mut_ptr().cast();
            hdr.msg_controllen = control.len() as _;

            unsafe {
                let chdr = libc::CMSG_FIRSTHDR(&hdr);
                (*chdr).cmsg_len =
                    libc::CMSG_LEN((fds.len() * size_of::<libc::c_int>()) as libc::c_uint) as _;
                (*chdr).cmsg_level = libc::SOL_SOCKET;
                (*chdr).cmsg_type = libc::SCM_RIGHTS;
                let data_ptr = libc::CMSG_DATA(chdr);

                // One shared lock section covers all referenced handles.
                let slots = self.table().read();
                for (i, &fd) in fds.iter().enumerate() {
                    let entry = slots.entry(fd, Rights::empty(), Rights::empty())?;
                    let host_fd = entry.object.try_host_fd().ok_or(Errno::EBADF)?;
                    ptr::write_unaligned(
                        data_ptr.add(i * size_of::<libc::c_int>()) as *mut libc::c_int,
                        host_fd,
                    );
                    objects.push(Arc::clone(&entry.object));
                }
            }
        }

        let object = self.table().get(sock, Rights::FD_WRITE, Rights::empty())?;
        let len = unsafe { libc::sendmsg(object.host_fd(), &hdr, 0) };
        drop(object);
        drop(objects);
        if len < 0 {
            return Err(Errno::last_host());
        }
        Ok(len as usize)
    }

    /// Disables sends and/or receives on a socket.
    pub fn sock_shutdown(&self, sock: Fd, how: ShutdownFlags) -> Result<(), Errno> {
        let nhow = if how == ShutdownFlags::RD {
            libc::SHUT_RD
        } else if how == ShutdownFlags::WR {
            libc::SHUT_WR
        } else if how == ShutdownFlags::RD | ShutdownFlags::WR {
            libc::SHUT_RDWR
        } else {
            return Err(Errno::EINVAL);
        };

        let object = self
            .table()
            .get(sock, Rights::SOCK_SHUTDOWN, Rights::empty())?;
        let ret = unsafe { libc::shutdown(object.host_fd(), nhow) };
        if ret < 0 {
            return Err(Errno::last_host());
        }
        Ok(())
    }
}
