//! Determines the ABI type of a host descriptor and the maximal rights
//! the ABI grants a handle of that type.

use std::mem::MaybeUninit;
use std::os::unix::io::RawFd;

use crate::abi::Errno;
use crate::abi::FileType;
use crate::abi::Rights;

/// Inspects a host descriptor and returns its ABI type together with the
/// widest base/inheriting right pair a handle to it may carry.
///
/// Read-only descriptors lose the write right and write-only descriptors
/// lose the read right, so a handle can never authorize more than the
/// host descriptor itself allows.
pub(crate) fn determine_type_rights(fd: RawFd) -> Result<(FileType, Rights, Rights), Errno> {
    let mut sb = MaybeUninit::<libc::stat>::uninit();
    if unsafe { libc::fstat(fd, sb.as_mut_ptr()) } < 0 {
        return Err(Errno::last_host());
    }
    let sb = unsafe { sb.assume_init() };

    let (filetype, mut base, inheriting) = match sb.st_mode & libc::S_IFMT {
        libc::S_IFBLK => (
            FileType::BlockDevice,
            Rights::BLOCK_DEVICE_BASE,
            Rights::BLOCK_DEVICE_INHERITING,
        ),
        libc::S_IFCHR => {
            if unsafe { libc::isatty(fd) } == 1 {
                (FileType::CharacterDevice, Rights::TTY_BASE, Rights::TTY_INHERITING)
            } else {
                (
                    FileType::CharacterDevice,
                    Rights::CHARACTER_DEVICE_BASE,
                    Rights::CHARACTER_DEVICE_INHERITING,
                )
            }
        }
        libc::S_IFDIR => (
            FileType::Directory,
            Rights::DIRECTORY_BASE,
            Rights::DIRECTORY_INHERITING,
        ),
        libc::S_IFREG => (
            FileType::RegularFile,
            Rights::REGULAR_FILE_BASE,
            Rights::REGULAR_FILE_INHERITING,
        ),
        libc::S_IFSOCK => {
            let filetype = match socket_type(fd)? {
                libc::SOCK_DGRAM => FileType::SocketDgram,
                libc::SOCK_STREAM => FileType::SocketStream,
                _ => return Err(Errno::EINVAL),
            };
            (filetype, Rights::SOCKET_BASE, Rights::SOCKET_INHERITING)
        }
        // Pipes are represented as stream sockets.
        libc::S_IFIFO => (
            FileType::SocketStream,
            Rights::SOCKET_BASE,
            Rights::SOCKET_INHERITING,
        ),
        _ => return Err(Errno::EINVAL),
    };

    // Strip read/write bits the descriptor's access mode cannot satisfy.
    let fl = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if fl >= 0 {
        match fl & libc::O_ACCMODE {
            libc::O_RDONLY => base.remove(Rights::FD_WRITE),
            libc::O_WRONLY => base.remove(Rights::FD_READ),
            _ => {}
        }
    }
    Ok((filetype, base, inheriting))
}

fn socket_type(fd: RawFd) -> Result<libc::c_int, Errno> {
    let mut socktype: libc::c_int = 0;
    let mut len = size_of::<libc::c_int>() as libc::socklen_t;
    let ret = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_TYPE,
            (&raw mut socktype).cast(),
            &mut len,
        )
    };
    if ret < 0 {
        return Err(Errno::last_host());
    }
    Ok(socktype)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_reports_stream_socket_with_split_rights() {
        let mut fds = [0 as RawFd; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let (rd, wr) = (fds[0], fds[1]);

        let (filetype, base, _) = determine_type_rights(rd).unwrap();
        assert_eq!(filetype, FileType::SocketStream);
        assert!(base.contains(Rights::FD_READ));
        assert!(!base.contains(Rights::FD_WRITE));

        let (_, base, _) = determine_type_rights(wr).unwrap();
        assert!(base.contains(Rights::FD_WRITE));
        assert!(!base.contains(Rights::FD_READ));

        unsafe {
            libc::close(rd);
            libc::close(wr);
        }
    }

    #[test]
    fn tempfile_reports_regular_file() {
        let file = tempfile::tempfile().unwrap();
        let fd = std::os::unix::io::AsRawFd::as_raw_fd(&file);
        let (filetype, base, inheriting) = determine_type_rights(fd).unwrap();
        assert_eq!(filetype, FileType::RegularFile);
        assert!(base.contains(Rights::FD_READ | Rights::FD_WRITE));
        assert!(inheriting.is_empty());
    }
}
