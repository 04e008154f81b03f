//! The ABI's closed error namespace and its mapping from host errno values.

use std::fmt;

/// An error code as delivered to the guest.
///
/// The set is closed: every host failure is folded into one of these
/// values before it crosses the ABI boundary. The numeric values are part
/// of the ABI and never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
#[allow(missing_docs, clippy::upper_case_acronyms, non_camel_case_types)]
pub enum Errno {
    E2BIG = 1,
    EACCES = 2,
    EADDRINUSE = 3,
    EADDRNOTAVAIL = 4,
    EAFNOSUPPORT = 5,
    EAGAIN = 6,
    EALREADY = 7,
    EBADF = 8,
    EBADMSG = 9,
    EBUSY = 10,
    ECANCELED = 11,
    ECHILD = 12,
    ECONNABORTED = 13,
    ECONNREFUSED = 14,
    ECONNRESET = 15,
    EDEADLK = 16,
    EDESTADDRREQ = 17,
    EDOM = 18,
    EDQUOT = 19,
    EEXIST = 20,
    EFAULT = 21,
    EFBIG = 22,
    EHOSTUNREACH = 23,
    EIDRM = 24,
    EILSEQ = 25,
    EINPROGRESS = 26,
    EINTR = 27,
    EINVAL = 28,
    EIO = 29,
    EISCONN = 30,
    EISDIR = 31,
    ELOOP = 32,
    EMFILE = 33,
    EMLINK = 34,
    EMSGSIZE = 35,
    EMULTIHOP = 36,
    ENAMETOOLONG = 37,
    ENETDOWN = 38,
    ENETRESET = 39,
    ENETUNREACH = 40,
    ENFILE = 41,
    ENOBUFS = 42,
    ENODEV = 43,
    ENOENT = 44,
    ENOEXEC = 45,
    ENOLCK = 46,
    ENOLINK = 47,
    ENOMEM = 48,
    ENOMSG = 49,
    ENOPROTOOPT = 50,
    ENOSPC = 51,
    ENOSYS = 52,
    ENOTCONN = 53,
    ENOTDIR = 54,
    ENOTEMPTY = 55,
    ENOTRECOVERABLE = 56,
    ENOTSOCK = 57,
    ENOTSUP = 58,
    ENOTTY = 59,
    ENXIO = 60,
    EOVERFLOW = 61,
    EOWNERDEAD = 62,
    EPERM = 63,
    EPIPE = 64,
    EPROTO = 65,
    EPROTONOSUPPORT = 66,
    EPROTOTYPE = 67,
    ERANGE = 68,
    EROFS = 69,
    ESPIPE = 70,
    ESRCH = 71,
    ESTALE = 72,
    ETIMEDOUT = 73,
    ETXTBSY = 74,
    EXDEV = 75,
    ENOTCAPABLE = 76,
}

impl Errno {
    /// Translates a host errno value into the ABI error namespace.
    ///
    /// The mapping is total: values the ABI has no name for become
    /// [`Errno::ENOSYS`].
    pub fn from_host(error: i32) -> Errno {
        // These two share numeric values with ENOTSUP/EAGAIN on several
        // hosts, so they are folded before the exact match below.
        if error == libc::EOPNOTSUPP {
            return Errno::ENOTSUP;
        }
        if error == libc::EWOULDBLOCK {
            return Errno::EAGAIN;
        }
        match error {
            libc::E2BIG => Errno::E2BIG,
            libc::EACCES => Errno::EACCES,
            libc::EADDRINUSE => Errno::EADDRINUSE,
            libc::EADDRNOTAVAIL => Errno::EADDRNOTAVAIL,
            libc::EAFNOSUPPORT => Errno::EAFNOSUPPORT,
            libc::EAGAIN => Errno::EAGAIN,
            libc::EALREADY => Errno::EALREADY,
            libc::EBADF => Errno::EBADF,
            libc::EBADMSG => Errno::EBADMSG,
            libc::EBUSY => Errno::EBUSY,
            libc::ECANCELED => Errno::ECANCELED,
            libc::ECHILD => Errno::ECHILD,
            libc::ECONNABORTED => Errno::ECONNABORTED,
            libc::ECONNREFUSED => Errno::ECONNREFUSED,
            libc::ECONNRESET => Errno::ECONNRESET,
            libc::EDEADLK => Errno::EDEADLK,
            libc::EDESTADDRREQ => Errno::EDESTADDRREQ,
            libc::EDOM => Errno::EDOM,
            libc::EDQUOT => Errno::EDQUOT,
            libc::EEXIST => Errno::EEXIST,
            libc::EFAULT => Errno::EFAULT,
            libc::EFBIG => Errno::EFBIG,
            libc::EHOSTUNREACH => Errno::EHOSTUNREACH,
            libc::EIDRM => Errno::EIDRM,
            libc::EILSEQ => Errno::EILSEQ,
            libc::EINPROGRESS => Errno::EINPROGRESS,
            libc::EINTR => Errno::EINTR,
            libc::EINVAL => Errno::EINVAL,
            libc::EIO => Errno::EIO,
            libc::EISCONN => Errno::EISCONN,
            libc::EISDIR => Errno::EISDIR,
            libc::ELOOP => Errno::ELOOP,
            libc::EMFILE => Errno::EMFILE,
            libc::EMLINK => Errno::EMLINK,
            libc::EMSGSIZE => Errno::EMSGSIZE,
            libc::EMULTIHOP => Errno::EMULTIHOP,
            libc::ENAMETOOLONG => Errno::ENAMETOOLONG,
            libc::ENETDOWN => Errno::ENETDOWN,
            libc::ENETRESET => Errno::ENETRESET,
            libc::ENETUNREACH => Errno::ENETUNREACH,
            libc::ENFILE => Errno::ENFILE,
            libc::ENOBUFS => Errno::ENOBUFS,
            libc::ENODEV => Errno::ENODEV,
            libc::ENOENT => Errno::ENOENT,
            libc::ENOEXEC => Errno::ENOEXEC,
            libc::ENOLCK => Errno::ENOLCK,
            libc::ENOLINK => Errno::ENOLINK,
            libc::ENOMEM => Errno::ENOMEM,
            libc::ENOMSG => Errno::ENOMSG,
            libc::ENOPROTOOPT => Errno::ENOPROTOOPT,
            libc::ENOSPC => Errno::ENOSPC,
            libc::ENOSYS => Errno::ENOSYS,
            #[cfg(target_os = "freebsd")]
            libc::ENOTCAPABLE => Errno::ENOTCAPABLE,
            libc::ENOTCONN => Errno::ENOTCONN,
            libc::ENOTDIR => Errno::ENOTDIR,
            libc::ENOTEMPTY => Errno::ENOTEMPTY,
            libc::ENOTRECOVERABLE => Errno::ENOTRECOVERABLE,
            libc::ENOTSOCK => Errno::ENOTSOCK,
            libc::ENOTSUP => Errno::ENOTSUP,
            libc::ENOTTY => Errno::ENOTTY,
            libc::ENXIO => Errno::ENXIO,
            libc::EOVERFLOW => Errno::EOVERFLOW,
            libc::EOWNERDEAD => Errno::EOWNERDEAD,
            libc::EPERM => Errno::EPERM,
            libc::EPIPE => Errno::EPIPE,
            libc::EPROTO => Errno::EPROTO,
            libc::EPROTONOSUPPORT => Errno::EPROTONOSUPPORT,
            libc::EPROTOTYPE => Errno::EPROTOTYPE,
            libc::ERANGE => Errno::ERANGE,
            libc::EROFS => Errno::EROFS,
            libc::ESPIPE => Errno::ESPIPE,
            libc::ESRCH => Errno::ESRCH,
            libc::ESTALE => Errno::ESTALE,
            libc::ETIMEDOUT => Errno::ETIMEDOUT,
            libc::ETXTBSY => Errno::ETXTBSY,
            libc::EXDEV => Errno::EXDEV,
            _ => Errno::ENOSYS,
        }
    }

    /// Captures the calling thread's current host errno and translates it.
    pub(crate) fn last_host() -> Errno {
        Errno::from_host(
            std::io::Error::last_os_error()
                .raw_os_error()
                .unwrap_or(libc::EIO),
        )
    }

    /// The raw ABI value.
    pub fn raw(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl std::error::Error for Errno {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_mapping_is_total() {
        assert_eq!(Errno::from_host(libc::EPERM), Errno::EPERM);
        assert_eq!(Errno::from_host(libc::ENOENT), Errno::ENOENT);
        // Values outside the closed set degrade to ENOSYS.
        assert_eq!(Errno::from_host(0), Errno::ENOSYS);
        assert_eq!(Errno::from_host(-1), Errno::ENOSYS);
        assert_eq!(Errno::from_host(4095), Errno::ENOSYS);
    }

    #[test]
    fn aliases_fold() {
        assert_eq!(Errno::from_host(libc::EOPNOTSUPP), Errno::ENOTSUP);
        assert_eq!(Errno::from_host(libc::EWOULDBLOCK), Errno::EAGAIN);
    }

    #[test]
    fn abi_values_are_stable() {
        assert_eq!(Errno::E2BIG.raw(), 1);
        assert_eq!(Errno::EINVAL.raw(), 28);
        assert_eq!(Errno::ENOTCAPABLE.raw(), 76);
    }
}
