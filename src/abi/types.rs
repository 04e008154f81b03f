//! Core ABI value types: handles, file types, stat records, directory
//! entries, and the small closed enums decoded from guest integers.

use std::fmt;

use num_enum::IntoPrimitive;
use num_enum::TryFromPrimitive;
use zerocopy::Immutable;
use zerocopy::IntoBytes;

use super::flags::FdFlags;
use super::rights::Rights;

/// A nanosecond timestamp or duration, as carried by the ABI.
pub type Timestamp = u64;

/// An opaque position in a directory stream.
pub type DirCookie = u64;

/// The cookie naming the start of a directory stream.
pub const DIRCOOKIE_START: DirCookie = 0;

/// A handle: a small integer naming a kernel object within one emulated
/// process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fd(pub u32);

impl Fd {
    /// The reserved handle value. Used by `mem_map` to request an
    /// anonymous mapping and stored in received-descriptor slots that
    /// could not be installed.
    pub const INVALID: Fd = Fd(u32::MAX);
}

impl fmt::Display for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A thread identifier within one emulated process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tid(pub u32);

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// The immutable type tag of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum FileType {
    /// The type could not be determined.
    #[default]
    Unknown = 0,
    /// Block-oriented device.
    BlockDevice = 16,
    /// Character-oriented device.
    CharacterDevice = 17,
    /// Directory.
    Directory = 32,
    /// Regular file.
    RegularFile = 96,
    /// Anonymous or named shared memory object.
    SharedMemory = 112,
    /// Datagram socket.
    SocketDgram = 128,
    /// Stream socket. Pipes are represented as stream sockets.
    SocketStream = 130,
    /// Symbolic link.
    SymbolicLink = 144,
}

/// Reference position for `fd_seek`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum Whence {
    /// Relative to the current offset.
    Cur = 1,
    /// Relative to the end of the file.
    End = 2,
    /// Relative to the start of the file.
    Set = 3,
}

/// File or memory access pattern advice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Advice {
    DontNeed = 1,
    NoReuse = 2,
    Normal = 3,
    Random = 4,
    Sequential = 5,
    WillNeed = 6,
}

/// The clocks the ABI exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum ClockId {
    /// A clock that never runs backwards and is unaffected by time steps.
    Monotonic = 1,
    /// CPU time consumed by the process.
    ProcessCputime = 2,
    /// Wall-clock time.
    Realtime = 3,
    /// CPU time consumed by the calling thread.
    ThreadCputime = 4,
}

/// Signals deliverable through `proc_raise`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Signal {
    Abrt = 1,
    Alrm = 2,
    Bus = 3,
    Chld = 4,
    Cont = 5,
    Fpe = 6,
    Hup = 7,
    Ill = 8,
    Int = 9,
    Kill = 10,
    Pipe = 11,
    Quit = 12,
    Segv = 13,
    Stop = 14,
    Sys = 15,
    Term = 16,
    Trap = 17,
    Tstp = 18,
    Ttin = 19,
    Ttou = 20,
    Urg = 21,
    Usr1 = 22,
    Usr2 = 23,
    Vtalrm = 24,
    Xcpu = 25,
    Xfsz = 26,
}

/// Whether a futex object is shared between emulated processes or private
/// to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Visible only within the current process.
    Private,
    /// Potentially shared with other processes through shared memory.
    Shared,
}

/// Descriptor state as reported by `fd_stat_get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdStat {
    /// The handle's type tag.
    pub filetype: FileType,
    /// Current descriptor flags.
    pub flags: FdFlags,
    /// Rights of the handle itself.
    pub rights_base: Rights,
    /// Upper bound for rights of handles derived from this one.
    pub rights_inheriting: Rights,
}

/// File attributes as reported by the stat family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileStat {
    /// Device containing the file.
    pub dev: u64,
    /// Inode number.
    pub ino: u64,
    /// File type, [`FileType::Unknown`] if it could not be determined.
    pub filetype: FileType,
    /// Hard link count.
    pub nlink: u32,
    /// File size in bytes.
    pub size: u64,
    /// Last access time.
    pub atim: Timestamp,
    /// Last modification time.
    pub mtim: Timestamp,
    /// Last status change time.
    pub ctim: Timestamp,
}

/// The fixed-layout header of one directory entry as written into the
/// caller's `file_readdir` buffer. The entry name follows immediately,
/// `namlen` bytes long and unterminated.
#[derive(Debug, Clone, Copy, IntoBytes, Immutable)]
#[repr(C)]
pub struct Dirent {
    /// Cookie naming the position just past this entry.
    pub next: DirCookie,
    /// Inode number of the named file.
    pub ino: u64,
    /// Length of the name following this header.
    pub namlen: u32,
    /// File type of the named file, as a raw [`FileType`] value.
    pub filetype: u8,
    pub(crate) pad: [u8; 3],
}

impl Dirent {
    pub(crate) fn new(next: DirCookie, ino: u64, namlen: u32, filetype: FileType) -> Dirent {
        Dirent {
            next,
            ino,
            namlen,
            filetype: filetype.into(),
            pad: [0; 3],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::IntoBytes as _;

    #[test]
    fn dirent_layout() {
        assert_eq!(size_of::<Dirent>(), 24);
        let de = Dirent::new(7, 42, 3, FileType::RegularFile);
        let bytes = de.as_bytes();
        assert_eq!(&bytes[0..8], 7u64.to_ne_bytes());
        assert_eq!(&bytes[8..16], 42u64.to_ne_bytes());
        assert_eq!(&bytes[16..20], 3u32.to_ne_bytes());
        assert_eq!(bytes[20], u8::from(FileType::RegularFile));
    }

    #[test]
    fn filetype_decodes_from_raw() {
        assert_eq!(FileType::try_from(32u8), Ok(FileType::Directory));
        assert!(FileType::try_from(1u8).is_err());
    }
}
