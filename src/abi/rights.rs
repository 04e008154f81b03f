//! Capability right bits and the fixed per-filetype right sets.

use bitflags::bitflags;

bitflags! {
    /// Rights attached to a handle.
    ///
    /// Each bit authorizes one class of operation. A handle carries two of
    /// these masks: a base set (what the handle itself may do) and an
    /// inheriting set (the upper bound for handles derived from it through
    /// `file_open`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Rights: u64 {
        /// Synchronize file data to disk.
        const FD_DATASYNC = 1 << 0;
        /// Read from the descriptor.
        const FD_READ = 1 << 1;
        /// Reposition the file offset.
        const FD_SEEK = 1 << 2;
        /// Change descriptor flags (append, nonblock, sync variants).
        const FD_STAT_PUT_FLAGS = 1 << 3;
        /// Synchronize file data and metadata to disk.
        const FD_SYNC = 1 << 4;
        /// Query the file offset.
        const FD_TELL = 1 << 5;
        /// Write to the descriptor.
        const FD_WRITE = 1 << 6;
        /// Provide file access pattern advice.
        const FILE_ADVISE = 1 << 7;
        /// Preallocate file space.
        const FILE_ALLOCATE = 1 << 8;
        /// Create a directory underneath this directory.
        const FILE_CREATE_DIRECTORY = 1 << 9;
        /// Create a regular file underneath this directory.
        const FILE_CREATE_FILE = 1 << 10;
        /// Use a path below this directory as a hard link source.
        const FILE_LINK_SOURCE = 1 << 11;
        /// Create a hard link below this directory.
        const FILE_LINK_TARGET = 1 << 12;
        /// Open files below this directory.
        const FILE_OPEN = 1 << 13;
        /// Read directory entries.
        const FILE_READDIR = 1 << 14;
        /// Read the target of symbolic links below this directory.
        const FILE_READLINK = 1 << 15;
        /// Use a path below this directory as a rename source.
        const FILE_RENAME_SOURCE = 1 << 16;
        /// Rename onto a path below this directory.
        const FILE_RENAME_TARGET = 1 << 17;
        /// Query file attributes through the descriptor.
        const FILE_STAT_FGET = 1 << 18;
        /// Truncate or extend the file through the descriptor.
        const FILE_STAT_FPUT_SIZE = 1 << 19;
        /// Change file timestamps through the descriptor.
        const FILE_STAT_FPUT_TIMES = 1 << 20;
        /// Query attributes of paths below this directory.
        const FILE_STAT_GET = 1 << 21;
        /// Change timestamps of paths below this directory.
        const FILE_STAT_PUT_TIMES = 1 << 22;
        /// Create symbolic links below this directory.
        const FILE_SYMLINK = 1 << 23;
        /// Remove files or directories below this directory.
        const FILE_UNLINK = 1 << 24;
        /// Map the file into memory.
        const MEM_MAP = 1 << 25;
        /// Map the file with execute permission.
        const MEM_MAP_EXEC = 1 << 26;
        /// Subscribe to readability/writability of the descriptor.
        const POLL_FD_READWRITE = 1 << 27;
        /// Pass the descriptor to a process image (reserved).
        const PROC_EXEC = 1 << 28;
        /// Shut down socket send/receive channels.
        const SOCK_SHUTDOWN = 1 << 29;
    }
}

impl Rights {
    /// Rights granted on regular files and block devices.
    pub const REGULAR_FILE_BASE: Rights = Rights::FD_DATASYNC
        .union(Rights::FD_READ)
        .union(Rights::FD_SEEK)
        .union(Rights::FD_STAT_PUT_FLAGS)
        .union(Rights::FD_SYNC)
        .union(Rights::FD_TELL)
        .union(Rights::FD_WRITE)
        .union(Rights::FILE_ADVISE)
        .union(Rights::FILE_ALLOCATE)
        .union(Rights::FILE_STAT_FGET)
        .union(Rights::FILE_STAT_FPUT_SIZE)
        .union(Rights::FILE_STAT_FPUT_TIMES)
        .union(Rights::MEM_MAP)
        .union(Rights::MEM_MAP_EXEC)
        .union(Rights::POLL_FD_READWRITE)
        .union(Rights::PROC_EXEC);
    /// Regular files yield no derived handles.
    pub const REGULAR_FILE_INHERITING: Rights = Rights::empty();

    /// Rights granted on directories.
    pub const DIRECTORY_BASE: Rights = Rights::FD_STAT_PUT_FLAGS
        .union(Rights::FD_SYNC)
        .union(Rights::FILE_ADVISE)
        .union(Rights::FILE_CREATE_DIRECTORY)
        .union(Rights::FILE_CREATE_FILE)
        .union(Rights::FILE_LINK_SOURCE)
        .union(Rights::FILE_LINK_TARGET)
        .union(Rights::FILE_OPEN)
        .union(Rights::FILE_READDIR)
        .union(Rights::FILE_READLINK)
        .union(Rights::FILE_RENAME_SOURCE)
        .union(Rights::FILE_RENAME_TARGET)
        .union(Rights::FILE_STAT_FGET)
        .union(Rights::FILE_STAT_FPUT_TIMES)
        .union(Rights::FILE_STAT_GET)
        .union(Rights::FILE_STAT_PUT_TIMES)
        .union(Rights::FILE_SYMLINK)
        .union(Rights::FILE_UNLINK)
        .union(Rights::POLL_FD_READWRITE);
    /// Anything reachable below a directory: the directory set itself plus
    /// everything a regular file grants.
    pub const DIRECTORY_INHERITING: Rights =
        Rights::DIRECTORY_BASE.union(Rights::REGULAR_FILE_BASE);

    /// Rights granted on block devices.
    pub const BLOCK_DEVICE_BASE: Rights = Rights::REGULAR_FILE_BASE;
    /// Block devices yield no derived handles.
    pub const BLOCK_DEVICE_INHERITING: Rights = Rights::empty();

    /// Rights granted on character devices that are not terminals.
    pub const CHARACTER_DEVICE_BASE: Rights = Rights::FD_READ
        .union(Rights::FD_STAT_PUT_FLAGS)
        .union(Rights::FD_SYNC)
        .union(Rights::FD_WRITE)
        .union(Rights::FILE_ADVISE)
        .union(Rights::FILE_STAT_FGET)
        .union(Rights::POLL_FD_READWRITE);
    /// Character devices yield no derived handles.
    pub const CHARACTER_DEVICE_INHERITING: Rights = Rights::empty();

    /// Rights granted on terminal descriptors. Terminals are not seekable
    /// and do not support sync, so those bits are absent.
    pub const TTY_BASE: Rights = Rights::FD_READ
        .union(Rights::FD_STAT_PUT_FLAGS)
        .union(Rights::FD_WRITE)
        .union(Rights::FILE_ADVISE)
        .union(Rights::FILE_STAT_FGET)
        .union(Rights::POLL_FD_READWRITE);
    /// Terminals yield no derived handles.
    pub const TTY_INHERITING: Rights = Rights::empty();

    /// Rights granted on sockets and pipes.
    pub const SOCKET_BASE: Rights = Rights::FD_READ
        .union(Rights::FD_STAT_PUT_FLAGS)
        .union(Rights::FD_WRITE)
        .union(Rights::FILE_STAT_FGET)
        .union(Rights::POLL_FD_READWRITE)
        .union(Rights::SOCK_SHUTDOWN);
    /// Sockets may carry descriptors of any kind in ancillary data.
    pub const SOCKET_INHERITING: Rights = Rights::all();

    /// Rights granted on shared memory objects.
    pub const SHARED_MEMORY_BASE: Rights = Rights::FD_READ
        .union(Rights::FD_STAT_PUT_FLAGS)
        .union(Rights::FD_SYNC)
        .union(Rights::FD_WRITE)
        .union(Rights::FILE_STAT_FGET)
        .union(Rights::FILE_STAT_FPUT_SIZE)
        .union(Rights::MEM_MAP)
        .union(Rights::MEM_MAP_EXEC);
    /// Shared memory objects yield no derived handles.
    pub const SHARED_MEMORY_INHERITING: Rights = Rights::empty();
}
