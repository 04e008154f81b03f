//! Flag words exchanged across the ABI boundary.

use bitflags::bitflags;

bitflags! {
    /// Flags qualifying a path lookup.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LookupFlags: u32 {
        /// Expand the final pathname component if it is a symbolic link.
        const SYMLINK_FOLLOW = 1 << 0;
    }
}

bitflags! {
    /// Flags controlling how `file_open` creates or opens its target.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpenFlags: u16 {
        /// Create the file if it does not exist.
        const CREAT = 1 << 0;
        /// Fail unless the target is a directory.
        const DIRECTORY = 1 << 1;
        /// Fail if the file already exists.
        const EXCL = 1 << 2;
        /// Truncate the file to size zero.
        const TRUNC = 1 << 3;
    }
}

bitflags! {
    /// Per-descriptor status flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FdFlags: u16 {
        /// Writes always append.
        const APPEND = 1 << 0;
        /// Writes complete with synchronized data integrity.
        const DSYNC = 1 << 1;
        /// I/O never blocks.
        const NONBLOCK = 1 << 2;
        /// Reads complete with synchronized integrity.
        const RSYNC = 1 << 3;
        /// Writes complete with synchronized data and metadata integrity.
        const SYNC = 1 << 4;
    }
}

bitflags! {
    /// Selects which part of a descriptor's state `fd_stat_put` replaces.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FdStatFlags: u16 {
        /// Replace the descriptor flags.
        const FLAGS = 1 << 0;
        /// Restrict the rights masks.
        const RIGHTS = 1 << 1;
    }
}

bitflags! {
    /// Selects which file attributes a stat-put operation changes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FileStatFlags: u16 {
        /// Set the access time to the provided timestamp.
        const ATIM = 1 << 0;
        /// Set the access time to the current time.
        const ATIM_NOW = 1 << 1;
        /// Set the modification time to the provided timestamp.
        const MTIM = 1 << 2;
        /// Set the modification time to the current time.
        const MTIM_NOW = 1 << 3;
        /// Truncate or extend the file to the provided size.
        const SIZE = 1 << 4;
    }
}

bitflags! {
    /// Flags for `file_unlink`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct UnlinkFlags: u8 {
        /// Remove a directory instead of a file.
        const REMOVEDIR = 1 << 0;
    }
}

bitflags! {
    /// Which direction of a socket `sock_shutdown` disables.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShutdownFlags: u8 {
        /// Disable further receives.
        const RD = 1 << 0;
        /// Disable further sends.
        const WR = 1 << 1;
    }
}

bitflags! {
    /// Flags accepted by `sock_recv`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RecvFlags: u16 {
        /// Return data without consuming it.
        const PEEK = 1 << 0;
        /// Block until the full amount of data can be returned.
        const WAITALL = 1 << 1;
    }
}

bitflags! {
    /// Flags reported by `sock_recv`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RecvOutFlags: u16 {
        /// The delivered descriptor set was truncated.
        const FDS_TRUNCATED = 1 << 0;
        /// The delivered data was truncated.
        const DATA_TRUNCATED = 1 << 1;
    }
}

bitflags! {
    /// Placement flags for `mem_map`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MapFlags: u8 {
        /// The mapping is not backed by a handle.
        const ANON = 1 << 0;
        /// Place the mapping at exactly the requested address.
        const FIXED = 1 << 1;
        /// Modifications stay private to this mapping.
        const PRIVATE = 1 << 2;
        /// Modifications are shared with other mappings of the object.
        const SHARED = 1 << 3;
    }
}

bitflags! {
    /// Memory protection bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemProt: u8 {
        /// Pages may be executed.
        const EXEC = 1 << 0;
        /// Pages may be written.
        const WRITE = 1 << 1;
        /// Pages may be read.
        const READ = 1 << 2;
    }
}

bitflags! {
    /// Flags for `mem_sync`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SyncFlags: u8 {
        /// Schedule the writeback without waiting for it.
        const ASYNC = 1 << 0;
        /// Invalidate cached copies after writing back.
        const INVALIDATE = 1 << 1;
        /// Wait for the writeback to complete.
        const SYNC = 1 << 2;
    }
}

bitflags! {
    /// Flags qualifying a clock subscription.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ClockFlags: u16 {
        /// The timeout is an absolute point on the subscribed clock rather
        /// than a duration from now.
        const ABSTIME = 1 << 0;
    }
}
