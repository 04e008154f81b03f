//! The CapABI vocabulary: error codes, right bits, flag words, value
//! types, and event records. Everything in this module is part of the
//! stable guest-visible interface.

mod errno;
mod event;
mod flags;
mod rights;
mod types;

pub use errno::Errno;
pub use event::Event;
pub use event::EventType;
pub use event::FdEvent;
pub use event::Subscription;
pub use event::SubscriptionKind;
pub use flags::ClockFlags;
pub use flags::FdFlags;
pub use flags::FdStatFlags;
pub use flags::FileStatFlags;
pub use flags::LookupFlags;
pub use flags::MapFlags;
pub use flags::MemProt;
pub use flags::OpenFlags;
pub use flags::RecvFlags;
pub use flags::RecvOutFlags;
pub use flags::ShutdownFlags;
pub use flags::SyncFlags;
pub use flags::UnlinkFlags;
pub use rights::Rights;
pub use types::Advice;
pub use types::ClockId;
pub use types::DIRCOOKIE_START;
pub use types::DirCookie;
pub use types::Dirent;
pub use types::Fd;
pub use types::FdStat;
pub use types::FileStat;
pub use types::FileType;
pub use types::Scope;
pub use types::Signal;
pub use types::Tid;
pub use types::Timestamp;
pub use types::Whence;
