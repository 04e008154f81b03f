//! The per-process handle table.
//!
//! A sparse vector of slots behind a reader-writer lock. Slots are picked
//! at random from the free half of the table; the doubling growth policy
//! keeps at least half of the slots empty so the random probe terminates
//! quickly in expectation.

use std::os::unix::io::RawFd;
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;
use parking_lot::RwLockReadGuard;
use rand::Rng;

use super::infer::determine_type_rights;
use super::object::FdObject;
use crate::abi::Errno;
use crate::abi::Fd;
use crate::abi::FileType;
use crate::abi::Rights;

/// One occupied slot: the object plus the two right sets the handle
/// carries.
#[derive(Debug)]
pub(crate) struct FdEntry {
    pub(crate) object: Arc<FdObject>,
    pub(crate) rights_base: Rights,
    pub(crate) rights_inheriting: Rights,
}

/// The slot array and its occupancy counter. Only accessible through the
/// table's lock.
#[derive(Debug, Default)]
pub(crate) struct Slots {
    entries: Vec<Option<FdEntry>>,
    used: usize,
}

impl Slots {
    /// Looks up a slot and validates that it grants the required rights.
    pub(crate) fn entry(
        &self,
        fd: Fd,
        need_base: Rights,
        need_inheriting: Rights,
    ) -> Result<&FdEntry, Errno> {
        let entry = self
            .entries
            .get(fd.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(Errno::EBADF)?;
        if !entry.rights_base.contains(need_base)
            || !entry.rights_inheriting.contains(need_inheriting)
        {
            return Err(Errno::ENOTCAPABLE);
        }
        Ok(entry)
    }

    fn entry_mut(
        &mut self,
        fd: Fd,
        need_base: Rights,
        need_inheriting: Rights,
    ) -> Result<&mut FdEntry, Errno> {
        let entry = self
            .entries
            .get_mut(fd.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(Errno::EBADF)?;
        if !entry.rights_base.contains(need_base)
            || !entry.rights_inheriting.contains(need_inheriting)
        {
            return Err(Errno::ENOTCAPABLE);
        }
        Ok(entry)
    }

    /// Grows the slot array until its size exceeds `min` and at least
    /// half of it remains free after `incr` more slots are occupied.
    fn grow(&mut self, min: usize, incr: usize) -> Result<(), Errno> {
        let size = self.entries.len();
        if size <= min || size < (self.used + incr) * 2 {
            let mut new_size = if size == 0 { 1 } else { size };
            while new_size <= min || new_size < (self.used + incr) * 2 {
                new_size *= 2;
            }
            self.entries
                .try_reserve_exact(new_size - size)
                .map_err(|_| Errno::ENOMEM)?;
            self.entries.resize_with(new_size, || None);
            debug!("handle table grown to {} slots", new_size);
        }
        Ok(())
    }

    /// Picks a uniformly random empty slot. The growth policy guarantees
    /// at least half the slots are free, so this terminates quickly.
    fn pick_unused(&self) -> Fd {
        assert!(
            self.entries.len() > self.used,
            "handle table has no free slots"
        );
        let mut rng = rand::rng();
        loop {
            let fd = rng.random_range(0..self.entries.len());
            if self.entries[fd].is_none() {
                return Fd(fd as u32);
            }
        }
    }

    fn attach(&mut self, fd: Fd, entry: FdEntry) {
        let slot = self
            .entries
            .get_mut(fd.0 as usize)
            .expect("handle table too small");
        assert!(slot.is_none(), "attempted to overwrite an occupied slot");
        *slot = Some(entry);
        self.used += 1;
        assert!(self.entries.len() >= self.used * 2, "handle table overfull");
    }

    fn detach(&mut self, fd: Fd) -> FdEntry {
        let slot = self
            .entries
            .get_mut(fd.0 as usize)
            .expect("handle table too small");
        let entry = slot.take().expect("attempted to detach an empty slot");
        self.used -= 1;
        entry
    }
}

/// The registry mapping handles to objects for one emulated process.
///
/// All threads of a process share one table. Lookups take the lock in
/// shared mode; mutations take it exclusively. Object teardown never
/// happens while the lock is held: detached entries are dropped after
/// the guard is released.
#[derive(Debug, Default)]
pub struct FdTable {
    slots: RwLock<Slots>,
}

impl FdTable {
    /// Creates an empty table.
    pub fn new() -> FdTable {
        FdTable::default()
    }

    /// Installs an already open host descriptor at a fixed handle value,
    /// inferring its type and maximal rights.
    ///
    /// Used to seed stdio and preopened directories before guest code
    /// runs. On success the table owns `host_fd`. Returns `false` if the
    /// descriptor could not be inspected or the slot made available.
    pub fn insert_existing(&self, fd: Fd, host_fd: RawFd) -> bool {
        let Ok((filetype, rights_base, rights_inheriting)) = determine_type_rights(host_fd)
        else {
            return false;
        };
        let object = Arc::new(FdObject::new(filetype, host_fd));

        let mut slots = self.slots.write();
        if slots.grow(fd.0 as usize, 1).is_err() {
            drop(slots);
            // Dropping the object closes the descriptor.
            return false;
        }
        slots.attach(
            fd,
            FdEntry {
                object,
                rights_base,
                rights_inheriting,
            },
        );
        true
    }

    /// Looks up a handle, validates rights, and returns a reference to
    /// the backing object that stays valid after the lock is released.
    pub(crate) fn get(
        &self,
        fd: Fd,
        need_base: Rights,
        need_inheriting: Rights,
    ) -> Result<Arc<FdObject>, Errno> {
        let slots = self.slots.read();
        let entry = slots.entry(fd, need_base, need_inheriting)?;
        Ok(Arc::clone(&entry.object))
    }

    /// Like [`FdTable::get`], but also returns the rights stored in the
    /// slot at lookup time.
    pub(crate) fn get_with_rights(
        &self,
        fd: Fd,
        need_base: Rights,
        need_inheriting: Rights,
    ) -> Result<(Arc<FdObject>, Rights, Rights), Errno> {
        let slots = self.slots.read();
        let entry = slots.entry(fd, need_base, need_inheriting)?;
        Ok((
            Arc::clone(&entry.object),
            entry.rights_base,
            entry.rights_inheriting,
        ))
    }

    /// Takes the table lock in shared mode for bulk lookups.
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Slots> {
        self.slots.read()
    }

    /// Inserts an object into a randomly picked free slot.
    pub(crate) fn insert(
        &self,
        object: Arc<FdObject>,
        rights_base: Rights,
        rights_inheriting: Rights,
    ) -> Result<Fd, Errno> {
        let mut slots = self.slots.write();
        if let Err(err) = slots.grow(0, 1) {
            drop(slots);
            drop(object);
            return Err(err);
        }
        let fd = slots.pick_unused();
        slots.attach(
            fd,
            FdEntry {
                object,
                rights_base,
                rights_inheriting,
            },
        );
        Ok(fd)
    }

    /// Wraps a host descriptor in a new object and inserts it. The
    /// descriptor is owned by the table from this point on, including on
    /// failure.
    pub(crate) fn insert_host_fd(
        &self,
        host_fd: RawFd,
        filetype: FileType,
        rights_base: Rights,
        rights_inheriting: Rights,
    ) -> Result<Fd, Errno> {
        let object = Arc::new(FdObject::new(filetype, host_fd));
        self.insert(object, rights_base, rights_inheriting)
    }

    /// Inserts a pair of host descriptors in one exclusive lock section,
    /// so the two handles become visible atomically.
    pub(crate) fn insert_host_pair(
        &self,
        host_fds: (RawFd, RawFd),
        filetype: FileType,
        rights_base: (Rights, Rights),
        rights_inheriting: Rights,
    ) -> Result<(Fd, Fd), Errno> {
        let object1 = Arc::new(FdObject::new(filetype, host_fds.0));
        let object2 = Arc::new(FdObject::new(filetype, host_fds.1));

        let mut slots = self.slots.write();
        if let Err(err) = slots.grow(0, 2) {
            drop(slots);
            drop(object1);
            drop(object2);
            return Err(err);
        }
        let fd1 = slots.pick_unused();
        slots.attach(
            fd1,
            FdEntry {
                object: object1,
                rights_base: rights_base.0,
                rights_inheriting,
            },
        );
        let fd2 = slots.pick_unused();
        slots.attach(
            fd2,
            FdEntry {
                object: object2,
                rights_base: rights_base.1,
                rights_inheriting,
            },
        );
        Ok((fd1, fd2))
    }

    /// Duplicates a handle into a fresh slot, copying its rights.
    pub(crate) fn dup(&self, from: Fd) -> Result<Fd, Errno> {
        let mut slots = self.slots.write();
        let (object, rights_base, rights_inheriting) = {
            let entry = slots.entry(from, Rights::empty(), Rights::empty())?;
            (
                Arc::clone(&entry.object),
                entry.rights_base,
                entry.rights_inheriting,
            )
        };
        slots.grow(0, 1)?;
        let fd = slots.pick_unused();
        slots.attach(
            fd,
            FdEntry {
                object,
                rights_base,
                rights_inheriting,
            },
        );
        Ok(fd)
    }

    /// Makes `to` refer to the same object as `from`, with `from`'s
    /// rights. The object previously at `to` is released after the lock
    /// is dropped.
    pub(crate) fn replace(&self, from: Fd, to: Fd) -> Result<(), Errno> {
        let mut slots = self.slots.write();
        let (object, rights_base, rights_inheriting) = {
            let entry = slots.entry(from, Rights::empty(), Rights::empty())?;
            (
                Arc::clone(&entry.object),
                entry.rights_base,
                entry.rights_inheriting,
            )
        };
        slots.entry(to, Rights::empty(), Rights::empty())?;
        let old = slots.detach(to);
        slots.attach(
            to,
            FdEntry {
                object,
                rights_base,
                rights_inheriting,
            },
        );
        drop(slots);
        drop(old);
        Ok(())
    }

    /// Removes a handle. The object is released after the lock is
    /// dropped; the underlying resource stays open while other holders
    /// retain references.
    pub(crate) fn close(&self, fd: Fd) -> Result<(), Errno> {
        let mut slots = self.slots.write();
        slots.entry(fd, Rights::empty(), Rights::empty())?;
        let old = slots.detach(fd);
        drop(slots);
        drop(old);
        Ok(())
    }

    /// Narrows the rights stored for a handle. Attempting to widen either
    /// set fails with `ENOTCAPABLE` and leaves the slot unchanged.
    pub(crate) fn restrict(
        &self,
        fd: Fd,
        rights_base: Rights,
        rights_inheriting: Rights,
    ) -> Result<(), Errno> {
        let mut slots = self.slots.write();
        let entry = slots.entry_mut(fd, rights_base, rights_inheriting)?;
        entry.rights_base = rights_base;
        entry.rights_inheriting = rights_inheriting;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn virtual_object() -> Arc<FdObject> {
        Arc::new(FdObject::new(FileType::Unknown, -1))
    }

    fn insert_one(table: &FdTable, base: Rights, inheriting: Rights) -> Fd {
        table.insert(virtual_object(), base, inheriting).unwrap()
    }

    #[test]
    fn insert_then_get_until_close() {
        let table = FdTable::new();
        let fd = insert_one(&table, Rights::FD_READ, Rights::empty());
        assert!(table.get(fd, Rights::empty(), Rights::empty()).is_ok());
        table.close(fd).unwrap();
        assert_eq!(
            table.get(fd, Rights::empty(), Rights::empty()).err(),
            Some(Errno::EBADF)
        );
    }

    #[test]
    fn rights_are_enforced() {
        let table = FdTable::new();
        let fd = insert_one(&table, Rights::FD_READ, Rights::empty());
        assert!(table.get(fd, Rights::FD_READ, Rights::empty()).is_ok());
        assert_eq!(
            table.get(fd, Rights::FD_WRITE, Rights::empty()).err(),
            Some(Errno::ENOTCAPABLE)
        );
        assert_eq!(
            table.get(Fd(9999), Rights::empty(), Rights::empty()).err(),
            Some(Errno::EBADF)
        );
    }

    #[test]
    fn restrict_narrows_but_never_widens() {
        let table = FdTable::new();
        let fd = insert_one(&table, Rights::FD_READ | Rights::FD_WRITE, Rights::empty());

        table.restrict(fd, Rights::FD_READ, Rights::empty()).unwrap();
        assert!(table.get(fd, Rights::FD_READ, Rights::empty()).is_ok());
        assert_eq!(
            table.get(fd, Rights::FD_WRITE, Rights::empty()).err(),
            Some(Errno::ENOTCAPABLE)
        );

        // Widening back fails and leaves the slot untouched.
        assert_eq!(
            table.restrict(fd, Rights::FD_READ | Rights::FD_WRITE, Rights::empty()),
            Err(Errno::ENOTCAPABLE)
        );
        assert!(table.get(fd, Rights::FD_READ, Rights::empty()).is_ok());
    }

    #[test]
    fn table_keeps_half_of_the_slots_free() {
        let table = FdTable::new();
        for _ in 0..100 {
            insert_one(&table, Rights::empty(), Rights::empty());
        }
        let slots = table.read();
        assert!(slots.entries.len() >= slots.used * 2);
        assert_eq!(slots.used, 100);
    }

    #[test]
    fn dup_and_replace_alias_the_object() {
        let table = FdTable::new();
        let fd = insert_one(&table, Rights::FD_READ, Rights::empty());
        let dup = table.dup(fd).unwrap();
        let a = table.get(fd, Rights::empty(), Rights::empty()).unwrap();
        let b = table.get(dup, Rights::empty(), Rights::empty()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let other = insert_one(&table, Rights::empty(), Rights::empty());
        table.replace(fd, other).unwrap();
        let c = table.get(other, Rights::empty(), Rights::empty()).unwrap();
        assert!(Arc::ptr_eq(&a, &c));
        // The replacement copies the source handle's rights.
        assert!(table.get(other, Rights::FD_READ, Rights::empty()).is_ok());
    }

    #[test]
    fn close_defers_teardown_to_the_last_reference() {
        let table = FdTable::new();
        let fd = insert_one(&table, Rights::empty(), Rights::empty());
        let held = table.get(fd, Rights::empty(), Rights::empty()).unwrap();
        table.close(fd).unwrap();
        // The object is still alive through the outstanding reference.
        assert_eq!(Arc::strong_count(&held), 1);
        drop(held);
    }

    #[test]
    fn insert_existing_lands_on_the_requested_slot() {
        let table = FdTable::new();
        let file = tempfile::tempfile().unwrap();
        let host = std::os::unix::io::IntoRawFd::into_raw_fd(file);
        assert!(table.insert_existing(Fd(0), host));
        let (_, base, _) = table
            .get_with_rights(Fd(0), Rights::empty(), Rights::empty())
            .unwrap();
        assert!(base.contains(Rights::FD_READ | Rights::FD_WRITE));
    }
}
