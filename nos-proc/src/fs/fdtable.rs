//! Per-process descriptor table
//!
//! A fixed array of `open_max` slots, each empty or naming a registry entry.
//! The table is owned by one process and always accessed under that
//! process's `files` lock; reference counts live in the registry entries.

use alloc::vec::Vec;

use nos_api::{Error, Fd, Result};

use crate::fs::file::{FileRef, FileRegistry};

pub struct FdTable {
    slots: Vec<Option<FileRef>>,
}

impl FdTable {
    pub fn new(open_max: usize) -> Self {
        let mut slots = Vec::with_capacity(open_max);
        slots.resize_with(open_max, || None);
        Self { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots
    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    fn index(&self, fd: Fd) -> Result<usize> {
        usize::try_from(fd)
            .ok()
            .filter(|&idx| idx < self.slots.len())
            .ok_or(Error::BadFileDescriptor)
    }

    /// Entry behind `fd`
    pub fn get(&self, fd: Fd) -> Result<FileRef> {
        let idx = self.index(fd)?;
        self.slots[idx].clone().ok_or(Error::BadFileDescriptor)
    }

    /// Store `file` in the lowest empty slot at or above `min_fd`
    ///
    /// The caller keeps ownership of `file` on failure.
    pub fn install(&mut self, min_fd: usize, file: FileRef) -> core::result::Result<Fd, FileRef> {
        match self.slots.iter().skip(min_fd).position(Option::is_none) {
            Some(offset) => {
                let idx = min_fd + offset;
                self.slots[idx] = Some(file);
                Ok(idx as Fd)
            }
            None => Err(file),
        }
    }

    /// Store `file` at exactly `fd`, returning whatever was there
    pub fn install_at(&mut self, fd: Fd, file: FileRef) -> Result<Option<FileRef>> {
        let idx = self.index(fd)?;
        Ok(self.slots[idx].replace(file))
    }

    /// Empty slot `fd` and hand back its reference
    pub fn take(&mut self, fd: Fd) -> Result<FileRef> {
        let idx = self.index(fd)?;
        self.slots[idx].take().ok_or(Error::BadFileDescriptor)
    }

    /// `close`: empty `fd` and drop its reference on the entry
    pub fn close(&mut self, registry: &FileRegistry, fd: Fd) -> Result<()> {
        let file = self.take(fd)?;
        registry.close(file);
        Ok(())
    }

    /// `dup2`: make `new_fd` name the same entry as `old_fd`
    ///
    /// Whatever `new_fd` named before is released. The new reference is
    /// taken before the old one is dropped, so redirecting a slot onto the
    /// entry it already names never passes through a zero count.
    pub fn dup2(&mut self, registry: &FileRegistry, old_fd: Fd, new_fd: Fd) -> Result<Fd> {
        let source = self.get(old_fd)?;
        let target = self.index(new_fd)?;
        if old_fd == new_fd {
            return Ok(new_fd);
        }

        let file = registry.duplicate(&source);
        if let Some(previous) = self.slots[target].replace(file) {
            registry.close(previous);
        }
        Ok(new_fd)
    }

    /// Child table for fork: same slots, one more reference per entry
    pub fn fork_copy(&self, registry: &FileRegistry) -> FdTable {
        FdTable {
            slots: self
                .slots
                .iter()
                .map(|slot| slot.as_ref().map(|file| registry.duplicate(file)))
                .collect(),
        }
    }

    /// Release every slot; used when the owning process is destroyed
    pub fn release_all(&mut self, registry: &FileRegistry) {
        for slot in self.slots.iter_mut() {
            if let Some(file) = slot.take() {
                registry.close(file);
            }
        }
    }

    /// Occupied descriptors and the entries they name
    pub fn iter(&self) -> impl Iterator<Item = (Fd, &FileRef)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|file| (idx as Fd, file)))
    }
}

impl core::fmt::Debug for FdTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(fd, file)| (fd, file.slot())))
            .finish()
    }
}
