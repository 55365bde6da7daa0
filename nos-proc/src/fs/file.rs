// Shared open-file registry
//
// One `OpenFile` per distinct open of a node. Descriptor tables (possibly
// in several processes, after fork or dup2) point at the same entry, so the
// cursor is shared. The registry is a fixed pool: entries never move, and
// the only registry-wide critical section is the scan for a free slot.

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use nos_api::{AccessMode, Error, OpenFlags, Result, Vfs, Vnode, Whence};

use crate::sync::Mutex;

/// Largest piece moved per node transfer
const IO_CHUNK: usize = 4096;

/// Reference to a live registry entry held by a descriptor slot
pub type FileRef = Arc<OpenFile>;

struct OpenFileInner {
    node: Option<Arc<dyn Vnode>>,
    offset: u64,
    mode: AccessMode,
    ref_count: usize,
}

/// A single shared open of a node
pub struct OpenFile {
    slot: usize,
    inner: Mutex<OpenFileInner>,
}

impl OpenFile {
    fn empty(slot: usize) -> Self {
        Self {
            slot,
            inner: Mutex::new(OpenFileInner {
                node: None,
                offset: 0,
                mode: AccessMode::ReadOnly,
                ref_count: 0,
            }),
        }
    }

    /// Index of this entry in the registry pool
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Number of descriptor slots naming this entry
    pub fn ref_count(&self) -> usize {
        self.inner.lock().ref_count
    }

    /// Current cursor position
    pub fn offset(&self) -> u64 {
        self.inner.lock().offset
    }

    pub fn mode(&self) -> AccessMode {
        self.inner.lock().mode
    }

    /// Whether the entry still holds its node
    pub fn is_open(&self) -> bool {
        self.inner.lock().node.is_some()
    }

    /// Read at the shared cursor and advance it
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let len = buf.len();
        self.read_chunked(len, |at, chunk| {
            buf[at..at + chunk.len()].copy_from_slice(chunk);
            Ok(())
        })
    }

    /// Write at the shared cursor and advance it
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        self.write_chunked(buf.len(), |at, chunk| {
            chunk.copy_from_slice(&buf[at..at + chunk.len()]);
            Ok(())
        })
    }

    /// Read up to `len` bytes, passing each chunk to `sink` with its
    /// position in the request
    ///
    /// The entry lock is held for the whole transfer, so transfers through
    /// descriptors sharing this entry never interleave. A short read from
    /// the node ends the transfer. A failure after some bytes moved ends it
    /// too, and the count so far is returned; the cursor covers only those
    /// bytes.
    pub fn read_chunked<F>(&self, len: usize, mut sink: F) -> Result<usize>
    where
        F: FnMut(usize, &[u8]) -> Result<()>,
    {
        let mut inner = self.inner.lock();
        if !inner.mode.can_read() {
            return Err(Error::BadFileDescriptor);
        }
        let node = inner.node.clone().ok_or(Error::BadFileDescriptor)?;

        let mut chunk = vec![0u8; len.min(IO_CHUNK)];
        let mut done = 0;
        while done < len {
            let want = (len - done).min(IO_CHUNK);
            let n = match node.read_at(&mut chunk[..want], inner.offset) {
                Ok(n) => n,
                Err(err) if done == 0 => return Err(err),
                Err(_) => break,
            };
            if n == 0 {
                break;
            }
            match sink(done, &chunk[..n]) {
                Ok(()) => {}
                Err(err) if done == 0 => return Err(err),
                Err(_) => break,
            }
            inner.offset += n as u64;
            done += n;
            if n < want {
                break;
            }
        }
        Ok(done)
    }

    /// Write up to `len` bytes, asking `source` to fill each chunk
    pub fn write_chunked<F>(&self, len: usize, mut source: F) -> Result<usize>
    where
        F: FnMut(usize, &mut [u8]) -> Result<()>,
    {
        let mut inner = self.inner.lock();
        if !inner.mode.can_write() {
            return Err(Error::BadFileDescriptor);
        }
        let node = inner.node.clone().ok_or(Error::BadFileDescriptor)?;

        let mut chunk = vec![0u8; len.min(IO_CHUNK)];
        let mut done = 0;
        while done < len {
            let want = (len - done).min(IO_CHUNK);
            match source(done, &mut chunk[..want]) {
                Ok(()) => {}
                Err(err) if done == 0 => return Err(err),
                Err(_) => break,
            }
            let n = match node.write_at(&chunk[..want], inner.offset) {
                Ok(n) => n,
                Err(err) if done == 0 => return Err(err),
                Err(_) => break,
            };
            inner.offset += n as u64;
            done += n;
            if n < want {
                break;
            }
        }
        Ok(done)
    }

    /// Move the shared cursor
    pub fn seek(&self, offset: i64, whence: Whence) -> Result<u64> {
        let mut inner = self.inner.lock();
        let node = inner.node.as_ref().ok_or(Error::BadFileDescriptor)?;
        if !node.is_seekable() {
            return Err(Error::NotSeekable);
        }

        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => inner.offset as i64,
            Whence::End => node.size()? as i64,
        };
        let new_offset = base.checked_add(offset).ok_or(Error::InvalidArgument)?;
        if new_offset < 0 {
            return Err(Error::InvalidArgument);
        }

        inner.offset = new_offset as u64;
        Ok(inner.offset)
    }
}

impl core::fmt::Debug for OpenFile {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("OpenFile")
            .field("slot", &self.slot)
            .field("offset", &inner.offset)
            .field("mode", &inner.mode)
            .field("ref_count", &inner.ref_count)
            .field("open", &inner.node.is_some())
            .finish()
    }
}

/// System-wide pool of open-file entries
pub struct FileRegistry {
    vfs: Arc<dyn Vfs>,
    entries: Vec<FileRef>,
    /// Occupancy map; guarded separately so bound entries never need it
    occupied: Mutex<Vec<bool>>,
}

impl FileRegistry {
    pub fn new(vfs: Arc<dyn Vfs>, capacity: usize) -> Self {
        Self {
            vfs,
            entries: (0..capacity).map(|slot| Arc::new(OpenFile::empty(slot))).collect(),
            occupied: Mutex::new(vec![false; capacity]),
        }
    }

    /// The volume layer entries are opened through
    pub fn vfs(&self) -> &Arc<dyn Vfs> {
        &self.vfs
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Number of entries currently bound
    pub fn in_use(&self) -> usize {
        self.occupied.lock().iter().filter(|&&used| used).count()
    }

    /// Open `path` and bind it to a fresh entry with a reference count of one
    ///
    /// `APPEND` starts the cursor at the node's current size. The node is
    /// closed again if no entry is free.
    pub fn open(&self, path: &str, flags: OpenFlags, mode: u32) -> Result<FileRef> {
        let access = flags.access_mode()?;
        let node = self.vfs.open(path, flags, mode)?;

        let offset = if flags.contains(OpenFlags::APPEND) {
            match node.size() {
                Ok(size) => size,
                Err(err) => {
                    self.vfs.close(node);
                    return Err(err);
                }
            }
        } else {
            0
        };

        let Some(slot) = self.claim_slot() else {
            log::warn!("file registry exhausted ({} entries) opening {}", self.capacity(), path);
            self.vfs.close(node);
            return Err(Error::TooManyOpenFilesSystemWide);
        };

        let entry = &self.entries[slot];
        {
            let mut inner = entry.inner.lock();
            debug_assert_eq!(inner.ref_count, 0);
            inner.node = Some(node);
            inner.offset = offset;
            inner.mode = access;
            inner.ref_count = 1;
        }
        Ok(entry.clone())
    }

    fn claim_slot(&self) -> Option<usize> {
        let mut occupied = self.occupied.lock();
        let slot = occupied.iter().position(|&used| !used)?;
        occupied[slot] = true;
        Some(slot)
    }

    /// Take another reference on `file` for a new descriptor slot
    pub fn duplicate(&self, file: &FileRef) -> FileRef {
        let mut inner = file.inner.lock();
        debug_assert!(inner.ref_count > 0, "duplicating a retired entry");
        inner.ref_count += 1;
        file.clone()
    }

    /// Drop one descriptor's reference; the last one closes the node
    pub fn close(&self, file: FileRef) {
        let retired = {
            let mut inner = file.inner.lock();
            debug_assert!(inner.ref_count > 0, "closing a retired entry");
            inner.ref_count = inner.ref_count.saturating_sub(1);
            if inner.ref_count == 0 {
                if let Some(node) = inner.node.take() {
                    self.vfs.close(node);
                }
                inner.offset = 0;
                true
            } else {
                false
            }
        };

        if retired {
            self.occupied.lock()[file.slot] = false;
        }
    }
}
