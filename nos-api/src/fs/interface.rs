//! Volume-node layer interface
//!
//! The process core never looks inside a node; it only opens, transfers
//! through, sizes and closes them.

use alloc::sync::Arc;

use crate::error::Result;
use crate::fs::types::OpenFlags;

/// An open handle on the volume layer
pub trait Vnode: Send + Sync {
    /// Read into `buf` starting at `offset`, returning the bytes transferred
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize>;

    /// Write `buf` starting at `offset`, returning the bytes transferred
    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize>;

    /// Current size of the object in bytes
    fn size(&self) -> Result<u64>;

    /// Whether the node keeps a meaningful cursor
    fn is_seekable(&self) -> bool {
        true
    }
}

/// Path-level entry point of the volume layer
pub trait Vfs: Send + Sync {
    /// Open `path`; the returned handle stays valid until passed to `close`
    fn open(&self, path: &str, flags: OpenFlags, mode: u32) -> Result<Arc<dyn Vnode>>;

    /// Release a handle obtained from `open`
    fn close(&self, node: Arc<dyn Vnode>);
}
