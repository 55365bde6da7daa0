//! Address-space and user-memory interfaces
//!
//! An address space is opaque to the process core: it can be created,
//! copied, activated, given a stack, and destroyed by dropping it. User
//! memory is reached only through the copy primitives below, which fail
//! cleanly with `Error::BadUserAddress` instead of faulting.

use alloc::boxed::Box;

use crate::core::types::{USER_PTR_SIZE, UserPtr, VirtAddr};
use crate::error::{Error, Result};

/// Raw copy primitives between kernel buffers and user memory
pub trait UserMemory {
    /// Copy `dst.len()` bytes from user address `src`
    fn copy_in(&self, src: UserPtr, dst: &mut [u8]) -> Result<()>;

    /// Copy all of `src` to user address `dst`
    fn copy_out(&mut self, src: &[u8], dst: UserPtr) -> Result<()>;

    /// Copy a NUL-terminated string from user space into `dst`
    ///
    /// Returns the length including the terminator. Fails with
    /// `NameTooLong` when no terminator is found within `dst.len()` bytes.
    fn copy_in_str(&self, src: UserPtr, dst: &mut [u8]) -> Result<usize> {
        for i in 0..dst.len() {
            let mut byte = [0u8; 1];
            self.copy_in(src + i, &mut byte)?;
            dst[i] = byte[0];
            if byte[0] == 0 {
                return Ok(i + 1);
            }
        }
        Err(Error::NameTooLong)
    }

    /// Copy a NUL-terminated string from `src` out to user space
    ///
    /// Returns the length including the terminator.
    fn copy_out_str(&mut self, src: &[u8], dst: UserPtr) -> Result<usize> {
        let len = src.iter().position(|&b| b == 0).ok_or(Error::NameTooLong)? + 1;
        self.copy_out(&src[..len], dst)?;
        Ok(len)
    }

    /// Fetch one user pointer
    fn copy_in_ptr(&self, src: UserPtr) -> Result<UserPtr> {
        let mut raw = [0u8; USER_PTR_SIZE];
        self.copy_in(src, &mut raw)?;
        Ok(UserPtr::from_ne_bytes(raw))
    }

    /// Store one user pointer
    fn copy_out_ptr(&mut self, value: UserPtr, dst: UserPtr) -> Result<()> {
        self.copy_out(&value.to_ne_bytes(), dst)
    }
}

/// A virtual-memory context owned by one process
pub trait AddressSpace: UserMemory + Send {
    /// Duplicate the whole space for a forked child
    fn copy(&self) -> Result<Box<dyn AddressSpace>>;

    /// Make this space the one the MMU translates through
    fn activate(&self);

    /// Drop any MMU state that still refers to this space
    fn deactivate(&self);

    /// Define the user stack region and return its initial top
    fn define_stack(&mut self) -> Result<VirtAddr>;
}

/// Factory for fresh, empty address spaces
pub trait VmManager: Send + Sync {
    fn create(&self) -> Result<Box<dyn AddressSpace>>;
}
