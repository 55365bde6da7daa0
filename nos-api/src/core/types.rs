//! Core types used throughout the NOS process subsystem

/// Process identifier type
pub type Pid = i32;

/// File descriptor type
pub type Fd = i32;

/// Virtual address type
pub type VirtAddr = usize;

/// Address in a user address space
pub type UserPtr = usize;

/// Size of a pointer as laid out in user memory
pub const USER_PTR_SIZE: usize = ::core::mem::size_of::<UserPtr>();

/// Identity of the kernel bookkeeping process; never assigned from the table
pub const KERNEL_PID: Pid = 0;

/// Standard input descriptor
pub const STDIN_FILENO: Fd = 0;

/// Standard output descriptor
pub const STDOUT_FILENO: Fd = 1;

/// Standard error descriptor
pub const STDERR_FILENO: Fd = 2;

/// Round `addr` down to user pointer alignment
#[inline]
pub const fn align_down_ptr(addr: VirtAddr) -> VirtAddr {
    addr & !(USER_PTR_SIZE - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_down_ptr() {
        assert_eq!(align_down_ptr(0x1000), 0x1000);
        assert_eq!(align_down_ptr(0x1001), 0x1000);
        assert_eq!(align_down_ptr(0x1000 + USER_PTR_SIZE - 1), 0x1000);
        assert_eq!(align_down_ptr(0x1000 + USER_PTR_SIZE), 0x1000 + USER_PTR_SIZE);
    }
}
