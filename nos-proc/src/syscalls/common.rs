// Shared utilities for syscall modules

use alloc::string::String;
use alloc::vec;

use nos_api::{Error, Result, UserMemory, UserPtr};

/// Value handed back to user space, or the error to report
pub type SyscallResult = core::result::Result<u64, Error>;

/// Convert syscall result to raw value for return
///
/// Errors come back as the negated errno, the way the user library expects
/// to find them in the return register.
pub fn result_to_raw(result: SyscallResult) -> u64 {
    match result {
        Ok(value) => value,
        Err(error) => (-(error.errno() as i64)) as u64,
    }
}

/// Extract arguments from syscall context
pub fn extract_args(args: &[u64], count: usize) -> Result<&[u64]> {
    if args.len() < count {
        Err(Error::InvalidArgument)
    } else {
        Ok(&args[..count])
    }
}

/// Copy a path in from user memory
///
/// `path_max` bounds the copy, terminator included.
pub fn copy_in_path<M>(mem: &M, upath: UserPtr, path_max: usize) -> Result<String>
where
    M: UserMemory + ?Sized,
{
    if upath == 0 {
        return Err(Error::BadUserAddress);
    }
    let mut buf = vec![0u8; path_max];
    let len = mem.copy_in_str(upath, &mut buf)?;
    buf.truncate(len - 1);
    if buf.is_empty() {
        return Err(Error::InvalidArgument);
    }
    String::from_utf8(buf).map_err(|_| Error::InvalidArgument)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSpace;
    use nos_api::error::errno;

    #[test]
    fn test_result_to_raw() {
        assert_eq!(result_to_raw(Ok(42)), 42);
        assert_eq!(result_to_raw(Err(Error::BadFileDescriptor)) as i64, -(errno::EBADF as i64));
    }

    #[test]
    fn test_extract_args() {
        assert_eq!(extract_args(&[1, 2, 3], 2), Ok(&[1u64, 2][..]));
        assert_eq!(extract_args(&[1], 2), Err(Error::InvalidArgument));
    }

    #[test]
    fn test_copy_in_path() {
        let mut space = FakeSpace::new();
        let path = space.place_str("/bin/sh");
        assert_eq!(copy_in_path(&space, path, 64).unwrap(), "/bin/sh");
        assert_eq!(copy_in_path(&space, path, 4), Err(Error::NameTooLong));
        assert_eq!(copy_in_path(&space, 0, 64), Err(Error::BadUserAddress));
        let empty = space.place_str("");
        assert_eq!(copy_in_path(&space, empty, 64), Err(Error::InvalidArgument));
    }
}
