//! File-system flag types shared by the syscall layer and the file registry

use bitflags::bitflags;

use crate::error::{Error, Result};

bitflags! {
    /// Flags accepted by `open`
    ///
    /// Read-only is the absence of both access bits, as in `O_RDONLY == 0`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        const WRONLY = 0x0001;
        const RDWR = 0x0002;
        const CREAT = 0x0004;
        const EXCL = 0x0008;
        const TRUNC = 0x0010;
        const APPEND = 0x0020;
    }
}

impl OpenFlags {
    /// Read-only open
    pub const RDONLY: OpenFlags = OpenFlags::empty();

    /// Mask of the access-mode bits
    pub const ACCMODE: u32 = 0x0003;

    /// Decode the access mode; both access bits set is invalid
    pub fn access_mode(self) -> Result<AccessMode> {
        match self.bits() & Self::ACCMODE {
            0 => Ok(AccessMode::ReadOnly),
            1 => Ok(AccessMode::WriteOnly),
            2 => Ok(AccessMode::ReadWrite),
            _ => Err(Error::InvalidArgument),
        }
    }
}

impl From<AccessMode> for OpenFlags {
    fn from(mode: AccessMode) -> Self {
        match mode {
            AccessMode::ReadOnly => OpenFlags::RDONLY,
            AccessMode::WriteOnly => OpenFlags::WRONLY,
            AccessMode::ReadWrite => OpenFlags::RDWR,
        }
    }
}

/// Access mode of an open file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    pub const fn can_read(self) -> bool {
        matches!(self, AccessMode::ReadOnly | AccessMode::ReadWrite)
    }

    pub const fn can_write(self) -> bool {
        matches!(self, AccessMode::WriteOnly | AccessMode::ReadWrite)
    }
}

/// Origin of an `lseek`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// Absolute offset
    Set,
    /// Relative to the current cursor
    Cur,
    /// Relative to the end of the file
    End,
}

impl Whence {
    pub const SEEK_SET: i32 = 0;
    pub const SEEK_CUR: i32 = 1;
    pub const SEEK_END: i32 = 2;

    /// Decode a raw `whence` argument
    pub fn from_raw(whence: i32) -> Result<Self> {
        match whence {
            Self::SEEK_SET => Ok(Whence::Set),
            Self::SEEK_CUR => Ok(Whence::Cur),
            Self::SEEK_END => Ok(Whence::End),
            _ => Err(Error::InvalidSeekWhence),
        }
    }
}
