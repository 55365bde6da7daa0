//! Error handling module for the NOS process subsystem

use core::fmt;

/// Numeric error codes returned to user space
///
/// The numbering follows the OS/161 `kern/errno.h` table so the syscall
/// layer can hand the value straight back to the user library.
pub mod errno {
    pub const ENOSYS: i32 = 1;
    pub const ENOMEM: i32 = 3;
    pub const EFAULT: i32 = 6;
    pub const ENAMETOOLONG: i32 = 7;
    pub const EINVAL: i32 = 8;
    pub const ENPROC: i32 = 12;
    pub const ENOEXEC: i32 = 13;
    pub const E2BIG: i32 = 14;
    pub const ESRCH: i32 = 15;
    pub const ECHILD: i32 = 16;
    pub const ENOENT: i32 = 19;
    pub const EMFILE: i32 = 28;
    pub const ENFILE: i32 = 29;
    pub const EBADF: i32 = 30;
    pub const EIO: i32 = 32;
    pub const ESPIPE: i32 = 33;
}

/// Common error type used throughout the NOS process subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    /// The process table has no free slot
    TooManyProcesses,
    /// The shared open-file registry is full
    TooManyOpenFilesSystemWide,
    /// The calling process has no free descriptor slot
    TooManyOpenFilesPerProcess,
    /// A record, buffer or address space could not be allocated
    OutOfMemory,
    /// No live process has the requested identity
    NoSuchProcess,
    /// The wait target is not a current child of the caller
    NoSuchChild,
    /// The descriptor is out of range, empty, or opened in the wrong mode
    BadFileDescriptor,
    /// Unsupported wait option
    InvalidOption,
    /// Unknown seek origin
    InvalidSeekWhence,
    /// The node behind the descriptor has no cursor (console, pipe)
    NotSeekable,
    /// A copy to or from user memory faulted
    BadUserAddress,
    /// The argument vector does not fit in the largest argument buffer
    ArgumentListTooLong,
    /// Invalid argument (bad access mode, negative offset, bad limit)
    InvalidArgument,
    /// No such file or directory
    NotFound,
    /// A user string was not terminated within the allowed length
    NameTooLong,
    /// The volume layer reported a transfer failure
    IoError,
    /// The loader rejected the image
    NotExecutable,
    /// Unknown system call number
    NoSuchSyscall,
}

impl Error {
    /// Errno value reported to user space for this error
    pub const fn errno(self) -> i32 {
        use self::errno::*;
        match self {
            Error::TooManyProcesses => ENPROC,
            Error::TooManyOpenFilesSystemWide => ENFILE,
            Error::TooManyOpenFilesPerProcess => EMFILE,
            Error::OutOfMemory => ENOMEM,
            Error::NoSuchProcess => ESRCH,
            Error::NoSuchChild => ECHILD,
            Error::BadFileDescriptor => EBADF,
            Error::InvalidOption => EINVAL,
            Error::InvalidSeekWhence => EINVAL,
            Error::NotSeekable => ESPIPE,
            Error::BadUserAddress => EFAULT,
            Error::ArgumentListTooLong => E2BIG,
            Error::InvalidArgument => EINVAL,
            Error::NotFound => ENOENT,
            Error::NameTooLong => ENAMETOOLONG,
            Error::IoError => EIO,
            Error::NotExecutable => ENOEXEC,
            Error::NoSuchSyscall => ENOSYS,
        }
    }

    /// True for the resource-exhaustion class of errors
    pub const fn is_exhaustion(self) -> bool {
        matches!(
            self,
            Error::TooManyProcesses
                | Error::TooManyOpenFilesSystemWide
                | Error::TooManyOpenFilesPerProcess
                | Error::OutOfMemory
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TooManyProcesses => write!(f, "Too many processes in system"),
            Error::TooManyOpenFilesSystemWide => write!(f, "Too many open files in system"),
            Error::TooManyOpenFilesPerProcess => write!(f, "Too many open files"),
            Error::OutOfMemory => write!(f, "Out of memory"),
            Error::NoSuchProcess => write!(f, "No such process"),
            Error::NoSuchChild => write!(f, "No child processes"),
            Error::BadFileDescriptor => write!(f, "Bad file number"),
            Error::InvalidOption => write!(f, "Invalid wait option"),
            Error::InvalidSeekWhence => write!(f, "Invalid seek origin"),
            Error::NotSeekable => write!(f, "Illegal seek"),
            Error::BadUserAddress => write!(f, "Bad memory reference"),
            Error::ArgumentListTooLong => write!(f, "Argument list too long"),
            Error::InvalidArgument => write!(f, "Invalid argument"),
            Error::NotFound => write!(f, "No such file or directory"),
            Error::NameTooLong => write!(f, "String too long"),
            Error::IoError => write!(f, "Input/output error"),
            Error::NotExecutable => write!(f, "File is not executable"),
            Error::NoSuchSyscall => write!(f, "Function not implemented"),
        }
    }
}

/// Result type for operations that can fail
pub type Result<T> = core::result::Result<T, Error>;
