// Argument marshalling for execv
//
// Arguments are packed back to back, each with its NUL, into one kernel
// buffer. The first attempt uses a small buffer; only when that overflows
// does the caller queue on the exec throttle for a full-size one, so large
// argument vectors cannot exhaust kernel memory together.

use alloc::vec;
use alloc::vec::Vec;

use nos_api::{
    Error, Result, ThreadSystem, USER_PTR_SIZE, UserMemory, UserPtr, VirtAddr, align_down_ptr,
};

use crate::sync::{Permit, Semaphore};

/// Buffer sizes for the two-stage copy-in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgLimits {
    pub fast_path: usize,
    pub max: usize,
}

/// Where `copy_out` left the argument vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserArgs {
    /// New stack pointer; also the base of the argv array
    pub stack_top: VirtAddr,
    pub argc: usize,
    pub argv: UserPtr,
}

pub struct ArgBuf<'a> {
    data: Vec<u8>,
    len: usize,
    nargs: usize,
    /// Held while this is a full-size buffer
    permit: Option<Permit<'a>>,
}

impl<'a> ArgBuf<'a> {
    fn with_capacity(max: usize, permit: Option<Permit<'a>>) -> Self {
        Self {
            data: vec![0; max],
            len: 0,
            nargs: 0,
            permit,
        }
    }

    /// Copy a NULL-terminated argv array in from user memory
    ///
    /// Fails with `ArgumentListTooLong` only when the arguments do not fit
    /// even the full-size buffer. While the throttle is taken the caller
    /// yields through `threads`.
    pub fn from_user<M>(
        mem: &M,
        uargv: UserPtr,
        limits: ArgLimits,
        throttle: &'a Semaphore,
        threads: &dyn ThreadSystem,
    ) -> Result<Self>
    where
        M: UserMemory + ?Sized,
    {
        let mut buf = ArgBuf::with_capacity(limits.fast_path, None);
        match buf.copy_in(mem, uargv) {
            Ok(()) => return Ok(buf),
            Err(Error::ArgumentListTooLong) => {}
            Err(err) => return Err(err),
        }
        drop(buf);

        log::debug!("exec: argv exceeds {} bytes, waiting for a large buffer", limits.fast_path);
        let permit = throttle.acquire(threads);
        let mut buf = ArgBuf::with_capacity(limits.max, Some(permit));
        buf.copy_in(mem, uargv)?;
        Ok(buf)
    }

    /// Build the buffer from kernel strings
    pub fn from_strs(args: &[&str], max: usize) -> Result<ArgBuf<'static>> {
        let mut buf = ArgBuf::with_capacity(max, None);
        for arg in args {
            let bytes = arg.as_bytes();
            if bytes.contains(&0) {
                return Err(Error::InvalidArgument);
            }
            let end = buf.len + bytes.len();
            if end >= max {
                return Err(Error::ArgumentListTooLong);
            }
            buf.data[buf.len..end].copy_from_slice(bytes);
            buf.data[end] = 0;
            buf.len = end + 1;
            buf.nargs += 1;
        }
        Ok(buf)
    }

    fn copy_in<M>(&mut self, mem: &M, mut uargv: UserPtr) -> Result<()>
    where
        M: UserMemory + ?Sized,
    {
        loop {
            let uarg = mem.copy_in_ptr(uargv)?;
            if uarg == 0 {
                return Ok(());
            }
            let copied = mem.copy_in_str(uarg, &mut self.data[self.len..]).map_err(|err| match err {
                Error::NameTooLong => Error::ArgumentListTooLong,
                other => other,
            })?;
            self.len += copied;
            self.nargs += 1;
            uargv += USER_PTR_SIZE;
        }
    }

    pub fn argc(&self) -> usize {
        self.nargs
    }

    /// Packed argument bytes, terminators included
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Capacity of the buffer in use
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn is_large(&self) -> bool {
        self.permit.is_some()
    }

    /// Arguments as separate byte strings, without terminators
    pub fn args(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.bytes()
            .split_inclusive(|&b| b == 0)
            .map(|arg| &arg[..arg.len() - 1])
    }

    /// Lay the arguments out on a new user stack below `stack_top`
    ///
    /// The strings go directly below `stack_top`, starting at a pointer
    /// aligned address; below them sits the argv array with its NULL
    /// terminator. The returned stack pointer is the base of that array.
    pub fn copy_out<M>(&self, mem: &mut M, stack_top: VirtAddr) -> Result<UserArgs>
    where
        M: UserMemory + ?Sized,
    {
        let strings = stack_top.checked_sub(self.len).ok_or(Error::BadUserAddress)?;
        let strings = align_down_ptr(strings);
        let argv = strings
            .checked_sub((self.nargs + 1) * USER_PTR_SIZE)
            .ok_or(Error::BadUserAddress)?;

        let mut pos = 0;
        let mut slot = argv;
        while pos < self.len {
            let uarg = strings + pos;
            mem.copy_out_ptr(uarg, slot)?;
            pos += mem.copy_out_str(&self.data[pos..self.len], uarg)?;
            slot += USER_PTR_SIZE;
        }
        mem.copy_out_ptr(0, slot)?;

        Ok(UserArgs {
            stack_top: argv,
            argc: self.nargs,
            argv,
        })
    }
}

impl core::fmt::Debug for ArgBuf<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ArgBuf")
            .field("len", &self.len)
            .field("max", &self.data.len())
            .field("nargs", &self.nargs)
            .field("large", &self.permit.is_some())
            .finish()
    }
}
