//! Process subsystem configuration
//!
//! All limits the process core enforces live here. Defaults follow the
//! classic OS/161 values (`MAX_PROC`, `OPEN_MAX`, `ARG_MAX`, ...).


use alloc::string::String;
use nos_api::{Error, Result};
use static_assertions::const_assert;

/// Default number of process slots (PIDs 1..=DEFAULT_MAX_PROCS)
pub const DEFAULT_MAX_PROCS: usize = 100;

/// Default per-process descriptor table size
pub const DEFAULT_OPEN_MAX: usize = 128;

/// Default capacity of the shared open-file registry
pub const DEFAULT_SYSTEM_OPEN_MAX: usize = 10 * DEFAULT_OPEN_MAX;

/// Largest argument vector accepted by `execv`
pub const DEFAULT_ARG_MAX: usize = 64 * 1024;

/// Size of the first-attempt argument buffer (one page)
pub const DEFAULT_ARG_FAST_PATH: usize = 4096;

/// Longest path accepted from user space, including the terminator
pub const DEFAULT_PATH_MAX: usize = 1024;

/// Processes allowed to hold a maximal argument buffer at once
pub const DEFAULT_EXEC_THROTTLE: usize = 1;

/// Descriptors below this index are reserved for the console bindings
pub const FIRST_USER_FD: usize = 3;

const_assert!(DEFAULT_MAX_PROCS >= 1);
const_assert!(DEFAULT_OPEN_MAX > FIRST_USER_FD);
const_assert!(DEFAULT_SYSTEM_OPEN_MAX >= DEFAULT_OPEN_MAX);
const_assert!(DEFAULT_ARG_FAST_PATH <= DEFAULT_ARG_MAX);

/// Limits and fixed names used by the process subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcConfig {
    /// Number of process slots; PIDs range over 1..=max_procs
    pub max_procs: usize,
    /// Descriptor slots per process
    pub open_max: usize,
    /// Entries in the shared open-file registry
    pub system_open_max: usize,
    /// Capacity of the large argument buffer
    pub arg_max: usize,
    /// Capacity of the first-attempt argument buffer
    pub arg_fast_path: usize,
    /// Longest user path, terminator included
    pub path_max: usize,
    /// Concurrent holders of a large argument buffer
    pub exec_throttle: usize,
    /// Path opened for descriptors 0, 1 and 2
    pub console_path: String,
}

impl Default for ProcConfig {
    fn default() -> Self {
        Self {
            max_procs: DEFAULT_MAX_PROCS,
            open_max: DEFAULT_OPEN_MAX,
            system_open_max: DEFAULT_SYSTEM_OPEN_MAX,
            arg_max: DEFAULT_ARG_MAX,
            arg_fast_path: DEFAULT_ARG_FAST_PATH,
            path_max: DEFAULT_PATH_MAX,
            exec_throttle: DEFAULT_EXEC_THROTTLE,
            console_path: String::from("con:"),
        }
    }
}

impl ProcConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_procs(mut self, max_procs: usize) -> Self {
        self.max_procs = max_procs;
        self
    }

    pub fn with_open_max(mut self, open_max: usize) -> Self {
        self.open_max = open_max;
        self
    }

    pub fn with_system_open_max(mut self, system_open_max: usize) -> Self {
        self.system_open_max = system_open_max;
        self
    }

    pub fn with_arg_limits(mut self, fast_path: usize, arg_max: usize) -> Self {
        self.arg_fast_path = fast_path;
        self.arg_max = arg_max;
        self
    }

    pub fn with_path_max(mut self, path_max: usize) -> Self {
        self.path_max = path_max;
        self
    }

    pub fn with_exec_throttle(mut self, permits: usize) -> Self {
        self.exec_throttle = permits;
        self
    }

    pub fn with_console_path(mut self, path: &str) -> Self {
        self.console_path = String::from(path);
        self
    }

    /// Reject limits the subsystem cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_procs == 0 || self.max_procs > i32::MAX as usize {
            return Err(Error::InvalidArgument);
        }
        if self.open_max <= FIRST_USER_FD || self.open_max > i32::MAX as usize {
            return Err(Error::InvalidArgument);
        }
        if self.system_open_max == 0 {
            return Err(Error::InvalidArgument);
        }
        if self.arg_fast_path == 0 || self.arg_fast_path > self.arg_max {
            return Err(Error::InvalidArgument);
        }
        if self.path_max == 0 || self.exec_throttle == 0 {
            return Err(Error::InvalidArgument);
        }
        if self.console_path.is_empty() {
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ProcConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_procs, 100);
        assert_eq!(config.system_open_max, 10 * config.open_max);
        assert_eq!(config.exec_throttle, 1);
        assert_eq!(config.console_path, "con:");
    }

    #[test]
    fn test_invalid_limits_rejected() {
        assert_eq!(ProcConfig::new().with_max_procs(0).validate(), Err(Error::InvalidArgument));
        assert_eq!(ProcConfig::new().with_open_max(3).validate(), Err(Error::InvalidArgument));
        assert_eq!(
            ProcConfig::new().with_arg_limits(8192, 4096).validate(),
            Err(Error::InvalidArgument)
        );
        assert_eq!(ProcConfig::new().with_exec_throttle(0).validate(), Err(Error::InvalidArgument));
    }

    #[test]
    fn test_builder_setters() {
        let config = ProcConfig::new()
            .with_max_procs(4)
            .with_open_max(8)
            .with_system_open_max(16)
            .with_console_path("tty0:");
        assert_eq!(config.max_procs, 4);
        assert_eq!(config.open_max, 8);
        assert_eq!(config.system_open_max, 16);
        assert_eq!(config.console_path, "tty0:");
        assert!(config.validate().is_ok());
    }
}
