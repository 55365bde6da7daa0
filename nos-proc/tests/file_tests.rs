//! File descriptor tests
//! Tests for open/close/read/write/lseek/dup2 through the syscall handlers

#![cfg(test)]

use std::sync::Arc;

use mockall::mock;
use mockall::predicate::eq;
use nos_api::{Error, OpenFlags, Result, TrapFrame, UserPtr, Vfs, Vnode, Whence};
use nos_proc::syscalls::file_io::*;
use nos_proc::testing::{ConsoleNode, DATA_BASE, DATA_SIZE, FakeLoader, FakeThreads, FakeVm, MemFile, TestKernel};
use nos_proc::{ProcConfig, ProcManager, Services, SyscallContext};

const O_RDONLY: i32 = 0;
const O_WRONLY: i32 = 1;
const O_RDWR: i32 = 2;
const O_CREAT: i32 = 4;
const O_APPEND: i32 = 32;

struct UserBufs {
    data_path: UserPtr,
    new_path: UserPtr,
    buf: UserPtr,
}

fn setup(kernel: &TestKernel, payload: &[u8]) -> (Arc<nos_proc::Process>, UserBufs) {
    kernel.fs.add_file("/data", b"0123456789");
    let mut bufs = UserBufs { data_path: 0, new_path: 0, buf: 0 };
    let proc = kernel.spawn_user_with("sh", |space| {
        bufs.data_path = space.place_str("/data");
        bufs.new_path = space.place_str("/new");
        bufs.buf = space.place_bytes(&[0u8; 64]);
        space.write_bytes(bufs.buf, payload);
    });
    (proc, bufs)
}

#[cfg(test)]
mod open_close_tests {
    use super::*;

    /// User opens start at 3 and reuse the lowest free slot
    #[test]
    fn test_open_lowest_descriptor() {
        let kernel = TestKernel::new();
        let (proc, bufs) = setup(&kernel, b"");
        let ctx = kernel.ctx(&proc);

        assert_eq!(handle_open(&ctx, bufs.data_path, O_RDONLY, 0), Ok(3));
        assert_eq!(handle_open(&ctx, bufs.data_path, O_RDONLY, 0), Ok(4));
        assert_eq!(handle_close(&ctx, 3), Ok(0));
        assert_eq!(handle_open(&ctx, bufs.data_path, O_RDONLY, 0), Ok(3));
    }

    /// Flag bits the file layer does not define are ignored
    #[test]
    fn test_open_ignores_unknown_flags() {
        let kernel = TestKernel::new();
        let (proc, bufs) = setup(&kernel, b"");
        let ctx = kernel.ctx(&proc);
        const O_NOCTTY: i32 = 0x40;

        assert_eq!(handle_open(&ctx, bufs.data_path, O_RDONLY | O_NOCTTY, 0), Ok(3));
        assert_eq!(handle_read(&ctx, 3, bufs.buf, 4), Ok(4));
        assert_eq!(handle_open(&ctx, bufs.data_path, O_WRONLY | O_RDWR | O_NOCTTY, 0), Err(Error::InvalidArgument));
    }

    /// Close of an empty or out-of-range descriptor
    #[test]
    fn test_close_bad_descriptor() {
        let kernel = TestKernel::new();
        let (proc, _) = setup(&kernel, b"");
        let ctx = kernel.ctx(&proc);

        assert_eq!(handle_close(&ctx, 9), Err(Error::BadFileDescriptor));
        assert_eq!(handle_close(&ctx, -1), Err(Error::BadFileDescriptor));
        assert_eq!(handle_close(&ctx, 4096), Err(Error::BadFileDescriptor));
        assert_eq!(handle_close(&ctx, 2), Ok(0));
        assert_eq!(handle_close(&ctx, 2), Err(Error::BadFileDescriptor));
    }

    /// Open errors: missing file, bad access mode, bad path pointer
    #[test]
    fn test_open_errors() {
        let kernel = TestKernel::new();
        let (proc, bufs) = setup(&kernel, b"");
        let ctx = kernel.ctx(&proc);

        assert_eq!(handle_open(&ctx, bufs.new_path, O_RDONLY, 0), Err(Error::NotFound));
        assert_eq!(handle_open(&ctx, bufs.data_path, O_WRONLY | O_RDWR, 0), Err(Error::InvalidArgument));
        assert_eq!(handle_open(&ctx, 0, O_RDONLY, 0), Err(Error::BadUserAddress));
        assert_eq!(handle_open(&ctx, bufs.new_path, O_WRONLY | O_CREAT, 0o644), Ok(3));
        assert!(kernel.fs.file("/new").is_some());
    }

    /// Per-process exhaustion gives the registry entry back
    #[test]
    fn test_per_process_limit() {
        let kernel = TestKernel::with_config(ProcConfig::new().with_open_max(5));
        let (proc, bufs) = setup(&kernel, b"");
        let ctx = kernel.ctx(&proc);

        assert_eq!(handle_open(&ctx, bufs.data_path, O_RDONLY, 0), Ok(3));
        assert_eq!(handle_open(&ctx, bufs.data_path, O_RDONLY, 0), Ok(4));
        let in_use = kernel.manager.files().in_use();
        assert_eq!(
            handle_open(&ctx, bufs.data_path, O_RDONLY, 0),
            Err(Error::TooManyOpenFilesPerProcess)
        );
        assert_eq!(kernel.manager.files().in_use(), in_use);
        assert_eq!(kernel.fs.open_handles(), in_use);
    }

    /// System-wide exhaustion closes the freshly opened node
    #[test]
    fn test_system_wide_limit() {
        let kernel = TestKernel::with_config(ProcConfig::new().with_system_open_max(5));
        let (proc, bufs) = setup(&kernel, b"");
        let ctx = kernel.ctx(&proc);

        assert_eq!(handle_open(&ctx, bufs.data_path, O_RDONLY, 0), Ok(3));
        assert_eq!(handle_open(&ctx, bufs.data_path, O_RDONLY, 0), Ok(4));
        assert_eq!(
            handle_open(&ctx, bufs.data_path, O_RDONLY, 0),
            Err(Error::TooManyOpenFilesSystemWide)
        );
        assert_eq!(kernel.fs.open_handles(), 5);
        assert!(proc.files().get(5).is_err());
    }
}

#[cfg(test)]
mod transfer_tests {
    use super::*;

    /// Writes to stdout land on the console
    #[test]
    fn test_console_write() {
        let kernel = TestKernel::new();
        let (proc, bufs) = setup(&kernel, b"hello\n");
        let ctx = kernel.ctx(&proc);

        assert_eq!(handle_write(&ctx, 1, bufs.buf, 6), Ok(6));
        assert_eq!(kernel.fs.console().output(), b"hello\n");
        assert_eq!(handle_write(&ctx, 0, bufs.buf, 6), Err(Error::BadFileDescriptor));
    }

    /// Reads advance the cursor and stop at end of file
    #[test]
    fn test_read_advances_cursor() {
        let kernel = TestKernel::new();
        let (proc, bufs) = setup(&kernel, b"");
        let ctx = kernel.ctx(&proc);
        let fd = handle_open(&ctx, bufs.data_path, O_RDONLY, 0).unwrap() as i32;

        assert_eq!(handle_read(&ctx, fd, bufs.buf, 4), Ok(4));
        assert_eq!(kernel.user_bytes(&proc, bufs.buf, 4), b"0123");
        assert_eq!(handle_read(&ctx, fd, bufs.buf, 64), Ok(6));
        assert_eq!(kernel.user_bytes(&proc, bufs.buf, 6), b"456789");
        assert_eq!(handle_read(&ctx, fd, bufs.buf, 64), Ok(0));
    }

    /// Mode checks and user pointer faults
    #[test]
    fn test_transfer_errors() {
        let kernel = TestKernel::new();
        let (proc, bufs) = setup(&kernel, b"abc");
        let ctx = kernel.ctx(&proc);
        let ro = handle_open(&ctx, bufs.data_path, O_RDONLY, 0).unwrap() as i32;
        let wo = handle_open(&ctx, bufs.data_path, O_WRONLY, 0).unwrap() as i32;

        assert_eq!(handle_write(&ctx, ro, bufs.buf, 3), Err(Error::BadFileDescriptor));
        assert_eq!(handle_read(&ctx, wo, bufs.buf, 3), Err(Error::BadFileDescriptor));
        assert_eq!(handle_read(&ctx, 42, bufs.buf, 3), Err(Error::BadFileDescriptor));
        assert_eq!(handle_read(&ctx, ro, 0, 3), Err(Error::BadUserAddress));
        assert_eq!(handle_read(&ctx, ro, 0x10, 3), Err(Error::BadUserAddress));
    }

    /// Append opens write at the end of the file
    #[test]
    fn test_append() {
        let kernel = TestKernel::new();
        let (proc, bufs) = setup(&kernel, b"xy");
        let ctx = kernel.ctx(&proc);
        let fd = handle_open(&ctx, bufs.data_path, O_WRONLY | O_APPEND, 0).unwrap() as i32;

        assert_eq!(handle_write(&ctx, fd, bufs.buf, 2), Ok(2));
        assert_eq!(kernel.fs.file("/data").unwrap().contents(), b"0123456789xy");
    }

    /// Transfers larger than one chunk go through whole
    #[test]
    fn test_large_write_and_read() {
        let kernel = TestKernel::new();
        kernel.fs.add_file("/big", b"");
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut path = 0;
        let mut buf = 0;
        let proc = kernel.spawn_user_with("sh", |space| {
            path = space.place_str("/big");
            buf = space.place_bytes(&payload);
        });
        let ctx = kernel.ctx(&proc);
        let fd = handle_open(&ctx, path, O_RDWR, 0).unwrap() as i32;

        assert_eq!(handle_write(&ctx, fd, buf, payload.len()), Ok(payload.len() as u64));
        assert_eq!(kernel.fs.file("/big").unwrap().contents(), payload);
        assert_eq!(handle_lseek(&ctx, fd, 0, Whence::SEEK_SET), Ok(0));
        assert_eq!(handle_read(&ctx, fd, buf, payload.len()), Ok(payload.len() as u64));
        assert_eq!(kernel.user_bytes(&proc, buf, payload.len()), payload);
    }

    /// A fault after the first chunk ends the read with the bytes already copied
    #[test]
    fn test_read_stops_at_unmapped_tail() {
        let kernel = TestKernel::new();
        let contents: Vec<u8> = (0..8192u32).map(|i| (i % 253) as u8).collect();
        kernel.fs.add_file("/big", &contents);
        let mut path = 0;
        let proc = kernel.spawn_user_with("sh", |space| path = space.place_str("/big"));
        let ctx = kernel.ctx(&proc);
        let fd = handle_open(&ctx, path, O_RDONLY, 0).unwrap() as i32;
        let tail = DATA_BASE + DATA_SIZE - 4096;

        assert_eq!(handle_read(&ctx, fd, tail, 8192), Ok(4096));
        assert_eq!(kernel.user_bytes(&proc, tail, 4096), &contents[..4096]);
        assert_eq!(handle_lseek(&ctx, fd, 0, Whence::SEEK_CUR), Ok(4096));

        // Nothing moves on a fault at the very first byte
        assert_eq!(handle_read(&ctx, fd, DATA_BASE + DATA_SIZE, 16), Err(Error::BadUserAddress));
        assert_eq!(handle_lseek(&ctx, fd, 0, Whence::SEEK_CUR), Ok(4096));
    }

    /// A fault after the first chunk ends the write with the bytes already stored
    #[test]
    fn test_write_stops_at_unmapped_tail() {
        let kernel = TestKernel::new();
        kernel.fs.add_file("/out", b"");
        let tail = DATA_BASE + DATA_SIZE - 4096;
        let pattern: Vec<u8> = (0..4096u32).map(|i| (i % 241) as u8).collect();
        let mut path = 0;
        let proc = kernel.spawn_user_with("sh", |space| {
            path = space.place_str("/out");
            space.write_bytes(tail, &pattern);
        });
        let ctx = kernel.ctx(&proc);
        let fd = handle_open(&ctx, path, O_WRONLY, 0).unwrap() as i32;

        assert_eq!(handle_write(&ctx, fd, tail, 8192), Ok(4096));
        assert_eq!(kernel.fs.file("/out").unwrap().contents(), pattern);
        assert_eq!(handle_lseek(&ctx, fd, 0, Whence::SEEK_CUR), Ok(4096));
    }
}

#[cfg(test)]
mod seek_dup_tests {
    use super::*;

    /// lseek origins and error cases
    #[test]
    fn test_lseek() {
        let kernel = TestKernel::new();
        let (proc, bufs) = setup(&kernel, b"");
        let ctx = kernel.ctx(&proc);
        let fd = handle_open(&ctx, bufs.data_path, O_RDONLY, 0).unwrap() as i32;

        assert_eq!(handle_lseek(&ctx, fd, 3, Whence::SEEK_SET), Ok(3));
        assert_eq!(handle_lseek(&ctx, fd, 2, Whence::SEEK_CUR), Ok(5));
        assert_eq!(handle_lseek(&ctx, fd, -2, Whence::SEEK_END), Ok(8));
        assert_eq!(handle_lseek(&ctx, fd, -9, Whence::SEEK_CUR), Err(Error::InvalidArgument));
        assert_eq!(handle_lseek(&ctx, fd, 0, 7), Err(Error::InvalidSeekWhence));
        assert_eq!(handle_lseek(&ctx, 1, 0, Whence::SEEK_SET), Err(Error::NotSeekable));
        assert_eq!(handle_lseek(&ctx, 40, 0, Whence::SEEK_SET), Err(Error::BadFileDescriptor));

        assert_eq!(handle_read(&ctx, fd, bufs.buf, 2), Ok(2));
        assert_eq!(kernel.user_bytes(&proc, bufs.buf, 2), b"89");
    }

    /// dup2 redirects stdout into a file and the two descriptors share a cursor
    #[test]
    fn test_dup2_redirect() {
        let kernel = TestKernel::new();
        let (proc, bufs) = setup(&kernel, b"ab");
        let ctx = kernel.ctx(&proc);
        let fd = handle_open(&ctx, bufs.data_path, O_WRONLY, 0).unwrap() as i32;

        assert_eq!(handle_dup2(&ctx, fd, 1), Ok(1));
        assert_eq!(handle_write(&ctx, 1, bufs.buf, 2), Ok(2));
        assert_eq!(handle_write(&ctx, fd, bufs.buf, 2), Ok(2));
        assert_eq!(kernel.fs.file("/data").unwrap().contents(), b"abab456789");
        assert!(kernel.fs.console().output().is_empty());

        assert_eq!(handle_dup2(&ctx, fd, fd), Ok(fd as u64));
        assert_eq!(handle_dup2(&ctx, 30, 1), Err(Error::BadFileDescriptor));
        assert_eq!(handle_dup2(&ctx, fd, -1), Err(Error::BadFileDescriptor));
        assert_eq!(handle_dup2(&ctx, fd, 128), Err(Error::BadFileDescriptor));
    }

    /// Parent and child share the cursor of an entry opened before fork
    #[test]
    fn test_fork_shares_cursor() {
        let kernel = TestKernel::new();
        let (parent, bufs) = setup(&kernel, b"");
        let pctx = kernel.ctx(&parent);
        let fd = handle_open(&pctx, bufs.data_path, O_RDONLY, 0).unwrap() as i32;

        let pid = kernel.manager.fork(&parent, &TrapFrame::new()).unwrap();
        let child = kernel.manager.lookup(pid).unwrap();
        let cctx = SyscallContext::new(&kernel.manager, child.clone());

        assert_eq!(handle_read(&cctx, fd, bufs.buf, 3), Ok(3));
        assert_eq!(handle_read(&pctx, fd, bufs.buf, 3), Ok(3));
        assert_eq!(kernel.user_bytes(&parent, bufs.buf, 3), b"345");
        assert_eq!(kernel.user_bytes(&child, bufs.buf, 3), b"012");

        assert_eq!(handle_close(&cctx, fd), Ok(0));
        assert_eq!(handle_read(&pctx, fd, bufs.buf, 3), Ok(3));
    }

    /// Every node is closed once all processes are gone
    #[test]
    fn test_no_handles_leak() {
        let kernel = TestKernel::new();
        let (parent, bufs) = setup(&kernel, b"");
        let ctx = kernel.ctx(&parent);
        handle_open(&ctx, bufs.data_path, O_RDONLY, 0).unwrap();
        handle_dup2(&ctx, 3, 9).unwrap();
        let pid = kernel.manager.fork(&parent, &TrapFrame::new()).unwrap();
        let child = kernel.manager.lookup(pid).unwrap();

        kernel.manager.exit(&child, 0);
        kernel.manager.exit(&parent, 0);
        let kproc = kernel.manager.kernel_process();
        kernel.manager.wait(kproc, parent.pid(), nos_api::WaitMode::Block).unwrap();

        assert_eq!(kernel.manager.process_count(), 0);
        assert_eq!(kernel.manager.files().in_use(), 0);
        assert_eq!(kernel.fs.open_handles(), 0);
    }
}

mock! {
    pub Volume {}

    impl Vfs for Volume {
        fn open(&self, path: &str, flags: OpenFlags, mode: u32) -> Result<Arc<dyn Vnode>>;
        fn close(&self, node: Arc<dyn Vnode>);
    }
}

#[cfg(test)]
mod mock_volume_tests {
    use super::*;

    fn manager_over(vfs: MockVolume) -> ProcManager {
        let services = Services {
            vfs: Arc::new(vfs),
            vm: Arc::new(FakeVm::new()),
            threads: Arc::new(FakeThreads::new()),
            loader: Arc::new(FakeLoader::new()),
        };
        ProcManager::new(ProcConfig::default(), services).expect("valid configuration")
    }

    /// Volume errors reach the caller and nothing is installed
    #[test]
    fn test_open_failure_propagates() {
        let console: Arc<dyn Vnode> = Arc::new(ConsoleNode::default());
        let mut vfs = MockVolume::new();
        vfs.expect_open()
            .withf(|path, _, _| path == "con:")
            .times(3)
            .returning(move |_, _, _| Ok(console.clone()));
        vfs.expect_open()
            .with(eq("/missing"), eq(OpenFlags::RDONLY), eq(0u32))
            .times(1)
            .returning(|_, _, _| Err(Error::NotFound));
        vfs.expect_close().times(0);

        let manager = manager_over(vfs);
        let proc = manager
            .create_for_run(manager.kernel_process(), "sh")
            .expect("Failed to create process");
        let mut space = FakeVm::new().space();
        let path = space.place_str("/missing");
        proc.set_space(Some(Box::new(space)));

        let ctx = SyscallContext::new(&manager, proc.clone());
        assert_eq!(handle_open(&ctx, path, O_RDONLY, 0), Err(Error::NotFound));
        assert_eq!(proc.files().open_count(), 3);
        assert_eq!(manager.files().in_use(), 3);
    }

    /// A full registry hands the node straight back to the volume
    #[test]
    fn test_registry_full_closes_node() {
        let console: Arc<dyn Vnode> = Arc::new(ConsoleNode::default());
        let mut vfs = MockVolume::new();
        vfs.expect_open()
            .withf(|path, _, _| path == "con:")
            .times(3)
            .returning(move |_, _, _| Ok(console.clone()));
        vfs.expect_open()
            .withf(|path, _, _| path == "/f")
            .times(1)
            .returning(|_, _, _| Ok(Arc::new(MemFile::with_contents(b"x")) as Arc<dyn Vnode>));
        vfs.expect_close().times(1).return_const(());

        let services = Services {
            vfs: Arc::new(vfs),
            vm: Arc::new(FakeVm::new()),
            threads: Arc::new(FakeThreads::new()),
            loader: Arc::new(FakeLoader::new()),
        };
        let config = ProcConfig::new().with_system_open_max(3);
        let manager = ProcManager::new(config, services).expect("valid configuration");
        let proc = manager
            .create_for_run(manager.kernel_process(), "sh")
            .expect("Failed to create process");
        let mut space = FakeVm::new().space();
        let path = space.place_str("/f");
        proc.set_space(Some(Box::new(space)));

        let ctx = SyscallContext::new(&manager, proc.clone());
        assert_eq!(handle_open(&ctx, path, O_RDONLY, 0), Err(Error::TooManyOpenFilesSystemWide));
        assert_eq!(proc.files().open_count(), 3);
    }
}
