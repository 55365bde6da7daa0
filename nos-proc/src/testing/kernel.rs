use std::sync::Arc;

use nos_api::{USER_PTR_SIZE, UserMemory, UserPtr};

use crate::config::ProcConfig;
use crate::process::{ProcManager, Process, Services};
use crate::syscalls::SyscallContext;
use crate::testing::{FakeLoader, FakeSpace, FakeThreads, FakeVm, MemFs};

/// A `ProcManager` wired to the in-memory collaborators
pub struct TestKernel {
    pub fs: Arc<MemFs>,
    pub vm: Arc<FakeVm>,
    pub threads: Arc<FakeThreads>,
    pub loader: Arc<FakeLoader>,
    pub manager: ProcManager,
}

impl TestKernel {
    pub fn new() -> Self {
        Self::with_config(ProcConfig::default())
    }

    pub fn with_config(config: ProcConfig) -> Self {
        let fs = Arc::new(MemFs::new());
        let vm = Arc::new(FakeVm::new());
        let threads = Arc::new(FakeThreads::new());
        let loader = Arc::new(FakeLoader::new());
        let services = Services {
            vfs: fs.clone(),
            vm: vm.clone(),
            threads: threads.clone(),
            loader: loader.clone(),
        };
        let manager = ProcManager::new(config, services).expect("valid test configuration");
        Self {
            fs,
            vm,
            threads,
            loader,
            manager,
        }
    }

    /// Add an executable the fake loader accepts
    pub fn add_program(&self, path: &str) {
        let mut image = FakeLoader::MAGIC.to_vec();
        image.extend_from_slice(path.as_bytes());
        self.fs.add_file(path, &image);
    }

    /// A running user process under the kernel process
    pub fn spawn_user(&self, name: &str) -> Arc<Process> {
        self.spawn_user_with(name, |_| {})
    }

    /// Like `spawn_user`, letting `prepare` fill the address space first
    pub fn spawn_user_with<F>(&self, name: &str, prepare: F) -> Arc<Process>
    where
        F: FnOnce(&mut FakeSpace),
    {
        let kproc = self.manager.kernel_process();
        let proc = self
            .manager
            .create_for_run(kproc, name)
            .expect("process slot for test process");
        let mut space = self.vm.space();
        prepare(&mut space);
        proc.set_space(Some(Box::new(space)));
        self.manager.adopt(kproc, &proc);
        proc.attach_thread();
        proc
    }

    /// Syscall context for `proc`; also makes it current on this host thread
    pub fn ctx(&self, proc: &Arc<Process>) -> SyscallContext<'_> {
        FakeThreads::set_current(Some(proc.pid()));
        SyscallContext::new(&self.manager, proc.clone())
    }

    pub fn user_bytes(&self, proc: &Process, addr: UserPtr, len: usize) -> Vec<u8> {
        let guard = proc.space();
        let space = guard.as_deref().expect("process has an address space");
        let mut buf = vec![0u8; len];
        space.copy_in(addr, &mut buf).expect("readable user address");
        buf
    }

    pub fn user_ptr(&self, proc: &Process, addr: UserPtr) -> UserPtr {
        let raw = self.user_bytes(proc, addr, USER_PTR_SIZE);
        UserPtr::from_ne_bytes(raw.try_into().expect("pointer width"))
    }

    pub fn user_i32(&self, proc: &Process, addr: UserPtr) -> i32 {
        let raw = self.user_bytes(proc, addr, 4);
        i32::from_ne_bytes(raw.try_into().expect("i32 width"))
    }

    pub fn user_cstr(&self, proc: &Process, addr: UserPtr) -> String {
        let guard = proc.space();
        let space = guard.as_deref().expect("process has an address space");
        let mut buf = vec![0u8; 4096];
        let len = space.copy_in_str(addr, &mut buf).expect("terminated user string");
        buf.truncate(len - 1);
        String::from_utf8(buf).expect("utf-8 user string")
    }

    /// Argument strings of an image entered through `execv` or `run_program`
    pub fn user_args(&self, proc: &Process, argv: UserPtr, argc: usize) -> Vec<String> {
        (0..argc)
            .map(|i| {
                let ptr = self.user_ptr(proc, argv + i * USER_PTR_SIZE);
                self.user_cstr(proc, ptr)
            })
            .collect()
    }
}

impl Default for TestKernel {
    fn default() -> Self {
        Self::new()
    }
}
