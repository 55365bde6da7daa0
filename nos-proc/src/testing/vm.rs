use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use nos_api::{
    AddressSpace, Error, Loader, Result, USER_PTR_SIZE, UserMemory, UserPtr, VirtAddr, VmManager,
    Vnode,
};

/// Start of the scratch region tests place user data in
pub const DATA_BASE: VirtAddr = 0x1000_0000;
/// Length of the scratch region; the page after it is unmapped
pub const DATA_SIZE: usize = 64 * 1024;

/// Initial user stack top
pub const STACK_TOP: VirtAddr = 0x8000_0000;
const STACK_SIZE: usize = 128 * 1024;

/// Entry point `FakeLoader` reports
pub const ENTRY_POINT: VirtAddr = 0x0040_0000;

/// Counters shared by every space a `FakeVm` hands out
#[derive(Debug, Default)]
pub struct VmStats {
    pub created: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub activations: AtomicUsize,
    pub deactivations: AtomicUsize,
}

impl VmStats {
    /// Spaces created and not yet dropped
    pub fn live(&self) -> usize {
        self.created.load(Ordering::SeqCst) - self.destroyed.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
struct Region {
    base: VirtAddr,
    bytes: Vec<u8>,
}

impl Region {
    fn range(&self, addr: UserPtr, len: usize) -> Option<core::ops::Range<usize>> {
        let start = addr.checked_sub(self.base)?;
        let end = start.checked_add(len)?;
        (end <= self.bytes.len()).then_some(start..end)
    }
}

/// Address space with a data region and a stack region; anything else faults
pub struct FakeSpace {
    regions: Vec<Region>,
    /// Next free byte in the data region for `place_*`
    cursor: VirtAddr,
    stack_defined: bool,
    /// Fail copy-outs once this many bytes have been written
    write_budget: Option<usize>,
    fail_copy: bool,
    stats: Arc<VmStats>,
}

impl FakeSpace {
    pub fn new() -> Self {
        Self::with_stats(Arc::new(VmStats::default()))
    }

    pub fn with_stats(stats: Arc<VmStats>) -> Self {
        stats.created.fetch_add(1, Ordering::SeqCst);
        Self {
            regions: vec![
                Region {
                    base: DATA_BASE,
                    bytes: vec![0; DATA_SIZE],
                },
                Region {
                    base: STACK_TOP - STACK_SIZE,
                    bytes: vec![0; STACK_SIZE],
                },
            ],
            cursor: DATA_BASE,
            stack_defined: false,
            write_budget: None,
            fail_copy: false,
            stats,
        }
    }

    pub fn stack_top(&self) -> VirtAddr {
        STACK_TOP
    }

    /// Whether `define_stack` has run on this space
    pub fn has_stack(&self) -> bool {
        self.stack_defined
    }

    /// Allow only `bytes` more bytes of copy-out before faulting
    pub fn limit_writes(&mut self, bytes: usize) {
        self.write_budget = Some(bytes);
    }

    /// Make `copy` fail with `OutOfMemory`
    pub fn fail_copy(&mut self, fail: bool) {
        self.fail_copy = fail;
    }

    fn locate(&self, addr: UserPtr, len: usize) -> Result<(usize, core::ops::Range<usize>)> {
        self.regions
            .iter()
            .enumerate()
            .find_map(|(idx, region)| region.range(addr, len).map(|range| (idx, range)))
            .ok_or(Error::BadUserAddress)
    }

    /// Store bytes without going through the copy-out budget
    pub fn write_bytes(&mut self, addr: UserPtr, bytes: &[u8]) {
        let (idx, range) = self.locate(addr, bytes.len()).expect("write outside fake space");
        self.regions[idx].bytes[range].copy_from_slice(bytes);
    }

    pub fn read_bytes(&self, addr: UserPtr, len: usize) -> Vec<u8> {
        let (idx, range) = self.locate(addr, len).expect("read outside fake space");
        self.regions[idx].bytes[range].to_vec()
    }

    pub fn read_ptr(&self, addr: UserPtr) -> UserPtr {
        let raw = self.read_bytes(addr, USER_PTR_SIZE);
        UserPtr::from_ne_bytes(raw.try_into().expect("pointer width"))
    }

    pub fn read_i32(&self, addr: UserPtr) -> i32 {
        let raw = self.read_bytes(addr, 4);
        i32::from_ne_bytes(raw.try_into().expect("i32 width"))
    }

    pub fn read_cstr(&self, addr: UserPtr) -> String {
        let mut out = Vec::new();
        let mut at = addr;
        loop {
            let byte = self.read_bytes(at, 1)[0];
            if byte == 0 {
                break;
            }
            out.push(byte);
            at += 1;
        }
        String::from_utf8(out).expect("utf-8 user string")
    }

    /// Reserve `len` pointer-aligned bytes in the data region
    pub fn alloc(&mut self, len: usize) -> UserPtr {
        let addr = self.cursor;
        self.cursor = (addr + len + USER_PTR_SIZE - 1) & !(USER_PTR_SIZE - 1);
        assert!(self.cursor <= DATA_BASE + DATA_SIZE, "fake data region exhausted");
        addr
    }

    /// Place raw bytes in the data region
    pub fn place_bytes(&mut self, bytes: &[u8]) -> UserPtr {
        let addr = self.alloc(bytes.len());
        self.write_bytes(addr, bytes);
        addr
    }

    /// Place a NUL-terminated string in the data region
    pub fn place_str(&mut self, s: &str) -> UserPtr {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        self.place_bytes(&bytes)
    }

    /// Place the strings and a NULL-terminated pointer array; returns the array
    pub fn place_argv(&mut self, args: &[&str]) -> UserPtr {
        let ptrs: Vec<UserPtr> = args.iter().map(|arg| self.place_str(arg)).collect();
        let argv = self.alloc((ptrs.len() + 1) * USER_PTR_SIZE);
        for (i, ptr) in ptrs.iter().chain(core::iter::once(&0)).enumerate() {
            self.write_bytes(argv + i * USER_PTR_SIZE, &ptr.to_ne_bytes());
        }
        argv
    }
}

impl Default for FakeSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FakeSpace {
    fn drop(&mut self) {
        self.stats.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

impl UserMemory for FakeSpace {
    fn copy_in(&self, src: UserPtr, dst: &mut [u8]) -> Result<()> {
        let (idx, range) = self.locate(src, dst.len())?;
        dst.copy_from_slice(&self.regions[idx].bytes[range]);
        Ok(())
    }

    fn copy_out(&mut self, src: &[u8], dst: UserPtr) -> Result<()> {
        if let Some(budget) = self.write_budget.as_mut() {
            if *budget < src.len() {
                return Err(Error::BadUserAddress);
            }
            *budget -= src.len();
        }
        let (idx, range) = self.locate(dst, src.len())?;
        self.regions[idx].bytes[range].copy_from_slice(src);
        Ok(())
    }
}

impl AddressSpace for FakeSpace {
    fn copy(&self) -> Result<Box<dyn AddressSpace>> {
        if self.fail_copy {
            return Err(Error::OutOfMemory);
        }
        self.stats.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSpace {
            regions: self.regions.clone(),
            cursor: self.cursor,
            stack_defined: self.stack_defined,
            write_budget: None,
            fail_copy: false,
            stats: self.stats.clone(),
        }))
    }

    fn activate(&self) {
        self.stats.activations.fetch_add(1, Ordering::SeqCst);
    }

    fn deactivate(&self) {
        self.stats.deactivations.fetch_add(1, Ordering::SeqCst);
    }

    fn define_stack(&mut self) -> Result<VirtAddr> {
        self.stack_defined = true;
        Ok(STACK_TOP)
    }
}

/// Hands out `FakeSpace`s that share one `VmStats`
pub struct FakeVm {
    stats: Arc<VmStats>,
    fail_create: AtomicBool,
    /// Copy-out budget given to every new space
    write_budget: crate::sync::Mutex<Option<usize>>,
}

impl FakeVm {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(VmStats::default()),
            fail_create: AtomicBool::new(false),
            write_budget: crate::sync::Mutex::new(None),
        }
    }

    pub fn stats(&self) -> &Arc<VmStats> {
        &self.stats
    }

    /// A space counted in this VM's statistics
    pub fn space(&self) -> FakeSpace {
        FakeSpace::with_stats(self.stats.clone())
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Give spaces created from now on a copy-out budget
    pub fn limit_writes(&self, bytes: Option<usize>) {
        *self.write_budget.lock() = bytes;
    }
}

impl Default for FakeVm {
    fn default() -> Self {
        Self::new()
    }
}

impl VmManager for FakeVm {
    fn create(&self) -> Result<Box<dyn AddressSpace>> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::OutOfMemory);
        }
        let mut space = self.space();
        space.write_budget = *self.write_budget.lock();
        Ok(Box::new(space))
    }
}

/// Loader accepting images that start with the ELF magic
#[derive(Default)]
pub struct FakeLoader {
    loads: AtomicUsize,
}

impl FakeLoader {
    pub const MAGIC: &'static [u8] = b"\x7fELF";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl Loader for FakeLoader {
    fn load(&self, node: &dyn Vnode, _space: &mut dyn AddressSpace) -> Result<VirtAddr> {
        let mut magic = [0u8; 4];
        let n = node.read_at(&mut magic, 0)?;
        if n < magic.len() || magic != Self::MAGIC {
            return Err(Error::NotExecutable);
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(ENTRY_POINT)
    }
}
