use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use nos_api::{Error, OpenFlags, Result, Vfs, Vnode};

use crate::sync::Mutex;

/// Regular in-memory file
#[derive(Default)]
pub struct MemFile {
    data: Mutex<Vec<u8>>,
}

impl MemFile {
    pub fn with_contents(contents: &[u8]) -> Self {
        Self {
            data: Mutex::new(contents.to_vec()),
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

impl Vnode for MemFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let data = self.data.lock();
        let start = (offset as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize> {
        let mut data = self.data.lock();
        let start = offset as usize;
        if data.len() < start + buf.len() {
            data.resize(start + buf.len(), 0);
        }
        data[start..start + buf.len()].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.data.lock().len() as u64)
    }
}

/// Console device: reads drain queued input, writes append to the output
#[derive(Default)]
pub struct ConsoleNode {
    input: Mutex<Vec<u8>>,
    output: Mutex<Vec<u8>>,
}

impl ConsoleNode {
    pub fn push_input(&self, bytes: &[u8]) {
        self.input.lock().extend_from_slice(bytes);
    }

    pub fn output(&self) -> Vec<u8> {
        self.output.lock().clone()
    }
}

impl Vnode for ConsoleNode {
    fn read_at(&self, buf: &mut [u8], _offset: u64) -> Result<usize> {
        let mut input = self.input.lock();
        let n = buf.len().min(input.len());
        buf[..n].copy_from_slice(&input[..n]);
        input.drain(..n);
        Ok(n)
    }

    fn write_at(&self, buf: &[u8], _offset: u64) -> Result<usize> {
        self.output.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn size(&self) -> Result<u64> {
        Ok(0)
    }

    fn is_seekable(&self) -> bool {
        false
    }
}

/// In-memory volume with a console at `con:`
pub struct MemFs {
    files: Mutex<HashMap<String, Arc<MemFile>>>,
    console: Arc<ConsoleNode>,
    opens: AtomicUsize,
    closes: AtomicUsize,
    fail_opens: AtomicBool,
}

impl MemFs {
    pub const CONSOLE: &'static str = "con:";

    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            console: Arc::new(ConsoleNode::default()),
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            fail_opens: AtomicBool::new(false),
        }
    }

    pub fn add_file(&self, path: &str, contents: &[u8]) -> Arc<MemFile> {
        let file = Arc::new(MemFile::with_contents(contents));
        self.files.lock().insert(path.to_string(), file.clone());
        file
    }

    pub fn file(&self, path: &str) -> Option<Arc<MemFile>> {
        self.files.lock().get(path).cloned()
    }

    pub fn console(&self) -> &Arc<ConsoleNode> {
        &self.console
    }

    /// Successful opens so far
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Handles opened and not yet closed
    pub fn open_handles(&self) -> usize {
        self.opens() - self.closes()
    }

    /// Make every following open fail with `IoError`
    pub fn fail_opens(&self, fail: bool) {
        self.fail_opens.store(fail, Ordering::SeqCst);
    }
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs for MemFs {
    fn open(&self, path: &str, flags: OpenFlags, _mode: u32) -> Result<Arc<dyn Vnode>> {
        if self.fail_opens.load(Ordering::SeqCst) {
            return Err(Error::IoError);
        }

        let node: Arc<dyn Vnode> = if path == Self::CONSOLE {
            self.console.clone()
        } else {
            let mut files = self.files.lock();
            let file = match files.get(path) {
                Some(_) if flags.contains(OpenFlags::CREAT | OpenFlags::EXCL) => {
                    return Err(Error::InvalidArgument);
                }
                Some(file) => file.clone(),
                None if flags.contains(OpenFlags::CREAT) => {
                    let file = Arc::new(MemFile::default());
                    files.insert(path.to_string(), file.clone());
                    file
                }
                None => return Err(Error::NotFound),
            };
            if flags.contains(OpenFlags::TRUNC) && flags.access_mode()?.can_write() {
                file.data.lock().clear();
            }
            file
        };

        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(node)
    }

    fn close(&self, node: Arc<dyn Vnode>) {
        drop(node);
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
