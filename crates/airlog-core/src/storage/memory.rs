//! RAM-backed [`Storage`] used by tests and the simulator's volatile mode.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use super::{Storage, StorageError};

/// In-memory filesystem with switchable failure modes.
#[derive(Debug, Default)]
pub struct MemStorage {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
    unavailable: bool,
    fail_writes: bool,
    fail_reads: bool,
}

fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a missing or unmounted card: every call fails.
    pub fn set_unavailable(&mut self, unavailable: bool) {
        self.unavailable = unavailable;
    }

    /// Make `write`, `append` and `create_dir` fail.
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Make `read_at` fail.
    pub fn set_fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    /// Place a file directly, creating its parent directory.
    pub fn insert_file(&mut self, path: &str, contents: &[u8]) {
        self.dirs.insert(parent(path).to_string());
        self.files.insert(path.to_string(), contents.to_vec());
    }

    pub fn file(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    /// File contents as text, if present and valid UTF-8.
    pub fn file_str(&self, path: &str) -> Option<&str> {
        self.file(path).and_then(|bytes| core::str::from_utf8(bytes).ok())
    }

    pub fn has_dir(&self, path: &str) -> bool {
        path == "/" || self.dirs.contains(path)
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable {
            Err(StorageError::Unavailable)
        } else {
            Ok(())
        }
    }

    fn check_writable(&self, path: &str) -> Result<(), StorageError> {
        self.check_available()?;
        if self.fail_writes {
            return Err(StorageError::io("write", "injected write failure"));
        }
        if !self.has_dir(parent(path)) {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}

impl Storage for MemStorage {
    fn exists(&mut self, path: &str) -> Result<bool, StorageError> {
        self.check_available()?;
        Ok(self.has_dir(path) || self.files.contains_key(path))
    }

    fn create_dir(&mut self, path: &str) -> Result<(), StorageError> {
        self.check_writable(path)?;
        self.dirs.insert(path.to_string());
        Ok(())
    }

    fn read_at(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.check_available()?;
        if self.fail_reads {
            return Err(StorageError::io("read", "injected read failure"));
        }
        let data = self.files.get(path).ok_or(StorageError::NotFound)?;
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write(&mut self, path: &str, contents: &[u8]) -> Result<(), StorageError> {
        self.check_writable(path)?;
        self.files.insert(path.to_string(), contents.to_vec());
        Ok(())
    }

    fn append(&mut self, path: &str, contents: &[u8]) -> Result<(), StorageError> {
        self.check_writable(path)?;
        self.files
            .entry(path.to_string())
            .or_default()
            .extend_from_slice(contents);
        Ok(())
    }
}
