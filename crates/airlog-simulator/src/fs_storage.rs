//! Host filesystem standing in for the node's SD card

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use airlog_core::storage::{MemStorage, Storage, StorageError};

/// Maps node paths such as `/data/PM_0000.csv` under a host directory.
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Use `root` as the card root, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

fn map_err(operation: &'static str, e: io::Error) -> StorageError {
    match e.kind() {
        io::ErrorKind::NotFound => StorageError::NotFound,
        _ => StorageError::io(operation, &e.to_string()),
    }
}

impl Storage for FsStorage {
    fn exists(&mut self, path: &str) -> Result<bool, StorageError> {
        self.resolve(path)
            .try_exists()
            .map_err(|e| map_err("check path", e))
    }

    fn create_dir(&mut self, path: &str) -> Result<(), StorageError> {
        fs::create_dir(self.resolve(path)).map_err(|e| map_err("create directory", e))
    }

    fn read_at(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize, StorageError> {
        let mut file = fs::File::open(self.resolve(path)).map_err(|e| map_err("open", e))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| map_err("seek", e))?;
        file.read(buf).map_err(|e| map_err("read", e))
    }

    fn write(&mut self, path: &str, contents: &[u8]) -> Result<(), StorageError> {
        let mut file = fs::File::create(self.resolve(path)).map_err(|e| map_err("create", e))?;
        file.write_all(contents)
            .and_then(|()| file.sync_data())
            .map_err(|e| map_err("write", e))
    }

    fn append(&mut self, path: &str, contents: &[u8]) -> Result<(), StorageError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.resolve(path))
            .map_err(|e| map_err("open for append", e))?;
        file.write_all(contents)
            .and_then(|()| file.sync_data())
            .map_err(|e| map_err("append", e))
    }
}

/// Storage chosen at startup: a host directory or volatile memory.
pub enum SimStorage {
    Fs(FsStorage),
    Memory(MemStorage),
}

impl Storage for SimStorage {
    fn exists(&mut self, path: &str) -> Result<bool, StorageError> {
        match self {
            Self::Fs(s) => s.exists(path),
            Self::Memory(s) => s.exists(path),
        }
    }

    fn create_dir(&mut self, path: &str) -> Result<(), StorageError> {
        match self {
            Self::Fs(s) => s.create_dir(path),
            Self::Memory(s) => s.create_dir(path),
        }
    }

    fn read_at(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize, StorageError> {
        match self {
            Self::Fs(s) => s.read_at(path, offset, buf),
            Self::Memory(s) => s.read_at(path, offset, buf),
        }
    }

    fn write(&mut self, path: &str, contents: &[u8]) -> Result<(), StorageError> {
        match self {
            Self::Fs(s) => s.write(path, contents),
            Self::Memory(s) => s.write(path, contents),
        }
    }

    fn append(&mut self, path: &str, contents: &[u8]) -> Result<(), StorageError> {
        match self {
            Self::Fs(s) => s.append(path, contents),
            Self::Memory(s) => s.append(path, contents),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airlog_core::storage::{LogStore, POWER_CYCLE_PATH};
    use airlog_core::Reading;

    /// Fresh directory under the system temp dir, removed on drop.
    struct TempRoot(PathBuf);

    impl TempRoot {
        fn new(name: &str) -> Self {
            let path = std::env::temp_dir()
                .join(format!("airlog-sim-{}-{}", name, std::process::id()));
            let _ = fs::remove_dir_all(&path);
            Self(path)
        }
    }

    impl Drop for TempRoot {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn test_paths_map_under_root() {
        let root = TempRoot::new("paths");
        let mut storage = FsStorage::open(&root.0).unwrap();

        assert!(!storage.exists("/data").unwrap());
        storage.create_dir("/data").unwrap();
        assert!(storage.exists("/data").unwrap());
        assert!(root.0.join("data").is_dir());
    }

    #[test]
    fn test_append_and_read_at() {
        let root = TempRoot::new("append");
        let mut storage = FsStorage::open(&root.0).unwrap();
        storage.create_dir("/data").unwrap();

        storage.append("/data/a.csv", b"hello ").unwrap();
        storage.append("/data/a.csv", b"world").unwrap();

        let mut buf = [0u8; 8];
        let n = storage.read_at("/data/a.csv", 6, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"world");
        assert_eq!(storage.read_at("/data/a.csv", 11, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let root = TempRoot::new("missing");
        let mut storage = FsStorage::open(&root.0).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(
            storage.read_at("/data/none.csv", 0, &mut buf),
            Err(StorageError::NotFound)
        );
    }

    #[test]
    fn test_log_survives_reopen() {
        let root = TempRoot::new("reopen");
        let reading = Reading {
            pm1_0_atm: 3,
            pm2_5_atm: 4,
            pm10_atm: 5,
            ..Reading::default()
        };

        for _ in 0..2 {
            let mut log = LogStore::new(FsStorage::open(&root.0).unwrap());
            log.append(&reading, 1_704_067_200, 60).unwrap();
        }

        let counter = fs::read_to_string(root.0.join(POWER_CYCLE_PATH.trim_start_matches('/')))
            .unwrap();
        assert_eq!(counter, "2\n");

        let second = fs::read_to_string(root.0.join("data/PM_0001.csv")).unwrap();
        assert_eq!(
            second,
            "Power_Cycle,Timestamp,PM1.0,PM2.5,PM10,Uptime_Sec\nP002_20240101_000000,3,4,5,60\n"
        );
    }
}
