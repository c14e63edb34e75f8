//! File-backed key-value storage.

use crate::error::{Result, StoreError};
use fs2::FileExt;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::KeyValueStorage;

/// Magic bytes for the storage manifest.
const STORAGE_MAGIC: &[u8; 4] = b"TKS\0";

/// Magic bytes for value files.
const VALUE_MAGIC: &[u8; 4] = b"TKV\0";

/// Current format version (manifest and value files).
const FORMAT_VERSION: u8 = 1;

/// Bytes around the payload: magic, version, length and checksum.
const VALUE_OVERHEAD: u64 = 4 + 1 + 8 + 4;

/// Durable storage: one checksummed file per key inside a locked directory.
///
/// Keys are hashed to file names, so any string is a valid key. Writes go
/// to a temporary file that is synced and then renamed over the old value.
pub struct FileStorage {
    path: PathBuf,

    /// Lock file for exclusive access.
    _lock_file: File,

    /// Serializes writers within this process.
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Open the storage directory, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;

        let manifest = path.join("MANIFEST");
        if manifest.exists() {
            Self::verify_manifest(&manifest)?;
        } else {
            Self::write_manifest(&manifest)?;
        }

        let lock_file = Self::acquire_lock(&path)?;
        info!(path = %path.display(), "opened file storage");

        Ok(Self {
            path,
            _lock_file: lock_file,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn value_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.path.join(format!("{}.kv", hex::encode(digest)))
    }

    fn write_manifest(path: &Path) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(STORAGE_MAGIC)?;
        file.write_all(&[FORMAT_VERSION])?;
        file.sync_all()?;
        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        let mut file = File::open(path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != STORAGE_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid storage magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != FORMAT_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported storage version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join("LOCK"))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked)?;

        Ok(lock_file)
    }

    fn read_value(path: &Path) -> Result<Vec<u8>> {
        let mut file = File::open(path)?;
        let size = file.metadata()?.len();

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != VALUE_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid value magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != FORMAT_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported value version: {}",
                version[0]
            )));
        }

        let mut len_bytes = [0u8; 8];
        file.read_exact(&mut len_bytes)?;
        let len = u64::from_le_bytes(len_bytes);
        if len > size.saturating_sub(VALUE_OVERHEAD) {
            return Err(StoreError::InvalidFormat(format!(
                "Value length {} exceeds file size {}",
                len, size
            )));
        }

        let mut content = vec![0u8; len as usize];
        file.read_exact(&mut content)?;

        let mut checksum_bytes = [0u8; 4];
        file.read_exact(&mut checksum_bytes)?;
        let stored = u32::from_le_bytes(checksum_bytes);
        let computed = crc32fast::hash(&content);
        if stored != computed {
            return Err(StoreError::ChecksumMismatch {
                expected: stored,
                got: computed,
            });
        }

        Ok(content)
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match Self::read_value(&self.value_path(key)) {
            Ok(content) => Ok(Some(content)),
            Err(StoreError::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let _lock = self.write_lock.lock();

        let target = self.value_path(key);
        let tmp = target.with_extension("kv.tmp");

        {
            let mut file = File::create(&tmp)?;
            file.write_all(VALUE_MAGIC)?;
            file.write_all(&[FORMAT_VERSION])?;
            file.write_all(&(value.len() as u64).to_le_bytes())?;
            file.write_all(value)?;
            file.write_all(&crc32fast::hash(value).to_le_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&tmp, &target)?;
        debug!(key, bytes = value.len(), "wrote value");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let _lock = self.write_lock.lock();

        match fs::remove_file(self.value_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
