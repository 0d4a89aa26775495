use crate::{PersistenceStore, StoreResult, io_error, validate_key};
use std::{
    fmt,
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

/// Filesystem-backed store rooted at `<root>/.quota`, one `<key>.json` file per key.
#[derive(Clone)]
pub struct FsStore {
    data_dir: PathBuf,
}

impl fmt::Debug for FsStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsStore")
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

impl FsStore {
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let data_dir = root.as_ref().join(".quota");
        fs::create_dir_all(&data_dir).map_err(|e| io_error(&data_dir, e))?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.json"))
    }

    /// Write to a sibling temp file and rename over the target so readers never see a torn blob.
    fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
        let tmp = path.with_extension("json.tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)
            .map_err(|e| io_error(&tmp, e))?;
        file.write_all(bytes).map_err(|e| io_error(&tmp, e))?;
        file.sync_all().map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| io_error(path, e))?;
        Ok(())
    }
}

impl PersistenceStore for FsStore {
    fn load(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        validate_key(key)?;
        let path = self.entry_path(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(path, err)),
        }
    }

    fn save(&self, key: &str, blob: &[u8]) -> StoreResult<()> {
        validate_key(key)?;
        let path = self.entry_path(key);
        Self::write_atomic(&path, blob)?;
        log::debug!("saved {} bytes to {}", blob.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn save_overwrites_previous_blob() {
        let tmp = TempDir::new().expect("tmpdir");
        let store = FsStore::open(tmp.path()).expect("open");
        store.save("ledger", b"one").expect("save");
        store.save("ledger", b"two").expect("save");
        assert_eq!(store.load("ledger").expect("load"), Some(b"two".to_vec()));
        assert!(!store.data_dir().join("ledger.json.tmp").exists());
    }
}
