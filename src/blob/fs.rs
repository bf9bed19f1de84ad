use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

use super::{BlobError, BlobStore, StoredBlob};

pub struct FsBlobStore {
    base_path: PathBuf,
}

impl FsBlobStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            base_path: data_dir.join("blobs"),
        }
    }

    fn object_path(&self, path: &str) -> Result<PathBuf, BlobError> {
        validate_path(path)?;
        Ok(self.base_path.join(path))
    }

    fn temp_path(&self) -> PathBuf {
        self.base_path.join("tmp").join(Uuid::new_v4().to_string())
    }
}

impl BlobStore for FsBlobStore {
    fn exists(&self, path: &str) -> Result<bool, BlobError> {
        Ok(self.object_path(path)?.exists())
    }

    fn delete(&self, path: &str) -> Result<bool, BlobError> {
        let target = self.object_path(path)?;
        match fs::remove_file(&target) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BlobError::Io(e)),
        }
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<StoredBlob, BlobError> {
        let final_path = self.object_path(path)?;

        let temp_path = self.temp_path();
        if let Some(parent) = temp_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&temp_path, data)?;

        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&temp_path, &final_path)?;

        Ok(StoredBlob {
            path: path.to_string(),
            url: format!("file://{}", final_path.display()),
            size: data.len() as u64,
        })
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        let target = self.object_path(path)?;
        fs::read(&target).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                BlobError::NotFound
            } else {
                BlobError::Io(e)
            }
        })
    }
}

fn validate_path(path: &str) -> Result<(), BlobError> {
    if path.is_empty() {
        return Err(BlobError::InvalidPath("empty path".to_string()));
    }

    let p = Path::new(path);
    let ok = p
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !ok {
        return Err(BlobError::InvalidPath(path.to_string()));
    }

    Ok(())
}
