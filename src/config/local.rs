use crate::core::Storage;
use crate::utils::error::Result;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Writes the bucket layout below a local directory (`UPLOAD_TO_BUCKET=false`).
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.base_path.join(path.trim_start_matches('/'))
    }
}

fn count_files(dir: &Path) -> std::io::Result<usize> {
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            count += count_files(&entry.path())?;
        } else {
            count += 1;
        }
    }
    Ok(count)
}

/// Removes `dir` and returns how many files it held.
fn remove_tree(dir: &Path) -> Result<usize> {
    let count = match count_files(dir) {
        Ok(count) => count,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!("Nothing to delete at {}", dir.display());
            return Ok(0);
        }
        Err(e) => return Err(e.into()),
    };

    std::fs::remove_dir_all(dir)?;
    Ok(count)
}

impl Storage for LocalStorage {
    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(full_path, data).await?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let dir = self.full_path(prefix);
        tokio::task::spawn_blocking(move || remove_tree(&dir)).await?
    }

    fn public_url(&self, path: &str) -> String {
        self.full_path(path).to_string_lossy().into_owned()
    }
}
