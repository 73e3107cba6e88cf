use std::path::Path;

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

/// Reads a JSON document, returning `None` when the file does not exist yet.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };

    let value = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

/// Writes a JSON document via a temp file and rename so readers never see a
/// half-written file.
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let bytes = serde_json::to_vec_pretty(value).context("Failed to serialize document")?;
    let tmp = path.with_extension("json.tmp");

    tokio::fs::write(&tmp, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))?;

    debug!(path = %path.display(), bytes = bytes.len(), "Persisted document");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let value: Option<Vec<String>> = read_json(&dir.path().join("absent.json")).await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_write_then_read_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state.json");
        write_json_atomic(&path, &vec!["a".to_string()]).await.unwrap();

        let value: Option<Vec<String>> = read_json(&path).await.unwrap();
        assert_eq!(value, Some(vec!["a".to_string()]));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();
        assert!(read_json::<Vec<String>>(&path).await.is_err());
    }
}
