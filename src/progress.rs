use crate::Error;
use async_trait::async_trait;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

#[cfg(feature = "tracing")]
use tracing::debug;

/// Abstraction for remembering which items were exported
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Identifiers recorded so far. A store that does not exist yet is empty.
    async fn load(&self) -> Result<HashSet<String>, Error>;

    /// Append one identifier. Only ever called after a confirmed export.
    async fn record(&self, id: &str) -> Result<(), Error>;
}

/// Newline-delimited file of exported title ids
pub struct FileProgressStore {
    path: PathBuf,
}

impl FileProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ProgressStore for FileProgressStore {
    async fn load(&self) -> Result<HashSet<String>, Error> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No progress file at {}", self.path.display());
                return Ok(HashSet::new());
            }
            Err(e) => return Err(e.into()),
        };

        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn record(&self, id: &str) -> Result<(), Error> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        // One write per line keeps concurrent appends from interleaving.
        file.write_all(format!("{id}\n").as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProgressStore::new(dir.path().join("nope.txt"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_empty_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.txt");
        std::fs::write(&path, "").unwrap();
        assert!(FileProgressStore::new(path).load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_tolerates_duplicates_and_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.txt");
        std::fs::write(&path, "111\n\n222\n111\n  333  \n").unwrap();

        let ids = FileProgressStore::new(path).load().await.unwrap();
        let expected: HashSet<String> = ["111", "222", "333"].iter().map(|s| s.to_string()).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_record_appends_without_rewriting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("progress.txt");
        let store = FileProgressStore::new(&path);

        store.record("111").await.unwrap();
        store.record("222").await.unwrap();
        store.record("111").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "111\n222\n111\n");
        assert_eq!(store.load().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_records_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileProgressStore::new(dir.path().join("progress.txt")));

        let handles: Vec<_> = (0..50)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.record(&format!("id-{i}")).await })
            })
            .collect();
        for result in futures::future::join_all(handles).await {
            result.unwrap().unwrap();
        }

        let content = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(content.lines().count(), 50);
        assert_eq!(store.load().await.unwrap().len(), 50);
    }
}
