//! Directory-backed file share used as a secondary sink for queue traffic.
//!
//! Layout: `<root>/logs/<queue>/<yyyyMMddHHmmssfff>_<uuid>.log`, one message
//! per file.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::StorageError;

pub const DEFAULT_READ_LIMIT: usize = 50;
const LOGS_DIR: &str = "logs";

#[derive(Clone, Debug)]
pub struct FileShare {
    name: String,
    root: PathBuf,
}

impl FileShare {
    pub fn new<P: Into<PathBuf>>(root: P, name: &str) -> Self {
        Self { name: name.to_string(), root: root.into() }
    }

    pub fn name(&self) -> &str { &self.name }

    pub async fn initialize(&self) -> Result<(), StorageError> {
        let logs = self.root.join(LOGS_DIR);
        fs::create_dir_all(&logs)
            .await
            .map_err(|e| StorageError::io(&format!("create {}", logs.display()), e))?;
        info!(share = %self.name, root = %self.root.display(), "file_share_ready");
        Ok(())
    }

    /// Write `message` to a new file under the queue's log directory.
    pub async fn save_queue_message(&self, message: &str, queue_name: &str) -> Result<PathBuf, StorageError> {
        if message.is_empty() {
            return Err(StorageError::InvalidArgument("message is required".into()));
        }
        let dir = self.queue_dir(queue_name)?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::io(&format!("create {}", dir.display()), e))?;

        let now = Utc::now();
        let file = dir.join(format!("{}_{}.log", now.format("%Y%m%d%H%M%S%3f"), Uuid::new_v4().simple()));
        let content = format!("[{}] {}\n", now.to_rfc3339_opts(SecondsFormat::Micros, true), message);
        fs::write(&file, content)
            .await
            .map_err(|e| StorageError::io(&format!("write {}", file.display()), e))?;
        debug!(share = %self.name, queue = %queue_name, file = %file.display(), "queue_message_saved");
        Ok(file)
    }

    /// Up to `max` saved messages, newest first, as `"<file>: <content>"`.
    pub async fn get_queue_messages(&self, queue_name: &str, max: usize) -> Result<Vec<String>, StorageError> {
        let dir = self.queue_dir(queue_name)?;
        let mut names = log_file_names(&dir).await?;
        names.truncate(max);

        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let path = dir.join(&name);
            let content = fs::read_to_string(&path)
                .await
                .map_err(|e| StorageError::io(&format!("read {}", path.display()), e))?;
            out.push(format!("{name}: {}", content.trim()));
        }
        Ok(out)
    }

    /// Names of the files saved for a queue, newest first.
    pub async fn list_queue_files(&self, queue_name: &str) -> Result<Vec<String>, StorageError> {
        log_file_names(&self.queue_dir(queue_name)?).await
    }

    /// Remove one saved file. `NotFound` if it is already gone.
    pub async fn delete_queue_file(&self, queue_name: &str, file_name: &str) -> Result<(), StorageError> {
        if file_name.is_empty() || file_name.contains(['/', '\\']) || file_name.starts_with('.') {
            return Err(StorageError::InvalidArgument(format!("invalid file name {file_name:?}")));
        }
        let path = self.queue_dir(queue_name)?.join(file_name);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!(share = %self.name, queue = %queue_name, file = %file_name, "queue_file_deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::not_found(&format!("file {file_name} in share {}", self.name)))
            }
            Err(e) => Err(StorageError::io(&format!("delete {}", path.display()), e)),
        }
    }

    fn queue_dir(&self, queue_name: &str) -> Result<PathBuf, StorageError> {
        if queue_name.is_empty() || queue_name.contains(['/', '\\']) || queue_name.starts_with('.') {
            return Err(StorageError::InvalidArgument(format!("invalid queue name {queue_name:?}")));
        }
        Ok(self.root.join(LOGS_DIR).join(queue_name))
    }
}

/// `.log` files in `dir`, newest first. A missing directory is empty.
async fn log_file_names(dir: &Path) -> Result<Vec<String>, StorageError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::io(&format!("read {}", dir.display()), e)),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StorageError::io(&format!("read {}", dir.display()), e))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".log") {
            names.push(name);
        }
    }
    names.sort_unstable_by(|a, b| b.cmp(a));
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn saved_messages_read_back_newest_first() -> Result<(), anyhow::Error> {
        let root = std::env::temp_dir().join(format!("file_share_{}", Uuid::new_v4()));
        let share = FileShare::new(&root, "abcretail-logs");
        share.initialize().await?;
        assert!(share.get_queue_messages("product-operations", DEFAULT_READ_LIMIT).await?.is_empty());

        share.save_queue_message("first", "product-operations").await?;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = share.save_queue_message("second", "product-operations").await?;
        let raw = fs::read_to_string(&second).await?;
        assert!(raw.starts_with('[') && raw.ends_with("] second\n"));

        let read = share.get_queue_messages("product-operations", DEFAULT_READ_LIMIT).await?;
        assert_eq!(read.len(), 2);
        assert!(read[0].contains(".log: [") && read[0].ends_with("] second"));
        assert!(read[1].ends_with("] first"));
        assert_eq!(share.get_queue_messages("product-operations", 1).await?.len(), 1);

        let _ = fs::remove_dir_all(&root).await;
        Ok(())
    }

    #[tokio::test]
    async fn saved_files_can_be_listed_and_deleted() -> Result<(), anyhow::Error> {
        let root = std::env::temp_dir().join(format!("file_share_{}", Uuid::new_v4()));
        let share = FileShare::new(&root, "abcretail-logs");
        assert!(share.list_queue_files("product-operations").await?.is_empty());

        let first = share.save_queue_message("first", "product-operations").await?;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = share.save_queue_message("second", "product-operations").await?;
        let file_name = |p: &PathBuf| p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();

        let listed = share.list_queue_files("product-operations").await?;
        assert_eq!(listed, [file_name(&second), file_name(&first)]);

        share.delete_queue_file("product-operations", &file_name(&first)).await?;
        assert_eq!(share.list_queue_files("product-operations").await?, [file_name(&second)]);
        let read = share.get_queue_messages("product-operations", DEFAULT_READ_LIMIT).await?;
        assert_eq!(read.len(), 1);

        let again = share.delete_queue_file("product-operations", &file_name(&first)).await;
        assert!(matches!(again, Err(StorageError::NotFound(_))));
        let escaping = share.delete_queue_file("product-operations", "../other.log").await;
        assert!(matches!(escaping, Err(StorageError::InvalidArgument(_))));

        let _ = fs::remove_dir_all(&root).await;
        Ok(())
    }

    #[tokio::test]
    async fn rejects_empty_and_escaping_arguments() {
        let share = FileShare::new(std::env::temp_dir(), "s");
        assert!(share.save_queue_message("", "q").await.is_err());
        assert!(share.save_queue_message("m", "").await.is_err());
        assert!(share.save_queue_message("m", "../q").await.is_err());
    }
}
