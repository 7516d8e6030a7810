//! Append-only activity log shared by the price tools

use std::path::{ Path, PathBuf };

use chrono::Utc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::Error;

/// A text file that records every upstream lookup, one line per event
#[derive(Debug)]
pub struct ActivityLog {
    path: PathBuf,
    /// Serializes appends so lines from concurrent calls never interleave
    write_lock: Mutex<()>,
}

impl ActivityLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file if it does not exist yet
    pub async fn ensure_exists(&self) -> Result<(), Error> {
        OpenOptions::new().create(true).append(true).open(&self.path).await?;
        Ok(())
    }

    /// Append one line
    pub async fn append(&self, line: &str) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(format!("{}\n", line.trim_end()).as_bytes()).await?;
        file.flush().await?;
        debug!("Activity: {}", line);
        Ok(())
    }

    pub async fn record_success(&self, symbol: &str, price: &str) -> Result<(), Error> {
        self.append(
            &format!(
                "Successfully got price for {}. Current price is {}. Current time is {}",
                symbol,
                price,
                Utc::now().to_rfc3339()
            )
        ).await
    }

    pub async fn record_failure(&self, message: &str) -> Result<(), Error> {
        self.append(&format!("{} at {}", message, Utc::now().to_rfc3339())).await
    }

    /// The whole log; a log that was never written reads as empty
    pub async fn read_all(&self) -> Result<String, Error> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_missing_log_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActivityLog::new(dir.path().join("activity.log"));
        assert_eq!(log.read_all().await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_records_success_and_failure() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActivityLog::new(dir.path().join("activity.log"));
        log.ensure_exists().await.unwrap();

        log.record_success("BTCUSDT", "65000.01").await.unwrap();
        log.record_failure("Error getting price for FOO: 400").await.unwrap();

        let contents = log.read_all().await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Successfully got price for BTCUSDT. Current price is 65000.01."));
        assert!(lines[1].starts_with("Error getting price for FOO: 400"));
    }

    #[tokio::test]
    async fn test_concurrent_appends_keep_whole_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(ActivityLog::new(dir.path().join("activity.log")));

        let mut tasks = Vec::new();
        for i in 0..20 {
            let log = Arc::clone(&log);
            tasks.push(tokio::spawn(async move { log.append(&format!("line {}", i)).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let contents = log.read_all().await.unwrap();
        assert_eq!(contents.lines().count(), 20);
        assert!(contents.lines().all(|line| line.starts_with("line ")));
    }
}
