//! Property registry feeds and the background refresh loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::RegistryError;
use crate::index::PropertyIndex;
use crate::property::{PropertyRecord, RawProperty};

/// Source of the full property list. Each fetch is a complete replacement.
#[async_trait]
pub trait RegistryFeed: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<Vec<PropertyRecord>, RegistryError>;
}

/// Reads a JSON array of property rows from disk.
#[derive(Debug, Clone)]
pub struct JsonFileFeed {
    path: PathBuf,
}

impl JsonFileFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RegistryFeed for JsonFileFeed {
    fn name(&self) -> &str {
        "json-file"
    }

    async fn fetch(&self) -> Result<Vec<PropertyRecord>, RegistryError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let rows: Vec<RawProperty> = serde_json::from_str(&content)?;
        let total = rows.len();

        let mut records = Vec::with_capacity(total);
        for row in rows {
            match row.into_record() {
                Ok(record) => records.push(record),
                Err(e) => warn!(error = %e, path = %self.path.display(), "Skipping property row"),
            }
        }
        debug!(
            path = %self.path.display(),
            total,
            valid = records.len(),
            "Registry feed read"
        );
        Ok(records)
    }
}

/// Fixed record set, for tests and demos.
#[derive(Debug, Clone, Default)]
pub struct StaticFeed {
    records: Vec<PropertyRecord>,
}

impl StaticFeed {
    pub fn new(records: Vec<PropertyRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl RegistryFeed for StaticFeed {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self) -> Result<Vec<PropertyRecord>, RegistryError> {
        Ok(self.records.clone())
    }
}

/// Fetch once and swap the result into the index.
///
/// On failure the previous snapshot stays in place. A feed that yields no
/// usable property is treated as broken rather than as an empty portfolio.
pub async fn refresh_once(
    feed: &dyn RegistryFeed,
    index: &PropertyIndex,
) -> Result<usize, RegistryError> {
    let records = feed.fetch().await?;
    if records.is_empty() {
        return Err(RegistryError::Feed(format!(
            "{} feed returned no usable properties",
            feed.name()
        )));
    }
    index.load(records)
}

/// Periodically reload the index from `feed` until the task is aborted.
pub fn spawn_refresh(
    feed: Arc<dyn RegistryFeed>,
    index: Arc<PropertyIndex>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick fires immediately; the caller has already loaded once.
        interval.tick().await;
        loop {
            interval.tick().await;
            match refresh_once(feed.as_ref(), &index).await {
                Ok(count) => info!(feed = feed.name(), properties = count, "Registry refreshed"),
                Err(e) => warn!(feed = feed.name(), error = %e, "Registry refresh failed, keeping previous set"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn rec(number: u32, street: &str) -> PropertyRecord {
        PropertyRecord::new(number, street, None, format!("{} {}", number, street))
    }

    #[tokio::test]
    async fn test_json_file_feed_reads_and_skips_bad_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"streetNumber": 28, "streetName": "Alaska Street", "fullAddress": "28 Alaska Street"}},
                {{"fullAddress": "29 Port Richmond Ave"}},
                {{"unit": "2"}}
            ]"#
        )
        .unwrap();

        let feed = JsonFileFeed::new(file.path());
        let records = feed.fetch().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].street_name, "port richmond");
    }

    #[tokio::test]
    async fn test_json_file_feed_missing_file() {
        let feed = JsonFileFeed::new("/nonexistent/properties.json");
        let err = feed.fetch().await.unwrap_err();
        assert!(matches!(err, RegistryError::Io(_)));
    }

    #[tokio::test]
    async fn test_refresh_once_replaces_index() {
        let index = PropertyIndex::default();
        index.load(vec![rec(1, "Old Road")]).unwrap();

        let feed = StaticFeed::new(vec![rec(627, "Cary Avenue"), rec(629, "Cary Avenue")]);
        let count = refresh_once(&feed, &index).await.unwrap();
        assert_eq!(count, 2);
        assert!(index.find_exact(1, "old", None).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_set() {
        let index = PropertyIndex::default();
        index.load(vec![rec(28, "Alaska Street")]).unwrap();

        let feed = JsonFileFeed::new("/nonexistent/properties.json");
        assert!(refresh_once(&feed, &index).await.is_err());
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_feed_does_not_wipe_index() {
        let index = PropertyIndex::default();
        index.load(vec![rec(28, "Alaska Street")]).unwrap();

        let err = refresh_once(&StaticFeed::default(), &index).await.unwrap_err();
        assert!(matches!(err, RegistryError::Feed(_)));
        assert!(err.to_string().contains("static"));
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn test_feed_of_only_bad_rows_is_a_feed_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"unit": "2"}}, {{"streetNumber": 5}}]"#).unwrap();

        let index = PropertyIndex::default();
        index.load(vec![rec(28, "Alaska Street")]).unwrap();

        let feed = JsonFileFeed::new(file.path());
        let err = refresh_once(&feed, &index).await.unwrap_err();
        assert!(matches!(err, RegistryError::Feed(_)));
        assert!(index.find_exact(28, "alaska", None).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_spawn_refresh_picks_up_changes() {
        let index = Arc::new(PropertyIndex::default());
        let feed: Arc<dyn RegistryFeed> = Arc::new(StaticFeed::new(vec![rec(28, "Alaska Street")]));

        let handle = spawn_refresh(Arc::clone(&feed), Arc::clone(&index), Duration::from_millis(10));
        for _ in 0..50 {
            if !index.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();
        assert_eq!(index.len(), 1);
    }
}
