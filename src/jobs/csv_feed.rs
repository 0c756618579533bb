// 📥 CSV feed - ScrapedRecords from a CSV snapshot
//
// Header row names the record fields:
//   title,subtitle,author,retail_price,promotional_price,image_link,hyperlink,bookstore
// Only title and hyperlink columns are mandatory. A fixed store name on the
// job overrides the `bookstore` column.

use super::ScrapeJob;
use crate::error::JobFetchError;
use crate::record::ScrapedRecord;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub struct CsvFeedJob {
    name: String,
    path: PathBuf,
    store: Option<String>,
}

impl CsvFeedJob {
    pub fn new(name: &str, path: impl Into<PathBuf>) -> Self {
        CsvFeedJob {
            name: name.to_string(),
            path: path.into(),
            store: None,
        }
    }

    /// Builder pattern: stamp every record with this store
    pub fn with_store(mut self, store: &str) -> Self {
        self.store = Some(store.to_string());
        self
    }
}

/// Read every row; the first undecodable row fails the whole file
fn load_csv(csv_path: &Path, store: Option<&str>) -> Result<Vec<ScrapedRecord>, JobFetchError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_path(csv_path)
        .map_err(|e| JobFetchError::Source(format!("cannot open {}: {}", csv_path.display(), e)))?;

    let mut records = Vec::new();

    for result in rdr.deserialize() {
        let mut record: ScrapedRecord = result.map_err(JobFetchError::failed)?;

        if let Some(store) = store {
            record.store_name = store.to_string();
        }

        records.push(record);
    }

    Ok(records)
}

#[async_trait]
impl ScrapeJob for CsvFeedJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<ScrapedRecord>, JobFetchError> {
        let path = self.path.clone();
        let store = self.store.clone();

        tokio::task::spawn_blocking(move || load_csv(&path, store.as_deref()))
            .await
            .map_err(|e| JobFetchError::Panicked(e.to_string()))?
    }
}
