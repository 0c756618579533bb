// 📦 JSON catalogue feed - IT-book style catalogue → ScrapedRecords
//
// Input is a JSON array of catalogue entries:
//   [{"title": "...", "subtitle": "...", "authors": "...", "price": "$31.99",
//     "image": "https://...", "url": "https://..."}]
// Catalogues carry list prices only, so every record has an empty promotional
// price and the store name fixed by the job.

use super::ScrapeJob;
use crate::error::JobFetchError;
use crate::record::ScrapedRecord;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
struct CatalogueEntry {
    title: String,

    #[serde(default)]
    subtitle: String,

    #[serde(default)]
    authors: String,

    #[serde(default)]
    price: String,

    #[serde(default)]
    image: String,

    url: String,
}

impl CatalogueEntry {
    fn into_record(self, store: &str) -> ScrapedRecord {
        ScrapedRecord {
            title: self.title,
            subtitle: self.subtitle,
            author: self.authors,
            retail_price: self.price,
            promotional_price: String::new(),
            image_link: self.image,
            hyperlink: self.url,
            store_name: store.to_string(),
        }
    }
}

pub struct JsonFeedJob {
    name: String,
    path: PathBuf,
    store: String,
}

impl JsonFeedJob {
    pub fn new(name: &str, path: impl Into<PathBuf>, store: &str) -> Self {
        JsonFeedJob {
            name: name.to_string(),
            path: path.into(),
            store: store.to_string(),
        }
    }

    /// Map a catalogue document into records for this job's store
    pub fn map_catalogue(&self, json: &str) -> Result<Vec<ScrapedRecord>, JobFetchError> {
        let entries: Vec<CatalogueEntry> =
            serde_json::from_str(json).map_err(JobFetchError::failed)?;

        Ok(entries
            .into_iter()
            .map(|entry| entry.into_record(&self.store))
            .collect())
    }
}

#[async_trait]
impl ScrapeJob for JsonFeedJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<ScrapedRecord>, JobFetchError> {
        let json = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            JobFetchError::Source(format!("cannot read {}: {}", self.path.display(), e))
        })?;

        self.map_catalogue(&json)
    }
}
