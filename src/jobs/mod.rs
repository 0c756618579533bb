// 🕷️ Scrape Jobs - independent sources of ScrapedRecords
//
// A job knows one source and nothing about storage. The orchestrator runs all
// registered jobs concurrently; a job's failure is its own and never reaches
// the other jobs.

use crate::error::JobFetchError;
use crate::record::ScrapedRecord;
use async_trait::async_trait;

pub mod csv_feed;
pub mod json_feed;

pub use csv_feed::CsvFeedJob;
pub use json_feed::JsonFeedJob;

/// A source of scraped records
#[async_trait]
pub trait ScrapeJob: Send + Sync {
    /// Job identifier used in logs and reports (e.g. "empik", "itbook")
    fn name(&self) -> &str;

    /// Fetch one snapshot of the source
    ///
    /// # Returns
    /// * `Ok(records)` - possibly empty
    /// * `Err(_)` - the whole job failed; absorbed by the orchestrator
    async fn fetch(&self) -> Result<Vec<ScrapedRecord>, JobFetchError>;
}

/// Fixed set of records, handy for wiring and tests
pub struct StaticJob {
    name: String,
    records: Vec<ScrapedRecord>,
}

impl StaticJob {
    pub fn new(name: &str, records: Vec<ScrapedRecord>) -> Self {
        StaticJob {
            name: name.to_string(),
            records,
        }
    }
}

#[async_trait]
impl ScrapeJob for StaticJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<ScrapedRecord>, JobFetchError> {
        Ok(self.records.clone())
    }
}
