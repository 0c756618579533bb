// 🔄 Ingest Pipeline - one orchestration cycle end to end
//
// scrape (concurrent) → reconcile (sequential, one transaction) → audit event
//
// The batch is all-or-nothing: a storage failure, or an unparseable record
// under the Abort policy, rolls every write of the cycle back.

use crate::db::Event;
use crate::error::{IngestError, ReconcileError};
use crate::orchestrator::{OrchestrationReport, ScrapeOrchestrator};
use crate::reconciliation::ReconciliationEngine;
use crate::record::ScrapedRecord;
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// POLICY / STATUS
// ============================================================================

/// What to do with a record whose prices or identity cannot be parsed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseErrorPolicy {
    /// Log it, report it, keep going
    #[default]
    Skip,

    /// Roll the whole cycle back
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IngestStatus {
    /// Every job succeeded and every record was stored
    Success,

    /// Some job failed or some record was skipped, but something was ingested
    PartialSuccess,

    /// Every job failed; nothing to ingest
    Failure,
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub hyperlink: String,
    pub title: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub job: String,
    pub records: usize,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

/// Totals of one reconciled batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchTotals {
    pub ingested: usize,
    pub books_created: usize,
    pub listings_created: usize,
    pub skipped: Vec<SkippedRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: IngestStatus,
    pub records_scraped: usize,
    pub records_ingested: usize,
    pub books_created: usize,
    pub listings_created: usize,
    pub skipped: Vec<SkippedRecord>,
    pub jobs: Vec<JobSummary>,
}

impl IngestReport {
    pub fn summary(&self) -> String {
        let failed_jobs = self.jobs.iter().filter(|j| j.error.is_some()).count();

        format!(
            "{:?}: {} scraped, {} ingested, {} skipped \
             ({} new books, {} new listings; {}/{} jobs failed)",
            self.status,
            self.records_scraped,
            self.records_ingested,
            self.skipped.len(),
            self.books_created,
            self.listings_created,
            failed_jobs,
            self.jobs.len()
        )
    }
}

fn job_summaries(report: &OrchestrationReport) -> Vec<JobSummary> {
    report
        .outcomes
        .iter()
        .map(|outcome| JobSummary {
            job: outcome.job.clone(),
            records: outcome.records(),
            error: outcome.result.as_ref().err().map(|e| e.to_string()),
            elapsed_ms: outcome.elapsed.as_millis() as u64,
        })
        .collect()
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct Pipeline {
    orchestrator: ScrapeOrchestrator,
    engine: ReconciliationEngine,
    policy: ParseErrorPolicy,
}

impl Pipeline {
    pub fn new(orchestrator: ScrapeOrchestrator, engine: ReconciliationEngine) -> Self {
        Pipeline {
            orchestrator,
            engine,
            policy: ParseErrorPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ParseErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Ingest one orchestration cycle
    pub async fn ingest_cycle<S: Storage + ?Sized>(
        &mut self,
        storage: &mut S,
    ) -> Result<IngestReport, IngestError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(%run_id, "ingest cycle started");

        let scraped = self.orchestrator.run().await?;
        let jobs = job_summaries(&scraped);

        if scraped.all_failed() {
            tracing::warn!(%run_id, jobs = jobs.len(), "every scrape job failed, nothing ingested");
            return Ok(IngestReport {
                run_id,
                started_at,
                finished_at: Utc::now(),
                status: IngestStatus::Failure,
                records_scraped: 0,
                records_ingested: 0,
                books_created: 0,
                listings_created: 0,
                skipped: Vec::new(),
                jobs,
            });
        }

        let totals = self.reconcile_batch(storage, run_id, &scraped.records, &jobs)?;

        let status = if scraped.failed() == 0 && totals.skipped.is_empty() {
            IngestStatus::Success
        } else {
            IngestStatus::PartialSuccess
        };

        let report = IngestReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            status,
            records_scraped: scraped.records.len(),
            records_ingested: totals.ingested,
            books_created: totals.books_created,
            listings_created: totals.listings_created,
            skipped: totals.skipped,
            jobs,
        };

        tracing::info!(%run_id, summary = %report.summary(), "ingest cycle finished");
        Ok(report)
    }

    /// Reconcile `records` inside one transaction, then record the audit event
    ///
    /// On error the transaction is rolled back and nothing of the batch remains.
    pub fn reconcile_batch<S: Storage + ?Sized>(
        &self,
        storage: &mut S,
        run_id: Uuid,
        records: &[ScrapedRecord],
        jobs: &[JobSummary],
    ) -> Result<BatchTotals, IngestError> {
        storage.begin()?;

        let result = self
            .apply_batch(storage, run_id, records, jobs)
            .and_then(|totals| {
                storage.commit()?;
                Ok(totals)
            });

        if let Err(err) = &result {
            if let Err(rollback_err) = storage.rollback() {
                tracing::error!(%run_id, error = %rollback_err, "rollback failed");
            }
            tracing::warn!(%run_id, error = %err, "ingest batch rolled back");
        }

        result
    }

    fn apply_batch<S: Storage + ?Sized>(
        &self,
        storage: &mut S,
        run_id: Uuid,
        records: &[ScrapedRecord],
        jobs: &[JobSummary],
    ) -> Result<BatchTotals, IngestError> {
        let mut totals = BatchTotals::default();

        for record in records {
            match self.engine.reconcile(storage, record) {
                Ok(outcome) => {
                    totals.ingested += 1;
                    if outcome.created_book() {
                        totals.books_created += 1;
                    }
                    if outcome.created_listing() {
                        totals.listings_created += 1;
                    }
                }
                Err(ReconcileError::Parse(err)) => match self.policy {
                    ParseErrorPolicy::Skip => {
                        tracing::warn!(
                            hyperlink = %record.hyperlink,
                            title = %record.title,
                            error = %err,
                            "skipping unparseable record"
                        );
                        totals.skipped.push(SkippedRecord {
                            hyperlink: record.hyperlink.clone(),
                            title: record.title.clone(),
                            reason: err.to_string(),
                        });
                    }
                    ParseErrorPolicy::Abort => {
                        return Err(IngestError::Parse {
                            hyperlink: record.hyperlink.clone(),
                            source: err,
                        });
                    }
                },
                Err(ReconcileError::Persistence(err)) => return Err(err.into()),
            }
        }

        let event = Event::new(
            "ingest_cycle",
            "ingest_cycle",
            &run_id.to_string(),
            serde_json::json!({
                "records_scraped": records.len(),
                "records_ingested": totals.ingested,
                "records_skipped": totals.skipped.len(),
                "books_created": totals.books_created,
                "listings_created": totals.listings_created,
                "jobs": jobs,
            }),
            "pipeline",
        );
        storage.record_event(&event)?;

        Ok(totals)
    }
}
