// 🎛️ Scrape Orchestrator - run every registered job concurrently
//
// Idle ──run()──▶ Running ──all workers done──▶ Completed
//   └──run() with no jobs──▶ Failed(NoProviders)   (nothing dispatched)
//
// Workers append into a shared ResultAggregator; `run()` returns only after
// the JoinSet has drained, so the aggregate is complete when it is read.
// A job that fails, panics or times out contributes zero records and is
// reported as a tagged outcome. It never fails the run.

use crate::error::{JobFetchError, NoProvidersError};
use crate::jobs::ScrapeJob;
use crate::record::ScrapedRecord;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle, JoinSet};

// ============================================================================
// RESULT AGGREGATOR
// ============================================================================

/// Shared, append-only collection of scraped records
///
/// Cloning shares the same underlying buffer.
#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    records: Arc<Mutex<Vec<ScrapedRecord>>>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ScrapedRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a batch, returns the total held afterwards
    pub fn append(&self, batch: Vec<ScrapedRecord>) -> usize {
        let mut records = self.lock();
        records.extend(batch);
        records.len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of everything held
    pub fn snapshot(&self) -> Vec<ScrapedRecord> {
        self.lock().clone()
    }

    /// Drain everything held
    pub fn take(&self) -> Vec<ScrapedRecord> {
        std::mem::take(&mut *self.lock())
    }
}

// ============================================================================
// CONFIG / STATE / REPORT
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Upper bound on jobs fetching at once; `None` runs every job at once
    pub max_concurrency: Option<usize>,

    /// Per-job limit; `None` waits for every job
    pub job_timeout: Option<Duration>,
}

impl OrchestratorConfig {
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Running,
    Completed,
    Failed(NoProvidersError),
}

/// Tagged result of one job in one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub job: String,

    /// Records contributed, or why none were
    pub result: Result<usize, JobFetchError>,

    pub elapsed: Duration,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn records(&self) -> usize {
        *self.result.as_ref().unwrap_or(&0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrchestrationReport {
    /// Union of all successful jobs' records, in no particular order
    pub records: Vec<ScrapedRecord>,

    /// One entry per registered job, in registration order
    pub outcomes: Vec<JobOutcome>,
}

impl OrchestrationReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn all_failed(&self) -> bool {
        self.succeeded() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

pub struct ScrapeOrchestrator {
    jobs: Vec<Arc<dyn ScrapeJob>>,
    aggregator: ResultAggregator,
    config: OrchestratorConfig,
    state: OrchestratorState,
}

impl ScrapeOrchestrator {
    pub fn new(aggregator: ResultAggregator, config: OrchestratorConfig) -> Self {
        ScrapeOrchestrator {
            jobs: Vec::new(),
            aggregator,
            config,
            state: OrchestratorState::Idle,
        }
    }

    pub fn register(&mut self, job: impl ScrapeJob + 'static) {
        self.jobs.push(Arc::new(job));
    }

    pub fn register_all(&mut self, jobs: impl IntoIterator<Item = Box<dyn ScrapeJob>>) {
        self.jobs.extend(jobs.into_iter().map(Arc::from));
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn aggregator(&self) -> &ResultAggregator {
        &self.aggregator
    }

    /// Run every registered job once and wait for all of them
    pub async fn run(&mut self) -> Result<OrchestrationReport, NoProvidersError> {
        if self.jobs.is_empty() {
            tracing::warn!("no scrape jobs registered, nothing dispatched");
            self.state = OrchestratorState::Failed(NoProvidersError);
            return Err(NoProvidersError);
        }

        self.state = OrchestratorState::Running;
        self.aggregator.clear();

        tracing::info!(
            jobs = self.jobs.len(),
            max_concurrency = ?self.config.max_concurrency,
            job_timeout = ?self.config.job_timeout,
            "starting scrape run"
        );

        let started = Instant::now();
        let semaphore = self
            .config
            .max_concurrency
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));

        let names: Vec<String> = self.jobs.iter().map(|job| job.name().to_string()).collect();

        let mut workers = JoinSet::new();
        for (index, job) in self.jobs.iter().enumerate() {
            let job = Arc::clone(job);
            let name = names[index].clone();
            let aggregator = self.aggregator.clone();
            let semaphore = semaphore.clone();
            let timeout = self.config.job_timeout;

            workers.spawn(async move {
                // never closed
                let _permit = match semaphore {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };

                let job_started = Instant::now();
                let result = fetch_with_timeout(job, timeout).await.map(|records| {
                    let count = records.len();
                    aggregator.append(records);
                    count
                });

                let outcome = JobOutcome {
                    job: name,
                    result,
                    elapsed: job_started.elapsed(),
                };
                (index, outcome)
            });
        }

        // Barrier: drain every worker
        let outcomes = drain_workers(&mut workers, &names).await;

        let report = OrchestrationReport {
            records: self.aggregator.snapshot(),
            outcomes,
        };

        self.state = OrchestratorState::Completed;
        tracing::info!(
            records = report.records.len(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scrape run completed"
        );

        Ok(report)
    }
}

/// Wait for every worker; a worker lost to a panic still yields an outcome
///
/// Outcomes come back in registration order, one per entry of `names`.
async fn drain_workers(
    workers: &mut JoinSet<(usize, JobOutcome)>,
    names: &[String],
) -> Vec<JobOutcome> {
    let mut slots: Vec<Option<JobOutcome>> = vec![None; names.len()];
    let mut lost = Vec::new();

    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok((index, outcome)) => {
                match &outcome.result {
                    Ok(count) => tracing::info!(
                        job = %outcome.job,
                        records = count,
                        elapsed_ms = outcome.elapsed.as_millis() as u64,
                        "scrape job finished"
                    ),
                    Err(err) => tracing::warn!(
                        job = %outcome.job,
                        error = %err,
                        elapsed_ms = outcome.elapsed.as_millis() as u64,
                        "scrape job failed"
                    ),
                }
                slots[index] = Some(outcome);
            }
            Err(err) => {
                tracing::error!(error = %err, "scrape worker lost");
                lost.push(panic_message(err));
            }
        }
    }

    let mut lost = lost.into_iter();
    slots
        .into_iter()
        .zip(names)
        .map(|(slot, name)| {
            slot.unwrap_or_else(|| JobOutcome {
                job: name.clone(),
                result: Err(JobFetchError::Panicked(
                    lost.next().unwrap_or_else(|| "worker lost".to_string()),
                )),
                elapsed: Duration::ZERO,
            })
        })
        .collect()
}

/// Aborts the task when dropped, finished or not
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Fetch on its own task so a panic or timeout stays inside this job
///
/// The fetch task never outlives its worker.
async fn fetch_with_timeout(
    job: Arc<dyn ScrapeJob>,
    timeout: Option<Duration>,
) -> Result<Vec<ScrapedRecord>, JobFetchError> {
    let mut fetch = AbortOnDrop(tokio::spawn(async move { job.fetch().await }));

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut fetch.0).await {
            Ok(joined) => joined,
            Err(_) => return Err(JobFetchError::TimedOut(limit)),
        },
        None => (&mut fetch.0).await,
    };

    joined.map_err(|err| JobFetchError::Panicked(panic_message(err)))?
}

fn panic_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "task cancelled".to_string();
    }

    let payload = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::StaticJob;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn records(job: &str, n: usize) -> Vec<ScrapedRecord> {
        (0..n)
            .map(|i| {
                let hyperlink = format!("/{}/{}", job, i);
                ScrapedRecord::new(&format!("Book {}", i), "Author", &hyperlink, job)
            })
            .collect()
    }

    /// Sleeps, then returns `count` records and bumps `finished`
    struct SlowJob {
        name: String,
        count: usize,
        delay: Duration,
        finished: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ScrapeJob for SlowJob {
        fn name(&self) -> &str {
            &self.name
        }

        async fn fetch(&self) -> Result<Vec<ScrapedRecord>, JobFetchError> {
            tokio::time::sleep(self.delay).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(records(&self.name, self.count))
        }
    }

    struct FailingJob;

    #[async_trait]
    impl ScrapeJob for FailingJob {
        fn name(&self) -> &str {
            "failing"
        }

        async fn fetch(&self) -> Result<Vec<ScrapedRecord>, JobFetchError> {
            Err(JobFetchError::Source("store page returned 503".to_string()))
        }
    }

    struct PanickingJob;

    #[async_trait]
    impl ScrapeJob for PanickingJob {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn fetch(&self) -> Result<Vec<ScrapedRecord>, JobFetchError> {
            panic!("selector not found");
        }
    }

    /// Tracks how many fetches overlap
    struct GaugedJob {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ScrapeJob for GaugedJob {
        fn name(&self) -> &str {
            "gauged"
        }

        async fn fetch(&self) -> Result<Vec<ScrapedRecord>, JobFetchError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(40)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    fn orchestrator() -> ScrapeOrchestrator {
        ScrapeOrchestrator::new(ResultAggregator::new(), OrchestratorConfig::default())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_jobs_fails_before_dispatch() {
        let mut orch = orchestrator();
        assert_eq!(orch.state(), OrchestratorState::Idle);

        let err = orch.run().await.unwrap_err();
        assert_eq!(err, NoProvidersError);
        assert_eq!(orch.state(), OrchestratorState::Failed(NoProvidersError));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_one_failing_job_does_not_sink_the_run() {
        let mut orch = orchestrator();
        orch.register(StaticJob::new("a", records("a", 2)));
        orch.register(FailingJob);
        orch.register(StaticJob::new("c", records("c", 3)));

        let report = orch.run().await.unwrap();

        assert_eq!(report.records.len(), 5);
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        let failure = report.failures().next().unwrap();
        assert_eq!(failure.job, "failing");
        assert!(matches!(failure.result, Err(JobFetchError::Source(_))));
        assert_eq!(orch.state(), OrchestratorState::Completed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_barrier_waits_for_every_job() {
        let finished = Arc::new(AtomicUsize::new(0));
        let mut orch = orchestrator();
        let counts = [1, 4, 0, 7, 2];

        for (i, count) in counts.iter().enumerate() {
            orch.register(SlowJob {
                name: format!("job{}", i),
                count: *count,
                delay: Duration::from_millis(10 * (counts.len() - i) as u64),
                finished: Arc::clone(&finished),
            });
        }

        let report = orch.run().await.unwrap();

        assert_eq!(finished.load(Ordering::SeqCst), counts.len());
        assert_eq!(report.records.len(), counts.iter().sum::<usize>());
        assert_eq!(orch.aggregator().len(), counts.iter().sum::<usize>());
        assert!(report.outcomes.iter().all(|o| o.is_success()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_panicking_job_is_isolated() {
        let mut orch = orchestrator();
        orch.register(PanickingJob);
        orch.register(StaticJob::new("ok", records("ok", 2)));

        let report = orch.run().await.unwrap();

        assert_eq!(report.records.len(), 2);
        let failure = report.failures().next().unwrap();
        assert_eq!(failure.job, "panicking");
        assert_eq!(
            failure.result,
            Err(JobFetchError::Panicked("selector not found".to_string()))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_timed_out_job_contributes_nothing() {
        let config = OrchestratorConfig::default().with_job_timeout(Duration::from_millis(50));
        let mut orch = ScrapeOrchestrator::new(ResultAggregator::new(), config);
        let finished = Arc::new(AtomicUsize::new(0));

        orch.register(SlowJob {
            name: "stuck".to_string(),
            count: 10,
            delay: Duration::from_secs(30),
            finished: Arc::clone(&finished),
        });
        orch.register(StaticJob::new("fast", records("fast", 3)));

        let report = orch.run().await.unwrap();

        assert_eq!(report.records.len(), 3);
        let stuck = report.outcomes.iter().find(|o| o.job == "stuck").unwrap();
        assert_eq!(stuck.result, Err(JobFetchError::TimedOut(Duration::from_millis(50))));
        assert_eq!(stuck.records(), 0);
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_ceiling() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let config = OrchestratorConfig::default().with_max_concurrency(2);
        let mut orch = ScrapeOrchestrator::new(ResultAggregator::new(), config);

        for _ in 0..6 {
            orch.register(GaugedJob {
                active: Arc::clone(&active),
                peak: Arc::clone(&peak),
            });
        }

        let report = orch.run().await.unwrap();

        assert_eq!(report.succeeded(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_results_do_not_accumulate_across_runs() {
        let aggregator = ResultAggregator::new();
        let mut orch = ScrapeOrchestrator::new(aggregator.clone(), OrchestratorConfig::default());
        orch.register(StaticJob::new("a", records("a", 2)));

        orch.run().await.unwrap();
        let second = orch.run().await.unwrap();

        assert_eq!(second.records.len(), 2);
        assert_eq!(aggregator.len(), 2);

        // jobs can be added between runs
        orch.register(StaticJob::new("b", records("b", 1)));
        assert_eq!(orch.run().await.unwrap().records.len(), 3);
    }

    fn lost_worker() -> (usize, JobOutcome) {
        panic!("worker died")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_lost_worker_still_gets_an_outcome() {
        let names = vec!["ok".to_string(), "lost".to_string()];
        let mut workers = JoinSet::new();
        workers.spawn(async {
            let outcome = JobOutcome {
                job: "ok".to_string(),
                result: Ok(2),
                elapsed: Duration::ZERO,
            };
            (0, outcome)
        });
        workers.spawn(async { lost_worker() });

        let outcomes = drain_workers(&mut workers, &names).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].job, "ok");
        assert_eq!(outcomes[0].result, Ok(2));
        assert_eq!(outcomes[1].job, "lost");
        assert_eq!(
            outcomes[1].result,
            Err(JobFetchError::Panicked("worker died".to_string()))
        );

        let report = OrchestrationReport {
            records: Vec::new(),
            outcomes,
        };
        assert_eq!(report.failed(), 1);
        assert!(!report.all_failed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_outcomes_follow_registration_order() {
        let finished = Arc::new(AtomicUsize::new(0));
        let mut orch = orchestrator();
        orch.register(SlowJob {
            name: "slow".to_string(),
            count: 1,
            delay: Duration::from_millis(50),
            finished: Arc::clone(&finished),
        });
        orch.register(StaticJob::new("fast", records("fast", 1)));

        let report = orch.run().await.unwrap();
        let jobs: Vec<&str> = report.outcomes.iter().map(|o| o.job.as_str()).collect();
        assert_eq!(jobs, vec!["slow", "fast"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropped_run_cancels_fetches() {
        let finished = Arc::new(AtomicUsize::new(0));
        let mut orch = orchestrator();
        orch.register(SlowJob {
            name: "slow".to_string(),
            count: 1,
            delay: Duration::from_millis(200),
            finished: Arc::clone(&finished),
        });

        let cut_short = tokio::time::timeout(Duration::from_millis(20), orch.run()).await;
        assert!(cut_short.is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_aggregator_shares_buffer_between_clones() {
        let aggregator = ResultAggregator::new();
        let worker_side = aggregator.clone();

        assert_eq!(worker_side.append(records("x", 2)), 2);
        assert_eq!(aggregator.len(), 2);
        assert_eq!(aggregator.take().len(), 2);
        assert!(worker_side.is_empty());
    }
}
