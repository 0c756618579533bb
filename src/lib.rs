// Promo Tracker - Core Library
// Exposes all modules for use in the CLI and tests

pub mod error;
pub mod record;
pub mod price;          // Free-text prices → Decimal + currency
pub mod identity;       // Identity keys for books, stores, listings
pub mod entities;       // Book, Bookstore, StoreListing, PricePoint
pub mod storage;        // Persistence seam
pub mod db;             // SQLite storage + audit events + read side
pub mod reconciliation; // Record → persisted entities
pub mod jobs;           // Scrape job trait + feed jobs
pub mod orchestrator;   // Concurrent scrape runs
pub mod pipeline;       // One ingest cycle end to end
pub mod config;         // TOML config

// Re-export commonly used types
pub use error::{
    ConfigError, IngestError, JobFetchError, NoProvidersError,
    ParseError, PersistenceError, ReconcileError,
};
pub use record::ScrapedRecord;
pub use price::{parse_amount, CurrencyRules, ParsedPrice, PriceParser};
pub use identity::{BookKey, IdentityKeys, IdentityResolver, ListingKey, StoreKey};
pub use entities::{
    Book, Bookstore, Entity, EntityChange,
    PriceHistory, PricePoint, StoreListing,
};
pub use storage::Storage;
pub use db::{
    Event, ListingHistory, ListingSnapshot, SqliteStorage, StorageCounts,
    get_events_by_type, get_events_for_entity, insert_event, setup_database,
};
pub use reconciliation::{ReconcileOutcome, ReconciliationEngine};
pub use jobs::{CsvFeedJob, JsonFeedJob, ScrapeJob, StaticJob};
pub use orchestrator::{
    JobOutcome, OrchestrationReport, OrchestratorConfig, OrchestratorState,
    ResultAggregator, ScrapeOrchestrator,
};
pub use pipeline::{
    IngestReport, IngestStatus, JobSummary, ParseErrorPolicy, Pipeline, SkippedRecord,
};
pub use config::{AppConfig, FeedConfig, FeedKind};
