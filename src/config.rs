// ⚙️ Configuration - TOML file + overrides
//
// Resolution priority for every setting:
//   1. command-line flag
//   2. environment variable (PROMO_CONFIG, PROMO_DB_PATH)
//   3. TOML config file
//   4. compiled default
// Flags and environment are merged by the CLI; this module owns 3 and 4.

use crate::error::ConfigError;
use crate::jobs::{CsvFeedJob, JsonFeedJob, ScrapeJob};
use crate::orchestrator::OrchestratorConfig;
use crate::pipeline::ParseErrorPolicy;
use crate::price::{CurrencyRules, PriceParser};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "PROMO_CONFIG";
pub const DB_PATH_ENV: &str = "PROMO_DB_PATH";
pub const DEFAULT_CONFIG_FILE: &str = "promo-tracker.toml";
pub const DEFAULT_DATABASE_PATH: &str = "promotions.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Csv,
    Json,
}

/// One `[[feeds]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub kind: FeedKind,
    pub name: String,
    pub path: PathBuf,

    /// Fixed store name; optional for csv, required for json
    #[serde(default)]
    pub store: Option<String>,
}

impl FeedConfig {
    fn build(&self) -> Result<Box<dyn ScrapeJob>, ConfigError> {
        match self.kind {
            FeedKind::Csv => {
                let job = CsvFeedJob::new(&self.name, &self.path);
                Ok(match &self.store {
                    Some(store) => Box::new(job.with_store(store)),
                    None => Box::new(job),
                })
            }
            FeedKind::Json => {
                let store = self.store.as_deref().ok_or_else(|| {
                    ConfigError::Invalid(format!("json feed `{}` needs a store name", self.name))
                })?;
                Ok(Box::new(JsonFeedJob::new(&self.name, &self.path, store)))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,

    /// Omit for one worker per job
    pub max_concurrency: Option<usize>,

    /// Omit for no timeout
    pub job_timeout_secs: Option<u64>,

    pub parse_error_policy: ParseErrorPolicy,
    pub currency: CurrencyRules,
    pub feeds: Vec<FeedConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            max_concurrency: None,
            job_timeout_secs: None,
            parse_error_policy: ParseErrorPolicy::default(),
            currency: CurrencyRules::default(),
            feeds: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load from a TOML file; a missing file falls back to defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "config file not found, using defaults");
                return Ok(AppConfig::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        let config = Self::from_toml_str(&contents)?;
        tracing::info!(path = %path.display(), feeds = config.feeds.len(), "loaded config");
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == Some(0) {
            return Err(ConfigError::Invalid("max_concurrency must be at least 1".to_string()));
        }
        if self.job_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid("job_timeout_secs must be at least 1".to_string()));
        }
        let rules = &self.currency;
        if rules.local_marker.trim().is_empty() || rules.fallback.trim().is_empty() {
            return Err(ConfigError::Invalid("currency labels cannot be blank".to_string()));
        }

        let mut names = HashSet::new();
        for feed in &self.feeds {
            if feed.name.trim().is_empty() {
                return Err(ConfigError::Invalid("feed name cannot be blank".to_string()));
            }
            if !names.insert(feed.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate feed name `{}`", feed.name)));
            }
            if feed.kind == FeedKind::Json && feed.store.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "json feed `{}` needs a store name",
                    feed.name
                )));
            }
        }

        Ok(())
    }

    /// Builder pattern: CLI/env database path wins over the file
    pub fn with_database_override(mut self, database_path: Option<PathBuf>) -> Self {
        if let Some(path) = database_path {
            self.database_path = path;
        }
        self
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_concurrency: self.max_concurrency,
            job_timeout: self.job_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn price_parser(&self) -> PriceParser {
        PriceParser::with_rules(self.currency.clone())
    }

    pub fn build_jobs(&self) -> Result<Vec<Box<dyn ScrapeJob>>, ConfigError> {
        self.feeds.iter().map(FeedConfig::build).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FULL: &str = r#"
database_path = "data/promotions.db"
max_concurrency = 4
job_timeout_secs = 60
parse_error_policy = "abort"

[currency]
local_marker = "zł"
fallback = "USD"

[[feeds]]
kind = "csv"
name = "empik"
path = "feeds/empik.csv"
store = "EMPIK"

[[feeds]]
kind = "json"
name = "itbook"
path = "feeds/itbook.json"
store = "ITBookstore"
"#;

    #[test]
    fn test_full_config() {
        let config = AppConfig::from_toml_str(FULL).unwrap();

        assert_eq!(config.database_path, PathBuf::from("data/promotions.db"));
        assert_eq!(config.parse_error_policy, ParseErrorPolicy::Abort);
        assert_eq!(config.currency.fallback, "USD");
        assert_eq!(config.feeds.len(), 2);
        assert_eq!(config.feeds[1].kind, FeedKind::Json);

        let orch = config.orchestrator_config();
        assert_eq!(orch.max_concurrency, Some(4));
        assert_eq!(orch.job_timeout, Some(Duration::from_secs(60)));

        let jobs = config.build_jobs().unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].name(), "empik");
        assert_eq!(jobs[1].name(), "itbook");
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();

        assert_eq!(config, AppConfig::default());
        assert_eq!(config.database_path, PathBuf::from(DEFAULT_DATABASE_PATH));
        assert_eq!(config.orchestrator_config(), OrchestratorConfig::default());
        assert_eq!(config.currency.local_marker, "zł");
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = AppConfig::load(Path::new("/nonexistent/promo-tracker.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();
        file.flush().unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.feeds.len(), 2);
    }

    #[test]
    fn test_database_override_wins() {
        let config = AppConfig::from_toml_str(FULL)
            .unwrap()
            .with_database_override(Some(PathBuf::from("/tmp/cli.db")));
        assert_eq!(config.database_path, PathBuf::from("/tmp/cli.db"));

        let untouched = AppConfig::from_toml_str(FULL).unwrap().with_database_override(None);
        assert_eq!(untouched.database_path, PathBuf::from("data/promotions.db"));
    }

    #[test]
    fn test_invalid_configs() {
        let cases = [
            "max_concurrency = 0",
            "job_timeout_secs = 0",
            "[currency]\nlocal_marker = \"  \"",
            "[[feeds]]\nkind = \"json\"\nname = \"itbook\"\npath = \"a.json\"",
            concat!(
                "[[feeds]]\nkind = \"csv\"\nname = \"a\"\npath = \"a.csv\"\n",
                "[[feeds]]\nkind = \"csv\"\nname = \"a\"\npath = \"b.csv\"",
            ),
        ];

        for case in cases {
            let result = AppConfig::from_toml_str(case);
            assert!(matches!(result, Err(ConfigError::Invalid(_))), "accepted: {}", case);
        }
    }

    #[test]
    fn test_unknown_feed_kind_is_toml_error() {
        let result =
            AppConfig::from_toml_str("[[feeds]]\nkind = \"xml\"\nname = \"a\"\npath = \"a.xml\"");
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }
}
