//! # eoka-harvest
//!
//! Harvest search timelines through an authenticated browser session. The
//! platform's own web client is loaded in the page, its operation metadata is
//! snapshotted once, and GraphQL calls are issued through it page by page.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use eoka_harvest::{Collector, Config, CsvExporter, HarvestBrowser, SessionState, TracingProgress};
//!
//! # #[tokio::main]
//! # async fn main() -> eoka_harvest::Result<()> {
//! let config = Config::load("harvest.yaml")?;
//! let session = SessionState::load(&config.session)?;
//! let browser = HarvestBrowser::open(&config, &session).await?;
//!
//! let collector = Collector::new(browser.catalog(), browser.flags(), config.pacing.clone());
//! let outcome = collector
//!     .collect(&browser, &config.search, &TracingProgress)
//!     .await;
//!
//! CsvExporter::new(config.output.bom).write_path(&config.output.path, &outcome.records)?;
//! browser.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod collector;
mod config;
pub mod export;
pub mod graphql;
pub mod search;
pub mod session;
pub mod timeline;
pub mod transport;

pub use browser::HarvestBrowser;
pub use collector::{
    CancelToken, CollectionOutcome, CollectionState, Collector, Phase, Progress, ProgressSink,
    StopReason, TracingProgress,
};
pub use config::{
    BrowserConfig, Config, DiscoveryConfig, OutputConfig, PacingConfig, PlatformConfig,
    SearchConfig, Viewport,
};
pub use export::CsvExporter;
pub use graphql::{
    FeatureFlagState, GraphqlRequest, HttpMethod, OperationCatalog, OperationDescriptor,
    OperationKind,
};
pub use session::SessionState;
pub use timeline::{Cursor, Record, TimelinePage};
pub use transport::GraphqlTransport;

/// Result type for eoka-harvest operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring, discovering, or collecting.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("invalid session: {0}")]
    Session(String),

    #[error("discovery failed: {0}")]
    Discovery(String),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("ambiguous operation: {name} matches {count} descriptors")]
    AmbiguousOperation { name: String, count: usize },

    #[error("request timed out after {attempts} attempts")]
    TransportTimeout { attempts: u32 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl Error {
    /// Whether the caller should retry the failed step after a bounded wait.
    ///
    /// Only discovery qualifies: the platform client may simply not have
    /// finished loading yet.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Discovery(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r##"
search:
  tag: "#Python"
  since: "2023-01-01"
  until: "2023-12-31"
"##;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.search.tag, "#Python");
        assert_eq!(config.search.limit, 100);
        assert_eq!(config.search.page_size, 50);
        assert_eq!(config.search.product, "Latest");
        assert_eq!(config.session, std::path::PathBuf::from("session.json"));
        assert_eq!(config.output.path, std::path::PathBuf::from("tweets.csv"));
        assert!(config.output.bom);
        assert!(!config.browser.headless);
        assert_eq!(config.platform.base_url, "https://x.com");
    }

    #[test]
    fn test_parse_pacing_defaults() {
        let yaml = r##"
search:
  tag: "rust"
  since: "2024-01-01"
  until: "2024-02-01"
"##;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.pacing.request_timeout_ms, 30_000);
        assert_eq!(config.pacing.max_attempts, 3);
        assert_eq!(config.pacing.retry_delay_ms, 5_000);
        assert_eq!(config.pacing.page_delay_ms, 2_000);
        assert_eq!(config.discovery.attempts, 5);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r##"
name: "python-2023"
session: "secrets/session.json"
browser:
  headless: true
  proxy: "http://localhost:8080"
  viewport:
    width: 1920
    height: 1080
platform:
  base_url: "https://twitter.com"
  landing_path: "/explore"
search:
  tag: "#Python"
  since: "2023-01-01"
  until: "2023-12-31"
  limit: 250
  page_size: 20
  product: "Top"
pacing:
  request_timeout_ms: 10000
  max_attempts: 5
  retry_delay_ms: 100
  page_delay_ms: 0
discovery:
  attempts: 2
  wait_ms: 500
output:
  path: "out/python.csv"
  bom: false
"##;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.name, "python-2023");
        assert!(config.browser.headless);
        assert_eq!(config.browser.proxy, Some("http://localhost:8080".into()));
        assert_eq!(config.browser.viewport.unwrap().width, 1920);
        assert_eq!(config.platform.landing_url(), "https://twitter.com/explore");
        assert_eq!(config.search.limit, 250);
        assert_eq!(config.search.product, "Top");
        assert_eq!(config.pacing.max_attempts, 5);
        assert_eq!(config.discovery.wait_ms, 500);
        assert!(!config.output.bom);
    }

    #[test]
    fn test_validation_empty_tag() {
        let yaml = r#"
search:
  tag: "  "
  since: "2023-01-01"
  until: "2023-12-31"
"#;
        let result = Config::parse(yaml);
        assert!(result.unwrap_err().to_string().contains("search.tag"));
    }

    #[test]
    fn test_validation_bad_date() {
        let yaml = r#"
search:
  tag: "rust"
  since: "01/01/2023"
  until: "2023-12-31"
"#;
        let result = Config::parse(yaml);
        assert!(result.unwrap_err().to_string().contains("YYYY-MM-DD"));
    }

    #[test]
    fn test_validation_inverted_range() {
        let yaml = r#"
search:
  tag: "rust"
  since: "2024-01-01"
  until: "2023-12-31"
"#;
        let result = Config::parse(yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_zero_limit() {
        let yaml = r#"
search:
  tag: "rust"
  since: "2023-01-01"
  until: "2023-12-31"
  limit: 0
"#;
        let result = Config::parse(yaml);
        assert!(result.unwrap_err().to_string().contains("at least 1"));
    }

    #[test]
    fn test_validation_zero_attempts() {
        let yaml = r#"
search:
  tag: "rust"
  since: "2023-01-01"
  until: "2023-12-31"
pacing:
  max_attempts: 0
"#;
        let result = Config::parse(yaml);
        assert!(result.unwrap_err().to_string().contains("max_attempts"));
    }

    #[test]
    fn test_validation_missing_search() {
        let yaml = r#"
name: "no search"
"#;
        assert!(Config::parse(yaml).is_err());
    }

    #[test]
    fn test_load_example_config() {
        let config = Config::load("configs/example.yaml").unwrap();
        assert_eq!(config.name, "Python hashtag, 2023");
        assert_eq!(config.search.tag, "#Python");
    }

    #[test]
    fn test_only_discovery_is_retryable() {
        assert!(Error::Discovery("not loaded".into()).is_retryable());
        assert!(!Error::TransportTimeout { attempts: 3 }.is_retryable());
        assert!(!Error::UnknownOperation("SearchTimeline".into()).is_retryable());
    }
}
