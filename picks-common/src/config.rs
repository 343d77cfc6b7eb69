//! Configuration management for the daily picks service.
//!
//! The service reads a single JSON file at `~/.picks/config.json`
//! (overridable with `PICKS_CONFIG`). Every field has a default, so an
//! absent file yields a fully working configuration.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (PICKS_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `PICKS_CONFIG` → path of the config file
//! - `PICKS_HOST` → server.host
//! - `PICKS_PORT` → server.port
//! - `PICKS_LOG_LEVEL` → observability.log_level
//! - `PICKS_LOG_FORMAT` → observability.log_format
//! - `PICKS_MARKETS` → picks.markets (comma-separated)
//! - `PICKS_REDIS_URL` → picks.store.redis_url (also selects the redis backend)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".picks"),
        |dirs| dirs.home_dir().join(".picks"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    std::env::var("PICKS_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| config_dir().join("config.json"))
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// JSON Schema reference
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Report generation settings
    #[serde(default)]
    pub picks: PicksConfig,
}

impl Config {
    /// Load configuration from the default path, falling back to defaults.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration, apply environment overrides and validate.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        config
            .validate()
            .context("Invalid configuration")?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("PICKS_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("PICKS_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(level) = std::env::var("PICKS_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Ok(format) = std::env::var("PICKS_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Ok(markets) = std::env::var("PICKS_MARKETS") {
            let parsed = parse_market_list(&markets);
            if !parsed.is_empty() {
                self.picks.markets = parsed;
            }
        }
        if let Ok(url) = std::env::var("PICKS_REDIS_URL") {
            self.picks.store.backend = StoreBackend::Redis;
            self.picks.store.redis_url = Some(url);
        }
    }

    /// Socket address string the HTTP server binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Split a comma-separated market list, normalising to upper case.
pub fn parse_market_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

// ============================================================================
// Server Configuration
// ============================================================================

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host. Default "127.0.0.1" (local only).
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Inbound request timeout in seconds.
    ///
    /// A cold request may have to wait for a full generation, so this must
    /// exceed `picks.generation_deadline_secs`.
    #[serde(default = "default_server_timeout")]
    pub request_timeout_secs: u64,

    /// Allowed CORS origins. Empty means any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_server_timeout(),
            cors_origins: Vec::new(),
        }
    }
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to set to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

// ============================================================================
// Picks Configuration
// ============================================================================

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PicksConfig {
    /// Markets to scan, in processing order (e.g. ["NSE", "NASDAQ"])
    #[serde(default = "default_markets")]
    pub markets: Vec<String>,

    /// Maximum candidates requested from the screener per market
    #[serde(default = "default_scan_limit")]
    pub scan_limit: usize,

    /// Maximum picks exported per market
    #[serde(default = "default_export_cap")]
    pub export_cap: usize,

    /// Number of top-ranked picks per market enriched with news
    #[serde(default = "default_news_top_n")]
    pub news_top_n: usize,

    /// Hours between report generations
    #[serde(default = "default_refresh_interval_hours")]
    pub refresh_interval_hours: u64,

    /// Deadline for one full generation in seconds
    #[serde(default = "default_generation_deadline")]
    pub generation_deadline_secs: u64,

    /// Trigger one generation at startup
    #[serde(default)]
    pub warmup_on_start: bool,

    /// Enable `POST /api/v1/daily-report/refresh`
    #[serde(default)]
    pub allow_manual_refresh: bool,

    /// Upstream finance API settings
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// News feed settings
    #[serde(default)]
    pub news: NewsConfig,

    /// Scoring thresholds
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Distributed report store
    #[serde(default)]
    pub store: StoreConfig,

    /// Response caching directives
    #[serde(default)]
    pub cache_control: CacheControlConfig,
}

impl Default for PicksConfig {
    fn default() -> Self {
        Self {
            markets: default_markets(),
            scan_limit: default_scan_limit(),
            export_cap: default_export_cap(),
            news_top_n: default_news_top_n(),
            refresh_interval_hours: default_refresh_interval_hours(),
            generation_deadline_secs: default_generation_deadline(),
            warmup_on_start: false,
            allow_manual_refresh: false,
            upstream: UpstreamConfig::default(),
            news: NewsConfig::default(),
            scoring: ScoringConfig::default(),
            store: StoreConfig::default(),
            cache_control: CacheControlConfig::default(),
        }
    }
}

/// Upstream finance API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Landing page that hands out the session cookie
    #[serde(default = "default_landing_url")]
    pub landing_url: String,

    /// Endpoint returning the crumb for a cookie
    #[serde(default = "default_crumb_url")]
    pub crumb_url: String,

    /// Base URL for screener, quote and spark endpoints
    #[serde(default = "default_query_base")]
    pub query_base: String,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_upstream_timeout")]
    pub request_timeout_secs: u64,

    /// Session lifetime in seconds
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// Symbols per quote request (clamped to 15)
    #[serde(default = "default_quote_chunk")]
    pub quote_chunk_size: usize,

    /// Symbols per spark request (clamped to 8)
    #[serde(default = "default_history_chunk")]
    pub history_chunk_size: usize,

    /// Chunk requests in flight at once
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,

    /// History lookback passed to the spark endpoint
    #[serde(default = "default_history_range")]
    pub history_range: String,

    /// History sampling interval
    #[serde(default = "default_history_interval")]
    pub history_interval: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            landing_url: default_landing_url(),
            crumb_url: default_crumb_url(),
            query_base: default_query_base(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_upstream_timeout(),
            session_ttl_secs: default_session_ttl(),
            quote_chunk_size: default_quote_chunk(),
            history_chunk_size: default_history_chunk(),
            fetch_concurrency: default_fetch_concurrency(),
            history_range: default_history_range(),
            history_interval: default_history_interval(),
        }
    }
}

/// News feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsConfig {
    /// RSS search endpoint
    #[serde(default = "default_news_feed_url")]
    pub feed_url: String,

    /// Extra query parameters appended to every search (locale etc.)
    #[serde(default = "default_news_params")]
    pub params: Vec<(String, String)>,

    /// Titles scored per search
    #[serde(default = "default_max_titles")]
    pub max_titles: usize,

    /// Headlines kept on the pick
    #[serde(default = "default_max_headlines")]
    pub max_headlines: usize,

    /// Phrases counted as positive
    #[serde(default = "default_positive_keywords")]
    pub positive_keywords: Vec<String>,

    /// Phrases counted as negative
    #[serde(default = "default_negative_keywords")]
    pub negative_keywords: Vec<String>,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            feed_url: default_news_feed_url(),
            params: default_news_params(),
            max_titles: default_max_titles(),
            max_headlines: default_max_headlines(),
            positive_keywords: default_positive_keywords(),
            negative_keywords: default_negative_keywords(),
        }
    }
}

/// Scoring thresholds and trade-plan multipliers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_sma_fast")]
    pub sma_fast: usize,
    #[serde(default = "default_sma_slow")]
    pub sma_slow: usize,
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    /// RSI band rewarded with +1 (inclusive)
    #[serde(default = "default_rsi_band")]
    pub rsi_band: (f64, f64),
    /// RSI above this is penalised
    #[serde(default = "default_rsi_overbought")]
    pub rsi_overbought: f64,
    /// Trailing samples for support/resistance
    #[serde(default = "default_level_lookback")]
    pub level_lookback: usize,
    /// Prior samples averaged for the volume shock ratio
    #[serde(default = "default_volume_lookback")]
    pub volume_lookback: usize,
    #[serde(default = "default_volume_shock_high")]
    pub volume_shock_high: f64,
    #[serde(default = "default_volume_shock_low")]
    pub volume_shock_low: f64,
    /// P/E band rewarded with +1 (inclusive)
    #[serde(default = "default_pe_band")]
    pub pe_band: (f64, f64),
    /// P/E above this is penalised
    #[serde(default = "default_pe_expensive")]
    pub pe_expensive: f64,
    /// Minimum dividend yield in percent
    #[serde(default = "default_min_dividend_yield")]
    pub min_dividend_yield: f64,
    /// News score is clamped to ±this
    #[serde(default = "default_news_clamp")]
    pub news_clamp: i32,
    #[serde(default = "default_breakout_entry")]
    pub breakout_entry: f64,
    #[serde(default = "default_breakout_stop")]
    pub breakout_stop: f64,
    #[serde(default = "default_bounce_entry")]
    pub bounce_entry: f64,
    #[serde(default = "default_bounce_stop")]
    pub bounce_stop: f64,
    /// Target multiples of risk
    #[serde(default = "default_target_multiples")]
    pub target_multiples: (f64, f64),
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            sma_fast: default_sma_fast(),
            sma_slow: default_sma_slow(),
            rsi_period: default_rsi_period(),
            rsi_band: default_rsi_band(),
            rsi_overbought: default_rsi_overbought(),
            level_lookback: default_level_lookback(),
            volume_lookback: default_volume_lookback(),
            volume_shock_high: default_volume_shock_high(),
            volume_shock_low: default_volume_shock_low(),
            pe_band: default_pe_band(),
            pe_expensive: default_pe_expensive(),
            min_dividend_yield: default_min_dividend_yield(),
            news_clamp: default_news_clamp(),
            breakout_entry: default_breakout_entry(),
            breakout_stop: default_breakout_stop(),
            bounce_entry: default_bounce_entry(),
            bounce_stop: default_bounce_stop(),
            target_multiples: default_target_multiples(),
        }
    }
}

/// Backend for the distributed report store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process map (single instance deployments, tests)
    #[default]
    Memory,
    /// Redis (requires the `redis-backend` feature)
    Redis,
}

/// Distributed report store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Redis URL (redis://host:port)
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Key the published payload is stored under
    #[serde(default = "default_store_key")]
    pub key: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: None,
            key: default_store_key(),
        }
    }
}

/// Cache-Control directives on the report endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheControlConfig {
    #[serde(default = "default_browser_max_age")]
    pub browser_max_age_secs: u64,
    #[serde(default = "default_shared_max_age")]
    pub shared_max_age_secs: u64,
}

impl Default for CacheControlConfig {
    fn default() -> Self {
        Self {
            browser_max_age_secs: default_browser_max_age(),
            shared_max_age_secs: default_shared_max_age(),
        }
    }
}

impl CacheControlConfig {
    /// Render the `Cache-Control` header value.
    pub fn header_value(&self) -> String {
        format!(
            "public, max-age={}, s-maxage={}",
            self.browser_max_age_secs, self.shared_max_age_secs
        )
    }
}

// ============================================================================
// Defaults
// ============================================================================

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    4440
}
fn default_server_timeout() -> u64 {
    360
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}
fn default_markets() -> Vec<String> {
    vec!["NSE".into(), "NASDAQ".into()]
}
fn default_scan_limit() -> usize {
    60
}
fn default_export_cap() -> usize {
    20
}
fn default_news_top_n() -> usize {
    1
}
fn default_refresh_interval_hours() -> u64 {
    24
}
fn default_generation_deadline() -> u64 {
    300
}
fn default_landing_url() -> String {
    "https://fc.yahoo.com".into()
}
fn default_crumb_url() -> String {
    "https://query1.finance.yahoo.com/v1/test/getcrumb".into()
}
fn default_query_base() -> String {
    "https://query1.finance.yahoo.com".into()
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0 Safari/537.36"
        .into()
}
fn default_upstream_timeout() -> u64 {
    15
}
fn default_session_ttl() -> u64 {
    30 * 60
}
fn default_quote_chunk() -> usize {
    15
}
fn default_history_chunk() -> usize {
    8
}
fn default_fetch_concurrency() -> usize {
    2
}
fn default_history_range() -> String {
    "6mo".into()
}
fn default_history_interval() -> String {
    "1d".into()
}
fn default_news_feed_url() -> String {
    "https://news.google.com/rss/search".into()
}
fn default_news_params() -> Vec<(String, String)> {
    vec![
        ("hl".into(), "en-IN".into()),
        ("gl".into(), "IN".into()),
        ("ceid".into(), "IN:en".into()),
    ]
}
fn default_max_titles() -> usize {
    6
}
fn default_max_headlines() -> usize {
    3
}
fn default_positive_keywords() -> Vec<String> {
    [
        "beats", "surge", "soars", "jumps", "rally", "record high", "upgrade", "outperform",
        "buy rating", "profit rises", "strong", "growth", "order win", "bags order", "expansion",
        "buyback", "dividend", "approval", "partnership",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_negative_keywords() -> Vec<String> {
    [
        "misses", "plunge", "slump", "falls", "tumbles", "downgrade", "underperform",
        "sell rating", "loss", "weak", "probe", "fraud", "lawsuit", "penalty", "resigns",
        "default", "recall", "ban",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_sma_fast() -> usize {
    50
}
fn default_sma_slow() -> usize {
    200
}
fn default_rsi_period() -> usize {
    14
}
fn default_rsi_band() -> (f64, f64) {
    (45.0, 65.0)
}
fn default_rsi_overbought() -> f64 {
    70.0
}
fn default_level_lookback() -> usize {
    30
}
fn default_volume_lookback() -> usize {
    10
}
fn default_volume_shock_high() -> f64 {
    1.5
}
fn default_volume_shock_low() -> f64 {
    0.7
}
fn default_pe_band() -> (f64, f64) {
    (8.0, 25.0)
}
fn default_pe_expensive() -> f64 {
    35.0
}
fn default_min_dividend_yield() -> f64 {
    1.0
}
fn default_news_clamp() -> i32 {
    2
}
fn default_breakout_entry() -> f64 {
    1.005
}
fn default_breakout_stop() -> f64 {
    0.98
}
fn default_bounce_entry() -> f64 {
    1.01
}
fn default_bounce_stop() -> f64 {
    0.985
}
fn default_target_multiples() -> (f64, f64) {
    (1.5, 2.5)
}
fn default_store_key() -> String {
    "picks:daily-report".into()
}
fn default_browser_max_age() -> u64 {
    15 * 60
}
fn default_shared_max_age() -> u64 {
    60 * 60
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 4440);
        assert_eq!(config.picks.markets, vec!["NSE", "NASDAQ"]);
        assert_eq!(config.picks.export_cap, 20);
        assert_eq!(config.picks.news_top_n, 1);
        assert_eq!(config.picks.refresh_interval_hours, 24);
        assert_eq!(config.picks.upstream.session_ttl_secs, 1800);
        assert_eq!(config.picks.upstream.quote_chunk_size, 15);
        assert_eq!(config.picks.upstream.history_chunk_size, 8);
        assert_eq!(config.picks.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"server": {{"port": 5000}}, "picks": {{"markets": ["BSE"], "scoring": {{"rsi_period": 10}}}}}}"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.picks.markets, vec!["BSE"]);
        assert_eq!(config.picks.scoring.rsi_period, 10);
        assert_eq!(config.picks.scoring.sma_fast, 50);
        assert_eq!(config.picks.export_cap, 20);
    }

    #[test]
    fn test_invalid_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_parse_market_list() {
        assert_eq!(parse_market_list(" nse, nasdaq ,,LSE"), vec!["NSE", "NASDAQ", "LSE"]);
        assert!(parse_market_list(" , ").is_empty());
    }

    #[test]
    fn test_cache_control_header() {
        let cc = CacheControlConfig::default();
        assert_eq!(cc.header_value(), "public, max-age=900, s-maxage=3600");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.picks.scoring, config.picks.scoring);
        assert_eq!(parsed.picks.news.positive_keywords, config.picks.news.positive_keywords);
    }
}
