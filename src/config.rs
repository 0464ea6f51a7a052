//! Harvest configuration
//!
//! Loaded from TOML. Every field has a default so an empty file (or no file)
//! describes a complete run against the public CC-MAIN-2021-31 PDF corpus.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pipeline::retry::RetryPolicy;

pub const DEFAULT_BASE_URL: &str =
    "https://digitalcorpora.s3.amazonaws.com/corpora/files/CC-MAIN-2021-31-PDF-UNTRUNCATED/";
pub const DEFAULT_TOTAL_ARCHIVES: u32 = 7933;
pub const DEFAULT_USER_AGENT: &str = concat!("pdfharvest/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvestConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub text: TextConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where archives come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Archives are numbered `0..total_archives`.
    #[serde(default = "default_total_archives")]
    pub total_archives: u32,
    /// Entry-name suffix selecting documents inside an archive (case-insensitive).
    #[serde(default = "default_entry_suffix")]
    pub entry_suffix: String,
    /// Issue one request against the store before starting.
    #[serde(default = "default_true")]
    pub probe: bool,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_total_archives() -> u32 {
    DEFAULT_TOTAL_ARCHIVES
}

fn default_entry_suffix() -> String {
    ".pdf".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            total_archives: default_total_archives(),
            entry_suffix: default_entry_suffix(),
            probe: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Stop scheduling downloads once this many documents are accepted.
    #[serde(default = "default_target_count")]
    pub target_count: usize,
    #[serde(default = "default_min_tokens")]
    pub min_tokens: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    /// Texts of at most this many characters are not language-classified.
    #[serde(default = "default_min_language_chars")]
    pub min_language_chars: usize,
}

fn default_target_count() -> usize {
    50_000
}

fn default_min_tokens() -> usize {
    1_500
}

fn default_max_tokens() -> usize {
    50_000
}

fn default_min_language_chars() -> usize {
    50
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            target_count: default_target_count(),
            min_tokens: default_min_tokens(),
            max_tokens: default_max_tokens(),
            min_language_chars: default_min_language_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Simultaneous archive downloads.
    #[serde(default = "default_downloads")]
    pub downloads: usize,
    /// Simultaneous archive processors; defaults to the number of cores.
    #[serde(default = "default_processors")]
    pub processors: usize,
    /// Capacity of the queues between stages.
    #[serde(default = "default_queue")]
    pub queue: usize,
}

fn default_downloads() -> usize {
    16
}

fn default_processors() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_queue() -> usize {
    32
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            downloads: default_downloads(),
            processors: default_processors(),
            queue: default_queue(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts)
            .base_delay(Duration::from_millis(self.base_delay_ms))
            .multiplier(self.backoff_multiplier)
            .max_delay(Duration::from_millis(self.max_delay_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    #[serde(default = "default_output")]
    pub output: PathBuf,
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("temp_zip_processing")
}

fn default_output() -> PathBuf {
    PathBuf::from("data/collected_pdf_texts.json")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            output: default_output(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Flush the ledger after this many newly accepted documents; 0 disables checkpoints.
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,
    /// Skip entries already in the ledger before decoding them.
    #[serde(default = "default_true")]
    pub skip_known: bool,
}

fn default_checkpoint_every() -> usize {
    1_000
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            checkpoint_every: default_checkpoint_every(),
            skip_known: true,
        }
    }
}

/// How entry bytes become text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Text,
}

/// The token counting scheme. One scheme is used for the whole corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TokenizerConfig {
    /// Byte-pair encoding with an embedded OpenAI vocabulary.
    Tiktoken {
        #[serde(default)]
        encoding: BpeEncoding,
    },
    #[serde(rename = "huggingface")]
    HuggingFace { path: PathBuf },
    Whitespace,
}

/// Vocabularies available to [`TokenizerConfig::Tiktoken`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BpeEncoding {
    #[default]
    #[serde(rename = "cl100k_base")]
    Cl100kBase,
    #[serde(rename = "p50k_base")]
    P50kBase,
}

impl BpeEncoding {
    pub fn name(self) -> &'static str {
        match self {
            Self::Cl100kBase => "cl100k_base",
            Self::P50kBase => "p50k_base",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextConfig {
    #[serde(default = "default_format")]
    pub format: DocumentFormat,
    #[serde(default = "default_tokenizer")]
    pub tokenizer: TokenizerConfig,
}

fn default_format() -> DocumentFormat {
    DocumentFormat::Pdf
}

fn default_tokenizer() -> TokenizerConfig {
    TokenizerConfig::Tiktoken {
        encoding: BpeEncoding::Cl100kBase,
    }
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            tokenizer: default_tokenizer(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default = "default_log_level")]
    pub level: LogLevel,
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            level: default_log_level(),
        }
    }
}

impl HarvestConfig {
    /// Load and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(vec![format!(
                "failed to read config file '{}': {e}",
                path.display()
            )])
        })?;
        let config = Self::from_toml(&content).map_err(|e| match e {
            Error::Config(mut errors) => {
                errors.insert(0, format!("in '{}':", path.display()));
                Error::Config(errors)
            }
            other => other,
        })?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: HarvestConfig =
            toml::from_str(content).map_err(|e| Error::Config(vec![e.to_string()]))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(vec![e.to_string()]))
    }

    /// Check every field, reporting all problems at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        match reqwest::Url::parse(&self.source.base_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(format!(
                "source.base_url must be http or https, got scheme '{}'",
                url.scheme()
            )),
            Err(e) => errors.push(format!("source.base_url is not a valid URL: {e}")),
        }
        if self.source.total_archives == 0 {
            errors.push("source.total_archives must be positive".to_string());
        }
        if self.source.entry_suffix.trim().is_empty() {
            errors.push("source.entry_suffix must not be empty".to_string());
        }

        if self.limits.target_count == 0 {
            errors.push("limits.target_count must be positive".to_string());
        }
        if self.limits.min_tokens > self.limits.max_tokens {
            errors.push(format!(
                "limits.min_tokens ({}) must not exceed limits.max_tokens ({})",
                self.limits.min_tokens, self.limits.max_tokens
            ));
        }

        if self.concurrency.downloads == 0 {
            errors.push("concurrency.downloads must be positive".to_string());
        }
        if self.concurrency.processors == 0 {
            errors.push("concurrency.processors must be positive".to_string());
        }
        if self.concurrency.queue == 0 {
            errors.push("concurrency.queue must be positive".to_string());
        }

        if self.fetch.max_attempts == 0 {
            errors.push("fetch.max_attempts must be positive".to_string());
        }
        if self.fetch.timeout_secs == 0 {
            errors.push("fetch.timeout_secs must be positive".to_string());
        }
        if !self.fetch.backoff_multiplier.is_finite() || self.fetch.backoff_multiplier < 1.0 {
            errors.push("fetch.backoff_multiplier must be a finite number >= 1.0".to_string());
        }
        if self.fetch.base_delay_ms > self.fetch.max_delay_ms {
            errors.push("fetch.base_delay_ms must not exceed fetch.max_delay_ms".to_string());
        }

        if self.paths.output.as_os_str().is_empty() {
            errors.push("paths.output must not be empty".to_string());
        }
        if self.paths.staging_dir.as_os_str().is_empty() {
            errors.push("paths.staging_dir must not be empty".to_string());
        }

        if let TokenizerConfig::HuggingFace { path } = &self.text.tokenizer {
            if path.as_os_str().is_empty() {
                errors.push("text.tokenizer.path must not be empty".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(errors))
        }
    }
}
