//! Configuration: TOML file, then environment overrides, then validation.
//!
//! Every section is optional; an empty file (or no file at the default
//! path) yields the built-in defaults, which describe the standard
//! legal/technical/training deployment with corpus identifiers left blank.
//!
//! ```toml
//! [platform]
//! provider = "vertex"
//! project_id = "acme-rag"
//! region = "us-central1"
//!
//! [[collections]]
//! name = "legal"
//! prefix = "legal/"
//! corpus = "projects/acme-rag/locations/us-central1/ragCorpora/123"
//! description = "Legal documents corpus"
//!
//! [ingest]
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [retrieval]
//! top_k = 5
//! ```
//!
//! Environment variables are applied on top of the file so container
//! deployments can be configured without one; see [`apply_env_overrides`].

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use rag_relay_core::models::Collection;
use rag_relay_core::remote::{ChunkingParams, GenerationParams};
use rag_relay_core::retry::RetryPolicy;

/// Path used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "./config/relay.toml";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default = "default_collections")]
    pub collections: Vec<Collection>,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            platform: PlatformConfig::default(),
            collections: default_collections(),
            ingest: IngestConfig::default(),
            retrieval: RetrievalConfig::default(),
            generation: GenerationConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlatformConfig {
    /// `"vertex"` or `"memory"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Overrides `https://{region}-aiplatform.googleapis.com/v1`.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Environment variable holding the OAuth bearer token.
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_operation_poll_ms")]
    pub operation_poll_ms: u64,
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            project_id: String::new(),
            region: default_region(),
            endpoint: None,
            access_token_env: default_access_token_env(),
            timeout_secs: default_timeout_secs(),
            operation_poll_ms: default_operation_poll_ms(),
            operation_timeout_secs: default_operation_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "vertex".to_string()
}
fn default_region() -> String {
    "us-central1".to_string()
}
fn default_access_token_env() -> String {
    "GOOGLE_OAUTH_ACCESS_TOKEN".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_operation_poll_ms() -> u64 {
    2000
}
fn default_operation_timeout_secs() -> u64 {
    600
}

fn default_collections() -> Vec<Collection> {
    [
        ("legal", "Legal documents corpus"),
        ("technical", "Technical documents corpus"),
        ("training", "Training documents corpus"),
    ]
    .iter()
    .map(|(name, description)| Collection {
        name: name.to_string(),
        prefix: format!("{}/", name),
        corpus: String::new(),
        description: description.to_string(),
    })
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Bucket the ingestor expects events from. Informational only.
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl IngestConfig {
    pub fn chunking(&self) -> ChunkingParams {
        ChunkingParams {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    4000
}
fn default_max_delay_ms() -> u64 {
    10_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Maximum vector distance of returned passages.
    #[serde(default)]
    pub similarity_threshold: Option<f64>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            similarity_threshold: None,
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_generation_top_k")]
    pub top_k: u32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        let params = GenerationParams::default();
        Self {
            model: default_model(),
            temperature: params.temperature,
            top_p: params.top_p,
            top_k: params.top_k,
            max_output_tokens: params.max_output_tokens,
        }
    }
}

impl GenerationConfig {
    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            max_output_tokens: self.max_output_tokens,
        }
    }
}

fn default_model() -> String {
    "gemini-1.5-pro".to_string()
}
fn default_temperature() -> f32 {
    GenerationParams::default().temperature
}
fn default_top_p() -> f32 {
    GenerationParams::default().top_p
}
fn default_generation_top_k() -> u32 {
    GenerationParams::default().top_k
}
fn default_max_output_tokens() -> u32 {
    GenerationParams::default().max_output_tokens
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_ingestor_bind")]
    pub ingestor_bind: String,
    #[serde(default = "default_agent_bind")]
    pub agent_bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ingestor_bind: default_ingestor_bind(),
            agent_bind: default_agent_bind(),
        }
    }
}

fn default_ingestor_bind() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_agent_bind() -> String {
    "0.0.0.0:8081".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `"pretty"` or `"json"`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

/// Loads configuration from `path` (or defaults), applies the process
/// environment, and validates the result.
///
/// A missing file is an error unless `path` is [`DEFAULT_CONFIG_PATH`].
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str::<Config>(&content).with_context(|| "Failed to parse config file")?
    } else if path == Path::new(DEFAULT_CONFIG_PATH) {
        Config::default()
    } else {
        bail!("Config file not found: {}", path.display());
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

/// Applies environment overrides using `lookup` to read variables.
///
/// | Variable | Field |
/// |----------|-------|
/// | `GCP_PROJECT_ID` | `platform.project_id` |
/// | `GCP_REGION` | `platform.region` |
/// | `{NAME}_CORPUS_NAME` | `corpus` of the collection called `name` |
/// | `DOCUMENTS_BUCKET` | `ingest.bucket` |
/// | `CHUNK_SIZE`, `CHUNK_OVERLAP` | `ingest.chunk_size`, `ingest.chunk_overlap` |
/// | `GEMINI_MODEL` | `generation.model` |
/// | `TOP_K_CHUNKS` | `retrieval.top_k` |
/// | `SIMILARITY_THRESHOLD` | `retrieval.similarity_threshold` |
/// | `PORT` | both bind addresses, as `0.0.0.0:{PORT}` |
/// | `LOG_LEVEL` | `logging.level` |
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("GCP_PROJECT_ID") {
        config.platform.project_id = v;
    }
    if let Some(v) = get("GCP_REGION") {
        config.platform.region = v;
    }
    for collection in &mut config.collections {
        let key = format!("{}_CORPUS_NAME", env_key(&collection.name));
        if let Some(v) = get(&key) {
            collection.corpus = v;
        }
    }
    if let Some(v) = get("DOCUMENTS_BUCKET") {
        config.ingest.bucket = Some(v);
    }
    if let Some(v) = get("CHUNK_SIZE") {
        config.ingest.chunk_size = parse_env("CHUNK_SIZE", &v)?;
    }
    if let Some(v) = get("CHUNK_OVERLAP") {
        config.ingest.chunk_overlap = parse_env("CHUNK_OVERLAP", &v)?;
    }
    if let Some(v) = get("GEMINI_MODEL") {
        config.generation.model = v;
    }
    if let Some(v) = get("TOP_K_CHUNKS") {
        config.retrieval.top_k = parse_env("TOP_K_CHUNKS", &v)?;
    }
    if let Some(v) = get("SIMILARITY_THRESHOLD") {
        config.retrieval.similarity_threshold = Some(parse_env("SIMILARITY_THRESHOLD", &v)?);
    }
    if let Some(v) = get("PORT") {
        let port: u16 = parse_env("PORT", &v)?;
        config.server.ingestor_bind = format!("0.0.0.0:{}", port);
        config.server.agent_bind = format!("0.0.0.0:{}", port);
    }
    if let Some(v) = get("LOG_LEVEL") {
        config.logging.level = v.to_lowercase();
    }

    Ok(())
}

fn env_key(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{} has an invalid value: '{}'", key, value))
}

pub fn validate(config: &Config) -> Result<()> {
    match config.platform.provider.as_str() {
        "vertex" => {
            if config.platform.project_id.trim().is_empty() {
                bail!("platform.project_id (or GCP_PROJECT_ID) is required for the vertex provider");
            }
        }
        "memory" => {}
        other => bail!(
            "Unknown platform provider: '{}'. Must be vertex or memory.",
            other
        ),
    }

    if config.ingest.chunk_size == 0 {
        bail!("ingest.chunk_size must be > 0");
    }
    if config.ingest.chunk_overlap >= config.ingest.chunk_size {
        bail!("ingest.chunk_overlap must be smaller than ingest.chunk_size");
    }
    if config.ingest.max_attempts == 0 {
        bail!("ingest.max_attempts must be >= 1");
    }

    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }

    if !(0.0..=2.0).contains(&config.generation.temperature) {
        bail!("generation.temperature must be in [0.0, 2.0]");
    }
    if !(config.generation.top_p > 0.0 && config.generation.top_p <= 1.0) {
        bail!("generation.top_p must be in (0.0, 1.0]");
    }
    if config.generation.max_output_tokens == 0 {
        bail!("generation.max_output_tokens must be > 0");
    }

    let mut names = HashSet::new();
    let mut prefixes = HashSet::new();
    for c in &config.collections {
        if c.name.trim().is_empty() {
            bail!("collection names must not be empty");
        }
        if c.prefix.is_empty() {
            bail!("collection '{}' has an empty prefix", c.name);
        }
        if !names.insert(c.name.as_str()) {
            bail!("duplicate collection name: '{}'", c.name);
        }
        if !prefixes.insert(c.prefix.as_str()) {
            bail!("duplicate collection prefix: '{}'", c.prefix);
        }
    }

    match config.logging.format.as_str() {
        "pretty" | "json" => {}
        other => bail!("Unknown logging.format: '{}'. Must be pretty or json.", other),
    }

    Ok(())
}
