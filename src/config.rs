use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub index: IndexSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub rewrite: RewriteSettings,
    #[serde(default)]
    pub feed: FeedSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub workers: Option<usize>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
        }
    }
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Dimension D shared by listing and preference vectors
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_cache_size")]
    pub cache_size: u64,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            api_key: String::new(),
            model: default_embedding_model(),
            dimensions: default_dimensions(),
            timeout_secs: default_embedding_timeout(),
            cache_size: default_cache_size(),
            cache_ttl_secs: default_cache_ttl(),
        }
    }
}

impl EmbeddingSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_openai_base_url() -> String { "https://api.openai.com/v1".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_dimensions() -> usize { 1536 }
fn default_embedding_timeout() -> u64 { 10 }
fn default_cache_size() -> u64 { 10_000 }
fn default_cache_ttl() -> u64 { 3600 }

#[derive(Debug, Clone, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            api_key: String::new(),
            model: default_llm_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl LlmSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_llm_model() -> String { "gpt-4o-mini".to_string() }
fn default_max_tokens() -> u32 { 600 }
fn default_temperature() -> f32 { 0.4 }
fn default_llm_timeout() -> u64 { 30 }

#[derive(Debug, Clone, Deserialize)]
pub struct IndexSettings {
    /// Must stay the same for the lifetime of the stored vectors
    #[serde(default = "default_metric")]
    pub metric: String,
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            metric: default_metric(),
            min_similarity: default_min_similarity(),
        }
    }
}

fn default_metric() -> String { "cosine".to_string() }
fn default_min_similarity() -> f32 { 0.2 }

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSettings {
    #[serde(default = "default_limit")]
    pub default_limit: u16,
    #[serde(default = "default_max_limit")]
    pub max_limit: u16,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

fn default_limit() -> u16 { 5 }
fn default_max_limit() -> u16 { 25 }

#[derive(Debug, Clone, Deserialize)]
pub struct RewriteSettings {
    /// Simultaneous per-listing rewrites within one request
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default = "default_max_repairs")]
    pub max_repairs: u32,
    #[serde(default = "default_price_tolerance")]
    pub price_tolerance: f64,
    #[serde(default = "default_area_tolerance")]
    pub area_tolerance: f64,
}

impl Default for RewriteSettings {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            max_repairs: default_max_repairs(),
            price_tolerance: default_price_tolerance(),
            area_tolerance: default_area_tolerance(),
        }
    }
}

fn default_parallelism() -> usize { 4 }
fn default_max_repairs() -> u32 { 1 }
fn default_price_tolerance() -> f64 { 0.01 }
fn default_area_tolerance() -> f64 { 0.02 }

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FeedSettings {
    /// JSON file of listings loaded at startup
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with HOMEMATCH__)
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., HOMEMATCH__SERVER__PORT -> server.port
            .add_source(
                Environment::with_prefix("HOMEMATCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings = substitute_env_vars(settings)?;

        settings.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("HOMEMATCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}

/// Fill provider credentials from the conventional OPENAI_API_KEY variable
/// unless they were set explicitly
fn substitute_env_vars(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    let Ok(api_key) = env::var("OPENAI_API_KEY") else {
        return Ok(settings);
    };

    let has_llm_key = settings
        .get_string("llm.api_key")
        .map(|k| !k.is_empty())
        .unwrap_or(false);
    let has_embedding_key = settings
        .get_string("embedding.api_key")
        .map(|k| !k.is_empty())
        .unwrap_or(false);

    let mut builder = Config::builder().add_source(settings);
    if !has_llm_key {
        builder = builder.set_override("llm.api_key", api_key.clone())?;
    }
    if !has_embedding_key {
        builder = builder.set_override("embedding.api_key", api_key)?;
    }

    builder.build()
}
