use crate::constants;
use crate::error::Result;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Runtime configuration for the service.
///
/// Tuning knobs come from an optional `config.toml`; secrets and deploy-time
/// settings come from the environment on top of it. The sub-structs are handed
/// to the outbound clients at construction so that nothing reads the process
/// environment at call time.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ticketmaster: TicketmasterConfig,
    pub geocoder: GeocoderConfig,
    pub ingest: IngestConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TicketmasterConfig {
    /// Discovery API key; `TICKETMASTER_API_KEY` in the environment.
    pub api_key: String,
    pub base_url: String,
    pub page_size: u32,
    pub fetch_attempts: u32,
    pub retry_delay_ms: u64,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub base_url: String,
    /// Nominatim requires an identifying User-Agent.
    pub user_agent: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub max_pages: u32,
    pub normalize_concurrency: usize,
    pub backfill_weeks: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for TicketmasterConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: constants::DEFAULT_TICKETMASTER_BASE_URL.to_string(),
            page_size: constants::DEFAULT_PAGE_SIZE,
            fetch_attempts: constants::DEFAULT_FETCH_ATTEMPTS,
            retry_delay_ms: constants::DEFAULT_RETRY_DELAY_MS,
            timeout_seconds: 30,
        }
    }
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: constants::DEFAULT_NOMINATIM_BASE_URL.to_string(),
            user_agent: format!("gigmap/{}", env!("CARGO_PKG_VERSION")),
            timeout_seconds: 10,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_pages: constants::DEFAULT_MAX_PAGES,
            normalize_concurrency: constants::DEFAULT_NORMALIZE_CONCURRENCY,
            backfill_weeks: constants::BACKFILL_WEEKS,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: constants::DEFAULT_SERVER_PORT,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ticketmaster: TicketmasterConfig::default(),
            geocoder: GeocoderConfig::default(),
            ingest: IngestConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration: `config.toml` when present, environment on top.
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = match fs::read_to_string(path) {
            Ok(raw) => toml::from_str(&raw)?,
            Err(_) => Config::default(),
        };

        if let Ok(key) = env::var("TICKETMASTER_API_KEY") {
            config.ticketmaster.api_key = key;
        }
        if let Ok(port) = env::var("PORT") {
            if let Ok(port) = port.parse() {
                config.server.port = port;
            }
        }

        Ok(config)
    }
}
