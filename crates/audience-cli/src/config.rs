use audience_core::config::CacheType;
use audience_core::{EngineConfig, SegmentError, SegmentResult};
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{info, warn};

#[derive(Deserialize, Debug, Clone)]
pub struct Environment {
    #[serde(default = "default_env_type")]
    pub env_type: String,
}

impl Default for Environment {
    fn default() -> Self {
        Self { env_type: default_env_type() }
    }
}

/// CLI configuration: the environment section plus every engine section.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct AudienceConfig {
    #[serde(default)]
    pub environment: Environment,
    #[serde(flatten)]
    pub engine: EngineConfig,
}

impl AudienceConfig {
    /// Loads the file named by `AUDIENCE_CONFIG_PATH` (default `audience.toml`).
    pub fn load() -> SegmentResult<Self> {
        let config_path =
            std::env::var("AUDIENCE_CONFIG_PATH").unwrap_or_else(|_| "audience.toml".to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Loads `path`, using defaults when the file does not exist.
    pub fn load_from(path: &Path) -> SegmentResult<Self> {
        match fs::read_to_string(path) {
            Ok(raw) => Self::from_toml_str(&raw),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(
                    "Configuration file '{}' not found. Using default configuration.",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(e) => Err(SegmentError::configuration(format!(
                "unable to read '{}': {e}",
                path.display()
            ))),
        }
    }

    pub fn from_toml_str(raw: &str) -> SegmentResult<Self> {
        toml::from_str(raw)
            .map_err(|e| SegmentError::configuration(format!("invalid configuration: {e}")))
    }

    /// Applies `AUDIENCE_*` environment variable overrides.
    pub fn apply_profile(self) -> Self {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from `lookup`. Unparseable values are logged and ignored.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        info!(
            "Applying configuration profile for '{}' environment.",
            self.environment.env_type
        );

        let caching = &mut self.engine.caching;
        if let Some(cache_type) = lookup("AUDIENCE_CACHE_TYPE") {
            match cache_type.as_str() {
                "in_memory" => caching.cache_type = CacheType::InMemory,
                "redis" => caching.cache_type = CacheType::Redis,
                other => warn!("Ignoring unknown AUDIENCE_CACHE_TYPE '{}'", other),
            }
        }
        if let Some(redis_url) = lookup("AUDIENCE_REDIS_URL") {
            caching.redis_url = Some(redis_url);
        }
        if let Some(ttl) = lookup("AUDIENCE_CACHE_TTL_SECONDS") {
            match ttl.parse::<u64>() {
                Ok(ttl) => caching.default_ttl_seconds = ttl,
                Err(_) => warn!("Ignoring invalid AUDIENCE_CACHE_TTL_SECONDS '{}'", ttl),
            }
        }

        if let Some(interval) = lookup("AUDIENCE_REFRESH_INTERVAL_SECONDS") {
            match interval.parse::<u64>() {
                Ok(interval) => self.engine.registry.refresh_interval_seconds = interval,
                Err(_) => {
                    warn!("Ignoring invalid AUDIENCE_REFRESH_INTERVAL_SECONDS '{}'", interval)
                }
            }
        }
        if let Some(parallel) = lookup("AUDIENCE_PARALLEL_INTERSECTION") {
            match parallel.parse::<bool>() {
                Ok(parallel) => self.engine.intersection.parallel = parallel,
                Err(_) => warn!("Ignoring invalid AUDIENCE_PARALLEL_INTERSECTION '{}'", parallel),
            }
        }

        self
    }
}

fn default_env_type() -> String {
    "default".to_string()
}
