use crate::application::{RegistryConfig, RequestRouter};
use crate::domain::entities::{EndpointSpec, RoutingRule};
use crate::domain::errors::RegistryError;
use crate::infrastructure::circuit_breaker::CircuitBreakerConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    // Gateway listener
    pub listen_addr: String,
    pub debug: bool,

    // Admin API
    pub admin_enabled: bool,
    pub admin_listen_addr: String,

    // Health checks
    pub health_interval_secs: u64,
    pub health_timeout_secs: u64,

    // Circuit breaker defaults
    pub breaker_threshold: u32,
    pub breaker_cooldown_secs: u64,

    // Response cache
    pub cache_max_entries: Option<usize>,

    // Services and routes installed at startup
    pub routes_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            debug: false,
            admin_enabled: true,
            admin_listen_addr: "0.0.0.0:8081".to_string(),
            health_interval_secs: 10,
            health_timeout_secs: 5,
            breaker_threshold: 5,
            breaker_cooldown_secs: 60,
            cache_max_entries: None,
            routes_path: None,
        }
    }
}

impl Config {
    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            breaker: CircuitBreakerConfig {
                failure_threshold: self.breaker_threshold,
                cooldown: Duration::from_secs(self.breaker_cooldown_secs),
            },
            health_check_timeout: Duration::from_secs(self.health_timeout_secs),
        }
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub fn load_config() -> anyhow::Result<Config> {
    Ok(load_config_from(|key| std::env::var(key).ok())?)
}

/// Build a [`Config`] from an arbitrary variable lookup.
pub fn load_config_from<F>(lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = Config::default();
    let flag = |key: &str, default: bool| {
        lookup(key)
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(default)
    };

    let listen_addr = lookup("GATEWAY_LISTEN_ADDR").unwrap_or(defaults.listen_addr);

    let debug = lookup("DEBUG").is_some() || lookup("GATEWAY_DEBUG").is_some();

    let admin_enabled = flag("GATEWAY_ADMIN_ENABLED", defaults.admin_enabled);

    let admin_listen_addr =
        lookup("GATEWAY_ADMIN_LISTEN_ADDR").unwrap_or(defaults.admin_listen_addr);

    let health_interval_secs = lookup("GATEWAY_HEALTH_INTERVAL_SECS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.health_interval_secs);

    let health_timeout_secs = lookup("GATEWAY_HEALTH_TIMEOUT_SECS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.health_timeout_secs);

    let breaker_threshold = lookup("GATEWAY_BREAKER_THRESHOLD")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.breaker_threshold);

    let breaker_cooldown_secs = lookup("GATEWAY_BREAKER_COOLDOWN_SECS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.breaker_cooldown_secs);

    let cache_max_entries = lookup("GATEWAY_CACHE_MAX_ENTRIES").and_then(|v| v.parse().ok());

    let routes_path = lookup("GATEWAY_ROUTES_PATH").filter(|p| !p.is_empty());

    if health_interval_secs == 0 {
        return Err(ConfigError::Invalid(
            "GATEWAY_HEALTH_INTERVAL_SECS must be positive".into(),
        ));
    }
    if breaker_threshold == 0 {
        return Err(ConfigError::Invalid(
            "GATEWAY_BREAKER_THRESHOLD must be positive".into(),
        ));
    }

    Ok(Config {
        listen_addr,
        debug,
        admin_enabled,
        admin_listen_addr,
        health_interval_secs,
        health_timeout_secs,
        breaker_threshold,
        breaker_cooldown_secs,
        cache_max_entries,
        routes_path,
    })
}

/// One service and its endpoints in a routes file.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceDefinition {
    pub name: String,
    #[serde(default)]
    pub endpoints: Vec<EndpointSpec>,
}

/// Services and routing rules installed at startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutesFile {
    #[serde(default)]
    pub services: Vec<ServiceDefinition>,
    #[serde(default)]
    pub routes: Vec<RoutingRule>,
}

impl RoutesFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Register every endpoint and install every rule. Stops at the first
    /// rejected endpoint.
    pub fn install(self, router: &RequestRouter) -> Result<(), ConfigError> {
        for service in self.services {
            for spec in service.endpoints {
                router.registry().register_service(&service.name, spec)?;
            }
        }
        for rule in self.routes {
            router.add_route(rule);
        }
        Ok(())
    }
}
