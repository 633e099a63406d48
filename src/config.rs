use crate::directory::AccountSeed;
use crate::hub::HubConfig;
use crate::session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Origin allowed to make credentialed requests; permissive CORS when unset
    pub allowed_origin: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            allowed_origin: None,
        }
    }
}

/// Backing store for sessions and persistent grants
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    #[default]
    Memory,
    Redis {
        url: String,
        #[serde(default = "default_command_timeout_ms")]
        command_timeout_ms: u64,
    },
}

fn default_command_timeout_ms() -> u64 {
    500
}

/// Top-level application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub store: StoreConfig,
    pub hub: HubConfig,
    /// Accounts loaded into the in-memory directory
    pub accounts: Vec<AccountSeed>,
}

impl AppConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_addr.is_empty() {
            return Err("server.bind_addr must not be empty".to_string());
        }

        self.session.validate()?;
        self.hub.validate()?;

        if let StoreConfig::Redis {
            url,
            command_timeout_ms,
        } = &self.store
        {
            if url.is_empty() {
                return Err("store.url must not be empty".to_string());
            }
            if *command_timeout_ms == 0 {
                return Err("store.command_timeout_ms must be greater than zero".to_string());
            }
        }

        for account in &self.accounts {
            if account.id.is_empty() || account.username.is_empty() {
                return Err(format!(
                    "Account '{}' must have both an id and a username",
                    account.email
                ));
            }
            if account.username.contains('.') {
                return Err(format!(
                    "Username '{}' must not contain '.'",
                    account.username
                ));
            }
        }

        Ok(())
    }

    /// Apply `BIND_ADDR` and `REDIS_URL` on top of the file values
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            std::env::var("BIND_ADDR").ok(),
            std::env::var("REDIS_URL").ok(),
        );
    }

    fn apply_overrides(&mut self, bind_addr: Option<String>, redis_url: Option<String>) {
        if let Some(addr) = bind_addr {
            info!("Bind address overridden by environment: {}", addr);
            self.server.bind_addr = addr;
        }

        if let Some(url) = redis_url {
            info!("Session store overridden by environment: redis");
            let command_timeout_ms = match &self.store {
                StoreConfig::Redis {
                    command_timeout_ms, ..
                } => *command_timeout_ms,
                StoreConfig::Memory => default_command_timeout_ms(),
            };
            self.store = StoreConfig::Redis {
                url,
                command_timeout_ms,
            };
        }
    }
}

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Arc<AppConfig>, String> {
    let path = path.as_ref();
    info!("Loading configuration from: {}", path.display());

    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

    let mut config: AppConfig = serde_yaml::from_str(&contents)
        .map_err(|e| format!("Failed to parse YAML config: {}", e))?;

    config.apply_env_overrides();
    config.validate()?;

    info!(
        "Configuration loaded successfully with {} account(s)",
        config.accounts.len()
    );

    Ok(Arc::new(config))
}

/// Load configuration with fallback options
pub fn load_config_with_fallback() -> Result<Arc<AppConfig>, String> {
    if let Ok(config_path) = std::env::var("CONFIG_PATH") {
        match load_config(&config_path) {
            Ok(config) => return Ok(config),
            Err(e) => warn!(
                "Failed to load config from CONFIG_PATH ({}): {}",
                config_path, e
            ),
        }
    }

    let paths = ["config.yaml", "config.yml", "./config.yaml", "./config.yml"];

    for path in paths {
        if Path::new(path).exists() {
            match load_config(path) {
                Ok(config) => return Ok(config),
                Err(e) => warn!("Failed to load config from '{}': {}", path, e),
            }
        }
    }

    Err(
        "No configuration file found. Please create a config.yaml file or set CONFIG_PATH environment variable. \
        See config.example.yaml for an example configuration.".to_string()
    )
}

/// Defaults plus environment overrides, for running without a config file
pub fn default_config() -> Result<Arc<AppConfig>, String> {
    let mut config = AppConfig::default();
    config.apply_env_overrides();
    config.validate()?;
    Ok(Arc::new(config))
}
