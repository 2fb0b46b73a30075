use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::routes::origin_policy::OriginPolicy;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Regex an Origin header must match to open a connection
    #[serde(default = "default_cors_origin_pattern")]
    pub cors_origin_pattern: String,

    /// Comma separated HTTP methods allowed for cross-origin requests
    #[serde(default = "default_cors_methods")]
    pub cors_methods: String,

    /// Frames queued per connection before it is dropped as too slow
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// Decoded events waiting for the hub before sockets are made to wait
    #[serde(default = "default_inbound_buffer")]
    pub inbound_buffer: usize,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        match Self::from_vars(std::env::vars()) {
            Ok(config) => {
                info!("✅ Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("❌ Failed to load configuration: {}", e);
                Err(e)
            }
        }
    }

    /// Build a configuration from explicit `(NAME, value)` pairs.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Ok(envy::from_iter::<_, Config>(vars)?)
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn origin_policy(&self) -> Result<OriginPolicy, ConfigError> {
        OriginPolicy::new(&self.cors_origin_pattern, &self.cors_methods)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin_pattern: default_cors_origin_pattern(),
            cors_methods: default_cors_methods(),
            outbound_buffer: default_outbound_buffer(),
            inbound_buffer: default_inbound_buffer(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvError(#[from] envy::Error),

    #[error("Invalid origin pattern '{pattern}': {source}")]
    OriginPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid HTTP method '{0}'")]
    Method(String),
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

pub(crate) fn default_cors_origin_pattern() -> String {
    r"^http://localhost:\d+$".to_string()
}

pub(crate) fn default_cors_methods() -> String {
    "GET,POST".to_string()
}

fn default_outbound_buffer() -> usize {
    256
}

fn default_inbound_buffer() -> usize {
    1024
}
