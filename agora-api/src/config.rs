use serde::Deserialize;
use std::{
    fmt::{Debug, Formatter},
    net::{IpAddr, SocketAddr},
};
use thiserror::Error;
use tracing::debug;

/// Process configuration, read from the environment and an optional `.env` file.
#[derive(Clone, Eq, PartialEq, Hash, Deserialize)]
pub struct Env {
    pub server_address: IpAddr,
    pub server_port: u16,
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,
    #[serde(default = "default_connect_attempts")]
    pub database_connect_attempts: u32,
    pub jwt_secret: String,
    #[serde(default)]
    pub cookie_secure: bool,
    /// Browser origins allowed to call the API with credentials. Empty disables CORS.
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

fn default_max_connections() -> u32 {
    10
}

fn default_connect_attempts() -> u32 {
    5
}

impl Env {
    /// Loads `.env` if present, then reads the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Err(err) = dotenvy::dotenv() {
            if err.not_found() {
                debug!("No .env file found");
            } else {
                return Err(err.into());
            }
        }

        Self::from_vars(std::env::vars())
    }

    pub fn from_vars(
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, ConfigError> {
        let env: Self = envy::from_iter(vars)?;

        if env.jwt_secret.is_empty() {
            return Err(ConfigError::EmptyJwtSecret);
        }

        Ok(env)
    }

    #[must_use]
    pub fn socket_address(&self) -> SocketAddr {
        SocketAddr::new(self.server_address, self.server_port)
    }
}

impl Debug for Env {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Env")
            .field("server_address", &self.server_address)
            .field("server_port", &self.server_port)
            .field("database_url", &"[redacted]")
            .field("database_max_connections", &self.database_max_connections)
            .field("database_connect_attempts", &self.database_connect_attempts)
            .field("jwt_secret", &"[redacted]")
            .field("cookie_secure", &self.cookie_secure)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("JWT_SECRET must not be empty")]
    EmptyJwtSecret,
}
