use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;

/// Placeholder JWT secrets that must not reach production.
pub const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

const DEFAULT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub token_ttl_days: i64,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let port = match get("PARLOR_PORT") {
            Some(v) => v.parse().with_context(|| format!("PARLOR_PORT is not a port: {}", v))?,
            None => 8888,
        };
        let token_ttl_days = match get("PARLOR_TOKEN_TTL_DAYS") {
            Some(v) => v
                .parse()
                .with_context(|| format!("PARLOR_TOKEN_TTL_DAYS is not a number: {}", v))?,
            None => 7,
        };

        Ok(Self {
            jwt_secret: get("PARLOR_JWT_SECRET")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SECRET.into()),
            db_path: get("PARLOR_DB_PATH").unwrap_or_else(|| "parlor.db".into()).into(),
            host: get("PARLOR_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            token_ttl_days,
        })
    }

    pub fn uses_placeholder_secret(&self) -> bool {
        PLACEHOLDER_SECRETS.contains(&self.jwt_secret.as_str())
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}
