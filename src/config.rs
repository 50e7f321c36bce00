use std::{env, fmt::Display, net::SocketAddr, path::PathBuf, str::FromStr};

use thiserror::Error;

use crate::constants::DEFAULT_PAGE_SIZE;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable {0} is required")]
    Missing(String),

    #[error("Invalid {key} value: {info}")]
    Invalid { key: String, info: String },
}

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub secret_key: String,
    pub bind_addr: SocketAddr,
    pub media_root: PathBuf,
    pub media_url: String,
    pub page_size: i64,
    pub token_ttl_hours: i64,
    pub shopping_cart_file: String,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut media_url: String = try_load(&lookup, "MEDIA_URL", "/media/")?;
        if !media_url.ends_with('/') {
            media_url.push('/');
        }

        Ok(Self {
            database_url: require(&lookup, "DATABASE_URL")?,
            database_max_connections: try_load(&lookup, "DATABASE_MAX_CONNECTIONS", "5")?,
            secret_key: require(&lookup, "SECRET_KEY")?,
            bind_addr: try_load(&lookup, "BIND_ADDR", "0.0.0.0:8000")?,
            media_root: try_load(&lookup, "MEDIA_ROOT", "media")?,
            media_url,
            page_size: try_load(&lookup, "PAGE_SIZE", &DEFAULT_PAGE_SIZE.to_string())?,
            token_ttl_hours: try_load(&lookup, "TOKEN_TTL_HOURS", "24")?,
            shopping_cart_file: try_load(&lookup, "SHOPPING_CART_FILE", "shopping_list.txt")?,
        })
    }
}

fn require<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ConfigError::Missing(key.to_string()))
}

fn try_load<F, T>(lookup: &F, key: &str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    lookup(key)
        .unwrap_or_else(|| {
            log::info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .trim()
        .parse()
        .map_err(|e: T::Err| {
            log::warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key: key.to_string(),
                info: e.to_string(),
            }
        })
}
