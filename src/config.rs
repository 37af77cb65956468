use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::AppError;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_LIST_LIMIT: i64 = 1000;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq)]
pub enum DetectorConfig {
    /// Remote inference service base URL.
    Remote(String),
    /// Local ONNX model file.
    Local(PathBuf),
    None,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub max_connections: u32,
    pub list_limit: i64,
    pub max_upload_bytes: usize,
    pub detector: DetectorConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| AppError::Config("DATABASE_URL is not set".to_string()))?;

        let bind_addr: SocketAddr = parse_or(&lookup, "BIND_ADDR", DEFAULT_BIND_ADDR.parse().ok())?;
        let max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", Some(DEFAULT_MAX_CONNECTIONS))?;
        let list_limit: i64 = parse_or(&lookup, "LIST_LIMIT", Some(DEFAULT_LIST_LIMIT))?;
        if list_limit <= 0 {
            return Err(AppError::Config("LIST_LIMIT must be positive".to_string()));
        }
        let max_upload_bytes = parse_or(&lookup, "MAX_UPLOAD_BYTES", Some(DEFAULT_MAX_UPLOAD_BYTES))?;

        let detector = match (
            lookup("DETECTOR_MODEL").filter(|v| !v.is_empty()),
            lookup("DETECTOR_URL").filter(|v| !v.is_empty()),
        ) {
            (Some(path), _) => DetectorConfig::Local(PathBuf::from(path)),
            (None, Some(url)) => DetectorConfig::Remote(url),
            (None, None) => DetectorConfig::None,
        };

        Ok(Self {
            database_url,
            bind_addr,
            max_connections,
            list_limit,
            max_upload_bytes,
            detector,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: Option<T>) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value: {}", key, raw))),
        None => default.ok_or_else(|| AppError::Config(format!("{} is not set", key))),
    }
}
