// src/config.rs

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::connecteam_client::{ConnecteamConfig, CONNECTEAM_API_BASE_URL, DEFAULT_TIMEOUT_SECS};
use crate::error::AppError;
use crate::supabase_store::SupabaseConfig;

const DEFAULT_SYNC_INTERVAL_SECS: u64 = 4 * 60 * 60;

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    3000
}

fn default_connecteam_base_url() -> String {
    CONNECTEAM_API_BASE_URL.to_string()
}

fn default_http_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_sync_interval_secs() -> u64 {
    DEFAULT_SYNC_INTERVAL_SECS
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // Server
    #[serde(default = "default_server_host")]
    pub server_host: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,

    // Store
    pub supabase_url: Option<String>,
    pub supabase_service_key: Option<String>,
    /// Keep everything in process memory instead of the hosted store.
    #[serde(default)]
    pub use_memory_store: bool,

    // Connecteam
    pub connecteam_api_key: Option<String>,
    #[serde(default = "default_connecteam_base_url")]
    pub connecteam_base_url: String,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// 0 turns the background sync off.
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenv::dotenv().ok();
        envy::from_env::<Config>()
    }

    pub fn from_pairs<I>(pairs: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter(pairs)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn supabase_config(&self) -> Result<SupabaseConfig, AppError> {
        let url = non_empty(&self.supabase_url)
            .ok_or_else(|| AppError::MissingEnvVar("SUPABASE_URL".into()))?;
        let service_key = non_empty(&self.supabase_service_key)
            .ok_or_else(|| AppError::MissingEnvVar("SUPABASE_SERVICE_KEY".into()))?;
        Ok(SupabaseConfig {
            url: url.to_string(),
            service_key: service_key.to_string(),
            timeout_secs: self.http_timeout_secs,
        })
    }

    pub fn connecteam_config(&self) -> ConnecteamConfig {
        ConnecteamConfig {
            api_key: non_empty(&self.connecteam_api_key).map(str::to_string),
            base_url: self.connecteam_base_url.clone(),
            timeout_secs: self.http_timeout_secs,
        }
    }

    /// Both paths, or none. Only one of the two is a configuration error.
    pub fn tls_paths(&self) -> Result<Option<(PathBuf, PathBuf)>, AppError> {
        match (&self.cert_path, &self.key_path) {
            (Some(cert), Some(key)) => Ok(Some((cert.clone(), key.clone()))),
            (None, None) => Ok(None),
            (Some(_), None) => Err(AppError::MissingEnvVar("KEY_PATH".into())),
            (None, Some(_)) => Err(AppError::MissingEnvVar("CERT_PATH".into())),
        }
    }

    pub fn sync_interval(&self) -> Option<Duration> {
        (self.sync_interval_secs > 0).then(|| Duration::from_secs(self.sync_interval_secs))
    }
}
