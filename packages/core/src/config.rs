use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::Cli;
use crate::services::bilibili::DEFAULT_API_URL;

/// Process settings, read from the environment (and `.env`) with CLI
/// overrides on top.
///
/// | variable                | default                    |
/// |-------------------------|----------------------------|
/// | `DATA_DIR`              | `data`                     |
/// | `BIND_ADDR`             | `127.0.0.1`                |
/// | `PORT`                  | `8000`                     |
/// | `BILIBILI_API_URL`      | `https://api.bilibili.com` |
/// | `FETCH_TIMEOUT_SECONDS` | `10`                       |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub bind_addr: String,
    pub port: u16,
    pub api_url: String,
    pub fetch_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup("DATA_DIR").unwrap_or_else(|| "data".to_string());
        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string());
        let api_url = lookup("BILIBILI_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let port = match lookup("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| format!("PORT must be a valid port number, got {:?}", raw))?,
            None => 8000,
        };

        let fetch_timeout_seconds = match lookup("FETCH_TIMEOUT_SECONDS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| {
                    format!("FETCH_TIMEOUT_SECONDS must be a positive number, got {:?}", raw)
                })?,
            None => 10,
        };

        Ok(Self {
            data_dir: PathBuf::from(data_dir),
            bind_addr,
            port,
            api_url,
            fetch_timeout: Duration::from_secs(fetch_timeout_seconds),
        })
    }

    /// Command-line flags win over the environment.
    pub fn apply_cli(mut self, cli: &Cli) -> Self {
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(data_dir) = &cli.data_dir {
            self.data_dir = data_dir.clone();
        }
        if let Some(api_url) = &cli.api_url {
            self.api_url = api_url.clone();
        }
        self
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}
