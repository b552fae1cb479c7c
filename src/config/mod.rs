//! Configuration module
//!
//! A single [`Config`] is built once at startup (defaults, then an optional
//! YAML file, then CLI/env overrides applied by the binary) and handed to
//! every component. Nothing reads configuration from globals.

use crate::{Error, Result};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use url::Url;

/// Default IP echo endpoint, answers `{"origin": "<caller ip>"}`
pub const DEFAULT_ECHO_URL: &str = "https://httpbin.org/ip";

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Forward proxy URL; empty means direct connections
    pub proxy: String,

    /// Static self-identification label reported in the status record
    pub isp: String,

    /// Listening port of the status API
    pub port: u16,

    /// Bind address of the status API
    pub bind_address: String,

    /// Seconds between self-checks
    pub refresh_interval: u64,

    /// Per-request timeout of the outbound client, in seconds
    pub request_timeout: u64,

    /// IP echo endpoint probed by the refresh loop
    pub echo_url: String,

    /// Upper bound on domain checks in flight at once
    pub max_concurrent_checks: usize,

    /// Log level
    pub log_level: String,
}

impl Config {
    /// Load configuration from file
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        Self::from_str(&content)
    }

    /// Load from string
    ///
    /// Only the YAML shape is checked here; [`Config::validate`] runs once
    /// CLI/env overrides have been layered on top.
    pub fn from_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval == 0 {
            return Err(Error::config("refresh-interval must be greater than zero"));
        }

        if self.request_timeout == 0 {
            return Err(Error::config("request-timeout must be greater than zero"));
        }

        if self.max_concurrent_checks == 0 {
            return Err(Error::config("max-concurrent-checks must be greater than zero"));
        }

        Url::parse(&self.echo_url)
            .map_err(|e| Error::config(format!("invalid echo-url {:?}: {}", self.echo_url, e)))?;

        if let Some(proxy) = self.proxy_url() {
            Url::parse(proxy)
                .map_err(|e| Error::config(format!("invalid proxy URL {:?}: {}", proxy, e)))?;
        }

        self.listen_addr()?;

        Ok(())
    }

    /// Proxy URL, or `None` for direct connections
    pub fn proxy_url(&self) -> Option<&str> {
        let proxy = self.proxy.trim();
        if proxy.is_empty() {
            None
        } else {
            Some(proxy)
        }
    }

    /// Socket address the status API listens on
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|_| Error::config(format!("invalid bind-address {:?}", self.bind_address)))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            proxy: String::new(),
            isp: "-".to_string(),
            port: 8080,
            bind_address: "0.0.0.0".to_string(),
            refresh_interval: 60,
            request_timeout: 10,
            echo_url: DEFAULT_ECHO_URL.to_string(),
            max_concurrent_checks: 64,
            log_level: "info".to_string(),
        }
    }
}
