// =============================================================================
// FitPulse Social Fitness Backend - Configuration
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend
// License: Apache 2.0 / MIT
//
// Description:
//   Server configuration loaded from a TOML file (FITPULSE_CONFIG) merged
//   with FITPULSE_-prefixed environment variables. Environment variables
//   win over file values.
//
// =============================================================================

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};

use crate::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Basic server configuration
    #[serde(default = "default_address")]
    pub address: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,

    // Database configuration
    pub database_url: String,
    #[serde(default)]
    pub db_pool_max_connections: Option<u32>,

    // Cross-instance transport; absent means single-instance mode
    #[serde(default)]
    pub redis_url: Option<String>,

    // Token validation
    pub jwt_secret: String,

    // Logging
    #[serde(default = "default_log")]
    pub log: String,

    // Pagination
    #[serde(default = "default_page_limit")]
    pub default_page_limit: u32,
    #[serde(default = "default_max_page_limit")]
    pub max_page_limit: u32,

    // Cache TTLs: the latest page goes stale on every send, old pages are
    // effectively immutable
    #[serde(default = "default_first_page_ttl")]
    pub first_page_ttl_secs: u64,
    #[serde(default = "default_deep_page_ttl")]
    pub deep_page_ttl_secs: u64,
    #[serde(default = "default_roster_ttl")]
    pub roster_ttl_secs: u64,

    // How many pages the invalidation sweep covers per container
    #[serde(default = "default_sweep_pages")]
    pub invalidation_sweep_pages: u32,
}

fn default_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8008
}

fn default_log() -> String {
    "info".to_owned()
}

fn default_page_limit() -> u32 {
    50
}

fn default_max_page_limit() -> u32 {
    100
}

fn default_first_page_ttl() -> u64 {
    30
}

fn default_deep_page_ttl() -> u64 {
    3600
}

fn default_roster_ttl() -> u64 {
    30
}

fn default_sweep_pages() -> u32 {
    10
}

impl Config {
    /// Load configuration from the file named by FITPULSE_CONFIG (when set)
    /// merged with FITPULSE_* environment variables.
    pub fn load() -> Result<Self> {
        let mut figment = Figment::new();
        if let Ok(path) = std::env::var("FITPULSE_CONFIG") {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed("FITPULSE_").global())
            .extract()
            .map_err(|e| Error::BadConfig(e.to_string()))
    }
}
