use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_BIND_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080);
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// None disables keepalive pings
    pub ping_interval: Option<Duration>,
    /// Serve the protocol reference page on `/`
    pub info_page: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR,
            ping_interval: Some(Duration::from_secs(DEFAULT_PING_INTERVAL_SECS)),
            info_page: true,
        }
    }
}

impl Config {
    /// Read `SIGNAL_*` variables from the process environment.
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bind_addr = parse_var(&lookup, "SIGNAL_BIND_ADDR", &DEFAULT_BIND_ADDR.to_string(), |raw| {
            raw.parse::<SocketAddr>().map_err(|e| e.to_string())
        })?;

        let ping_secs = parse_var(
            &lookup,
            "SIGNAL_PING_INTERVAL_SECS",
            &DEFAULT_PING_INTERVAL_SECS.to_string(),
            |raw| raw.parse::<u64>().map_err(|e| e.to_string()),
        )?;

        let info_page = parse_var(&lookup, "SIGNAL_INFO_PAGE", "true", parse_bool)?;

        Ok(Self {
            bind_addr,
            ping_interval: (ping_secs > 0).then(|| Duration::from_secs(ping_secs)),
            info_page,
        })
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
    parse: impl Fn(&str) -> std::result::Result<T, String>,
) -> Result<T> {
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    parse(raw.trim()).map_err(|reason| Error::Config { key, reason })
}

fn parse_bool(raw: &str) -> std::result::Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("expected a boolean, got {other:?}")),
    }
}
