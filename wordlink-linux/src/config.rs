//! Load config from file and environment.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Daemon configuration. File: ~/.config/wordlink/config.toml or /etc/wordlink/config.toml.
/// Env overrides: WORDLINK_LISTEN_PORT, WORDLINK_DATA_DIR, WORDLINK_LOG.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Inbound listener TCP port (default 45690).
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Where the address book is kept.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Name reported to peers and shown in invitations.
    #[serde(default = "default_device_name")]
    pub device_name: String,
    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,
    #[serde(default = "default_io_timeout_secs")]
    pub io_timeout_secs: u64,
    #[serde(default = "default_resend_interval_secs")]
    pub resend_interval_secs: u64,
    /// tracing filter directive, e.g. "info" or "wordlink_linux=debug".
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Devices this host may talk to, the TCP stand-in for the radio's bonded list.
    #[serde(default)]
    pub paired: Vec<PairedPeer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PairedPeer {
    pub name: String,
    /// host:port of the peer's listener.
    pub address: String,
}

fn default_listen_port() -> u16 {
    45690
}
fn default_data_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(h) => PathBuf::from(h).join(".local/share/wordlink"),
        None => PathBuf::from("/var/lib/wordlink"),
    }
}
fn default_device_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "wordlink".to_owned())
}
fn default_ping_timeout_secs() -> u64 {
    5
}
fn default_io_timeout_secs() -> u64 {
    10
}
fn default_resend_interval_secs() -> u64 {
    5
}
fn default_log_level() -> String {
    "info".to_owned()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            data_dir: default_data_dir(),
            device_name: default_device_name(),
            ping_timeout_secs: default_ping_timeout_secs(),
            io_timeout_secs: default_io_timeout_secs(),
            resend_interval_secs: default_resend_interval_secs(),
            log_level: default_log_level(),
            paired: Vec::new(),
        }
    }
}

impl Config {
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs.max(1))
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs.max(1))
    }

    pub fn resend_interval(&self) -> Duration {
        Duration::from_secs(self.resend_interval_secs.max(1))
    }

    pub fn address_file(&self) -> PathBuf {
        self.data_dir.join("addresses.bin")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Load config: merge default, then config file (explicit path or the first one present), then env vars.
pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let mut c = match explicit {
        Some(p) => load_file(p)?,
        None => match config_paths().into_iter().find(|p| p.exists()) {
            Some(p) => load_file(&p)?,
            None => Config::default(),
        },
    };
    apply_env(&mut c, |k| std::env::var(k).ok());
    Ok(c)
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("WORDLINK_LISTEN_PORT") {
        if let Ok(p) = s.parse::<u16>() {
            c.listen_port = p;
        }
    }
    if let Some(s) = var("WORDLINK_DATA_DIR") {
        c.data_dir = PathBuf::from(s);
    }
    if let Some(s) = var("WORDLINK_LOG") {
        c.log_level = s;
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/wordlink/config.toml"));
    }
    out.push(PathBuf::from("/etc/wordlink/config.toml"));
    out
}

fn load_file(path: &Path) -> Result<Config, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_owned(),
        source,
    })?;
    toml::from_str::<Config>(&s).map_err(|source| ConfigError::Parse {
        path: path.to_owned(),
        source,
    })
}
