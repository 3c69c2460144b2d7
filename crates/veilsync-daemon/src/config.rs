//! Daemon configuration loaded from environment variables.
//!
//! Every setting has a default so the daemon can start with zero
//! configuration against a local Tor client.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use veilsync_net::TransportConfig;
use veilsync_shared::constants::DEFAULT_POW_WORKERS;
use veilsync_store::Database;

use crate::communicator::SyncSettings;

/// Highest exchange difficulty accepted. Each extra hex digit multiplies the
/// expected work by 16.
pub const MAX_EXCHANGE_POW: usize = 6;

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Directory holding the key file, database and block files.
    /// Env: `VEILSYNC_DATA_DIR`
    /// Default: platform data directory, else `./data`
    pub data_dir: PathBuf,

    /// SOCKS5 proxy for `.onion` addresses.
    /// Env: `VEILSYNC_TOR_PROXY`
    /// Default: `socks5h://127.0.0.1:9050`
    pub tor_proxy: String,

    /// HTTP proxy for `.b32.i2p` addresses. I2P peers are unreachable without it.
    /// Env: `VEILSYNC_I2P_PROXY`
    pub i2p_proxy: Option<String>,

    /// Env: `VEILSYNC_TICK_MS`
    /// Default: 1000
    pub tick: Duration,

    /// Peer exchange runs every this many ticks.
    /// Env: `VEILSYNC_PEX_EVERY`
    /// Default: 10
    pub pex_every: u64,

    /// Reconciliation and download run every this many ticks.
    /// Env: `VEILSYNC_SYNC_EVERY`
    /// Default: 5
    pub sync_every: u64,

    /// Failure counters decay every this many ticks.
    /// Env: `VEILSYNC_DECAY_EVERY`
    /// Default: 30
    pub decay_every: u64,

    /// Addresses contacted per peer exchange round.
    /// Env: `VEILSYNC_PEX_SAMPLE`
    /// Default: 5
    pub pex_sample: usize,

    /// Session failures at which an address is skipped until decayed.
    /// Env: `VEILSYNC_FAILURE_CEILING`
    /// Default: 5
    pub failure_ceiling: u32,

    /// Env: `VEILSYNC_CONNECT_TIMEOUT_SECS`
    /// Default: 15
    pub connect_timeout: Duration,

    /// Env: `VEILSYNC_REQUEST_TIMEOUT_SECS`
    /// Default: 30
    pub request_timeout: Duration,

    /// Proof-of-work difficulty attached to key exchange, 0 disables it.
    /// A round that outlasts the request timeout is abandoned.
    /// Env: `VEILSYNC_EXCHANGE_POW` (at most [`MAX_EXCHANGE_POW`])
    pub exchange_pow: usize,

    /// Env: `VEILSYNC_POW_WORKERS`
    /// Default: 3
    pub pow_workers: usize,

    /// Seed addresses added on startup.
    /// Env: `VEILSYNC_BOOTSTRAP` (comma-separated)
    pub bootstrap: Vec<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let transport = TransportConfig::default();
        Self {
            data_dir: Database::default_data_dir().unwrap_or_else(|_| PathBuf::from("./data")),
            tor_proxy: transport.tor_proxy,
            i2p_proxy: None,
            tick: Duration::from_millis(1000),
            pex_every: 10,
            sync_every: 5,
            decay_every: 30,
            pex_sample: 5,
            failure_ceiling: 5,
            connect_timeout: transport.connect_timeout,
            request_timeout: transport.request_timeout,
            exchange_pow: 0,
            pow_workers: DEFAULT_POW_WORKERS,
            bootstrap: Vec::new(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup. Invalid values are logged and
    /// the default is kept.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = lookup("VEILSYNC_DATA_DIR").filter(|v| !v.is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(proxy) = lookup("VEILSYNC_TOR_PROXY").filter(|v| !v.is_empty()) {
            config.tor_proxy = proxy;
        }
        config.i2p_proxy = lookup("VEILSYNC_I2P_PROXY").filter(|v| !v.is_empty());

        if let Some(ms) = parse_positive::<u64>(&lookup, "VEILSYNC_TICK_MS") {
            config.tick = Duration::from_millis(ms);
        }
        if let Some(n) = parse_positive(&lookup, "VEILSYNC_PEX_EVERY") {
            config.pex_every = n;
        }
        if let Some(n) = parse_positive(&lookup, "VEILSYNC_SYNC_EVERY") {
            config.sync_every = n;
        }
        if let Some(n) = parse_positive(&lookup, "VEILSYNC_DECAY_EVERY") {
            config.decay_every = n;
        }
        if let Some(n) = parse_positive(&lookup, "VEILSYNC_PEX_SAMPLE") {
            config.pex_sample = n;
        }
        if let Some(n) = parse_positive(&lookup, "VEILSYNC_FAILURE_CEILING") {
            config.failure_ceiling = n;
        }
        if let Some(secs) = parse_positive(&lookup, "VEILSYNC_CONNECT_TIMEOUT_SECS") {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_positive(&lookup, "VEILSYNC_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parse_var::<usize>(&lookup, "VEILSYNC_EXCHANGE_POW") {
            if n <= MAX_EXCHANGE_POW {
                config.exchange_pow = n;
            } else {
                tracing::warn!(value = n, "VEILSYNC_EXCHANGE_POW too high, using default");
            }
        }
        if let Some(n) = parse_positive(&lookup, "VEILSYNC_POW_WORKERS") {
            config.pow_workers = n;
        }
        if let Some(seeds) = lookup("VEILSYNC_BOOTSTRAP") {
            config.bootstrap = seeds
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        if config.connect_timeout >= config.request_timeout {
            let clamped = config.request_timeout / 2;
            tracing::warn!(
                connect_timeout = ?config.connect_timeout,
                request_timeout = ?config.request_timeout,
                clamped = ?clamped,
                "Connect timeout must be shorter than request timeout, clamping"
            );
            config.connect_timeout = clamped;
        }

        config
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            tor_proxy: self.tor_proxy.clone(),
            i2p_proxy: self.i2p_proxy.clone(),
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
        }
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            tick: self.tick,
            pex_every: self.pex_every,
            sync_every: self.sync_every,
            decay_every: self.decay_every,
            pex_sample: self.pex_sample,
            failure_ceiling: self.failure_ceiling,
            exchange_pow: self.exchange_pow,
            pow_workers: self.pow_workers,
            pow_timeout: self.request_timeout,
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}

fn parse_positive<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr + Default + PartialEq,
{
    let value = parse_var::<T>(lookup, key)?;
    if value == T::default() {
        tracing::warn!(key, "Value must be positive, using default");
        return None;
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> DaemonConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DaemonConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.tor_proxy, "socks5h://127.0.0.1:9050");
        assert_eq!(config.i2p_proxy, None);
        assert_eq!(config.tick, Duration::from_secs(1));
        assert_eq!(
            (config.pex_every, config.sync_every, config.decay_every),
            (10, 5, 30)
        );
        assert_eq!(config.pow_workers, DEFAULT_POW_WORKERS);
        assert_eq!(config.exchange_pow, 0);
        assert!(config.connect_timeout < config.request_timeout);
        assert!(config.bootstrap.is_empty());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("VEILSYNC_DATA_DIR", "/tmp/veil"),
            ("VEILSYNC_I2P_PROXY", "http://127.0.0.1:4444"),
            ("VEILSYNC_TICK_MS", "250"),
            ("VEILSYNC_SYNC_EVERY", "2"),
            ("VEILSYNC_EXCHANGE_POW", "3"),
            ("VEILSYNC_BOOTSTRAP", " a.onion , ,b.onion"),
        ]);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/veil"));
        assert_eq!(config.i2p_proxy.as_deref(), Some("http://127.0.0.1:4444"));
        assert_eq!(config.tick, Duration::from_millis(250));
        assert_eq!(config.sync_every, 2);
        assert_eq!(config.exchange_pow, 3);
        assert_eq!(config.bootstrap, vec!["a.onion", "b.onion"]);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = config_from(&[
            ("VEILSYNC_PEX_EVERY", "0"),
            ("VEILSYNC_DECAY_EVERY", "soon"),
            ("VEILSYNC_EXCHANGE_POW", "7"),
            ("VEILSYNC_POW_WORKERS", "-1"),
        ]);
        assert_eq!(config.pex_every, 10);
        assert_eq!(config.decay_every, 30);
        assert_eq!(config.exchange_pow, 0);
        assert_eq!(config.pow_workers, DEFAULT_POW_WORKERS);
    }

    #[test]
    fn test_exchange_pow_bounded() {
        let config = config_from(&[("VEILSYNC_EXCHANGE_POW", "64")]);
        assert_eq!(config.exchange_pow, 0);

        let config = config_from(&[
            ("VEILSYNC_EXCHANGE_POW", "6"),
            ("VEILSYNC_REQUEST_TIMEOUT_SECS", "12"),
        ]);
        assert_eq!(config.exchange_pow, MAX_EXCHANGE_POW);
        assert_eq!(config.sync_settings().pow_timeout, Duration::from_secs(12));
    }

    #[test]
    fn test_connect_timeout_clamped() {
        let config = config_from(&[
            ("VEILSYNC_CONNECT_TIMEOUT_SECS", "60"),
            ("VEILSYNC_REQUEST_TIMEOUT_SECS", "20"),
        ]);
        assert_eq!(config.request_timeout, Duration::from_secs(20));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));

        let settings = config.sync_settings();
        assert_eq!(settings.sync_every, config.sync_every);
        assert_eq!(config.transport_config().connect_timeout, Duration::from_secs(10));
    }
}
