use serde::Deserialize;
use std::path::Path;

fn default_return_raw_svc_port() -> bool {
    false
}

/// Process-wide configuration, loaded once at startup from a JSON file.
///
/// Unlike the teacher's TOML-based config, this is deliberately JSON with
/// `deny_unknown_fields`: the system this balancer front-ends already speaks
/// JSON everywhere else, and rejecting unknown keys catches config typos
/// before they reach production.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub beam_node_address: String,
    pub wallet_service_path: String,
    pub bbs_monitor_path: String,
    pub listen_address: String,
    pub service_public_address: String,
    pub database_path: String,
    pub push_contact_mail: String,

    pub wallet_service_first_port: u16,
    pub wallet_service_last_port: u16,
    #[serde(default)]
    pub wallet_service_cnt: Option<usize>,

    pub bbs_monitor_first_port: u16,
    pub bbs_monitor_last_port: u16,

    #[serde(default = "default_return_raw_svc_port")]
    pub return_raw_svc_port: bool,

    #[serde(default)]
    pub vapid_public: Option<String>,
    #[serde(default)]
    pub vapid_private: Option<String>,

    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default)]
    pub allowed_origin: Option<String>,

    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub noisy_logs: bool,

    #[serde(default)]
    pub endpoint_alive_timeout_ms: u64,
    #[serde(default)]
    pub service_launch_timeout_ms: u64,
    #[serde(default)]
    pub service_alive_timeout_ms: u64,
    #[serde(default)]
    pub service_heartbeat_timeout_ms: u64,
    #[serde(default)]
    pub activity_log_interval_ms: u64,
}

/// The SBBS monitor pool is always exactly one process; the field exists in
/// the config file purely for symmetry with `wallet_service_cnt` but its
/// value is ignored (clamped here so callers don't need to special-case it).
pub const BBS_MONITOR_CNT: usize = 1;

pub const PING_PERIOD_MS: u64 = 27_000;

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let mut cfg: Config = serde_json::from_str(&raw)?;
        cfg.apply_defaults();
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_defaults(&mut self) {
        if !self.debug {
            self.noisy_logs = false;
        }
        if self.endpoint_alive_timeout_ms == 0 {
            self.endpoint_alive_timeout_ms = PING_PERIOD_MS * 3 / 2;
        }
        if self.service_launch_timeout_ms == 0 {
            self.service_launch_timeout_ms = 10_000;
        }
        if self.service_alive_timeout_ms == 0 {
            self.service_alive_timeout_ms = 15_000;
        }
        if self.service_heartbeat_timeout_ms == 0 {
            self.service_heartbeat_timeout_ms = 11_000;
        }
        if self.activity_log_interval_ms == 0 {
            self.activity_log_interval_ms = if self.debug { 5_000 } else { 600_000 };
        }
        if self.wallet_service_cnt.is_none() {
            let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
            let n = if self.debug { 1 } else { cpus.saturating_sub(2).max(2) };
            self.wallet_service_cnt = Some(n);
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.wallet_service_last_port <= self.wallet_service_first_port {
            anyhow::bail!("wallet_service_last_port must be greater than wallet_service_first_port");
        }
        if self.bbs_monitor_last_port <= self.bbs_monitor_first_port {
            anyhow::bail!("bbs_monitor_last_port must be greater than bbs_monitor_first_port");
        }
        Ok(())
    }

    pub fn wallet_service_cnt(&self) -> usize {
        self.wallet_service_cnt.unwrap_or(2)
    }

    pub fn status_enabled(&self) -> bool {
        self.debug || self.api_secret.as_deref().is_some_and(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> &'static str {
        r#"{
            "beam_node_address": "127.0.0.1:10000",
            "wallet_service_path": "/bin/wallet-service",
            "bbs_monitor_path": "/bin/bbs-monitor",
            "listen_address": "0.0.0.0:8080",
            "service_public_address": "wallet.example",
            "database_path": "/var/lib/balancer/db",
            "push_contact_mail": "mailto:ops@example.com",
            "wallet_service_first_port": 20000,
            "wallet_service_last_port": 20100,
            "bbs_monitor_first_port": 21000,
            "bbs_monitor_last_port": 21010
        }"#
    }

    #[test]
    fn rejects_unknown_fields() {
        let bad = minimal_json().replace('}', r#","bogus_field":1}"#);
        let err: Result<Config, _> = serde_json::from_str(&bad);
        assert!(err.is_err());
    }

    #[test]
    fn fills_in_duration_defaults() {
        let mut cfg: Config = serde_json::from_str(minimal_json()).unwrap();
        cfg.apply_defaults();
        assert_eq!(cfg.service_launch_timeout_ms, 10_000);
        assert_eq!(cfg.service_alive_timeout_ms, 15_000);
        assert_eq!(cfg.service_heartbeat_timeout_ms, 11_000);
        assert_eq!(cfg.activity_log_interval_ms, 600_000);
    }

    #[test]
    fn debug_forces_noisy_logs_off_when_unset_and_clamps_activity_log() {
        let mut cfg: Config = serde_json::from_str(minimal_json()).unwrap();
        cfg.debug = true;
        cfg.apply_defaults();
        assert_eq!(cfg.activity_log_interval_ms, 5_000);
        assert_eq!(cfg.wallet_service_cnt(), 1);
    }
}
