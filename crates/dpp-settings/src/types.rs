//! Settings types.
//!
//! Every section deserializes with `#[serde(default)]`, so a settings file
//! only needs to name the values it changes.

use dpp_core::{BackoffConfig, LogFormat};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Contract the relay watches when none is configured.
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x59B649856d8c5Fb6991d30a345f0b923eA91a3f7";

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// HTTP / WebSocket listener.
    pub server: ServerSettings,
    /// Ledger JSON-RPC endpoint.
    pub ledger: LedgerSettings,
    /// Poll loop timing.
    pub poller: PollerSettings,
    /// Shutdown behaviour.
    pub shutdown: ShutdownSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Reject combinations the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poller.poll_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "poller.pollIntervalMs must be greater than zero".into(),
            ));
        }
        if self.poller.backoff_base_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "poller.backoffBaseMs must be greater than zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.poller.jitter_factor) {
            return Err(SettingsError::InvalidValue(format!(
                "poller.jitterFactor must be within 0.0..=1.0, got {}",
                self.poller.jitter_factor
            )));
        }
        if self.poller.failure_alert_threshold == 0 {
            return Err(SettingsError::InvalidValue(
                "poller.failureAlertThreshold must be greater than zero".into(),
            ));
        }
        if self.ledger.request_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "ledger.requestTimeoutMs must be greater than zero".into(),
            ));
        }
        if self.poller.backoff_max_ms < self.poller.backoff_base_ms {
            return Err(SettingsError::InvalidValue(format!(
                "poller.backoffMaxMs ({}) is below poller.backoffBaseMs ({})",
                self.poller.backoff_max_ms, self.poller.backoff_base_ms
            )));
        }
        if self.ledger.rpc_url.trim().is_empty() {
            return Err(SettingsError::InvalidValue("ledger.rpcUrl is empty".into()));
        }
        if !is_hex_address(&self.ledger.contract_address) {
            return Err(SettingsError::InvalidValue(format!(
                "ledger.contractAddress is not a 20-byte hex address: {}",
                self.ledger.contract_address
            )));
        }
        if self.server.client_buffer_size == 0 {
            return Err(SettingsError::InvalidValue(
                "server.clientBufferSize must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn is_hex_address(value: &str) -> bool {
    let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) else {
        return false;
    };
    hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit())
}

/// Listener and client fan-out settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listening port.
    pub port: u16,
    /// Outbound message queue length per connected client.
    pub client_buffer_size: usize,
    /// Consecutive failed pushes before a client is dropped from the registry.
    pub max_send_failures: u32,
    /// Add hash, attestor, timestamp and block number to broadcast payloads.
    pub include_event_details: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 10_000,
            client_buffer_size: 256,
            max_send_failures: 1,
            include_event_details: false,
        }
    }
}

/// Ledger endpoint settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LedgerSettings {
    /// Ethereum JSON-RPC URL.
    pub rpc_url: String,
    /// Address of the registry contract emitting `PanelEventAdded`.
    pub contract_address: String,
    /// Upper bound on a single ledger request.
    pub request_timeout_ms: u64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            contract_address: DEFAULT_CONTRACT_ADDRESS.to_string(),
            request_timeout_ms: 15_000,
        }
    }
}

/// Poll loop settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollerSettings {
    /// Delay between healthy poll iterations.
    pub poll_interval_ms: u64,
    /// First delay after a failed iteration.
    pub backoff_base_ms: u64,
    /// Cap on the failure delay.
    pub backoff_max_ms: u64,
    /// Jitter fraction applied to failure delays.
    pub jitter_factor: f64,
    /// Consecutive failures before the poller reports itself degraded.
    pub failure_alert_threshold: u32,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10_000,
            backoff_base_ms: dpp_core::retry::DEFAULT_BASE_DELAY_MS,
            backoff_max_ms: dpp_core::retry::DEFAULT_MAX_DELAY_MS,
            jitter_factor: dpp_core::retry::DEFAULT_JITTER_FACTOR,
            failure_alert_threshold: 5,
        }
    }
}

impl PollerSettings {
    /// Backoff parameters for the poll loop.
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            base_delay_ms: self.backoff_base_ms,
            max_delay_ms: self.backoff_max_ms,
            jitter_factor: self.jitter_factor,
        }
    }
}

/// Shutdown settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShutdownSettings {
    /// How long in-flight work may run after the shutdown signal.
    pub grace_period_ms: u64,
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            grace_period_ms: 10_000,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive (`"info"`, `"dpp_server=debug"`, ...).
    pub level: String,
    /// Line format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
