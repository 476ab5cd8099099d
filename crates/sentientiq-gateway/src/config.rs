//! Gateway configuration

use anyhow::Result;
use sentientiq_behavior::SessionConfig;
use sentientiq_intervention::EngineConfig;
use sentientiq_memory::VolatilityConfig;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::dispatcher::DispatcherConfig;

/// Gateway service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Service host
    pub host: String,
    /// Service port
    pub port: u16,
    /// Session store settings
    pub session: SessionSettings,
    /// Periodic task settings
    pub tasks: TaskSettings,
    /// Real-time channel settings
    pub channel: ChannelSettings,
    /// Persistence settings
    pub persistence: PersistenceSettings,
    /// Intervention action settings
    pub actions: ActionSettings,
    /// JSON rule catalog replacing the built-in rules
    pub rules_path: Option<String>,
    /// Emit JSON log lines
    pub log_json: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            session: SessionSettings::default(),
            tasks: TaskSettings::default(),
            channel: ChannelSettings::default(),
            persistence: PersistenceSettings::default(),
            actions: ActionSettings::default(),
            rules_path: None,
            log_json: false,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from `.env` and the environment
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut cfg = Self::default();

        // Platform-assigned PORT wins over the prefixed variable
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(p) = port.parse::<u16>() {
                cfg.port = p;
            }
        }
        if let Ok(host) = std::env::var("SENTIENTIQ_HOST") {
            cfg.host = host;
        }
        if std::env::var("PORT").is_err() {
            env_override("SENTIENTIQ_PORT", &mut cfg.port);
        }

        env_override("SENTIENTIQ_SESSION_TTL_SECS", &mut cfg.session.ttl_secs);
        env_override("SENTIENTIQ_HISTORY_CAP", &mut cfg.session.history_cap);
        env_override("SENTIENTIQ_SWEEP_INTERVAL_SECS", &mut cfg.tasks.sweep_interval_secs);
        env_override("SENTIENTIQ_EVI_INTERVAL_SECS", &mut cfg.tasks.evi_interval_secs);
        env_override("SENTIENTIQ_HEARTBEAT_SECS", &mut cfg.channel.heartbeat_secs);
        env_override("SENTIENTIQ_QUEUE_CAPACITY", &mut cfg.persistence.queue_capacity);
        env_override("SENTIENTIQ_WEBHOOK_TIMEOUT_SECS", &mut cfg.actions.webhook_timeout_secs);
        env_override("SENTIENTIQ_LOG_JSON", &mut cfg.log_json);

        if let Ok(path) = std::env::var("SENTIENTIQ_RULES_PATH") {
            cfg.rules_path = Some(path).filter(|p| !p.is_empty());
        }
        if let Ok(url) = std::env::var("SENTIENTIQ_PERSISTENCE_URL") {
            cfg.persistence.url = Some(url).filter(|u| !u.is_empty());
        }
        if let Ok(key) = std::env::var("SENTIENTIQ_PERSISTENCE_KEY") {
            cfg.persistence.api_key = Some(key).filter(|k| !k.is_empty());
        }

        if cfg.session.history_cap == 0 {
            anyhow::bail!("SENTIENTIQ_HISTORY_CAP must be at least 1");
        }
        if cfg.persistence.queue_capacity == 0 {
            anyhow::bail!("SENTIENTIQ_QUEUE_CAPACITY must be at least 1");
        }

        Ok(cfg)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            history_cap: self.session.history_cap,
            ttl_ms: self.session.ttl_secs.saturating_mul(1_000) as i64,
            ..SessionConfig::default()
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
    }

    pub fn volatility_config(&self) -> VolatilityConfig {
        VolatilityConfig::default()
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            heartbeat: Duration::from_secs(self.channel.heartbeat_secs.max(1)),
            outbound_buffer: self.channel.outbound_buffer,
            ..DispatcherConfig::default()
        }
    }
}

fn env_override<T: FromStr>(key: &str, target: &mut T) {
    if let Ok(val) = std::env::var(key) {
        if let Ok(v) = val.trim().parse() {
            *target = v;
        }
    }
}

/// Session store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Inactivity before a session is evicted
    pub ttl_secs: u64,
    /// Diagnoses retained per session
    pub history_cap: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl_secs: (sentientiq_common::SESSION_TTL_MS / 1_000) as u64,
            history_cap: sentientiq_common::MAX_SESSION_HISTORY,
        }
    }
}

/// Periodic task intervals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSettings {
    pub sweep_interval_secs: u64,
    pub evi_interval_secs: u64,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 300,
            evi_interval_secs: 60,
        }
    }
}

impl TaskSettings {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn evi_interval(&self) -> Duration {
        Duration::from_secs(self.evi_interval_secs.max(1))
    }
}

/// Real-time channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Server ping interval
    pub heartbeat_secs: u64,
    /// Per-connection outbound buffer
    pub outbound_buffer: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            heartbeat_secs: 30,
            outbound_buffer: 64,
        }
    }
}

/// Persistence gateway settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceSettings {
    /// REST endpoint; the in-memory gateway is used when unset
    pub url: Option<String>,
    pub api_key: Option<String>,
    /// Bounded write queue length
    pub queue_capacity: usize,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            queue_capacity: 1024,
        }
    }
}

/// Intervention action settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSettings {
    /// Upper bound on one webhook request
    pub webhook_timeout_secs: u64,
}

impl Default for ActionSettings {
    fn default() -> Self {
        Self { webhook_timeout_secs: 5 }
    }
}

impl ActionSettings {
    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs.max(1))
    }
}
