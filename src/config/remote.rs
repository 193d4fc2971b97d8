//! Remote configuration client descriptor.
//!
//! Only the settings are resolved here; polling the agent belongs to the
//! remote-config client that consumes this descriptor.

use std::sync::LazyLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::env::EnvSource;
use crate::config::validation::{log_parse_error, log_unexpected_value};

pub const AGENT_URL_ENV_VAR: &str = "DD_TRACE_AGENT_URL";
pub const AGENT_HOST_ENV_VAR: &str = "DD_AGENT_HOST";
pub const AGENT_PORT_ENV_VAR: &str = "DD_TRACE_AGENT_PORT";
pub const POLL_INTERVAL_ENV_VAR: &str = "DD_REMOTE_CONFIG_POLL_INTERVAL_SECONDS";
pub const SERVICE_ENV_VAR: &str = "DD_SERVICE";
pub const ENV_ENV_VAR: &str = "DD_ENV";
pub const VERSION_ENV_VAR: &str = "DD_VERSION";

const DEFAULT_AGENT_HOST: &str = "localhost";
const DEFAULT_AGENT_PORT: u16 = 8126;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Remote-config products AppSec subscribes to.
pub const APPSEC_PRODUCTS: [&str; 4] = ["ASM_FEATURES", "ASM_DD", "ASM", "ASM_DATA"];

/// Capabilities advertised to the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    AsmActivation,
    AsmIpBlocking,
    AsmDdRules,
    AsmExclusions,
    AsmRequestBlocking,
    AsmUserBlocking,
    AsmCustomRules,
    AsmCustomBlockingResponse,
}

impl Capability {
    /// Bit index used by the remote-config protocol.
    pub fn bit(self) -> u8 {
        match self {
            Capability::AsmActivation => 1,
            Capability::AsmIpBlocking => 2,
            Capability::AsmDdRules => 3,
            Capability::AsmExclusions => 4,
            Capability::AsmRequestBlocking => 5,
            Capability::AsmUserBlocking => 7,
            Capability::AsmCustomRules => 8,
            Capability::AsmCustomBlockingResponse => 9,
        }
    }
}

/// Settings for the remote configuration client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub agent_url: Url,
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,
    pub service_name: Option<String>,
    pub env: Option<String>,
    pub app_version: Option<String>,
    pub tracer_version: String,
    pub products: Vec<String>,
    pub capabilities: Vec<Capability>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            agent_url: DEFAULT_AGENT_URL.clone(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            service_name: None,
            env: None,
            app_version: None,
            tracer_version: env!("CARGO_PKG_VERSION").to_string(),
            products: APPSEC_PRODUCTS.iter().map(|p| p.to_string()).collect(),
            capabilities: vec![
                Capability::AsmActivation,
                Capability::AsmIpBlocking,
                Capability::AsmDdRules,
                Capability::AsmExclusions,
                Capability::AsmRequestBlocking,
                Capability::AsmUserBlocking,
                Capability::AsmCustomRules,
                Capability::AsmCustomBlockingResponse,
            ],
        }
    }
}

impl ClientConfig {
    /// Resolves the client settings from the environment. Invalid values are
    /// logged and replaced by defaults.
    pub fn from_env<E: EnvSource + ?Sized>(env: &E) -> Self {
        let mut cfg = Self {
            agent_url: resolve_agent_url(env),
            poll_interval: resolve_poll_interval(env),
            ..Self::default()
        };
        cfg.service_name = non_empty(env, SERVICE_ENV_VAR);
        cfg.env = non_empty(env, ENV_ENV_VAR);
        cfg.app_version = non_empty(env, VERSION_ENV_VAR);
        cfg
    }

    /// Capability bitmask as sent to the agent.
    pub fn capabilities_mask(&self) -> u64 {
        self.capabilities
            .iter()
            .fold(0, |mask, c| mask | (1u64 << c.bit()))
    }
}

fn non_empty<E: EnvSource + ?Sized>(env: &E, name: &str) -> Option<String> {
    env.lookup(name).filter(|v| !v.is_empty())
}

/// `http://localhost:8126`, parsed once.
static DEFAULT_AGENT_URL: LazyLock<Url> = LazyLock::new(|| {
    Url::parse(&format!("http://{DEFAULT_AGENT_HOST}:{DEFAULT_AGENT_PORT}"))
        .expect("default agent URL is a valid literal")
});

fn default_agent_url(host: &str, port: u16) -> Url {
    // Bracket bare IPv6 hosts.
    let host = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_string()
    };
    match Url::parse(&format!("http://{host}:{port}")) {
        Ok(url) => url,
        Err(e) => {
            log_parse_error(AGENT_HOST_ENV_VAR, &host, &e, &DEFAULT_AGENT_HOST);
            let mut url = DEFAULT_AGENT_URL.clone();
            // http URLs always accept a port.
            let _ = url.set_port(Some(port));
            url
        }
    }
}

fn resolve_agent_url<E: EnvSource + ?Sized>(env: &E) -> Url {
    let default_port = match non_empty(env, AGENT_PORT_ENV_VAR) {
        None => DEFAULT_AGENT_PORT,
        Some(raw) => match raw.parse::<u16>() {
            Ok(port) if port > 0 => port,
            Ok(port) => {
                log_unexpected_value(AGENT_PORT_ENV_VAR, &port, "expecting a non-zero port", &DEFAULT_AGENT_PORT);
                DEFAULT_AGENT_PORT
            }
            Err(e) => {
                log_parse_error(AGENT_PORT_ENV_VAR, &raw, &e, &DEFAULT_AGENT_PORT);
                DEFAULT_AGENT_PORT
            }
        },
    };
    let host = non_empty(env, AGENT_HOST_ENV_VAR).unwrap_or_else(|| DEFAULT_AGENT_HOST.to_string());
    let default = default_agent_url(&host, default_port);

    let Some(raw) = non_empty(env, AGENT_URL_ENV_VAR) else {
        return default;
    };
    match Url::parse(&raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https" | "unix") => url,
        Ok(url) => {
            log_unexpected_value(
                AGENT_URL_ENV_VAR,
                &url,
                "unsupported scheme",
                &default.as_str(),
            );
            default
        }
        Err(e) => {
            log_parse_error(AGENT_URL_ENV_VAR, &raw, &e, &default.as_str());
            default
        }
    }
}

fn resolve_poll_interval<E: EnvSource + ?Sized>(env: &E) -> Duration {
    let Some(raw) = non_empty(env, POLL_INTERVAL_ENV_VAR) else {
        return DEFAULT_POLL_INTERVAL;
    };
    match raw.parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs > 0.0 && secs <= u32::MAX as f64 => {
            Duration::from_secs_f64(secs)
        }
        Ok(secs) => {
            log_unexpected_value(
                POLL_INTERVAL_ENV_VAR,
                &secs,
                "expecting a strictly positive number of seconds",
                &DEFAULT_POLL_INTERVAL,
            );
            DEFAULT_POLL_INTERVAL
        }
        Err(e) => {
            log_parse_error(POLL_INTERVAL_ENV_VAR, &raw, &e, &DEFAULT_POLL_INTERVAL);
            DEFAULT_POLL_INTERVAL
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
