//! Controller configuration from environment variables.

use crate::connectivity::ConnectivityMode;
use crate::error::ControllerError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_WORKERS: usize = 2;
const DEFAULT_RESYNC_PERIOD_SECS: u64 = 30;
const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 30;

/// Runtime settings for the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch; `None` watches all namespaces
    pub namespace: Option<String>,
    pub workers: usize,
    pub mode: ConnectivityMode,
    pub resync_period: Duration,
    /// Per-operation timeout for backend calls
    pub backend_timeout: Duration,
}

impl ControllerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from any variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty());

        let workers = parse_or(&lookup, "WORKERS", DEFAULT_WORKERS)?;
        if workers == 0 {
            return Err(ControllerError::InvalidConfig(
                "WORKERS must be at least 1".to_string(),
            ));
        }

        let mode = match lookup("RUN_OUTSIDE_CLUSTER") {
            Some(value) if parse_bool("RUN_OUTSIDE_CLUSTER", &value)? => ConnectivityMode::Tunnel,
            _ => ConnectivityMode::InCluster,
        };

        let resync_secs = parse_or(&lookup, "RESYNC_PERIOD_SECS", DEFAULT_RESYNC_PERIOD_SECS)?;
        let backend_secs = parse_or(&lookup, "BACKEND_TIMEOUT_SECS", DEFAULT_BACKEND_TIMEOUT_SECS)?;
        if resync_secs == 0 || backend_secs == 0 {
            return Err(ControllerError::InvalidConfig(
                "RESYNC_PERIOD_SECS and BACKEND_TIMEOUT_SECS must be positive".to_string(),
            ));
        }

        Ok(Self {
            namespace,
            workers,
            mode,
            resync_period: Duration::from_secs(resync_secs),
            backend_timeout: Duration::from_secs(backend_secs),
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ControllerError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| {
            ControllerError::InvalidConfig(format!("{} has invalid value {:?}", name, value))
        }),
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ControllerError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "" | "0" | "false" | "no" => Ok(false),
        _ => Err(ControllerError::InvalidConfig(format!(
            "{} has invalid value {:?}",
            name, value
        ))),
    }
}
