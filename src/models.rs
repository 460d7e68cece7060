use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Checking,
    Connected,
    Disconnected,
}

/// Reachability of a single backend service, as published to subscribers
/// and over the status API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub url: String,
    pub state: ServiceState,
    pub last_checked: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceStatus {
    pub fn checking(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            state: ServiceState::Checking,
            last_checked: Utc::now(),
            response_time_ms: None,
            error: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ServiceState::Connected
    }
}

/// Why a probe attempt failed. `Display` renders the operator-facing
/// message shown next to a disconnected service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    Timeout,
    Unreachable,
    ServerError(u16),
    ClientError(u16),
    Unknown(String),
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeFailure::Timeout => write!(f, "timeout: service not responding"),
            ProbeFailure::Unreachable => write!(f, "cannot connect: service unavailable"),
            ProbeFailure::ServerError(status) => write!(f, "server error ({})", status),
            ProbeFailure::ClientError(status) => write!(f, "client error ({})", status),
            ProbeFailure::Unknown(message) if !message.is_empty() => write!(f, "{}", message),
            ProbeFailure::Unknown(_) => write!(f, "unknown error"),
        }
    }
}

/// Aggregate of the full status list. Derived on demand, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum OverallStatus {
    Checking,
    Connected,
    Partial { connected: usize, total: usize },
    Disconnected,
}

impl OverallStatus {
    pub fn of(statuses: &[ServiceStatus]) -> Self {
        if statuses.is_empty() {
            return OverallStatus::Checking;
        }
        let connected = statuses.iter().filter(|s| s.is_connected()).count();
        let total = statuses.len();
        if connected == total {
            OverallStatus::Connected
        } else if connected == 0 {
            OverallStatus::Disconnected
        } else {
            OverallStatus::Partial { connected, total }
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallStatus::Checking => write!(f, "not yet verified"),
            OverallStatus::Connected => write!(f, "all services connected"),
            OverallStatus::Partial { connected, total } => {
                write!(f, "{}/{} connected", connected, total)
            }
            OverallStatus::Disconnected => write!(f, "all services disconnected"),
        }
    }
}
