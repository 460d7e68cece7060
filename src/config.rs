use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitorConfig {
    pub services: Vec<ServiceEndpoint>,
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

fn default_check_interval_ms() -> u64 {
    30_000
}
fn default_probe_timeout_ms() -> u64 {
    5_000
}
fn default_api_port() -> u16 {
    3000
}

/// One monitored backend. The health path is relative to `base_url`; the
/// probe chain falls back to `{base_url}/api` and a bare HEAD when the
/// health endpoint is not reachable.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServiceEndpoint {
    pub name: String,
    pub base_url: String,
    #[serde(default = "default_health_path")]
    pub health_path: String,
}

fn default_health_path() -> String {
    "/actuator/health".into()
}

impl ServiceEndpoint {
    pub fn new(name: &str, base_url: &str) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            health_path: default_health_path(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            services: vec![
                ServiceEndpoint::new(
                    "Customer Service",
                    "http://localhost:8091/customer-services/api/v1",
                ),
                ServiceEndpoint::new(
                    "Account Service",
                    "http://localhost:8091/account-services/api/v1",
                ),
                ServiceEndpoint::new(
                    "Report Service",
                    "http://localhost:8091/report-services/api/v1",
                ),
            ],
            check_interval_ms: default_check_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            api_port: default_api_port(),
        }
    }
}

impl MonitorConfig {
    /// Rejects configurations the monitor cannot run against. Called once
    /// at startup; the service list is immutable afterwards.
    pub fn validate(&self) -> Result<()> {
        if self.check_interval_ms == 0 {
            bail!("check_interval_ms must be greater than zero");
        }
        if self.probe_timeout_ms == 0 {
            bail!("probe_timeout_ms must be greater than zero");
        }
        let mut seen = HashSet::new();
        for service in &self.services {
            if service.name.trim().is_empty() {
                bail!("service with base_url {} has an empty name", service.base_url);
            }
            if !seen.insert(service.name.as_str()) {
                bail!("duplicate service name: {}", service.name);
            }
            if let Err(e) = reqwest::Url::parse(&service.base_url) {
                bail!("service {} has an invalid base_url: {}", service.name, e);
            }
        }
        Ok(())
    }
}
