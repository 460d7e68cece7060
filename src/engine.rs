use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use reqwest::{header, Method};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{MonitorConfig, ServiceEndpoint};
use crate::models::{OverallStatus, ProbeFailure, ServiceState, ServiceStatus};

/// Live reachability view over the configured backend services.
///
/// Every entry starts out `Checking` and is published before the first probe
/// resolves; after that the table is only mutated by completed probe results.
/// Results are stamped with a sequence number at initiation, and a completed
/// result is discarded if a later-initiated probe already wrote the entry.
pub struct Monitor {
    pub config: MonitorConfig,
    http_client: reqwest::Client,
    inner: Mutex<MonitorInner>,
    status_tx: watch::Sender<Vec<ServiceStatus>>,
    seq: AtomicU64,
}

struct MonitorInner {
    entries: HashMap<String, StatusEntry>,
    inflight_retries: HashSet<String>,
}

struct StatusEntry {
    status: ServiceStatus,
    seq: u64,
}

/// Releases the in-flight marker even when the retry future is dropped
/// before completing (e.g. the API caller hangs up).
struct RetryGuard<'a> {
    monitor: &'a Monitor,
    name: &'a str,
}

impl Drop for RetryGuard<'_> {
    fn drop(&mut self) {
        self.monitor
            .inner
            .lock()
            .inflight_retries
            .remove(self.name);
    }
}

impl Monitor {
    pub fn new(config: MonitorConfig) -> Self {
        let entries: HashMap<String, StatusEntry> = config
            .services
            .iter()
            .map(|svc| {
                let status = ServiceStatus::checking(&svc.name, &svc.base_url);
                (svc.name.clone(), StatusEntry { status, seq: 0 })
            })
            .collect();

        let snapshot = config
            .services
            .iter()
            .filter_map(|svc| entries.get(&svc.name).map(|e| e.status.clone()))
            .collect();
        let (status_tx, _) = watch::channel(snapshot);

        Self {
            config,
            http_client: reqwest::Client::new(),
            inner: Mutex::new(MonitorInner {
                entries,
                inflight_retries: HashSet::new(),
            }),
            status_tx,
            seq: AtomicU64::new(0),
        }
    }

    /// Periodic loop: one immediate cycle, then one per interval. A cycle
    /// that overruns the interval delays the next tick instead of stacking.
    pub async fn run(self: Arc<Self>, shutdown: Arc<Notify>) {
        info!(
            "Connectivity monitor active: {} services, interval {}ms",
            self.config.services.len(),
            self.config.check_interval_ms
        );

        let mut ticker = interval(Duration::from_millis(self.config.check_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    info!("Connectivity monitor shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let started = Instant::now();
                    self.check_all().await;
                    info!(
                        "Check cycle completed {} probes in {:.2}s",
                        self.config.services.len(),
                        started.elapsed().as_secs_f64()
                    );
                }
            }
        }
    }

    /// One full cycle: every service probed concurrently, the merged result
    /// published as a single update once all chains have resolved.
    pub async fn check_all(&self) {
        let mut probes = FuturesUnordered::new();
        for service in &self.config.services {
            let seq = self.next_seq();
            probes.push(async move { (service, seq, self.probe_service(service).await) });
        }

        let mut results = Vec::with_capacity(self.config.services.len());
        while let Some(result) = probes.next().await {
            results.push(result);
        }

        let mut inner = self.inner.lock();
        for (service, seq, status) in results {
            Self::apply_locked(&mut inner, &service.name, seq, status);
        }
        self.publish_locked(&inner);
    }

    /// Probes one service outside the periodic schedule and republishes.
    /// Unknown names resolve to a synthetic `Disconnected` status rather
    /// than an error; a retry already in flight for the same name is
    /// coalesced into the current cached status.
    pub async fn retry(&self, name: &str) -> ServiceStatus {
        let Some(service) = self.config.services.iter().find(|s| s.name == name) else {
            return ServiceStatus {
                name: name.to_string(),
                url: String::new(),
                state: ServiceState::Disconnected,
                last_checked: Utc::now(),
                response_time_ms: None,
                error: Some("service not found".into()),
            };
        };

        {
            let mut inner = self.inner.lock();
            if inner.inflight_retries.contains(name) {
                if let Some(entry) = inner.entries.get(name) {
                    debug!("retry for {} already in flight, returning cached status", name);
                    return entry.status.clone();
                }
            }
            inner.inflight_retries.insert(name.to_string());
        }
        let _guard = RetryGuard {
            monitor: self,
            name,
        };

        let seq = self.next_seq();
        let status = self.probe_service(service).await;
        self.apply_result(name, seq, status.clone());
        status
    }

    /// Fast-path check used before outgoing calls: an already-`Connected`
    /// cached entry is trusted without a network round trip, anything else
    /// triggers an immediate probe.
    pub async fn validate_connection(&self, name: &str) -> bool {
        let Some(service) = self.config.services.iter().find(|s| s.name == name) else {
            return false;
        };
        if self.is_connected(name) {
            return true;
        }

        let seq = self.next_seq();
        let status = self.probe_service(service).await;
        let connected = status.is_connected();
        self.apply_result(name, seq, status);
        connected
    }

    /// Live stream of the full status list. New subscribers observe the
    /// current value immediately, then every subsequent publish.
    pub fn subscribe(&self) -> watch::Receiver<Vec<ServiceStatus>> {
        self.status_tx.subscribe()
    }

    pub fn current_status(&self) -> Vec<ServiceStatus> {
        self.status_tx.borrow().clone()
    }

    pub fn status_of(&self, name: &str) -> Option<ServiceStatus> {
        self.status_tx
            .borrow()
            .iter()
            .find(|s| s.name == name)
            .cloned()
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.status_of(name).map(|s| s.is_connected()).unwrap_or(false)
    }

    pub fn overall_status(&self) -> OverallStatus {
        OverallStatus::of(&self.status_tx.borrow())
    }

    /// Cascading probe chain. Backends expose readiness differently, so a
    /// failed health endpoint falls back to the API root, then to a bare
    /// HEAD against the base address. Each attempt gets the full timeout.
    async fn probe_service(&self, service: &ServiceEndpoint) -> ServiceStatus {
        let started = Instant::now();

        let health_url = format!("{}{}", service.base_url, service.health_path);
        let outcome = match self.attempt(Method::GET, &health_url, true).await {
            Ok(()) => Ok(()),
            Err(primary) => {
                let api_url = format!("{}/api", service.base_url);
                let fallback = match self.attempt(Method::GET, &api_url, false).await {
                    Ok(()) => Ok(()),
                    Err(_) => self.attempt(Method::HEAD, &service.base_url, false).await,
                };
                // classification always comes from the health endpoint's
                // failure, not the fallbacks'
                fallback.map_err(|_| primary)
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(()) => ServiceStatus {
                name: service.name.clone(),
                url: service.base_url.clone(),
                state: ServiceState::Connected,
                last_checked: Utc::now(),
                response_time_ms: Some(elapsed_ms),
                error: None,
            },
            Err(failure) => ServiceStatus {
                name: service.name.clone(),
                url: service.base_url.clone(),
                state: ServiceState::Disconnected,
                last_checked: Utc::now(),
                response_time_ms: Some(elapsed_ms),
                error: Some(failure.to_string()),
            },
        }
    }

    /// One bounded attempt. The timeout drops the request future, so a late
    /// response is cancelled rather than observed after the fact.
    async fn attempt(
        &self,
        method: Method,
        url: &str,
        json_accept: bool,
    ) -> Result<(), ProbeFailure> {
        let mut request = self.http_client.request(method, url);
        if json_accept {
            request = request.header(header::ACCEPT, "application/json");
        }

        let per_attempt = Duration::from_millis(self.config.probe_timeout_ms);
        let response = match timeout(per_attempt, request.send()).await {
            Err(_) => return Err(ProbeFailure::Timeout),
            Ok(Err(e)) => return Err(classify(e)),
            Ok(Ok(r)) => r,
        };
        match response.error_for_status() {
            Ok(_) => Ok(()),
            Err(e) => Err(classify(e)),
        }
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn apply_result(&self, name: &str, seq: u64, status: ServiceStatus) {
        let mut inner = self.inner.lock();
        Self::apply_locked(&mut inner, name, seq, status);
        self.publish_locked(&inner);
    }

    fn apply_locked(inner: &mut MonitorInner, name: &str, seq: u64, status: ServiceStatus) {
        let Some(entry) = inner.entries.get_mut(name) else {
            return;
        };
        if seq <= entry.seq {
            debug!(
                "Discarding stale probe result for {} (seq {} <= {})",
                name, seq, entry.seq
            );
            return;
        }

        let previous = entry.status.state;
        if previous != status.state {
            match status.state {
                ServiceState::Disconnected => error!(
                    "[CHANGE] {} -> disconnected: {}",
                    name,
                    status.error.as_deref().unwrap_or("unknown error")
                ),
                ServiceState::Connected if previous == ServiceState::Disconnected => {
                    warn!("[CHANGE] {} -> connected", name)
                }
                _ => info!(
                    "{} connected ({}ms)",
                    name,
                    status.response_time_ms.unwrap_or(0)
                ),
            }
        }

        entry.seq = seq;
        entry.status = status;
    }

    fn publish_locked(&self, inner: &MonitorInner) {
        let snapshot: Vec<ServiceStatus> = self
            .config
            .services
            .iter()
            .filter_map(|svc| inner.entries.get(&svc.name).map(|e| e.status.clone()))
            .collect();
        self.status_tx.send_replace(snapshot);
    }
}

fn classify(error: reqwest::Error) -> ProbeFailure {
    if error.is_timeout() {
        return ProbeFailure::Timeout;
    }
    if let Some(status) = error.status() {
        return if status.is_server_error() {
            ProbeFailure::ServerError(status.as_u16())
        } else {
            ProbeFailure::ClientError(status.as_u16())
        };
    }
    if error.is_connect() {
        return ProbeFailure::Unreachable;
    }
    ProbeFailure::Unknown(error.without_url().to_string())
}
