//! Data provider abstraction for the traffic backend.
//!
//! The `DataProvider` trait is the only seam between the dashboard and the
//! remote system. Implementations:
//! - `HttpProvider`: JSON over HTTP (the production path)
//! - `MemoryProvider`: in-process values with injectable failures and latency

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::protocol::{
    ControlAction, DashboardSummary, MetricsSnapshot, ProtocolError, Settings, SettingsUpdate,
    Strategy, TrafficState, Validate, decode,
};

/// Type alias for a boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Failure of a single provider operation.
///
/// Transport problems, undecodable responses and errors reported by the remote
/// side stay distinguishable here; the synchronizer flattens them to a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("remote error (HTTP {status}): {detail}")]
    Remote { status: u16, detail: String },
}

impl From<ProtocolError> for ProviderError {
    fn from(err: ProtocolError) -> Self {
        ProviderError::Malformed(err.to_string())
    }
}

/// Trait for traffic data providers.
///
/// Implementations must be `Send + Sync` for use across async tasks.
/// Methods return boxed futures for dyn-compatibility.
pub trait DataProvider: Send + Sync {
    fn fetch_state(&self) -> BoxFuture<'_, Result<TrafficState, ProviderError>>;

    fn fetch_metrics(&self) -> BoxFuture<'_, Result<MetricsSnapshot, ProviderError>>;

    fn fetch_summary(&self) -> BoxFuture<'_, Result<DashboardSummary, ProviderError>>;

    fn fetch_settings(&self) -> BoxFuture<'_, Result<Settings, ProviderError>>;

    /// Dispatch a control write; resolves to the provider's confirmation.
    fn send_control(
        &self,
        action: ControlAction,
    ) -> BoxFuture<'_, Result<ControlAction, ProviderError>>;

    fn update_settings(&self, strategy: Strategy) -> BoxFuture<'_, Result<Settings, ProviderError>>;
}

/// HTTP provider speaking the backend's JSON API under `{base_url}/api`.
pub struct HttpProvider {
    base_url: String,
    timeout: Option<Duration>,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            timeout: None,
            client,
        }
    }

    /// Per-request timeout. Without one, the transport default applies.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url)
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<Vec<u8>, ProviderError> {
        let req = match self.timeout {
            Some(t) => req.timeout(t),
            None => req,
        };
        let resp = req
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| ProviderError::Transport(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(ProviderError::Remote {
                status: status.as_u16(),
                detail: remote_detail(&body, status),
            });
        }
        Ok(body.to_vec())
    }

    async fn get_json<T>(&self, path: &str) -> Result<T, ProviderError>
    where
        T: DeserializeOwned + Validate,
    {
        let body = self.send(self.client.get(self.url(path))).await?;
        Ok(decode(&body)?)
    }

    async fn post_raw<B: Serialize>(&self, path: &str, body: &B) -> Result<Vec<u8>, ProviderError> {
        self.send(self.client.post(self.url(path)).json(body)).await
    }
}

/// Extract the error detail from a FastAPI-style `{"detail": ...}` body.
fn remote_detail(body: &[u8], status: reqwest::StatusCode) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_slice(body).ok();
    match parsed.as_ref().and_then(|v| v.get("detail")) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    }
}

impl DataProvider for HttpProvider {
    fn fetch_state(&self) -> BoxFuture<'_, Result<TrafficState, ProviderError>> {
        Box::pin(self.get_json("state"))
    }

    fn fetch_metrics(&self) -> BoxFuture<'_, Result<MetricsSnapshot, ProviderError>> {
        Box::pin(self.get_json("metrics"))
    }

    fn fetch_summary(&self) -> BoxFuture<'_, Result<DashboardSummary, ProviderError>> {
        Box::pin(self.get_json("dashboard"))
    }

    fn fetch_settings(&self) -> BoxFuture<'_, Result<Settings, ProviderError>> {
        Box::pin(async move {
            let body = self.send(self.client.get(self.url("settings"))).await?;
            Ok(Settings::decode(&body)?)
        })
    }

    fn send_control(
        &self,
        action: ControlAction,
    ) -> BoxFuture<'_, Result<ControlAction, ProviderError>> {
        Box::pin(async move {
            action.validate()?;
            let body = self.post_raw("control", &action).await?;
            Ok(decode(&body)?)
        })
    }

    fn update_settings(&self, strategy: Strategy) -> BoxFuture<'_, Result<Settings, ProviderError>> {
        Box::pin(async move {
            let body = self.post_raw("settings", &SettingsUpdate::new(strategy)).await?;
            Ok(Settings::decode_update_reply(&body)?)
        })
    }
}

/// Provider operations, used to address failures and call counters.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
    FetchState,
    FetchMetrics,
    FetchSummary,
    FetchSettings,
    SendControl,
    UpdateSettings,
}

#[derive(Debug, Default)]
struct MemoryState {
    state: Option<TrafficState>,
    metrics: Option<MetricsSnapshot>,
    summary: Option<DashboardSummary>,
    settings: Option<Settings>,
    failures: HashMap<Operation, ProviderError>,
    calls: HashMap<Operation, usize>,
    controls: Vec<ControlAction>,
    latency: Option<Duration>,
    op_latency: HashMap<Operation, Duration>,
}

/// In-memory provider for tests and offline demos.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    inner: Mutex<MemoryState>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_state(&self, state: TrafficState) {
        self.inner.lock().state = Some(state);
    }

    pub fn set_metrics(&self, metrics: MetricsSnapshot) {
        self.inner.lock().metrics = Some(metrics);
    }

    pub fn set_summary(&self, summary: DashboardSummary) {
        self.inner.lock().summary = Some(summary);
    }

    pub fn set_settings(&self, settings: Settings) {
        self.inner.lock().settings = Some(settings);
    }

    pub fn settings(&self) -> Option<Settings> {
        self.inner.lock().settings.clone()
    }

    /// Make `op` fail with `err` until [`MemoryProvider::clear_failure`].
    pub fn fail(&self, op: Operation, err: ProviderError) {
        self.inner.lock().failures.insert(op, err);
    }

    pub fn clear_failure(&self, op: Operation) {
        self.inner.lock().failures.remove(&op);
    }

    /// Delay applied to every operation before it resolves.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.inner.lock().latency = latency;
    }

    /// Delay for `op` alone, overriding [`MemoryProvider::set_latency`].
    /// `None` falls back to the shared delay.
    pub fn set_latency_for(&self, op: Operation, latency: Option<Duration>) {
        let mut inner = self.inner.lock();
        match latency {
            Some(d) => inner.op_latency.insert(op, d),
            None => inner.op_latency.remove(&op),
        };
    }

    pub fn calls(&self, op: Operation) -> usize {
        self.inner.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Control actions accepted so far, oldest first.
    pub fn controls(&self) -> Vec<ControlAction> {
        self.inner.lock().controls.clone()
    }

    /// Handle `op` the way a server would: the call is counted and its result
    /// is read (or its write applied) when the request is issued, then
    /// delivered after the configured latency.
    fn run<'a, T, F>(&'a self, op: Operation, f: F) -> BoxFuture<'a, Result<T, ProviderError>>
    where
        T: Send + 'a,
        F: FnOnce(&mut MemoryState) -> Result<T, ProviderError> + Send + 'a,
    {
        let (latency, result) = {
            let mut inner = self.inner.lock();
            *inner.calls.entry(op).or_insert(0) += 1;
            let latency = inner.op_latency.get(&op).copied().or(inner.latency);
            let result = match inner.failures.get(&op).cloned() {
                Some(err) => Err(err),
                None => f(&mut inner),
            };
            (latency, result)
        };
        Box::pin(async move {
            if let Some(d) = latency {
                tokio::time::sleep(d).await;
            }
            result
        })
    }
}

fn not_loaded(what: &str) -> ProviderError {
    ProviderError::Remote {
        status: 503,
        detail: format!("no {what} available"),
    }
}

impl DataProvider for MemoryProvider {
    fn fetch_state(&self) -> BoxFuture<'_, Result<TrafficState, ProviderError>> {
        self.run(Operation::FetchState, |s| s.state.clone().ok_or_else(|| not_loaded("state")))
    }

    fn fetch_metrics(&self) -> BoxFuture<'_, Result<MetricsSnapshot, ProviderError>> {
        self.run(Operation::FetchMetrics, |s| {
            s.metrics.clone().ok_or_else(|| not_loaded("metrics"))
        })
    }

    fn fetch_summary(&self) -> BoxFuture<'_, Result<DashboardSummary, ProviderError>> {
        self.run(Operation::FetchSummary, |s| {
            s.summary.clone().ok_or_else(|| not_loaded("summary"))
        })
    }

    fn fetch_settings(&self) -> BoxFuture<'_, Result<Settings, ProviderError>> {
        self.run(Operation::FetchSettings, |s| {
            s.settings.clone().ok_or_else(|| not_loaded("settings"))
        })
    }

    fn send_control(
        &self,
        action: ControlAction,
    ) -> BoxFuture<'_, Result<ControlAction, ProviderError>> {
        self.run(Operation::SendControl, move |s| {
            action.validate()?;
            let known = s
                .state
                .as_ref()
                .is_some_and(|st| st.intersection(&action.intersection).is_some());
            if !known {
                return Err(ProviderError::Remote {
                    status: 400,
                    detail: format!("Invalid traffic light ID: {}", action.intersection),
                });
            }
            s.controls.push(action.clone());
            Ok(action)
        })
    }

    fn update_settings(&self, strategy: Strategy) -> BoxFuture<'_, Result<Settings, ProviderError>> {
        self.run(Operation::UpdateSettings, move |s| {
            let settings = Settings::new(strategy);
            s.settings = Some(settings.clone());
            Ok(settings)
        })
    }
}
