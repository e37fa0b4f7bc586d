use std::collections::BTreeMap;
use std::sync::Arc;

use crate::protocol::{DashboardSummary, MetricsSnapshot, Strategy, TrafficState};
use crate::request::Channel;

/// A failed fetch or write, flattened to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub channel: Channel,
    pub message: String,
}

impl Fault {
    pub fn new(channel: Channel, message: impl Into<String>) -> Self {
        Self {
            channel,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.channel, self.message)
    }
}

/// Read-only view of everything the dashboard knows.
///
/// Each field is valid as of its own last successful fetch; fields are not
/// consistent with each other in time. Cloning is cheap (shared `Arc`s).
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub state: Option<Arc<TrafficState>>,
    pub metrics: Option<Arc<MetricsSnapshot>>,
    pub summary: Option<Arc<DashboardSummary>>,
    pub strategy: Option<Strategy>,
    faults: BTreeMap<Channel, String>,
}

impl Snapshot {
    pub fn fault(&self, channel: Channel) -> Option<&str> {
        self.faults.get(&channel).map(String::as_str)
    }

    pub fn is_failing(&self, channel: Channel) -> bool {
        self.faults.contains_key(&channel)
    }

    pub fn faults(&self) -> impl Iterator<Item = Fault> + '_ {
        self.faults.iter().map(|(c, m)| Fault::new(*c, m.clone()))
    }

    /// The most severe active fault. Ties resolve to the lower channel.
    pub fn last_error(&self) -> Option<Fault> {
        self.faults()
            .max_by(|a, b| {
                a.channel
                    .severity()
                    .cmp(&b.channel.severity())
                    .then_with(|| b.channel.cmp(&a.channel))
            })
    }

    /// The fast stream is failing: positions and signals on screen are stale.
    pub fn live_view_broken(&self) -> bool {
        self.is_failing(Channel::State)
    }

    /// The slow stream is failing: trend panels are stale.
    pub fn trends_stale(&self) -> bool {
        self.is_failing(Channel::Metrics) || self.is_failing(Channel::Summary)
    }
}

/// Latest accepted value per channel, replaced wholesale on every commit.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    snapshot: Snapshot,
    revisions: BTreeMap<Channel, u64>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Number of successful commits on `channel`.
    pub fn revision(&self, channel: Channel) -> u64 {
        self.revisions.get(&channel).copied().unwrap_or(0)
    }

    fn bump(&mut self, channel: Channel) {
        *self.revisions.entry(channel).or_insert(0) += 1;
        self.snapshot.faults.remove(&channel);
    }

    /// Replace the live state.
    ///
    /// Intersection and edge lists that compare equal to the cached ones keep
    /// the cached `Arc`, so geometry consumers keyed on identity see no change.
    pub fn commit_state(&mut self, mut state: TrafficState) -> Arc<TrafficState> {
        if let Some(prev) = &self.snapshot.state {
            if prev.edges == state.edges {
                state.edges = Arc::clone(&prev.edges);
            }
            if prev.intersections == state.intersections {
                state.intersections = Arc::clone(&prev.intersections);
            }
        }
        let state = Arc::new(state);
        self.snapshot.state = Some(Arc::clone(&state));
        self.bump(Channel::State);
        state
    }

    pub fn commit_metrics(&mut self, metrics: MetricsSnapshot) -> Arc<MetricsSnapshot> {
        let metrics = Arc::new(metrics);
        self.snapshot.metrics = Some(Arc::clone(&metrics));
        self.bump(Channel::Metrics);
        metrics
    }

    pub fn commit_summary(&mut self, summary: DashboardSummary) -> Arc<DashboardSummary> {
        let summary = Arc::new(summary);
        self.snapshot.summary = Some(Arc::clone(&summary));
        self.bump(Channel::Summary);
        summary
    }

    pub fn commit_strategy(&mut self, channel: Channel, strategy: Strategy) {
        self.snapshot.strategy = Some(strategy);
        self.bump(channel);
    }

    /// Record a successful write that carries no cached value.
    pub fn commit_write(&mut self) {
        self.bump(Channel::Control);
    }

    /// Flag `channel` as failing. The cached value, if any, is left untouched.
    pub fn record_fault(&mut self, fault: &Fault) {
        self.snapshot
            .faults
            .insert(fault.channel, fault.message.clone());
    }
}
