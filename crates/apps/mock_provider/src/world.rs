//! Deterministic mock traffic network.
//!
//! Two fixed intersections joined by a diagonal road, with a few vehicles that
//! advance along it on every state read. Queues drift on a short cycle so the
//! dashboard's tiers change over time.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use foundation::Vec2;
use streaming::{
    ControlAction, DashboardSummary, Direction, Intersection, MetricsSnapshot, RoadEdge, RunStatus,
    Settings, SignalCommand, Strategy, TrafficState, Vehicle,
};

const WAIT_HISTORY: [f64; 5] = [28.0, 26.5, 22.1, 20.3, 19.7];
const THROUGHPUT_HISTORY: [f64; 5] = [180.0, 190.0, 205.0, 220.0, 240.0];
const TOTAL_PROCESSED: u64 = 1300;
/// Wait time (seconds) that maps to a congestion index of 1.
const CONGESTION_WAIT_CEILING: f64 = 60.0;

/// Fraction of the main road a vehicle covers per state read.
const VEHICLE_STEP: f64 = 0.04;
const VEHICLE_OFFSETS: [f64; 3] = [0.0, 0.35, 0.7];

#[derive(Debug)]
struct Node {
    id: &'static str,
    position: Vec2,
    base_queues: [u32; 4],
    command: SignalCommand,
    processed: u64,
    avg_wait: f64,
}

#[derive(Debug)]
pub struct World {
    tick: u64,
    nodes: Vec<Node>,
    settings: Settings,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        Self {
            tick: 0,
            nodes: vec![
                Node {
                    id: "A1",
                    position: Vec2::new(100.0, 200.0),
                    base_queues: [5, 3, 8, 2],
                    command: SignalCommand::NsGreen,
                    processed: 640,
                    avg_wait: 18.5,
                },
                Node {
                    id: "B2",
                    position: Vec2::new(300.0, 420.0),
                    base_queues: [9, 6, 4, 7],
                    command: SignalCommand::EwGreen,
                    processed: 660,
                    avg_wait: 21.0,
                },
            ],
            settings: Settings {
                strategy: Strategy::Ai,
                last_updated: Some(now_secs()),
            },
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    fn main_road(&self) -> (Vec2, Vec2) {
        (self.nodes[0].position, self.nodes[1].position)
    }

    fn queues(&self, node: &Node) -> BTreeMap<Direction, u32> {
        Direction::ALL
            .iter()
            .zip(node.base_queues)
            .enumerate()
            .map(|(k, (&dir, base))| (dir, base + ((self.tick + k as u64 * 2) % 7) as u32))
            .collect()
    }

    fn intersection(&self, node: &Node) -> Intersection {
        Intersection {
            id: node.id.to_string(),
            position: node.position,
            queues: self.queues(node),
            processed: node.processed,
            avg_wait: node.avg_wait,
            phase: node.command.phase_index(),
            signals: Direction::ALL
                .iter()
                .map(|&d| (d, node.command.signal_for(d)))
                .collect(),
        }
    }

    fn edges(&self) -> Vec<RoadEdge> {
        let (a, b) = self.main_road();
        vec![
            RoadEdge {
                id: "A1-B2".into(),
                shape: vec![a, Vec2::new(200.0, 310.0), b],
            },
            RoadEdge {
                id: "A1-W".into(),
                shape: vec![Vec2::new(20.0, 200.0), a],
            },
            RoadEdge {
                id: "B2-N".into(),
                shape: vec![b, Vec2::new(300.0, 500.0)],
            },
        ]
    }

    fn vehicles(&self) -> Vec<Vehicle> {
        let (a, b) = self.main_road();
        let d = Vec2::new(b.x - a.x, b.y - a.y);
        VEHICLE_OFFSETS
            .iter()
            .enumerate()
            .map(|(i, offset)| {
                let t = (offset + self.tick as f64 * VEHICLE_STEP).fract();
                Vehicle {
                    id: format!("veh-{i}"),
                    position: Vec2::new(a.x + d.x * t, a.y + d.y * t),
                    vx: d.x * VEHICLE_STEP,
                    vy: d.y * VEHICLE_STEP,
                    lane: "A1-B2_0".into(),
                    waiting_time: if t < VEHICLE_STEP { 4.0 } else { 0.0 },
                }
            })
            .collect()
    }

    /// Advance the simulation one step and return the new live state.
    pub fn advance(&mut self) -> TrafficState {
        self.tick += 1;
        for node in &mut self.nodes {
            node.processed += 3;
        }
        let mut state = TrafficState::new(
            self.nodes.iter().map(|n| self.intersection(n)).collect(),
            self.vehicles(),
            self.edges(),
        );
        state.timestamp = Some(now_secs());
        state
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        let avg_wait = WAIT_HISTORY[WAIT_HISTORY.len() - 1];
        MetricsSnapshot {
            avg_wait_time: avg_wait,
            total_processed: TOTAL_PROCESSED,
            throughput: THROUGHPUT_HISTORY[THROUGHPUT_HISTORY.len() - 1],
            congestion_index: (avg_wait / CONGESTION_WAIT_CEILING).clamp(0.0, 1.0),
            optimization_strategy: self.settings.strategy.as_str().to_string(),
            wait_time_history: Some(WAIT_HISTORY.to_vec()),
            throughput_history: Some(THROUGHPUT_HISTORY.to_vec()),
        }
    }

    pub fn summary(&self) -> DashboardSummary {
        let high_congestion = self
            .nodes
            .iter()
            .map(|n| self.intersection(n))
            .filter(|i| i.total_queue() > 20)
            .map(|i| i.id)
            .collect();
        DashboardSummary {
            status: RunStatus::Running,
            intersections: self.nodes.len() as u32,
            vehicles: VEHICLE_OFFSETS.len() as u32,
            emergency_vehicles: 1,
            high_congestion,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn set_strategy(&mut self, strategy: Strategy) -> &Settings {
        self.settings = Settings {
            strategy,
            last_updated: Some(now_secs()),
        };
        &self.settings
    }

    /// Switch the named intersection's phase. Returns `false` for an unknown id.
    pub fn apply(&mut self, action: &ControlAction) -> bool {
        match self.nodes.iter_mut().find(|n| n.id == action.intersection) {
            Some(node) => {
                node.command = action.action;
                true
            }
            None => false,
        }
    }
}

/// Map a requested strategy name onto the two supported modes.
pub fn parse_strategy(name: &str) -> Option<Strategy> {
    match name.trim().to_ascii_lowercase().as_str() {
        "ai" | "rl" | "adaptive" => Some(Strategy::Ai),
        "manual" | "rule_based" => Some(Strategy::Manual),
        _ => None,
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fixed_intersections_and_phase_signals() {
        let mut world = World::new();
        let state = world.advance();
        let a1 = state.intersection("A1").unwrap();
        assert_eq!(a1.position, Vec2::new(100.0, 200.0));
        assert_eq!(a1.phase, 0);
        assert_eq!(a1.signal(Direction::North), Some(streaming::SignalColor::Green));
        assert_eq!(a1.signal(Direction::East), Some(streaming::SignalColor::Red));
        assert_eq!(state.intersection("B2").unwrap().position, Vec2::new(300.0, 420.0));
        assert_eq!(state.edges.len(), 3);
    }

    #[test]
    fn vehicles_move_between_reads() {
        let mut world = World::new();
        let first = world.advance();
        let second = world.advance();
        assert_ne!(first.vehicles[0].position, second.vehicles[0].position);
        assert_eq!(world.tick(), 2);
    }

    #[test]
    fn control_switches_phase() {
        let mut world = World::new();
        assert!(world.apply(&ControlAction::new("B2", SignalCommand::AllRed)));
        let state = world.advance();
        let b2 = state.intersection("B2").unwrap();
        assert_eq!(b2.phase, 2);
        assert!(b2.signals.values().all(|&c| c == streaming::SignalColor::Red));
        assert!(!world.apply(&ControlAction::new("Z9", SignalCommand::AllRed)));
    }

    #[test]
    fn strategy_names_collapse_to_two_modes() {
        assert_eq!(parse_strategy("adaptive"), Some(Strategy::Ai));
        assert_eq!(parse_strategy("RL"), Some(Strategy::Ai));
        assert_eq!(parse_strategy("rule_based"), Some(Strategy::Manual));
        assert_eq!(parse_strategy("chaos"), None);
    }

    #[test]
    fn metrics_congestion_is_normalized() {
        let m = World::new().metrics();
        assert_eq!(m.congestion_index, 19.7 / 60.0);
        assert_eq!(m.total_processed, 1300);
    }
}
