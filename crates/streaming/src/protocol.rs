//! Wire contract between the dashboard and the traffic data provider.
//!
//! This module defines the payloads for:
//! - Live traffic state (intersections, vehicles, road edges)
//! - Aggregate metrics and the dashboard summary
//! - Settings (optimization strategy) and signal control actions
//!
//! Decoding is an explicit typed step: every payload is deserialized into the
//! types below and then validated. A payload with a missing field, a wrong type
//! or an out-of-range value is rejected as a whole, never patched with defaults.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use foundation::Vec2;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

/// Maximum number of points kept per metrics trend series.
pub const TREND_CAPACITY: usize = 120;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid payload: {0}")]
    Invalid(String),
    #[error("unknown signal command: {0:?}")]
    UnknownCommand(String),
    #[error("settings payload carries no recognized strategy field")]
    UnrecognizedSettings,
}

/// Post-decode checks for a payload.
pub trait Validate {
    fn validate(&self) -> Result<(), ProtocolError>;
}

/// Decode and validate a JSON payload.
pub fn decode<T>(bytes: &[u8]) -> Result<T, ProtocolError>
where
    T: DeserializeOwned + Validate,
{
    let value: T = serde_json::from_slice(bytes)?;
    value.validate()?;
    Ok(value)
}

fn invalid(msg: impl Into<String>) -> ProtocolError {
    ProtocolError::Invalid(msg.into())
}

fn check_non_negative(what: &str, v: f64) -> Result<(), ProtocolError> {
    if !v.is_finite() || v < 0.0 {
        return Err(invalid(format!("{what} must be a finite value >= 0, got {v}")));
    }
    Ok(())
}

fn check_point(what: &str, p: Vec2) -> Result<(), ProtocolError> {
    if !p.is_finite() {
        return Err(invalid(format!("{what} has a non-finite coordinate")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Directions and signals
// ---------------------------------------------------------------------------

/// Approach direction at an intersection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    pub fn short_name(self) -> &'static str {
        match self {
            Direction::North => "N",
            Direction::South => "S",
            Direction::East => "E",
            Direction::West => "W",
        }
    }

    pub fn long_name(self) -> &'static str {
        match self {
            Direction::North => "NORTH",
            Direction::South => "SOUTH",
            Direction::East => "EAST",
            Direction::West => "WEST",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for Direction {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "N" | "NORTH" => Ok(Direction::North),
            "S" | "SOUTH" => Ok(Direction::South),
            "E" | "EAST" => Ok(Direction::East),
            "W" | "WEST" => Ok(Direction::West),
            other => Err(invalid(format!("unknown direction {other:?}"))),
        }
    }
}

impl Serialize for Direction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.short_name())
    }
}

impl<'de> Deserialize<'de> for Direction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Signal state reported for one approach.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalColor {
    #[serde(alias = "green")]
    Green,
    #[serde(alias = "yellow")]
    Yellow,
    #[serde(alias = "red")]
    Red,
    /// Anything the provider reports that is not a plain color.
    #[serde(other)]
    Unknown,
}

fn serialize_long_keys<S, V>(map: &BTreeMap<Direction, V>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    V: Serialize,
{
    use serde::ser::SerializeMap;
    let mut out = serializer.serialize_map(Some(map.len()))?;
    for (dir, value) in map {
        out.serialize_entry(dir.long_name(), value)?;
    }
    out.end()
}

/// Per-direction maps accept both spellings of a key (`"N"`, `"NORTH"`), so a
/// payload naming one approach twice is ambiguous and rejected.
fn unique_direction_keys<'de, D, V>(deserializer: D) -> Result<BTreeMap<Direction, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    use serde::de::{Error, MapAccess, Visitor};
    use std::marker::PhantomData;

    struct Keys<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for Keys<V> {
        type Value = BTreeMap<Direction, V>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map keyed by direction")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut map = BTreeMap::new();
            while let Some((dir, value)) = access.next_entry::<Direction, V>()? {
                if map.insert(dir, value).is_some() {
                    return Err(A::Error::custom(format!("duplicate direction key {}", dir.long_name())));
                }
            }
            Ok(map)
        }
    }

    deserializer.deserialize_map(Keys(PhantomData))
}

// ---------------------------------------------------------------------------
// Geometry helpers
// ---------------------------------------------------------------------------

mod point {
    use foundation::Vec2;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(p: &Vec2, serializer: S) -> Result<S::Ok, S::Error> {
        <[f64; 2]>::from(*p).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec2, D::Error> {
        <[f64; 2]>::deserialize(deserializer).map(Vec2::from)
    }
}

mod polyline {
    use foundation::Vec2;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(points: &[Vec2], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(points.iter().map(|&p| <[f64; 2]>::from(p)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec2>, D::Error> {
        let raw = Vec::<[f64; 2]>::deserialize(deserializer)?;
        Ok(raw.into_iter().map(Vec2::from).collect())
    }
}

// ---------------------------------------------------------------------------
// Live state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intersection {
    pub id: String,
    #[serde(with = "point")]
    pub position: Vec2,
    #[serde(deserialize_with = "unique_direction_keys")]
    pub queues: BTreeMap<Direction, u32>,
    /// Vehicles that have cleared the intersection during this run.
    pub processed: u64,
    /// Running average wait (seconds).
    pub avg_wait: f64,
    #[serde(default)]
    pub phase: u32,
    #[serde(
        default,
        serialize_with = "serialize_long_keys",
        deserialize_with = "unique_direction_keys"
    )]
    pub signals: BTreeMap<Direction, SignalColor>,
}

impl Intersection {
    pub fn total_queue(&self) -> u64 {
        self.queues.values().map(|&n| u64::from(n)).sum()
    }

    pub fn signal(&self, dir: Direction) -> Option<SignalColor> {
        self.signals.get(&dir).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: String,
    #[serde(with = "point")]
    pub position: Vec2,
    #[serde(default)]
    pub vx: f64,
    #[serde(default)]
    pub vy: f64,
    pub lane: String,
    #[serde(default)]
    pub waiting_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadEdge {
    pub id: String,
    #[serde(with = "polyline")]
    pub shape: Vec<Vec2>,
}

fn no_edges() -> Arc<[RoadEdge]> {
    Arc::from(Vec::new())
}

/// One fast-cycle payload: the whole live network, replaced wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficState {
    #[serde(default)]
    pub timestamp: Option<f64>,
    pub intersections: Arc<[Intersection]>,
    #[serde(default)]
    pub vehicles: Vec<Vehicle>,
    #[serde(default = "no_edges")]
    pub edges: Arc<[RoadEdge]>,
}

impl TrafficState {
    pub fn new(intersections: Vec<Intersection>, vehicles: Vec<Vehicle>, edges: Vec<RoadEdge>) -> Self {
        Self {
            timestamp: None,
            intersections: Arc::from(intersections),
            vehicles,
            edges: Arc::from(edges),
        }
    }

    pub fn intersection(&self, id: &str) -> Option<&Intersection> {
        self.intersections.iter().find(|i| i.id == id)
    }
}

impl Validate for TrafficState {
    fn validate(&self) -> Result<(), ProtocolError> {
        let mut seen = HashSet::new();
        for node in self.intersections.iter() {
            if !seen.insert(node.id.as_str()) {
                return Err(invalid(format!("duplicate intersection id {:?}", node.id)));
            }
            check_point("intersection position", node.position)?;
            check_non_negative("intersection avg_wait", node.avg_wait)?;
        }
        for v in &self.vehicles {
            check_point("vehicle position", v.position)?;
            check_non_negative("vehicle waiting_time", v.waiting_time)?;
        }
        for edge in self.edges.iter() {
            for p in &edge.shape {
                check_point("edge shape", *p)?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Metrics and summary
// ---------------------------------------------------------------------------

fn bounded_series<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<f64>>, D::Error> {
    let mut raw = Vec::<f64>::deserialize(deserializer)?;
    if raw.len() > TREND_CAPACITY {
        raw.drain(..raw.len() - TREND_CAPACITY);
    }
    Ok(Some(raw))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub avg_wait_time: f64,
    pub total_processed: u64,
    pub throughput: f64,
    /// Normalized congestion in `[0, 1]`.
    pub congestion_index: f64,
    pub optimization_strategy: String,
    #[serde(default, deserialize_with = "bounded_series", skip_serializing_if = "Option::is_none")]
    pub wait_time_history: Option<Vec<f64>>,
    #[serde(default, deserialize_with = "bounded_series", skip_serializing_if = "Option::is_none")]
    pub throughput_history: Option<Vec<f64>>,
}

impl Validate for MetricsSnapshot {
    fn validate(&self) -> Result<(), ProtocolError> {
        check_non_negative("avg_wait_time", self.avg_wait_time)?;
        check_non_negative("throughput", self.throughput)?;
        if !(0.0..=1.0).contains(&self.congestion_index) {
            return Err(invalid(format!(
                "congestion_index must lie in [0, 1], got {}",
                self.congestion_index
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[serde(alias = "live")]
    Running,
    #[serde(alias = "stopped")]
    Idle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub status: RunStatus,
    pub intersections: u32,
    #[serde(default)]
    pub vehicles: u32,
    #[serde(default)]
    pub emergency_vehicles: u32,
    /// Intersections currently flagged as heavily congested.
    #[serde(default)]
    pub high_congestion: Vec<String>,
}

impl DashboardSummary {
    pub fn has_alerts(&self) -> bool {
        self.emergency_vehicles > 0 || !self.high_congestion.is_empty()
    }
}

impl Validate for DashboardSummary {
    fn validate(&self) -> Result<(), ProtocolError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Strategy {
    Ai,
    Manual,
}

impl Strategy {
    pub fn from_enabled(ai_enabled: bool) -> Self {
        if ai_enabled { Strategy::Ai } else { Strategy::Manual }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Ai => "ai",
            Strategy::Manual => "manual",
        }
    }

    pub fn is_ai(self) -> bool {
        self == Strategy::Ai
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical settings field, used for every outbound write.
pub const STRATEGY_FIELD: &str = "optimization_strategy";

const LEGACY_NAME_FIELDS: [&str; 2] = ["strategy", "mode"];
const LEGACY_FLAG_FIELDS: [&str; 4] = ["ai_enabled", "aiEnabled", "ai_mode", "aiMode"];

/// Compatibility shim for the provider's settings shape.
///
/// Upstream has reported the strategy under several keys over time. The
/// canonical key is [`STRATEGY_FIELD`]; `strategy`/`mode` (names) and the
/// `ai_enabled` family (booleans) are accepted here and nowhere else.
/// A truthy flag or a name starting with `ai` means AI mode. A payload with
/// none of these keys, or with one of them holding the wrong type, is rejected.
pub fn normalize_strategy(settings: &Value) -> Result<Strategy, ProtocolError> {
    let Some(obj) = settings.as_object() else {
        return Err(invalid("settings payload is not an object"));
    };

    let mut recognized = false;
    let mut ai = false;

    for key in std::iter::once(STRATEGY_FIELD).chain(LEGACY_NAME_FIELDS) {
        let Some(v) = obj.get(key) else {
            continue;
        };
        let name = v
            .as_str()
            .ok_or_else(|| invalid(format!("settings field {key:?} must be a string")))?;
        recognized = true;
        ai |= name.trim().to_ascii_lowercase().starts_with("ai");
    }

    for key in LEGACY_FLAG_FIELDS {
        let Some(v) = obj.get(key) else {
            continue;
        };
        let flag = v
            .as_bool()
            .ok_or_else(|| invalid(format!("settings field {key:?} must be a boolean")))?;
        recognized = true;
        ai |= flag;
    }

    if !recognized {
        return Err(ProtocolError::UnrecognizedSettings);
    }
    Ok(Strategy::from_enabled(ai))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub strategy: Strategy,
    pub last_updated: Option<f64>,
}

impl Settings {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            last_updated: None,
        }
    }

    pub fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        let strategy = normalize_strategy(value)?;
        let last_updated = value.get("last_updated").and_then(Value::as_f64);
        Ok(Self {
            strategy,
            last_updated,
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(&value)
    }

    /// Decode the `{"status": ..., "current": {...}}` reply to a settings write.
    pub fn decode_update_reply(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_slice(bytes)?;
        let current = value
            .get("current")
            .ok_or_else(|| invalid("settings reply is missing \"current\""))?;
        Self::from_value(current)
    }
}

impl Serialize for Settings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut out = serializer.serialize_map(None)?;
        out.serialize_entry(STRATEGY_FIELD, self.strategy.as_str())?;
        if let Some(ts) = self.last_updated {
            out.serialize_entry("last_updated", &ts)?;
        }
        out.end()
    }
}

/// Body of a settings write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub optimization_strategy: String,
}

impl SettingsUpdate {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            optimization_strategy: strategy.as_str().to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Control
// ---------------------------------------------------------------------------

/// Phase commands accepted by the signal controller.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalCommand {
    NsGreen,
    NsYellow,
    AllRed,
    EwGreen,
    EwYellow,
}

impl SignalCommand {
    pub const ALL: [SignalCommand; 5] = [
        SignalCommand::NsGreen,
        SignalCommand::NsYellow,
        SignalCommand::AllRed,
        SignalCommand::EwGreen,
        SignalCommand::EwYellow,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SignalCommand::NsGreen => "NS_GREEN",
            SignalCommand::NsYellow => "NS_YELLOW",
            SignalCommand::AllRed => "ALL_RED",
            SignalCommand::EwGreen => "EW_GREEN",
            SignalCommand::EwYellow => "EW_YELLOW",
        }
    }

    /// Controller phase index for this command.
    pub fn phase_index(self) -> u32 {
        match self {
            SignalCommand::NsGreen => 0,
            SignalCommand::NsYellow => 1,
            SignalCommand::AllRed => 2,
            SignalCommand::EwGreen => 3,
            SignalCommand::EwYellow => 4,
        }
    }

    /// Color each approach shows while this phase is active.
    pub fn signal_for(self, dir: Direction) -> SignalColor {
        let north_south = matches!(dir, Direction::North | Direction::South);
        match (self, north_south) {
            (SignalCommand::NsGreen, true) | (SignalCommand::EwGreen, false) => SignalColor::Green,
            (SignalCommand::NsYellow, true) | (SignalCommand::EwYellow, false) => SignalColor::Yellow,
            _ => SignalColor::Red,
        }
    }
}

impl fmt::Display for SignalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalCommand {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace('-', "_");
        SignalCommand::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| ProtocolError::UnknownCommand(s.to_string()))
    }
}

/// Operator (or agent) request to switch an intersection's phase.
///
/// The provider echoes the accepted action back as its confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlAction {
    #[serde(alias = "intersectionId", alias = "intersection_id")]
    pub intersection: String,
    pub action: SignalCommand,
}

impl ControlAction {
    pub fn new(intersection: impl Into<String>, action: SignalCommand) -> Self {
        Self {
            intersection: intersection.into(),
            action,
        }
    }
}

impl Validate for ControlAction {
    fn validate(&self) -> Result<(), ProtocolError> {
        if self.intersection.trim().is_empty() {
            return Err(invalid("control action has an empty intersection id"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn state_json() -> Value {
        json!({
            "timestamp": 12.5,
            "intersections": [
                {
                    "id": "A1",
                    "position": [100.0, 200.0],
                    "queues": {"N": 5, "S": 3, "E": 4, "W": 2},
                    "processed": 120,
                    "avg_wait": 22.3,
                    "phase": 3,
                    "signals": {"NORTH": "RED", "SOUTH": "RED", "EAST": "GREEN", "WEST": "GrGr"}
                }
            ],
            "vehicles": [
                {"id": "v0", "position": [110.0, 205.0], "vx": 1.0, "vy": 0.0, "lane": "e2c_0", "waiting_time": 0.0}
            ],
            "edges": [
                {"id": "n2c", "shape": [[100.0, 400.0], [100.0, 200.0]]}
            ]
        })
    }

    fn decode_value<T: DeserializeOwned + Validate>(v: Value) -> Result<T, ProtocolError> {
        decode(&serde_json::to_vec(&v).unwrap())
    }

    #[test]
    fn decodes_full_state() {
        let state: TrafficState = decode_value(state_json()).unwrap();
        let a1 = state.intersection("A1").unwrap();
        assert_eq!(a1.position, Vec2::new(100.0, 200.0));
        assert_eq!(a1.total_queue(), 14);
        assert_eq!(a1.phase, 3);
        assert_eq!(a1.signal(Direction::East), Some(SignalColor::Green));
        assert_eq!(a1.signal(Direction::West), Some(SignalColor::Unknown));
        assert_eq!(state.vehicles[0].lane, "e2c_0");
        assert_eq!(state.edges[0].shape.len(), 2);
    }

    #[test]
    fn state_without_vehicles_or_edges_is_accepted() {
        let mut v = state_json();
        v.as_object_mut().unwrap().remove("vehicles");
        v.as_object_mut().unwrap().remove("edges");
        let state: TrafficState = decode_value(v).unwrap();
        assert!(state.vehicles.is_empty());
        assert!(state.edges.is_empty());
    }

    #[test]
    fn state_missing_intersections_is_rejected() {
        let err = decode_value::<TrafficState>(json!({"vehicles": []})).unwrap_err();
        assert!(matches!(err, ProtocolError::Json(_)));
    }

    #[test]
    fn duplicate_intersection_ids_are_rejected() {
        let mut v = state_json();
        let node = v["intersections"][0].clone();
        v["intersections"].as_array_mut().unwrap().push(node);
        let err = decode_value::<TrafficState>(v).unwrap_err();
        assert!(err.to_string().contains("duplicate intersection id"));
    }

    #[test]
    fn negative_queue_counts_are_rejected() {
        let mut v = state_json();
        v["intersections"][0]["queues"]["N"] = json!(-1);
        assert!(decode_value::<TrafficState>(v).is_err());
    }

    #[test]
    fn both_spellings_of_one_direction_are_rejected() {
        let mut v = state_json();
        v["intersections"][0]["queues"] = json!({"N": 1, "NORTH": 2});
        let err = decode_value::<TrafficState>(v).unwrap_err();
        assert!(matches!(err, ProtocolError::Json(_)));
        assert!(err.to_string().contains("duplicate direction key NORTH"), "{err}");

        let mut v = state_json();
        v["intersections"][0]["signals"] = json!({"NORTH": "GREEN", "n": "RED"});
        let err = decode_value::<TrafficState>(v).unwrap_err();
        assert!(err.to_string().contains("duplicate direction key NORTH"), "{err}");
    }

    #[test]
    fn signals_may_be_omitted() {
        let mut v = state_json();
        v["intersections"][0].as_object_mut().unwrap().remove("signals");
        let state: TrafficState = decode_value(v).unwrap();
        assert!(state.intersections[0].signals.is_empty());
    }

    #[test]
    fn signals_serialize_with_long_keys() {
        let state: TrafficState = decode_value(state_json()).unwrap();
        let out = serde_json::to_value(&state.intersections[0]).unwrap();
        assert_eq!(out["signals"]["EAST"], json!("GREEN"));
        assert_eq!(out["queues"]["N"], json!(5));
        assert_eq!(out["position"], json!([100.0, 200.0]));
        let edge = serde_json::to_value(&state.edges[0]).unwrap();
        assert_eq!(edge["shape"], json!([[100.0, 400.0], [100.0, 200.0]]));
    }

    #[test]
    fn metrics_trends_are_bounded() {
        let history: Vec<f64> = (0..(TREND_CAPACITY + 30)).map(|i| i as f64).collect();
        let m: MetricsSnapshot = decode_value(json!({
            "avg_wait_time": 23.3,
            "total_processed": 1300,
            "throughput": 240,
            "congestion_index": 0.39,
            "optimization_strategy": "adaptive",
            "wait_time_history": history,
        }))
        .unwrap();
        let wait = m.wait_time_history.unwrap();
        assert_eq!(wait.len(), TREND_CAPACITY);
        assert_eq!(wait[0], 30.0);
        assert_eq!(m.throughput_history, None);
    }

    #[test]
    fn congestion_outside_unit_range_is_rejected() {
        let err = decode_value::<MetricsSnapshot>(json!({
            "avg_wait_time": 1.0,
            "total_processed": 1,
            "throughput": 1,
            "congestion_index": 1.5,
            "optimization_strategy": "ai",
        }))
        .unwrap_err();
        assert!(err.to_string().contains("congestion_index"));
    }

    #[test]
    fn summary_accepts_live_and_rejects_unknown_status() {
        let s: DashboardSummary = decode_value(json!({
            "status": "live",
            "intersections": 4,
            "emergency_vehicles": 1
        }))
        .unwrap();
        assert_eq!(s.status, RunStatus::Running);
        assert!(s.has_alerts());

        assert!(decode_value::<DashboardSummary>(json!({"status": "paused", "intersections": 4})).is_err());
    }

    #[test]
    fn strategy_shim_handles_variants() {
        let cases = [
            (json!({"optimization_strategy": "ai"}), Strategy::Ai),
            (json!({"optimization_strategy": "manual"}), Strategy::Manual),
            (json!({"strategy": "AI_adaptive"}), Strategy::Ai),
            (json!({"mode": "rule_based"}), Strategy::Manual),
            (json!({"aiEnabled": true}), Strategy::Ai),
            (json!({"ai_mode": false, "strategy": "manual"}), Strategy::Manual),
            (json!({"optimization_strategy": "manual", "ai_enabled": true}), Strategy::Ai),
        ];
        for (value, want) in cases {
            assert_eq!(normalize_strategy(&value).unwrap(), want, "{value}");
        }
    }

    #[test]
    fn strategy_shim_fails_closed() {
        assert!(matches!(
            normalize_strategy(&json!({"last_updated": 1.0})),
            Err(ProtocolError::UnrecognizedSettings)
        ));
        assert!(normalize_strategy(&json!({"ai_enabled": "yes"})).is_err());
        assert!(normalize_strategy(&json!(["ai"])).is_err());
    }

    #[test]
    fn settings_update_reply_reads_current() {
        let reply = json!({"status": "ok", "current": {"optimization_strategy": "ai", "last_updated": 5.0}});
        let s = Settings::decode_update_reply(&serde_json::to_vec(&reply).unwrap()).unwrap();
        assert_eq!(s.strategy, Strategy::Ai);
        assert_eq!(s.last_updated, Some(5.0));
        assert_eq!(
            serde_json::to_value(&s).unwrap(),
            json!({"optimization_strategy": "ai", "last_updated": 5.0})
        );
    }

    #[test]
    fn signal_commands_parse_and_map_to_phases() {
        assert_eq!("ew_green".parse::<SignalCommand>().unwrap(), SignalCommand::EwGreen);
        assert_eq!("ALL-RED".parse::<SignalCommand>().unwrap().phase_index(), 2);
        assert!(matches!(
            "GREEN".parse::<SignalCommand>(),
            Err(ProtocolError::UnknownCommand(_))
        ));
        assert_eq!(SignalCommand::NsGreen.signal_for(Direction::South), SignalColor::Green);
        assert_eq!(SignalCommand::NsGreen.signal_for(Direction::East), SignalColor::Red);
        assert_eq!(SignalCommand::EwYellow.signal_for(Direction::West), SignalColor::Yellow);
    }

    #[test]
    fn control_action_accepts_camel_case_id() {
        let a: ControlAction = decode_value(json!({"intersectionId": "B2", "action": "NS_YELLOW"})).unwrap();
        assert_eq!(a, ControlAction::new("B2", SignalCommand::NsYellow));
        assert!(decode_value::<ControlAction>(json!({"intersection": " ", "action": "ALL_RED"})).is_err());
    }
}
