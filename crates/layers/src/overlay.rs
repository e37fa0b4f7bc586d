use foundation::Vec2;
use streaming::{Direction, Intersection, SignalColor, TrafficState, Vehicle};

use crate::projection::{Projector, ViewTransform, Viewport};
use crate::symbology::{QueueTier, heading_degrees, lamp_color};

/// Screen distance from an intersection's center to each of its lamps.
pub const LAMP_OFFSET: f64 = 14.0;

/// Screen-space lamp position relative to the intersection center.
/// Screen y grows downward, so north sits above.
pub fn lamp_offset(dir: Direction) -> Vec2 {
    match dir {
        Direction::North => Vec2::new(0.0, -LAMP_OFFSET),
        Direction::South => Vec2::new(0.0, LAMP_OFFSET),
        Direction::East => Vec2::new(LAMP_OFFSET, 0.0),
        Direction::West => Vec2::new(-LAMP_OFFSET, 0.0),
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SignalLamp {
    pub direction: Direction,
    pub center: Vec2,
    pub color: SignalColor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeGlyph {
    pub id: String,
    pub center: Vec2,
    pub queue_total: u64,
    pub tier: QueueTier,
    /// Always one lamp per direction, in `Direction::ALL` order.
    pub lamps: [SignalLamp; 4],
    pub phase: u32,
    pub processed: u64,
    pub avg_wait: f64,
}

impl NodeGlyph {
    fn build(node: &Intersection, center: Vec2) -> Self {
        let queue_total = node.total_queue();
        Self {
            id: node.id.clone(),
            center,
            queue_total,
            tier: QueueTier::from_total(queue_total),
            lamps: Direction::ALL.map(|direction| SignalLamp {
                direction,
                center: center + lamp_offset(direction),
                color: lamp_color(node.signal(direction)),
            }),
            phase: node.phase,
            processed: node.processed,
            avg_wait: node.avg_wait,
        }
    }

    pub fn lamp(&self, dir: Direction) -> &SignalLamp {
        // `lamps` is built from `Direction::ALL`, whose order matches the enum.
        &self.lamps[dir as usize]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleGlyph {
    pub id: String,
    pub center: Vec2,
    /// Domain heading in degrees, counterclockwise from +x.
    pub heading_deg: f64,
    pub lane: String,
    pub waiting_time: f64,
}

impl VehicleGlyph {
    fn build(vehicle: &Vehicle, center: Vec2) -> Self {
        Self {
            id: vehicle.id.clone(),
            center,
            heading_deg: heading_degrees(vehicle.vx, vehicle.vy),
            lane: vehicle.lane.clone(),
            waiting_time: vehicle.waiting_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgePath {
    pub id: String,
    pub points: Vec<Vec2>,
}

/// Everything needed to draw one pass, already in screen space.
///
/// Draw order is edges, then intersections, then vehicles.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub transform: ViewTransform,
    pub edges: Vec<EdgePath>,
    pub nodes: Vec<NodeGlyph>,
    pub vehicles: Vec<VehicleGlyph>,
}

impl Frame {
    /// A frame with nothing to draw, shown before the first state arrives.
    pub fn empty(viewport: Viewport) -> Self {
        Self {
            transform: ViewTransform::identity(viewport),
            edges: Vec::new(),
            nodes: Vec::new(),
            vehicles: Vec::new(),
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.transform.viewport
    }

    pub fn node(&self, id: &str) -> Option<&NodeGlyph> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Project `state` and attach per-entity render rules.
pub fn compose(state: &TrafficState, projector: &mut Projector) -> Frame {
    let projection = projector.project(state);

    let edges = state
        .edges
        .iter()
        .zip(projection.edges)
        .map(|(edge, points)| EdgePath {
            id: edge.id.clone(),
            points,
        })
        .collect();
    let nodes = state
        .intersections
        .iter()
        .zip(projection.intersections)
        .map(|(node, center)| NodeGlyph::build(node, center))
        .collect();
    let vehicles = state
        .vehicles
        .iter()
        .zip(projection.vehicles)
        .map(|(v, center)| VehicleGlyph::build(v, center))
        .collect();

    Frame {
        transform: projection.transform,
        edges,
        nodes,
        vehicles,
    }
}
