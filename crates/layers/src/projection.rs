//! Domain-to-screen mapping for the network view.
//!
//! One affine transform per render pass places intersections, road shapes and
//! vehicles in a fixed-size viewport. The extent is taken over intersections and
//! edge shapes only; vehicles are expected to stay on the network and a single
//! stray vehicle must not rescale the whole frame.

use std::sync::Arc;

use foundation::{Aabb2, Vec2};
use streaming::{Intersection, RoadEdge, TrafficState};

/// Fixed-size render target with a uniform margin.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub padding: f64,
}

impl Viewport {
    pub const fn new(width: f64, height: f64, padding: f64) -> Self {
        Self {
            width,
            height,
            padding,
        }
    }

    pub fn inner_width(&self) -> f64 {
        (self.width - 2.0 * self.padding).max(0.0)
    }

    pub fn inner_height(&self) -> f64 {
        (self.height - 2.0 * self.padding).max(0.0)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(900.0, 600.0, 40.0)
    }
}

/// Per-axis affine map from domain space to screen space.
///
/// Axes scale independently: the domain is stretched to fill the padded
/// viewport rather than letterboxed. Screen y grows downward, so domain y is
/// flipped.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ViewTransform {
    pub viewport: Viewport,
    pub min: Vec2,
    pub scale_x: f64,
    pub scale_y: f64,
}

impl ViewTransform {
    /// Unit scale anchored at the origin. Used when there is no extent.
    pub fn identity(viewport: Viewport) -> Self {
        Self {
            viewport,
            min: Vec2::ZERO,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }

    /// Fit `extent` into `viewport`. A zero-size axis keeps a scale of 1.
    pub fn fit(extent: Option<Aabb2>, viewport: Viewport) -> Self {
        let Some(extent) = extent else {
            return Self::identity(viewport);
        };
        Self {
            viewport,
            min: extent.min,
            scale_x: axis_scale(extent.width(), viewport.inner_width()),
            scale_y: axis_scale(extent.height(), viewport.inner_height()),
        }
    }

    /// Fit the union of intersection positions and edge shape points.
    pub fn fit_network(intersections: &[Intersection], edges: &[RoadEdge], viewport: Viewport) -> Self {
        let points = intersections
            .iter()
            .map(|i| i.position)
            .chain(edges.iter().flat_map(|e| e.shape.iter().copied()));
        Self::fit(Aabb2::from_points(points), viewport)
    }

    pub fn project(&self, p: Vec2) -> Vec2 {
        let pad = self.viewport.padding;
        Vec2::new(
            pad + (p.x - self.min.x) * self.scale_x,
            self.viewport.height - (pad + (p.y - self.min.y) * self.scale_y),
        )
    }

    pub fn project_all(&self, points: &[Vec2]) -> Vec<Vec2> {
        points.iter().map(|&p| self.project(p)).collect()
    }
}

fn axis_scale(extent: f64, available: f64) -> f64 {
    if extent > 0.0 && extent.is_finite() {
        available / extent
    } else {
        1.0
    }
}

/// Screen-space copies of one state, index-parallel to its lists.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub transform: ViewTransform,
    pub intersections: Vec<Vec2>,
    pub vehicles: Vec<Vec2>,
    pub edges: Vec<Vec<Vec2>>,
}

#[derive(Debug)]
struct CachedTransform {
    intersections: Arc<[Intersection]>,
    edges: Arc<[RoadEdge]>,
    transform: ViewTransform,
}

/// Caches the transform between render passes.
///
/// The transform is rebuilt only when the intersection list or the edge list
/// is a different allocation from the last pass. Vehicle and signal updates
/// reuse it since they cannot move the extent.
#[derive(Debug)]
pub struct Projector {
    viewport: Viewport,
    cached: Option<CachedTransform>,
    recomputes: u64,
}

impl Projector {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            cached: None,
            recomputes: 0,
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        if viewport != self.viewport {
            self.viewport = viewport;
            self.cached = None;
        }
    }

    /// How many times the transform has been derived from scratch.
    pub fn recomputes(&self) -> u64 {
        self.recomputes
    }

    pub fn transform_for(&mut self, state: &TrafficState) -> ViewTransform {
        if let Some(c) = &self.cached {
            if Arc::ptr_eq(&c.intersections, &state.intersections) && Arc::ptr_eq(&c.edges, &state.edges) {
                return c.transform;
            }
        }

        let transform = ViewTransform::fit_network(&state.intersections, &state.edges, self.viewport);
        self.recomputes += 1;
        self.cached = Some(CachedTransform {
            intersections: Arc::clone(&state.intersections),
            edges: Arc::clone(&state.edges),
            transform,
        });
        transform
    }

    /// Project every entity of `state` without touching it.
    pub fn project(&mut self, state: &TrafficState) -> Projection {
        let transform = self.transform_for(state);
        Projection {
            transform,
            intersections: state.intersections.iter().map(|i| transform.project(i.position)).collect(),
            vehicles: state.vehicles.iter().map(|v| transform.project(v.position)).collect(),
            edges: state.edges.iter().map(|e| transform.project_all(&e.shape)).collect(),
        }
    }
}

impl Default for Projector {
    fn default() -> Self {
        Self::new(Viewport::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use streaming::Vehicle;

    fn node(id: &str, x: f64, y: f64) -> Intersection {
        Intersection {
            id: id.into(),
            position: Vec2::new(x, y),
            queues: BTreeMap::new(),
            processed: 0,
            avg_wait: 0.0,
            phase: 0,
            signals: BTreeMap::new(),
        }
    }

    fn vehicle(id: &str, x: f64, y: f64) -> Vehicle {
        Vehicle {
            id: id.into(),
            position: Vec2::new(x, y),
            vx: 0.0,
            vy: 0.0,
            lane: "l0".into(),
            waiting_time: 0.0,
        }
    }

    #[track_caller]
    fn assert_close(actual: Vec2, expected: Vec2) {
        let near = (actual.x - expected.x).abs() < 1e-9 && (actual.y - expected.y).abs() < 1e-9;
        assert!(near, "{actual:?} != {expected:?}");
    }

    fn triangle() -> TrafficState {
        TrafficState::new(
            vec![node("a", 0.0, 0.0), node("b", 100.0, 0.0), node("c", 100.0, 100.0)],
            vec![vehicle("v", 50.0, 50.0)],
            vec![RoadEdge {
                id: "diag".into(),
                shape: vec![Vec2::new(0.0, 0.0), Vec2::new(100.0, 100.0)],
            }],
        )
    }

    #[test]
    fn triangle_scenario_fills_padded_viewport() {
        let state = triangle();
        let t = ViewTransform::fit_network(&state.intersections, &state.edges, Viewport::default());
        assert_eq!(t.min, Vec2::new(0.0, 0.0));
        assert_eq!(t.scale_x, 820.0 / 100.0);
        assert_eq!(t.scale_y, 520.0 / 100.0);
        assert_ne!(t.scale_x, t.scale_y);

        assert_close(t.project(Vec2::new(0.0, 0.0)), Vec2::new(40.0, 560.0));
        assert_close(t.project(Vec2::new(100.0, 0.0)), Vec2::new(860.0, 560.0));
        assert_close(t.project(Vec2::new(100.0, 100.0)), Vec2::new(860.0, 40.0));
    }

    #[test]
    fn projected_points_stay_inside_viewport() {
        let state = TrafficState::new(
            vec![node("a", -37.5, 12.0), node("b", 410.0, -90.25), node("c", 3.0, 777.0)],
            vec![],
            vec![RoadEdge {
                id: "e".into(),
                shape: vec![Vec2::new(-120.0, 5.0), Vec2::new(15.0, 900.0), Vec2::new(500.0, -200.0)],
            }],
        );
        let vp = Viewport::new(640.0, 480.0, 24.0);
        let mut projector = Projector::new(vp);
        let proj = projector.project(&state);
        let all = proj.intersections.iter().chain(proj.edges.iter().flatten());
        for p in all {
            assert!((0.0..=vp.width).contains(&p.x), "{p:?}");
            assert!((0.0..=vp.height).contains(&p.y), "{p:?}");
        }
    }

    #[test]
    fn empty_network_projects_to_nothing() {
        let state = TrafficState::new(vec![], vec![], vec![]);
        let mut projector = Projector::default();
        let proj = projector.project(&state);
        assert_eq!(proj.transform, ViewTransform::identity(Viewport::default()));
        assert!(proj.intersections.is_empty());
        assert!(proj.edges.is_empty());
    }

    #[test]
    fn zero_height_extent_keeps_unit_vertical_scale() {
        let state = TrafficState::new(vec![node("a", 0.0, 5.0), node("b", 50.0, 5.0)], vec![], vec![]);
        let t = ViewTransform::fit_network(&state.intersections, &state.edges, Viewport::default());
        assert_eq!(t.scale_x, 820.0 / 50.0);
        assert_eq!(t.scale_y, 1.0);
        assert_close(t.project(Vec2::new(0.0, 5.0)), Vec2::new(40.0, 560.0));
    }

    #[test]
    fn fitting_is_deterministic() {
        let state = triangle();
        let a = ViewTransform::fit_network(&state.intersections, &state.edges, Viewport::default());
        let b = ViewTransform::fit_network(&state.intersections, &state.edges, Viewport::default());
        assert_eq!(a.scale_x.to_bits(), b.scale_x.to_bits());
        assert_eq!(a.scale_y.to_bits(), b.scale_y.to_bits());
        assert_eq!(a.min.x.to_bits(), b.min.x.to_bits());
        assert_eq!(a.min.y.to_bits(), b.min.y.to_bits());
    }

    #[test]
    fn edges_widen_the_extent_but_vehicles_do_not() {
        let mut state = triangle();
        state.vehicles.push(vehicle("stray", 10_000.0, -10_000.0));
        let t = Projector::default().transform_for(&state);
        assert_eq!(t.scale_x, 820.0 / 100.0);

        state.edges = Arc::from(vec![RoadEdge {
            id: "long".into(),
            shape: vec![Vec2::new(0.0, 0.0), Vec2::new(200.0, 0.0)],
        }]);
        let t = Projector::default().transform_for(&state);
        assert_eq!(t.scale_x, 820.0 / 200.0);
    }

    #[test]
    fn transform_is_reused_until_geometry_identity_changes() {
        let mut state = triangle();
        let mut projector = Projector::default();
        projector.project(&state);
        assert_eq!(projector.recomputes(), 1);

        // Vehicle movement alone reuses the transform.
        state.vehicles[0].position = Vec2::new(60.0, 40.0);
        projector.project(&state);
        assert_eq!(projector.recomputes(), 1);

        // Same values in a new allocation still count as new geometry.
        state.intersections = Arc::from(state.intersections.to_vec());
        projector.project(&state);
        assert_eq!(projector.recomputes(), 2);

        projector.set_viewport(Viewport::new(300.0, 300.0, 10.0));
        projector.project(&state);
        assert_eq!(projector.recomputes(), 3);
    }
}
