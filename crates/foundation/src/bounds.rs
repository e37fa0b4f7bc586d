use crate::math::Vec2;

/// Axis-aligned bounding box in 2D.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb2 {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb2 {
    /// Box covering a single point.
    pub fn point(p: Vec2) -> Self {
        Aabb2 { min: p, max: p }
    }

    /// Smallest box covering every finite point; `None` when there is none.
    ///
    /// Non-finite points are skipped so one bad coordinate cannot poison the
    /// whole extent.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Vec2>,
    {
        let mut out: Option<Aabb2> = None;
        for p in points.into_iter().filter(|p| p.is_finite()) {
            match out.as_mut() {
                Some(b) => b.extend(p),
                None => out = Some(Aabb2::point(p)),
            }
        }
        out
    }

    pub fn extend(&mut self, p: Vec2) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }
}
