use streaming::SignalColor;

/// Totals above this are drawn as heavily congested.
pub const HIGH_QUEUE_ABOVE: u64 = 20;
/// Totals above this (and not above [`HIGH_QUEUE_ABOVE`]) are drawn as busy.
pub const MEDIUM_QUEUE_ABOVE: u64 = 10;

/// Congestion bucket for an intersection's summed queue length.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueueTier {
    Low,
    Medium,
    High,
}

impl QueueTier {
    pub fn from_total(total: u64) -> Self {
        if total > HIGH_QUEUE_ABOVE {
            QueueTier::High
        } else if total > MEDIUM_QUEUE_ABOVE {
            QueueTier::Medium
        } else {
            QueueTier::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueueTier::Low => "low",
            QueueTier::Medium => "medium",
            QueueTier::High => "high",
        }
    }
}

/// Lamp color for a reported signal. Missing or unrecognized reports are red.
pub fn lamp_color(reported: Option<SignalColor>) -> SignalColor {
    match reported {
        Some(SignalColor::Green) => SignalColor::Green,
        Some(SignalColor::Yellow) => SignalColor::Yellow,
        _ => SignalColor::Red,
    }
}

/// Heading of a velocity in degrees, counterclockwise from +x.
///
/// Returns 0 when the angle is undefined (non-finite components).
pub fn heading_degrees(vx: f64, vy: f64) -> f64 {
    let deg = vy.atan2(vx).to_degrees();
    if deg.is_finite() { deg } else { 0.0 }
}

/// Straight-alpha RGBA.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Rgba(pub [f32; 4]);

impl Rgba {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self([r, g, b, a])
    }

    pub fn alpha(self) -> f32 {
        self.0[3]
    }

    /// `#rrggbb`; alpha is emitted separately as an opacity attribute.
    pub fn hex(self) -> String {
        let [r, g, b, _] = self.0.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        format!("#{r:02x}{g:02x}{b:02x}")
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Palette {
    pub background: Rgba,
    pub edge: Rgba,
    /// Body of an intersection marker; the queue tier is drawn as its ring.
    pub node_fill: Rgba,
    pub tier_low: Rgba,
    pub tier_medium: Rgba,
    pub tier_high: Rgba,
    pub lamp_green: Rgba,
    pub lamp_yellow: Rgba,
    pub lamp_red: Rgba,
    pub vehicle: Rgba,
    pub text: Rgba,
}

impl Palette {
    pub fn tier(&self, tier: QueueTier) -> Rgba {
        match tier {
            QueueTier::Low => self.tier_low,
            QueueTier::Medium => self.tier_medium,
            QueueTier::High => self.tier_high,
        }
    }

    pub fn lamp(&self, color: SignalColor) -> Rgba {
        match color {
            SignalColor::Green => self.lamp_green,
            SignalColor::Yellow => self.lamp_yellow,
            SignalColor::Red | SignalColor::Unknown => self.lamp_red,
        }
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            background: Rgba::new(0.07, 0.09, 0.12, 1.0),
            edge: Rgba::new(0.45, 0.5, 0.58, 0.9),
            node_fill: Rgba::new(0.16, 0.18, 0.22, 1.0),
            tier_low: Rgba::new(0.22, 0.74, 0.42, 1.0),
            tier_medium: Rgba::new(0.96, 0.66, 0.16, 1.0),
            tier_high: Rgba::new(0.9, 0.22, 0.2, 1.0),
            lamp_green: Rgba::new(0.1, 0.85, 0.3, 1.0),
            lamp_yellow: Rgba::new(1.0, 0.85, 0.1, 1.0),
            lamp_red: Rgba::new(0.95, 0.15, 0.15, 1.0),
            vehicle: Rgba::new(0.55, 0.78, 1.0, 1.0),
            text: Rgba::new(0.92, 0.94, 0.96, 1.0),
        }
    }
}
