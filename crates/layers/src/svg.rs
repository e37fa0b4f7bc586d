//! Standalone SVG output for a composed [`Frame`].

use std::fmt::Write;

use foundation::Vec2;

use crate::overlay::{Frame, NodeGlyph, VehicleGlyph};
use crate::symbology::{Palette, Rgba};

const NODE_RADIUS: f64 = 9.0;
const LAMP_RADIUS: f64 = 4.0;

/// Screen coordinate written to two decimals, so float noise from the
/// projection (`859.9999999999999`) comes out as `860`.
#[derive(Debug, Copy, Clone)]
struct Px(f64);

impl std::fmt::Display for Px {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let v = (self.0 * 100.0).round() / 100.0;
        // Avoid "-0".
        let v = if v == 0.0 { 0.0 } else { v };
        write!(f, "{v}")
    }
}

/// Text drawn over the network: status lines top-left, an optional warning
/// banner across the bottom.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hud {
    pub lines: Vec<String>,
    pub banner: Option<String>,
}

pub fn render(frame: &Frame, hud: &Hud, palette: &Palette) -> String {
    let vp = frame.viewport();
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_document(&mut out, frame, hud, palette, vp.width, vp.height);
    out
}

fn write_document(
    out: &mut String,
    frame: &Frame,
    hud: &Hud,
    palette: &Palette,
    width: f64,
    height: f64,
) -> std::fmt::Result {
    writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
    )?;
    writeln!(out, r#"<rect width="100%" height="100%" {}/>"#, fill(palette.background))?;

    writeln!(out, r#"<g class="edges">"#)?;
    for edge in &frame.edges {
        if edge.points.len() < 2 {
            continue;
        }
        writeln!(
            out,
            r#"<polyline data-id="{}" points="{}" fill="none" stroke="{}" stroke-opacity="{}" stroke-width="3"/>"#,
            escape(&edge.id),
            points_attr(&edge.points),
            palette.edge.hex(),
            palette.edge.alpha(),
        )?;
    }
    writeln!(out, "</g>")?;

    writeln!(out, r#"<g class="nodes">"#)?;
    for node in &frame.nodes {
        write_node(out, node, palette)?;
    }
    writeln!(out, "</g>")?;

    writeln!(out, r#"<g class="vehicles">"#)?;
    for v in &frame.vehicles {
        write_vehicle(out, v, palette)?;
    }
    writeln!(out, "</g>")?;

    write_hud(out, hud, palette, height)?;
    writeln!(out, "</svg>")
}

fn write_node(out: &mut String, node: &NodeGlyph, palette: &Palette) -> std::fmt::Result {
    let Vec2 { x, y } = node.center;
    let tier = palette.tier(node.tier);
    writeln!(
        out,
        r#"<g data-id="{id}" data-tier="{}"><circle cx="{}" cy="{}" r="{NODE_RADIUS}" {} stroke="{}" stroke-opacity="{}" stroke-width="3"/>"#,
        node.tier.as_str(),
        Px(x),
        Px(y),
        fill(palette.node_fill),
        tier.hex(),
        tier.alpha(),
        id = escape(&node.id),
    )?;
    for lamp in &node.lamps {
        writeln!(
            out,
            r#"<circle data-dir="{}" cx="{}" cy="{}" r="{LAMP_RADIUS}" {}/>"#,
            lamp.direction,
            Px(lamp.center.x),
            Px(lamp.center.y),
            fill(palette.lamp(lamp.color)),
        )?;
    }
    writeln!(
        out,
        r#"<text x="{}" y="{}" font-size="11" {}>{} ({})</text></g>"#,
        Px(x + NODE_RADIUS + 8.0),
        Px(y - NODE_RADIUS - 4.0),
        fill(palette.text),
        escape(&node.id),
        node.queue_total,
    )
}

fn write_vehicle(out: &mut String, v: &VehicleGlyph, palette: &Palette) -> std::fmt::Result {
    // Screen y is flipped, so a counterclockwise domain heading is a clockwise
    // screen rotation.
    writeln!(
        out,
        r#"<polygon data-id="{}" points="6,0 -4,3 -4,-3" transform="translate({} {}) rotate({})" {}/>"#,
        escape(&v.id),
        Px(v.center.x),
        Px(v.center.y),
        Px(-v.heading_deg),
        fill(palette.vehicle),
    )
}

fn write_hud(out: &mut String, hud: &Hud, palette: &Palette, height: f64) -> std::fmt::Result {
    for (i, line) in hud.lines.iter().enumerate() {
        writeln!(
            out,
            r#"<text x="12" y="{}" font-size="12" font-family="monospace" {}>{}</text>"#,
            18 + i * 16,
            fill(palette.text),
            escape(line),
        )?;
    }
    if let Some(banner) = &hud.banner {
        writeln!(
            out,
            r#"<text class="banner" x="12" y="{}" font-size="13" {}>{}</text>"#,
            Px(height - 12.0),
            fill(palette.lamp_red),
            escape(banner),
        )?;
    }
    Ok(())
}

fn fill(color: Rgba) -> String {
    format!(r#"fill="{}" fill-opacity="{}""#, color.hex(), color.alpha())
}

fn points_attr(points: &[Vec2]) -> String {
    let mut s = String::new();
    for (i, p) in points.iter().enumerate() {
        if i > 0 {
            s.push(' ');
        }
        let _ = write!(s, "{},{}", Px(p.x), Px(p.y));
    }
    s
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::compose;
    use crate::projection::{Projector, Viewport};
    use pretty_assertions::assert_eq;
    use streaming::{Direction, Intersection, RoadEdge, SignalColor, TrafficState};

    fn frame() -> Frame {
        let state = TrafficState::new(
            vec![
                Intersection {
                    id: "A<1>".into(),
                    position: Vec2::new(0.0, 0.0),
                    queues: [(Direction::North, 25)].into_iter().collect(),
                    processed: 0,
                    avg_wait: 0.0,
                    phase: 0,
                    signals: [(Direction::North, SignalColor::Green)].into_iter().collect(),
                },
                Intersection {
                    id: "B2".into(),
                    position: Vec2::new(100.0, 100.0),
                    queues: Default::default(),
                    processed: 0,
                    avg_wait: 0.0,
                    phase: 0,
                    signals: Default::default(),
                },
            ],
            vec![],
            vec![RoadEdge {
                id: "e".into(),
                shape: vec![Vec2::new(0.0, 0.0), Vec2::new(100.0, 100.0)],
            }],
        );
        compose(&state, &mut Projector::default())
    }

    #[test]
    fn renders_every_entity_and_escapes_text() {
        let hud = Hud {
            lines: vec!["strategy: ai".into()],
            banner: Some("state failed: timeout".into()),
        };
        let svg = render(&frame(), &hud, &Palette::default());

        assert!(svg.starts_with("<svg "));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert!(svg.contains(r#"points="40,560 860,40""#));
        assert!(svg.contains(r#"data-id="A&lt;1&gt;" data-tier="high""#));
        assert!(svg.contains(r#"data-id="B2" data-tier="low""#));
        // Tier is the ring; the body stays neutral.
        let palette = Palette::default();
        let high = format!(
            r#"fill="{}" fill-opacity="1" stroke="{}""#,
            palette.node_fill.hex(),
            palette.tier_high.hex()
        );
        assert!(svg.contains(&high), "{svg}");
        assert!(!svg.contains(&format!(r#"fill="{}""#, palette.tier_high.hex())));
        assert_eq!(svg.matches("data-dir=").count(), 8);
        assert!(svg.contains("strategy: ai"));
        assert!(svg.contains(r#"class="banner""#));
    }

    #[test]
    fn empty_frame_is_still_a_document() {
        let svg = render(&Frame::empty(Viewport::default()), &Hud::default(), &Palette::default());
        assert!(svg.contains(r#"viewBox="0 0 900 600""#));
        assert!(!svg.contains("<polyline"));
        assert!(!svg.contains("banner"));
    }

    #[test]
    fn coordinates_are_rounded_to_hundredths() {
        assert_eq!(Px(859.9999999999999).to_string(), "860");
        assert_eq!(Px(40.000000000000004).to_string(), "40");
        assert_eq!(Px(12.346).to_string(), "12.35");
        assert_eq!(Px(-0.001).to_string(), "0");
        assert_eq!(points_attr(&[Vec2::new(40.0, 560.0000000000001), Vec2::new(859.9999999999999, 40.0)]), "40,560 860,40");
    }

    #[test]
    fn escape_covers_markup_characters() {
        assert_eq!(escape(r#"a&b<"c">'"#), "a&amp;b&lt;&quot;c&quot;&gt;&apos;");
    }
}
