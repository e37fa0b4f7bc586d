use layers::svg::Hud;
use streaming::{RunStatus, Snapshot};

/// Text overlay for one snapshot. Each panel reads only its own resource, so a
/// stale panel keeps its last value and is marked instead of cleared.
pub fn build(snapshot: &Snapshot) -> Hud {
    let mut lines = Vec::new();

    lines.push(match snapshot.strategy {
        Some(s) => format!("strategy: {s}"),
        None => "strategy: unknown".to_string(),
    });

    let stale = if snapshot.trends_stale() { " (stale)" } else { "" };
    if let Some(m) = &snapshot.metrics {
        lines.push(format!(
            "avg wait {:.1}s | throughput {:.0} | processed {} | congestion {:.0}%{stale}",
            m.avg_wait_time,
            m.throughput,
            m.total_processed,
            m.congestion_index * 100.0,
        ));
    }
    if let Some(s) = &snapshot.summary {
        let status = match s.status {
            RunStatus::Running => "running",
            RunStatus::Idle => "idle",
        };
        let mut line = format!(
            "{status} | {} intersections | {} vehicles",
            s.intersections, s.vehicles
        );
        if s.emergency_vehicles > 0 {
            line.push_str(&format!(" | {} emergency", s.emergency_vehicles));
        }
        if !s.high_congestion.is_empty() {
            line.push_str(&format!(" | congested: {}", s.high_congestion.join(", ")));
        }
        line.push_str(stale);
        lines.push(line);
    }

    Hud {
        lines,
        banner: snapshot.last_error().map(|f| f.to_string()),
    }
}

/// Single log line for the watch loop.
pub fn status_line(hud: &Hud) -> String {
    let mut line = hud.lines.join(" || ");
    if let Some(banner) = &hud.banner {
        line.push_str(" || ERROR ");
        line.push_str(banner);
    }
    line
}
