mod hud;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use layers::svg::{self, Hud};
use layers::{compose, Frame, Palette, Projector, Viewport};
use streaming::{
    ControlAction, DashboardSummary, Fault, HttpProvider, SignalCommand, Snapshot, Strategy,
    SyncConfig, SyncListener, Synchronizer,
};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "dashboard", about = "Live traffic dashboard client")]
struct Cli {
    /// Backend root; requests go to `{base_url}/api/...`.
    #[arg(long, env = "DASHBOARD_BASE_URL", default_value = "http://127.0.0.1:8000")]
    base_url: String,

    /// Per-request timeout in milliseconds. Off (0) unless set; the transport
    /// default applies.
    #[arg(long, env = "DASHBOARD_TIMEOUT_MS", default_value_t = 0)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll the backend and redraw the network on every render tick.
    Watch(WatchArgs),
    /// Fetch everything once and write a single frame.
    Render(RenderArgs),
    /// Switch an intersection's signal phase.
    Control {
        intersection: String,
        /// NS_GREEN, NS_YELLOW, ALL_RED, EW_GREEN or EW_YELLOW.
        action: SignalCommand,
    },
    /// Set the optimization strategy.
    Strategy { mode: Mode },
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum Mode {
    Ai,
    Manual,
}

#[derive(Debug, clap::Args)]
struct ViewArgs {
    /// SVG output path.
    #[arg(long, env = "DASHBOARD_OUT", default_value = "dashboard.svg")]
    out: PathBuf,
    #[arg(long, env = "DASHBOARD_WIDTH", default_value_t = 900.0)]
    width: f64,
    #[arg(long, env = "DASHBOARD_HEIGHT", default_value_t = 600.0)]
    height: f64,
    #[arg(long, env = "DASHBOARD_PADDING", default_value_t = 40.0)]
    padding: f64,
}

impl ViewArgs {
    fn viewport(&self) -> Viewport {
        Viewport::new(self.width, self.height, self.padding)
    }
}

#[derive(Debug, clap::Args)]
struct WatchArgs {
    #[command(flatten)]
    view: ViewArgs,
    /// Live state period in milliseconds.
    #[arg(long, env = "DASHBOARD_FAST_MS", default_value_t = 400)]
    fast_ms: u64,
    /// Metrics and summary period in milliseconds.
    #[arg(long, env = "DASHBOARD_SLOW_MS", default_value_t = 2000)]
    slow_ms: u64,
    /// Redraw period in milliseconds.
    #[arg(long, env = "DASHBOARD_RENDER_MS", default_value_t = 400)]
    render_ms: u64,
    /// Exit after this many redraws.
    #[arg(long)]
    frames: Option<u64>,
}

#[derive(Debug, clap::Args)]
struct RenderArgs {
    #[command(flatten)]
    view: ViewArgs,
}

/// Logs resource-level events the render loop would otherwise only show
/// as HUD text.
struct LogListener;

impl SyncListener for LogListener {
    fn on_summary_update(&self, summary: &Arc<DashboardSummary>) {
        if summary.has_alerts() {
            warn!(
                "alerts: {} emergency vehicles, congested {:?}",
                summary.emergency_vehicles, summary.high_congestion
            );
        }
    }

    fn on_strategy_update(&self, strategy: Strategy) {
        info!("optimization strategy is {strategy}");
    }

    fn on_fault(&self, fault: &Fault) {
        warn!("{fault}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let provider = Arc::new(http_provider(&cli));

    match cli.command {
        Command::Watch(args) => {
            let config = SyncConfig::new(
                Duration::from_millis(args.fast_ms),
                Duration::from_millis(args.slow_ms),
            );
            let sync = Synchronizer::with_listener(provider, config, Arc::new(LogListener));
            watch(&sync, &args).await
        }
        Command::Render(args) => {
            let sync = Synchronizer::new(provider, SyncConfig::default());
            sync.refresh_now().await;
            let mut projector = Projector::new(args.view.viewport());
            let hud = draw(&sync.snapshot(), &mut projector, &args.view.out).await?;
            println!("{}", hud::status_line(&hud));
            Ok(())
        }
        Command::Control {
            intersection,
            action,
        } => {
            let sync = Synchronizer::new(provider, SyncConfig::default());
            let confirmed = sync
                .send_control(ControlAction::new(intersection, action))
                .await?;
            println!("{} -> {}", confirmed.intersection, confirmed.action);
            if let Some(node) = sync
                .snapshot()
                .state
                .as_ref()
                .and_then(|s| s.intersection(&confirmed.intersection))
            {
                println!("phase {} signals {:?}", node.phase, node.signals);
            }
            Ok(())
        }
        Command::Strategy { mode } => {
            let sync = Synchronizer::new(provider, SyncConfig::default());
            let strategy = sync.set_strategy(matches!(mode, Mode::Ai)).await?;
            println!("optimization strategy: {strategy}");
            Ok(())
        }
    }
}

fn http_provider(cli: &Cli) -> HttpProvider {
    let provider = HttpProvider::new(cli.base_url.as_str());
    match cli.timeout_ms {
        0 => provider,
        ms => provider.with_timeout(Duration::from_millis(ms)),
    }
}

async fn watch(sync: &Synchronizer, args: &WatchArgs) -> anyhow::Result<()> {
    let mut projector = Projector::new(args.view.viewport());
    let mut ticker = tokio::time::interval(Duration::from_millis(args.render_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    sync.start();
    info!(
        "watching {} (fast {:?}, slow {:?})",
        args.view.out.display(),
        sync.config().fast_period,
        sync.config().slow_period
    );

    let mut drawn = 0u64;
    let result = loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break Ok(());
            }
        }

        match draw(&sync.snapshot(), &mut projector, &args.view.out).await {
            Ok(hud) => info!("{}", hud::status_line(&hud)),
            Err(err) => break Err(err),
        }
        drawn += 1;
        if args.frames.is_some_and(|n| drawn >= n) {
            break Ok(());
        }
    };

    sync.stop();
    result
}

/// Compose the current snapshot and write it out. Returns the HUD it drew.
async fn draw(snapshot: &Snapshot, projector: &mut Projector, out: &Path) -> anyhow::Result<Hud> {
    let frame = match &snapshot.state {
        Some(state) => compose(state, projector),
        None => Frame::empty(projector.viewport()),
    };
    let hud = hud::build(snapshot);
    let doc = svg::render(&frame, &hud, &Palette::default());
    tokio::fs::write(out, doc)
        .await
        .with_context(|| format!("failed to write {}", out.display()))?;
    Ok(hud)
}
