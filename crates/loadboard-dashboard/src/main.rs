//! `loadboard` ice loading dashboard
//!
//! Standalone front end for the dashboard aggregator: watches the backend and
//! prints the dashboard on every change, prints a one-off snapshot, or prints
//! the list action behind a tile.

#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use loadboard_core::{DashboardConfig, LoadingState, StatTile, init_logging};
use loadboard_dashboard::presentation::format_weight;
use loadboard_dashboard::{
    DashboardController, DashboardError, DashboardResult, DashboardState, JsonRpcQueryService,
    ListAction, NavigationService, Phase, RealtimeBridge, Services, TracingNotifier, UpdatePoller,
};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command line interface for the loading dashboard
#[derive(Parser)]
#[command(
    name = "loadboard",
    version = env!("CARGO_PKG_VERSION"),
    about = "Ice loading operations dashboard",
    long_about = "Aggregates loading request and fleet statistics from the backend into a live dashboard: tile counters, state and priority distributions, load totals and recent activity."
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable structured JSON logging
    #[arg(long)]
    json_logs: bool,

    /// First dispatch day (YYYY-MM-DD)
    #[arg(long, value_name = "DAY", global = true)]
    start: Option<String>,

    /// Last dispatch day (YYYY-MM-DD)
    #[arg(long, value_name = "DAY", global = true)]
    end: Option<String>,

    /// Do not restrict requests to today when no day is given
    #[arg(long, global = true)]
    all_dates: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand)]
enum Commands {
    /// Keep the dashboard current and print it on every change
    Watch {
        /// Print the state as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load the dashboard once and print it
    Snapshot {
        /// Print the state as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the list action behind a tile
    Open {
        /// Tile key, e.g. `urgent_requests`
        #[arg(value_name = "TILE")]
        tile: StatTile,
    },

    /// Print the list action for the requests in one state
    OpenState {
        /// State code, e.g. `ready_for_loading`
        #[arg(value_name = "STATE")]
        state: String,
    },

    /// Validate configuration
    Config {
        /// Show resolved configuration
        #[arg(short, long)]
        show: bool,
    },
}

/// Navigation target printing the action for the host to open
#[derive(Debug, Clone, Copy)]
struct StdoutNavigator;

impl NavigationService for StdoutNavigator {
    fn open_filtered_list(&self, action: ListAction) {
        let window = action.to_act_window();
        println!(
            "{}",
            serde_json::to_string_pretty(&window).unwrap_or_else(|_| window.to_string())
        );
    }
}

#[tokio::main]
async fn main() -> DashboardResult<()> {
    // Load .env file if it exists (for development convenience)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Note: .env file not loaded: {e}");
    }

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = %config.backend.url,
        "Loading dashboard starting"
    );

    match cli.command {
        Some(Commands::Watch { json }) => watch(&config, json).await,
        Some(Commands::Snapshot { json }) => snapshot(&config, json).await,
        Some(Commands::Open { tile }) => {
            build_controller(&config, Arc::new(StdoutNavigator))?.open_tile(tile);
            Ok(())
        }
        Some(Commands::OpenState { state }) => {
            build_controller(&config, Arc::new(StdoutNavigator))?
                .open_state(&LoadingState::from_code(&state));
            Ok(())
        }
        Some(Commands::Config { show }) => handle_config_command(&config, show),
        None => watch(&config, false).await,
    }
}

/// Load configuration from file or environment and apply CLI overrides
fn load_config(cli: &Cli) -> DashboardResult<DashboardConfig> {
    let mut config = match cli.config.as_deref() {
        Some(path) => load_config_file(path)?,
        None => DashboardConfig::load()?,
    };

    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    if cli.json_logs {
        config.logging.format = "json".to_string();
    }
    if cli.start.is_some() || cli.end.is_some() {
        config.range.start_date.clone_from(&cli.start);
        config.range.end_date.clone_from(&cli.end);
    }
    if cli.all_dates {
        config.range.unbounded = true;
    }

    config.validate()?;
    Ok(config)
}

fn load_config_file(path: &Path) -> DashboardResult<DashboardConfig> {
    eprintln!("Loading configuration from: {}", path.display());
    Ok(DashboardConfig::from_toml_file(path)?)
}

fn build_controller(
    config: &DashboardConfig,
    navigation: Arc<dyn NavigationService>,
) -> DashboardResult<DashboardController> {
    let services = Services {
        query: Arc::new(JsonRpcQueryService::new(&config.backend)?),
        navigation,
        notifications: Arc::new(TracingNotifier),
    };
    DashboardController::new(services, config)
}

/// Run the dashboard until Ctrl+C
async fn watch(config: &DashboardConfig, json: bool) -> DashboardResult<()> {
    let controller = build_controller(config, Arc::new(StdoutNavigator))?;
    let mut updates = controller.subscribe();
    controller.activate().await?;

    let token = CancellationToken::new();
    let realtime = start_realtime(&controller, config, token.clone())?;
    info!("Dashboard is running. Press Ctrl+C to stop.");

    print_state(&updates.borrow_and_update().clone(), json)?;
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down gracefully");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                if state.phase != Phase::Refreshing {
                    print_state(&state, json)?;
                }
            }
        }
    }

    token.cancel();
    for task in realtime {
        if let Err(e) = task.await {
            warn!(error = %e, "Realtime task ended abnormally");
        }
    }
    controller.shutdown().await;
    Ok(())
}

fn start_realtime(
    controller: &DashboardController,
    config: &DashboardConfig,
    token: CancellationToken,
) -> DashboardResult<Vec<JoinHandle<()>>> {
    let realtime = &config.realtime;
    if realtime.uses_bus() {
        warn!("Bus updates need an embedding host; the standalone dashboard only polls");
    }
    if !realtime.uses_poll() {
        return Ok(Vec::new());
    }

    let poller = UpdatePoller::new(
        &config.backend.url,
        &realtime.updates_path,
        config.backend.timeout(),
    )?
    .with_session(config.backend.session_id.clone());
    info!(path = %realtime.updates_path, "Polling backend for updates");

    RealtimeBridge::new(controller.clone(), realtime.clone())
        .with_poller(poller)
        .spawn(token)
}

/// Load once, print, and stop
async fn snapshot(config: &DashboardConfig, json: bool) -> DashboardResult<()> {
    let controller = build_controller(config, Arc::new(StdoutNavigator))?;
    controller.activate().await?;
    let state = controller.state();
    controller.shutdown().await;

    print_state(&state, json)?;
    match state.error {
        Some(message) if !state.is_loaded() => Err(DashboardError::backend(message)),
        _ => Ok(()),
    }
}

fn print_state(state: &DashboardState, json: bool) -> DashboardResult<()> {
    if json {
        println!("{}", serde_json::to_string(state)?);
    } else {
        println!("{}", render(state));
    }
    Ok(())
}

/// Plain text rendering of the dashboard
fn render(state: &DashboardState) -> String {
    let mut out = String::new();
    let day = |d: Option<chrono::NaiveDate>| d.map_or_else(|| "any".to_string(), |d| d.to_string());

    let _ = writeln!(
        out,
        "Loading dashboard [{} .. {}] {:?}",
        day(state.range.start()),
        day(state.range.end()),
        state.phase
    );
    if let Some(error) = &state.error {
        let _ = writeln!(out, "  ! {error}");
    }
    if !state.is_loaded() {
        return out;
    }

    for tile in StatTile::ALL {
        if let Some(count) = state.stats.tile(tile) {
            let _ = writeln!(out, "  {:<26}{count:>6}", tile.label());
        }
    }

    let _ = writeln!(
        out,
        "Load: {} total, {} average over {} requests",
        format_weight(state.weights.total),
        format_weight(state.weights.average),
        state.weights.requests
    );

    let _ = writeln!(out, "By state:");
    for entry in &state.state_distribution {
        let _ = writeln!(out, "  {:<26}{:>6}", entry.label, entry.count);
    }
    let _ = writeln!(out, "By priority:");
    for entry in &state.priority_distribution {
        let _ = writeln!(out, "  {:<26}{:>6}", entry.label, entry.count);
    }

    let _ = writeln!(out, "Recent:");
    for request in &state.recent {
        let car = request.car_id.as_ref().map_or_else(
            || "-".to_string(),
            |car| match car.status_label.as_str() {
                "" => car.name.clone(),
                status => format!("{} ({status})", car.name),
            },
        );
        let _ = writeln!(
            out,
            "  {} {} {:<16}{:<22}{:<10}{:<28}{:<20}{:>4}%  {} {}",
            request.priority_icon,
            request.state_icon,
            request.name,
            request.state_label,
            request.priority_label,
            car,
            request.progress_text(),
            request.efficiency,
            request.dispatch_time_formatted,
            request.dispatch_day
        );
    }
    out
}

/// Handle configuration commands
fn handle_config_command(config: &DashboardConfig, show: bool) -> DashboardResult<()> {
    let range = config.range.resolve()?;
    info!(
        start = ?range.start(),
        end = ?range.end(),
        tiles = config.tiles.len(),
        "Configuration is valid"
    );

    if show {
        let config_toml = toml::to_string_pretty(config).map_err(|e| {
            loadboard_core::Error::configuration(format!("Failed to serialize configuration: {e}"))
        })?;
        println!("{config_toml}");
    }
    Ok(())
}
