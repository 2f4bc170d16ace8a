//! CLI entry point for mockroute.
//!
//! Serves a mock HTTP API straight from a directory tree and reloads it
//! when the tree changes.
//!
//! # Usage
//!
//! ```bash
//! mockroute [OPTIONS] <COMMAND>
//!
//! # Create ./mocks with a sample users resource
//! mockroute init
//!
//! # Serve ./mocks on port 4000 with live reload
//! mockroute serve
//!
//! # Print the route table once
//! mockroute routes --format json
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

mod scaffold;

use std::io::Write;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{WrapErr, eyre};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use mr_core::Config;
use mr_routes::{RebuildReport, RouteEngine, RouteError, RouteTable};
use mr_server::AppState;
use mr_watcher::{FileWatcher, MockTreeFilter, NoChanges, WatchLoop};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Serve a mock HTTP API from a directory of JSON files and Lua handlers.
///
/// Directories named `get`, `post`, `put` or `delete` set the method,
/// `[name]` segments capture path parameters.
#[derive(Parser)]
#[command(name = "mockroute", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file. Flags override its values.
    #[arg(short, long, global = true, env = "MOCKROUTE_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Serve the mock tree with live reload.
    Serve {
        /// Root of the mock tree.
        #[arg(short, long)]
        root: Option<Utf8PathBuf>,

        /// Port to listen on.
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        /// Address to bind to.
        #[arg(long)]
        host: Option<String>,

        /// Disable file watching (routes load once).
        #[arg(long)]
        no_watch: bool,

        /// Debounce window for file changes, in milliseconds.
        #[arg(long)]
        debounce_ms: Option<u64>,
    },

    /// Load the mock tree once and print its routes.
    Routes {
        /// Root of the mock tree.
        #[arg(short, long)]
        root: Option<Utf8PathBuf>,

        /// Output format.
        #[arg(short, long, value_enum, default_value_t = ListFormat::Text)]
        format: ListFormat,
    },

    /// Create a `mocks` directory with a sample resource.
    Init {
        /// Directory to create `mocks` in.
        #[arg(default_value = ".")]
        dir: Utf8PathBuf,
    },
}

/// Route listing format.
#[derive(Clone, Copy, ValueEnum)]
enum ListFormat {
    /// Aligned text, one route per line.
    Text,
    /// JSON document.
    Json,
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `info` level by default.
/// Noisy crates like `hyper` and `notify` are filtered to `warn` level.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},hyper=warn,mio=warn,notify=warn"))
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_ansi(use_ansi))
        .with(filter)
        .init();
}

/// Loads the configuration file if one was given, else the defaults.
fn load_config(cli: &Cli) -> color_eyre::Result<Config> {
    match &cli.config {
        Some(path) => Config::from_json_file(path)
            .wrap_err_with(|| format!("Failed to load configuration from {path}")),
        None => Ok(Config::default()),
    }
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

/// Serves the mock tree until a shutdown signal.
///
/// The first rebuild runs before the listener binds, so the server never
/// answers from an empty table it could have filled.
async fn run_serve(config: Config) -> color_eyre::Result<()> {
    config.check_mock_root()?;
    let engine = Arc::new(RouteEngine::new(&config));
    let debounce = config.watch.debounce();

    let watch = if config.watch.enabled {
        let watcher = FileWatcher::new(&config.mocks.root, &config.watch, MockTreeFilter).await?;
        info!(root = %watcher.watch_path(), debounce_ms = config.watch.debounce_ms, "Watching for changes");
        WatchLoop::spawn(Arc::clone(&engine), watcher, debounce)
    } else {
        info!("File watching disabled");
        WatchLoop::spawn(Arc::clone(&engine), NoChanges, debounce)
    };

    let report = watch
        .handle()
        .force_rebuild()
        .await
        .wrap_err("Initial route load failed")?;
    log_report(&report);

    let state = Arc::new(AppState::new(
        Arc::clone(&engine),
        watch.handle(),
        &config.server.introspection_prefix,
    ));
    let served = mr_server::start_server(&config.server, state).await;

    watch.shutdown().await?;
    served?;
    Ok(())
}

/// Runs one derivation and load pass and prints the table.
///
/// Per-entry problems are reported on stderr; only a structural failure
/// makes the command fail.
fn run_routes(config: &Config, format: ListFormat) -> color_eyre::Result<()> {
    let engine = RouteEngine::new(config);
    let report = engine.rebuild()?;
    let table = engine.table().snapshot();

    let content = match format {
        ListFormat::Text => render_text(&table),
        ListFormat::Json => render_json(&table, &report.skipped)?,
    };

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    write!(handle, "{content}")?;

    if !report.skipped.is_empty() && matches!(format, ListFormat::Text) {
        let stderr = std::io::stderr();
        let mut handle = stderr.lock();
        writeln!(handle)?;
        writeln!(handle, "Skipped ({}):", report.skipped.len())?;
        for error in &report.skipped {
            writeln!(handle, "  {error}")?;
        }
    }

    Ok(())
}

/// Writes the sample mock tree.
fn run_init(config: &Config, dir: &Utf8Path) -> color_eyre::Result<()> {
    let written = scaffold::create_mock_tree(dir, &config.handlers.script_extension)?;

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "Created example mocks for users (GET, POST, PUT, DELETE):")?;
    for path in &written {
        writeln!(handle, "  {path}")?;
    }
    writeln!(handle)?;
    writeln!(handle, "Run `mockroute serve --root {}` to start.", dir.join("mocks"))?;
    Ok(())
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

fn log_report(report: &RebuildReport) {
    info!(
        routes = report.routes,
        generation = report.generation,
        duration_ms = report.duration.as_millis(),
        "Routes loaded"
    );
    if !report.skipped.is_empty() {
        warn!(skipped = report.skipped.len(), "Some mock files were skipped");
    }
}

/// Renders the table as aligned text.
fn render_text(table: &RouteTable) -> String {
    use std::fmt::Write;

    let routes = table.describe();
    let width = routes
        .iter()
        .map(|route| route.pattern.len())
        .max()
        .unwrap_or(0);

    let mut output = String::new();
    for route in &routes {
        let _ = writeln!(
            output,
            "{:<7} {:<width$}  {:<8} {}",
            route.method.as_str(),
            route.pattern,
            route.kind.label(),
            route.source,
        );
    }
    let _ = writeln!(output, "{} route(s)", routes.len());
    output
}

/// Renders the table and skipped entries as JSON.
fn render_json(table: &RouteTable, skipped: &[RouteError]) -> color_eyre::Result<String> {
    #[derive(serde::Serialize)]
    struct Listing {
        generation: u64,
        count: usize,
        routes: Vec<mr_routes::RouteSummary>,
        skipped: Vec<String>,
    }

    let listing = Listing {
        generation: table.generation(),
        count: table.len(),
        routes: table.describe(),
        skipped: skipped.iter().map(ToString::to_string).collect(),
    };
    let mut json = serde_json::to_string_pretty(&listing)
        .map_err(|e| eyre!("Failed to serialize JSON: {e}"))?;
    json.push('\n');
    Ok(json)
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments
    let cli = Cli::parse();

    // 3. Initialize tracing (handles --no-color for log output)
    init_tracing(cli.verbose, cli.no_color);

    // 4. Layer flags over the configuration file
    let mut config = load_config(&cli)?;

    match cli.command {
        Commands::Serve {
            root,
            port,
            host,
            no_watch,
            debounce_ms,
        } => {
            if let Some(root) = root {
                config.mocks.root = root;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            if no_watch {
                config.watch.enabled = false;
            }
            if let Some(debounce_ms) = debounce_ms {
                config.watch.debounce_ms = debounce_ms;
            }
            config.validate()?;
            run_serve(config).await
        }
        Commands::Routes { root, format } => {
            if let Some(root) = root {
                config.mocks.root = root;
            }
            config.validate()?;
            run_routes(&config, format)
        }
        Commands::Init { dir } => run_init(&config, &dir),
    }
}
