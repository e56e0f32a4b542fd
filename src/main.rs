use std::{path::PathBuf, sync::Arc, time::Duration};

use chrono::Utc;
use clap::Parser;
use serde::Serialize;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tollgate::{
    AppState, build_app,
    config::TollgateConfig,
    db::DbPool,
    jobs,
    models::BillingPeriod,
    observability,
    services::BillingService,
    usage_buffer::UsageBuffer,
};

/// Config file looked up in the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "tollgate.toml";

/// CLI arguments for the Tollgate gateway
#[derive(Parser, Debug)]
#[command(version, about = "Tollgate multi-tenant API gateway", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to ./tollgate.toml if it exists,
    /// otherwise built-in defaults)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the gateway server (default)
    Serve,
    /// Run database migrations and exit
    Migrate,
    /// Run a billing job once and exit
    #[command(subcommand)]
    Billing(BillingCommand),
}

#[derive(clap::Subcommand, Debug)]
enum BillingCommand {
    /// Generate billing cycles for a month
    Generate {
        /// Month to bill as YYYY-MM (defaults to every unbilled month up to
        /// the previous one)
        #[arg(long)]
        period: Option<String>,
    },
    /// Mark pending zero-amount cycles paid
    Autopay,
    /// Move unpaid cycles past their grace period to overdue
    SweepOverdue,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::Migrate) => run_migrate(args.config.as_deref()).await,
        Some(Command::Billing(command)) => run_billing(args.config.as_deref(), command).await,
        Some(Command::Serve) | None => run_server(args.config.as_deref()).await,
    }
}

/// Resolve and load the configuration, exiting on failure.
fn load_config(explicit_path: Option<&str>) -> TollgateConfig {
    let path = match explicit_path {
        Some(path) => {
            let path = PathBuf::from(path);
            if !path.exists() {
                eprintln!("Error: Config file not found: {}", path.display());
                std::process::exit(1);
            }
            Some(path)
        }
        None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()),
    };

    let Some(path) = path else {
        return TollgateConfig::default();
    };
    match TollgateConfig::from_file(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn init_tracing_or_exit(config: &TollgateConfig) {
    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("Error: Failed to initialize tracing: {e}");
        std::process::exit(1);
    }
}

async fn run_server(explicit_config_path: Option<&str>) {
    let config = load_config(explicit_config_path);
    init_tracing_or_exit(&config);

    if let Err(e) = observability::metrics::init_metrics(&config.observability.metrics) {
        tracing::warn!(error = %e, "Failed to initialize metrics");
    }

    tracing::info!("Starting Tollgate");

    if config.auth.jwt_secret.is_none() {
        tracing::warn!("auth.jwt_secret is not set; dashboard routes will reject every request");
    }
    if config.database.is_none() {
        tracing::warn!(
            "No database configured; API keys cannot be resolved and billing is disabled"
        );
    }

    let state = match AppState::new(config.clone()).await {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Error: Failed to initialize application state: {e}");
            std::process::exit(1);
        }
    };

    let usage_buffer = state
        .start_usage_worker()
        .and(state.usage_buffer.clone());

    if let Some(services) = &state.services {
        state.task_tracker.spawn(jobs::start_billing_scheduler(
            services.billing.clone(),
            config.billing.scheduler.clone(),
            state.shutdown.clone(),
        ));
    }

    let task_tracker = state.task_tracker.clone();
    let shutdown = state.shutdown.clone();
    let app = build_app(state);

    let bind_addr = config.server.socket_addr();
    let listener = match tokio::net::TcpListener::bind(bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Error: Failed to bind to {bind_addr}: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on http://{}", bind_addr);

    // Graceful shutdown: wait for SIGINT/SIGTERM, then drain background tasks.
    let drain_timeout = Duration::from_secs(config.server.shutdown_timeout_secs);
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(
            task_tracker,
            shutdown,
            usage_buffer,
            drain_timeout,
        ))
        .await
    {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

async fn shutdown_signal(
    task_tracker: TaskTracker,
    shutdown: CancellationToken,
    usage_buffer: Option<Arc<UsageBuffer>>,
    drain_timeout: Duration,
) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, waiting for background tasks to complete...");

    // No new detached work; stop the scheduler and last-used worker; drain usage.
    task_tracker.close();
    shutdown.cancel();
    if let Some(buffer) = usage_buffer {
        buffer.shutdown();
    }

    match tokio::time::timeout(drain_timeout, task_tracker.wait()).await {
        Ok(()) => tracing::info!("All background tasks completed"),
        Err(_) => {
            tracing::warn!("Timeout waiting for background tasks, some may not have completed")
        }
    }

    tracing::info!("Shutdown complete");
}

/// Connect to the configured database, exiting when there is none.
async fn connect_or_exit(config: &TollgateConfig) -> DbPool {
    if config.database.is_none() {
        eprintln!("Error: Database is not configured.");
        std::process::exit(1);
    }
    match DbPool::from_config(&config.database).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            eprintln!("Error: Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_migrate(explicit_config_path: Option<&str>) {
    let config = load_config(explicit_config_path);
    init_tracing_or_exit(&config);

    tracing::info!("Running database migrations");

    let pool = connect_or_exit(&config).await;
    match pool.run_migrations().await {
        Ok(()) => {
            tracing::info!("Database migrations completed successfully");
        }
        Err(e) => {
            tracing::error!(error = %e, "Database migrations failed");
            eprintln!("Error: Database migrations failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// Print a job report as JSON on stdout.
fn print_report(report: &impl Serialize) {
    match serde_json::to_string_pretty(report) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error: Failed to render report: {e}"),
    }
}

async fn run_billing(explicit_config_path: Option<&str>, command: BillingCommand) {
    let config = load_config(explicit_config_path);
    init_tracing_or_exit(&config);

    let pool = connect_or_exit(&config).await;
    let billing = BillingService::new(Arc::new(pool), config.billing.clone());
    let now = Utc::now();

    let result = match command {
        BillingCommand::Generate { period: Some(s) } => {
            let Some(period) = BillingPeriod::parse_year_month(&s) else {
                eprintln!("Error: Invalid period '{s}', expected YYYY-MM");
                std::process::exit(2);
            };
            tracing::info!(period_start = %period.start, "Generating billing cycles");
            billing.generate_cycles(period).await.map(|r| print_report(&r))
        }
        BillingCommand::Generate { period: None } => {
            tracing::info!("Generating billing cycles through the previous month");
            billing.generate_outstanding(now).await.map(|r| print_report(&r))
        }
        BillingCommand::Autopay => billing
            .auto_pay_zero_amount(now)
            .await
            .map(|paid| print_report(&serde_json::json!({ "paid": paid }))),
        BillingCommand::SweepOverdue => billing.sweep_overdue(now).await.map(|r| print_report(&r)),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "Billing job failed");
        eprintln!("Error: Billing job failed: {e}");
        std::process::exit(1);
    }
}
