// src/main.rs

use anyhow::{anyhow, Context};
use axum_server::tls_rustls::RustlsConfig;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use payroll_core::api::{self, AppState};
use payroll_core::clock::{Clock, SystemClock};
use payroll_core::config::Config;
use payroll_core::connecteam_client::{ConnecteamClient, TimeTrackingGateway};
use payroll_core::export::{export_rows_for_week, write_payroll_csv};
use payroll_core::store::{MemoryStore, PayrollStore};
use payroll_core::supabase_store::SupabaseStore;
use payroll_core::sync::run_periodic_sync;
use payroll_core::AppError;

#[derive(Parser, Debug)]
#[command(name = "payroll-core", version, about = "Connecteam hours sync and weekly payroll")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the admin HTTP API (default).
    Serve,
    /// Sync Connecteam hours for one week.
    Sync {
        /// Any date in the target week. Defaults to the current week.
        #[arg(long)]
        week: Option<NaiveDate>,
        /// Skip zeroing every employee's current week hours first.
        #[arg(long)]
        no_clear: bool,
    },
    /// Create or refresh payroll records for a week.
    Generate {
        #[arg(long)]
        week: NaiveDate,
    },
    /// Write a week's payroll as CSV.
    Export {
        #[arg(long)]
        week: NaiveDate,
        /// Defaults to stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn build_store(config: &Config) -> Result<Arc<dyn PayrollStore>, AppError> {
    if config.use_memory_store {
        warn!("USE_MEMORY_STORE is set; data will not survive a restart.");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = SupabaseStore::new(config.supabase_config()?)?;
    info!("Supabase store initialized.");
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- Setup ---
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration from environment")?;
    info!("App configuration loaded.");

    let store = build_store(&config)?;
    let gateway: Arc<dyn TimeTrackingGateway> = Arc::new(
        ConnecteamClient::new(config.connecteam_config())
            .context("Failed to build Connecteam client")?,
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = AppState::new(gateway, store.clone(), clock);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, state).await,
        Command::Sync { week, no_clear } => {
            let result = state
                .synchronizer
                .sync_current_week_hours(week, !no_clear)
                .await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if result.success {
                Ok(())
            } else {
                Err(anyhow!("Sync finished with {} errors", result.errors.len()))
            }
        }
        Command::Generate { week } => {
            let summary = state
                .payroll
                .generate_weekly_payroll(week)
                .await
                .map_err(AppError::from)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Command::Export { week, output } => {
            let rows = export_rows_for_week(store.as_ref(), week)
                .await
                .map_err(AppError::from)?;
            match output {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    write_payroll_csv(file, &rows).map_err(AppError::from)?;
                    info!("Wrote {} payroll rows to {}", rows.len(), path.display());
                }
                None => {
                    let stdout = io::stdout();
                    let mut handle = stdout.lock();
                    write_payroll_csv(&mut handle, &rows).map_err(AppError::from)?;
                    handle.flush()?;
                }
            }
            Ok(())
        }
    }
}

async fn serve(config: &Config, state: AppState) -> anyhow::Result<()> {
    match config.sync_interval() {
        Some(interval) => {
            info!("Periodic hours sync every {}s", interval.as_secs());
            tokio::spawn(run_periodic_sync(state.synchronizer.clone(), interval));
        }
        None => info!("Periodic hours sync disabled (SYNC_INTERVAL_SECS=0)"),
    }

    let app = api::router(state);
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.bind_address()))?;

    match config.tls_paths()? {
        Some((cert_path, key_path)) => {
            let tls_config = match RustlsConfig::from_pem_file(&cert_path, &key_path).await {
                Ok(tls_config) => tls_config,
                Err(e) => {
                    let err_msg = format!("Failed to load TLS cert/key: {}", e);
                    error!("{}", err_msg);
                    return Err(AppError::TlsConfig(err_msg).into());
                }
            };
            info!(
                "TLS configuration loaded successfully from {} and {}",
                cert_path.display(),
                key_path.display()
            );
            info!("Starting server on https://{}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind {}", addr))?;
            info!("Starting server on http://{}", addr);
            axum::serve(listener, app).await?;
        }
    }
    Ok(())
}
