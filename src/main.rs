use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use trucklog_lib::auth::{self, NewUser};
use trucklog_lib::dashboard::{self, Period};
use trucklog_lib::export::ExportFormat;
use trucklog_lib::models::UserRole;
use trucklog_lib::reports::{self, ReportKind, ReportOptions};
use trucklog_lib::{db, server, AppConfig};

#[derive(Parser)]
#[command(name = "trucklog")]
#[command(version, about = "Trip, consignment and fleet records for a freight office")]
struct Cli {
    /// Data directory (database, logs, delivery proofs)
    #[arg(long, global = true, env = "TRUCKLOG_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Create or upgrade the database schema and exit
    Migrate,
    /// Add a user account
    CreateUser {
        #[arg(long)]
        email: String,
        #[arg(long)]
        full_name: String,
        #[arg(long, default_value = "clerk")]
        role: UserRole,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long, env = "TRUCKLOG_USER_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Print today's dashboard figures as JSON
    Dashboard,
    /// Write a report file
    Report {
        kind: ReportKind,
        #[arg(long, default_value = "pdf")]
        format: ExportFormat,
        /// Output directory
        #[arg(long, default_value = ".")]
        out: PathBuf,
        /// First day, YYYY-MM-DD
        #[arg(long)]
        from: Option<String>,
        /// Last day, YYYY-MM-DD
        #[arg(long)]
        to: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AppConfig::from_env().context("Invalid configuration")?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let _guard = trucklog_lib::init_logging(&config.log_filter, &config.log_dir())
        .context("Failed to initialise logging")?;
    info!("Starting trucklog v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            server::serve(config).await.context("Server error")?;
        }
        Commands::Migrate => {
            let state = db::init(&config.data_dir).context("Failed to open database")?;
            let conn = state.lock()?;
            println!("schema version {}", db::schema_version(&conn)?);
        }
        Commands::CreateUser {
            email,
            full_name,
            role,
            phone,
            password,
        } => {
            let state = db::init(&config.data_dir).context("Failed to open database")?;
            let conn = state.lock()?;
            let user = auth::create_user(
                &conn,
                NewUser {
                    email,
                    full_name,
                    role,
                    phone_number: phone,
                    password,
                },
            )
            .context("Failed to create user")?;
            println!("created {} {} ({})", user.role, user.email, user.id);
        }
        Commands::Dashboard => {
            let state = db::init(&config.data_dir).context("Failed to open database")?;
            let conn = state.lock()?;
            let stats = dashboard::dashboard_stats(&conn, &Period::current())?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Report {
            kind,
            format,
            out,
            from,
            to,
        } => {
            let state = db::init(&config.data_dir).context("Failed to open database")?;
            let file = {
                let conn = state.lock()?;
                reports::export_report(&conn, kind, format, &ReportOptions { from, to })
                    .with_context(|| format!("Failed to build {kind} report"))?
            };
            std::fs::create_dir_all(&out)
                .with_context(|| format!("Failed to create {}", out.display()))?;
            let path = out.join(&file.file_name);
            std::fs::write(&path, &file.bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{}", path.display());
        }
    }
    Ok(())
}
