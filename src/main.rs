use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use pegs::config::AppConfig;
use pegs::{api, registry, Catalog};

#[derive(Parser)]
#[command(name = "pegs")]
#[command(about = "Versioned PEGS requirements catalog")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port for HTTP API (overrides PEGS_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Database file (overrides PEGS_DB_PATH)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// List the requirement kinds with their prefixes and fields
    Kinds,
    /// Report consistency issues in a solution
    Check {
        /// Solution id
        solution: Uuid,

        /// Database file (overrides PEGS_DB_PATH)
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "pegs=debug,pegs_core=debug,tower_http=debug".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let db = config.open_database()?;
    let catalog = Catalog::with_config(db, config.catalog());
    let app = api::create_router(catalog);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", config.port)).await?;
    tracing::info!("PEGS server listening on http://127.0.0.1:{}", config.port);

    axum::serve(listener, app).await?;
    Ok(())
}

fn print_kinds() {
    for info in registry::all() {
        let fields: Vec<String> = registry::fields_of(info.req_type)
            .iter()
            .map(|spec| {
                if spec.required {
                    format!("{}*", spec.name)
                } else {
                    spec.name.to_string()
                }
            })
            .collect();
        let part = info
            .req_type
            .part()
            .map(|part| format!("{part:?}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<24} {:<6} {:<12} {:<16} {}",
            info.label,
            info.prefix.unwrap_or("-"),
            part,
            info.parent.map(|p| p.label()).unwrap_or("-"),
            fields.join(", ")
        );
    }
}

fn check(config: AppConfig, solution: Uuid) -> anyhow::Result<()> {
    let catalog = Catalog::with_config(config.open_database()?, config.catalog());
    let issues = catalog.check_consistency(solution)?;
    if issues.is_empty() {
        println!("Solution {} is consistent", solution);
        return Ok(());
    }
    for issue in &issues {
        println!("{}", serde_json::to_string(issue)?);
    }
    anyhow::bail!("{} consistency issue(s) in solution {}", issues.len(), solution)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = AppConfig::from_env();

    match cli.command {
        Some(Commands::Serve { port, db }) => {
            if let Some(port) = port {
                config.port = port;
            }
            if db.is_some() {
                config.db_path = db;
            }
            tracing::info!("Starting PEGS server on port {}", config.port);
            serve(config).await?;
        }
        Some(Commands::Kinds) => print_kinds(),
        Some(Commands::Check { solution, db }) => {
            if db.is_some() {
                config.db_path = db;
            }
            check(config, solution)?;
        }
        None => {
            tracing::info!("Starting PEGS server on port {}", config.port);
            serve(config).await?;
        }
    }

    Ok(())
}
