mod commands;
mod config;
mod openweather;
mod scheduler;
mod server;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{cmd_delete, cmd_edit, cmd_range, cmd_read, cmd_weather, cmd_write};
use crate::config::{Config, WeatherConfig};
use crate::openweather::OpenWeatherClient;
use skydiary_core::service::DiaryService;

#[derive(Parser)]
#[command(
    name = "skydiary",
    version,
    about = "A personal diary that remembers the weather",
    long_about = "A personal diary that remembers the weather.\n\n\
                  Every entry is stamped with the day's condition, icon and temperature \
                  from OpenWeatherMap. Run `skydiary serve` for the REST API."
)]
struct Cli {
    /// Database file (default: platform data directory)
    #[arg(long, global = true, env = "SKYDIARY_DB", value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(flatten)]
    weather: WeatherConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a diary entry, stamped with that day's weather
    Write {
        /// Entry text
        text: String,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show all entries for a date (default: today)
    Read {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List entries between two dates, inclusive
    Range {
        /// First date (YYYY-MM-DD)
        start: String,
        /// Last date (YYYY-MM-DD)
        end: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace the text of the first entry for a date
    Edit {
        /// New entry text
        text: String,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete every entry for a date
    Delete {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow)
        date: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the cached weather for a date, fetching it if missing
    Weather {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        date: Option<String>,
        /// Fetch a fresh reading and overwrite the cached one
        #[arg(long)]
        refresh: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Local time of the daily weather refresh (HH:MM)
        #[arg(long, env = "SKYDIARY_REFRESH_AT", default_value = "01:00")]
        refresh_at: String,
        /// Disable the daily weather refresh
        #[arg(long)]
        no_refresh: bool,
    },
}

fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skydiary=info,skydiary_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.db)?;
    tracing::debug!(
        db = %config.db_path.display(),
        data_dir = %config.data_dir.display(),
        "Opening diary database"
    );
    let svc = DiaryService::new(&config.db_path)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let weather = cli.weather;
    let client = || OpenWeatherClient::new(weather.clone(), rt.handle().clone());

    match cli.command {
        Commands::Write { text, date, json } => {
            cmd_write(&svc, client, date.as_deref(), &text, json)
        }
        Commands::Read { date, json } => cmd_read(&svc, date.as_deref(), json),
        Commands::Range { start, end, json } => cmd_range(&svc, &start, &end, json),
        Commands::Edit { text, date, json } => cmd_edit(&svc, date.as_deref(), &text, json),
        Commands::Delete { date, json } => cmd_delete(&svc, Some(&date), json),
        Commands::Weather {
            date,
            refresh,
            json,
        } => cmd_weather(&svc, client, date.as_deref(), refresh, json),
        Commands::Serve {
            port,
            bind,
            refresh_at,
            no_refresh,
        } => {
            let refresh_at = if no_refresh {
                None
            } else {
                Some(scheduler::parse_refresh_time(&refresh_at)?)
            };
            let provider = Arc::new(client()?);
            rt.block_on(server::start_server(
                svc, provider, port, &bind, refresh_at,
            ))
        }
    }
}
