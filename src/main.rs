// src/main.rs

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;

use scanrelay::app::App;
use scanrelay::{config, logging};

#[derive(Debug, Parser)]
#[command(name = "scanrelay", version, about = "Run security tools against a target and keep the reports")]
struct Cli {
    /// Config file (default: the platform config dir, or $SCANRELAY_CONFIG).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for the database, reports and log file.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a scan and wait for its report.
    Scan {
        target: String,
        /// Tool to run; repeat for several. Defaults to the configured tool list.
        #[arg(short, long = "tool")]
        tools: Vec<String>,
        /// Recipient of the completion notification.
        #[arg(long)]
        notify: Option<String>,
    },
    /// List recent scans, newest first.
    Scans {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Show one scan and its alerts.
    Show { id: String },
    /// List recent alerts, newest first.
    Alerts {
        #[arg(long, default_value_t = 100)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// List the configured tools and whether they are installed.
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let cfg = config::load(cli.config.as_deref(), cli.data_dir.as_deref())?;
    logging::initialize_logging(&cfg.data_dir)?;
    tracing::info!(
        config_file = ?cfg.config_path,
        data_dir = %cfg.data_dir.display(),
        "Configuration loaded."
    );
    tracing::debug!(config = ?cfg, "Effective configuration.");

    let app = App::open(cfg)?;
    let mut stdout = std::io::stdout().lock();

    match cli.command {
        Command::Scan { target, tools, notify } => {
            app.run_scan(&mut stdout, &target, &tools, notify).await?;
        }
        Command::Scans { limit } => app.list_scans(&mut stdout, limit)?,
        Command::Show { id } => app.show_scan(&mut stdout, &id)?,
        Command::Alerts { limit, json } => app.list_alerts(&mut stdout, limit, json)?,
        Command::Tools => app.list_tools(&mut stdout)?,
    }
    Ok(())
}
