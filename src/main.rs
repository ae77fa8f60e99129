use std::path::PathBuf;

use agency_ledger::config::Config;
use agency_ledger::server::{self, AppState};
use agency_ledger::{db, entities, export, import, init_logging};
use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "agency-ledger")]
#[command(author, version, about = "Agency record keeping server and workbook tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the JSON API.
    Serve,
    /// Load one workbook into its table(s).
    Import {
        #[arg(long)]
        workbook: PathBuf,
        #[arg(long)]
        dataset: String,
        #[arg(long)]
        sheet: Option<String>,
    },
    /// Load every default workbook found in a directory.
    ImportAll {
        #[arg(long)]
        assets: PathBuf,
    },
    /// Write one table to an .xlsx file.
    Export {
        #[arg(long)]
        dataset: String,
        #[arg(long)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;
    let _log_guard = init_logging(&config.log_dir)?;
    config.log_resolved();

    let state = db::init(&config.db_path())
        .with_context(|| format!("opening {}", config.db_path().display()))?;

    match cli.command {
        Command::Serve => {
            server::serve(&config, AppState::new(state)).await?;
        }
        Command::Import {
            workbook,
            dataset,
            sheet,
        } => {
            let report =
                import::run_loader(&state.lock(), &dataset, &workbook, sheet.as_deref())?;
            info!(
                dataset = %report.dataset,
                rows = report.total_rows(),
                skipped = report.skipped.len(),
                "Import finished"
            );
        }
        Command::ImportAll { assets } => {
            let results = import::run_all(&state.lock(), &assets);
            let failed = results.iter().filter(|(_, r)| r.is_err()).count();
            for (dataset, result) in &results {
                if let Ok(report) = result {
                    info!(dataset = %dataset, rows = report.total_rows(), "Loaded");
                }
            }
            if failed > 0 {
                warn!(failed, total = results.len(), "Some loaders failed");
            }
        }
        Command::Export { dataset, out } => {
            let entity =
                entities::find(&dataset).ok_or_else(|| anyhow!("unknown dataset {dataset}"))?;
            let bytes = export::export_entity(&state.lock(), entity)?;
            std::fs::write(&out, bytes)
                .with_context(|| format!("writing {}", out.display()))?;
            info!(table = entity.table, out = %out.display(), "Export written");
        }
    }

    Ok(())
}
