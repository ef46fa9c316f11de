use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod changeset;
mod classifier;
mod config;
mod detector;
mod error;
mod models;
mod scanner;
mod vault;
mod workflow;

use changeset::{ChangedFile, ChangesetAnalyzer};
use config::ScannerConfig;
use scanner::{save_registry, DependencyScanner};
use vault::KnowledgeVault;

#[derive(Parser)]
#[command(name = "depscan")]
#[command(about = "Detect technology dependencies in instruction files and assess change impact", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan configured directories and write the dependency registry
    Scan {
        /// Scanner configuration file
        #[arg(short, long, default_value = "scanner-config.yaml")]
        config: PathBuf,

        /// Registry output path
        #[arg(short, long, default_value = "dependency-registry.json")]
        output: PathBuf,
    },

    /// Analyze the impact of a technology across tracked files
    Impact {
        /// Technology name, e.g. "React"
        technology: String,

        /// Registry store directory (default: ~/.depscan/vault)
        #[arg(long)]
        vault: Option<PathBuf>,
    },

    /// Summarize registry store health
    Health {
        /// Registry store directory (default: ~/.depscan/vault)
        #[arg(long)]
        vault: Option<PathBuf>,
    },

    /// Analyze a proposed changeset (e.g. the files touched by a PR)
    Changeset {
        /// Identifier for the changeset, e.g. a PR number
        id: String,

        /// Changed files to analyze
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Cross-reference against this registry store
        #[arg(long)]
        vault: Option<PathBuf>,
    },
}

fn default_vault_dir() -> Result<PathBuf> {
    Ok(dirs::home_dir()
        .context("could not determine home directory")?
        .join(".depscan")
        .join("vault"))
}

fn open_vault(path: Option<PathBuf>) -> Result<KnowledgeVault> {
    let root = match path {
        Some(p) => p,
        None => default_vault_dir()?,
    };
    Ok(KnowledgeVault::open(&root)?)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Scan { config, output } => {
            info!("🔍 Scanning for technology dependencies...");
            let config = ScannerConfig::load(&config)?;
            let scanner = DependencyScanner::new(config);
            let outcome = scanner.scan()?;

            save_registry(&outcome.registry, &output)?;
            let stats = &outcome.registry.statistics;
            println!(
                "📊 Scanned {} files ({} skipped), {} technologies detected, {} high-confidence",
                stats.total_files_scanned,
                stats.skipped_files,
                stats.total_technologies_detected,
                stats.high_confidence_detections
            );
            println!("Registry written to {}", output.display());
            Ok(())
        }

        Commands::Impact { technology, vault } => {
            let vault = open_vault(vault)?;
            let impact = vault.analyze_technology_impact(&technology)?;
            println!("{}", serde_json::to_string_pretty(&impact)?);
            Ok(())
        }

        Commands::Health { vault } => {
            let vault = open_vault(vault)?;
            let health = vault.get_system_health_summary()?;
            println!("{}", serde_json::to_string_pretty(&health)?);
            Ok(())
        }

        Commands::Changeset { id, files, vault } => {
            info!("🔍 Analyzing changeset {} ({} files)...", id, files.len());
            let changed: Vec<ChangedFile> = files
                .iter()
                .map(|path| {
                    let content = fs::read_to_string(path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    Ok(ChangedFile {
                        path: path.to_string_lossy().to_string(),
                        content,
                    })
                })
                .collect::<Result<_>>()?;

            let store = match vault {
                Some(p) => Some(KnowledgeVault::open(&p)?),
                None => None,
            };
            let analysis = ChangesetAnalyzer::new().analyze(&id, &changed, store.as_ref());
            println!("{}", serde_json::to_string_pretty(&analysis)?);
            Ok(())
        }
    }
}
