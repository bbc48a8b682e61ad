use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::*;
use sheetview_core::{AppConfig, FileIdentity, PersistenceStore, ViewStateController};
use std::fs;
use std::path::PathBuf;

mod formatter;

use formatter::{TableRenderer, TerminalNotifier};

#[derive(Parser)]
#[command(name = "sheetview")]
#[command(about = "Excel workbook viewer with markup cell detection and a persistent session", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import a workbook and make it the active file
    Import {
        /// Path to the Excel file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// List imported files
    List,
    /// Make a file active by its index
    Select {
        #[arg(value_name = "INDEX")]
        index: usize,
    },
    /// Scan a worksheet of the active file and display it
    Sheet {
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Switch between raw and rendered display
    Toggle,
    /// Redisplay the active worksheet
    Show,
    /// Export sanitized data as a new workbook
    Export {
        /// Export every imported file instead of the active worksheet
        #[arg(long)]
        all: bool,
        /// Directory the export is written into
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        output: PathBuf,
    },
    /// Remove a file by its index
    Remove {
        #[arg(value_name = "INDEX")]
        index: usize,
    },
    /// Drop every file and the saved session
    Clear,
    /// Check that session storage works
    Selftest,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        AppConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        // Try to load default config from current directory if it exists
        let default_config_path = PathBuf::from("sheetview.toml");
        if default_config_path.exists() {
            AppConfig::from_file(&default_config_path).with_context(|| {
                format!(
                    "Failed to load config from {}",
                    default_config_path.display()
                )
            })?
        } else {
            AppConfig::default()
        }
    };

    let storage_dir = match &config.storage_dir {
        Some(dir) => dir.clone(),
        None => dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sheetview"),
    };
    let store = PersistenceStore::open(
        &storage_dir,
        config.fallback_quota_bytes,
        config.retention_days,
    );

    let mut controller = ViewStateController::new(
        store,
        TableRenderer::new(),
        TerminalNotifier,
        config.export_prefix.clone(),
    );
    controller.restore();
    // Grids repaint only for the command itself, not during restore
    controller.renderer_mut().enable();

    match cli.command {
        Command::Import { file } => {
            let bytes = fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let metadata = fs::metadata(&file)?;
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());

            let mut identity = FileIdentity::new(name, metadata.len());
            identity.last_modified = metadata.modified().ok().map(DateTime::<Utc>::from);

            let index = controller.import(identity, None, &bytes)?;
            if let Some(imported) = controller.registry().get(index)
                && let Some(workbook) = imported.workbook.as_ref()
            {
                println!(
                    "{} {}",
                    "Sheets:".bold(),
                    workbook.sheet_names().join(", ")
                );
            }
        }
        Command::List => {
            if controller.registry().is_empty() {
                println!("No files imported");
            }
            for (i, file) in controller.registry().files().iter().enumerate() {
                let marker = if controller.registry().active_index() == Some(i) {
                    "*".green().bold().to_string()
                } else {
                    " ".to_string()
                };
                let status = if file.workbook.is_none() {
                    "needs re-upload".yellow().to_string()
                } else if file.render_cache.is_some() {
                    "processed".to_string()
                } else {
                    "loaded".to_string()
                };
                println!(
                    "{marker} [{i}] {} ({} bytes, {status})",
                    file.identity.name.bold(),
                    file.identity.size
                );
            }
        }
        Command::Select { index } => controller.select_file(index)?,
        Command::Sheet { name } => controller.select_sheet(&name)?,
        Command::Toggle => controller.toggle_view_mode(),
        Command::Show => controller.refresh(),
        Command::Export { all, output } => {
            let export = if all {
                controller.export_all()?
            } else {
                controller.export_active()?
            };
            let path = output.join(&export.file_name);
            fs::write(&path, &export.bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        Command::Remove { index } => match controller.remove_file(index) {
            Some(identity) => println!("Removed {}", identity.name),
            None => println!("No file at index {index}"),
        },
        Command::Clear => {
            controller.clear_all();
            println!("Session cleared");
        }
        Command::Selftest => {
            println!("{} {}", "Storage:".bold(), storage_dir.display());
            if controller.storage_ok() {
                println!("{}", "✓ Storage self-test passed".green().bold());
            } else {
                println!("{}", "✗ Storage self-test failed".red().bold());
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
