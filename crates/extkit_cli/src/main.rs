//! `extkit` command-line entry point.
//!
//! # Responsibility
//! - Run one discovery pass over an extensions directory and print the result.
//! - Optionally reconcile enabled flags with a SQLite settings file.

use clap::Parser;
use extkit_core::{
    default_log_level, init_logging, init_stderr_logging, ExtensionRegistry, LoadOptions,
    LoadReport, ReconciliationBridge, SqliteSettingsStore,
};
use log::warn;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "extkit")]
#[command(about = "Discover, load and reconcile application extensions")]
#[command(version)]
struct Cli {
    /// Directory scanned recursively for extension archives
    #[arg(value_name = "EXTENSIONS_DIR")]
    extensions_dir: PathBuf,

    /// Capability id a code unit must declare
    #[arg(long, required_unless_present = "options")]
    capability: Option<String>,

    /// Load options as JSON (`capability`, `appName`, `minVersion`)
    #[arg(long, value_name = "FILE")]
    options: Option<PathBuf>,

    /// Only load extensions targeting this application name
    #[arg(long, value_name = "NAME")]
    app_name: Option<String>,

    /// Minimum target application version
    #[arg(long, value_name = "VERSION")]
    min_version: Option<String>,

    /// SQLite settings file used to reconcile enabled flags
    #[arg(long, value_name = "DB")]
    settings: Option<PathBuf>,

    /// Write rolling log files here instead of stderr (absolute path)
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// trace|debug|info|warn|error
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("extkit: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let level = cli.log_level.as_deref().unwrap_or(default_log_level());
    let logging = match &cli.log_dir {
        Some(dir) => init_logging(level, &dir.display().to_string()),
        None => init_stderr_logging(level),
    };
    if let Err(err) = logging {
        eprintln!("extkit: logging disabled: {err}");
    }

    let options = resolve_options(&cli)?;
    let mut registry = ExtensionRegistry::new();
    let report = registry.load_from(&cli.extensions_dir, &options)?;

    if let Some(settings) = &cli.settings {
        reconcile(&mut registry, settings)?;
    }

    print_registry(&registry);
    print_skipped(&report);
    Ok(())
}

fn resolve_options(cli: &Cli) -> Result<LoadOptions, Box<dyn Error>> {
    let mut options = match &cli.options {
        Some(path) => LoadOptions::from_json(&std::fs::read_to_string(path)?)?,
        None => LoadOptions::new(cli.capability.clone().unwrap_or_default()),
    };
    if let Some(capability) = &cli.capability {
        options.capability = capability.clone();
    }
    if let Some(app_name) = &cli.app_name {
        options.app_name = Some(app_name.clone());
    }
    if let Some(min_version) = &cli.min_version {
        options.min_version = Some(min_version.clone());
    }
    options.validate()?;
    Ok(options)
}

fn reconcile(registry: &mut ExtensionRegistry, settings: &Path) -> Result<(), Box<dyn Error>> {
    let mut store = SqliteSettingsStore::open(settings)?;
    let mut bridge = ReconciliationBridge::new(registry, &mut store);
    bridge.register_extension_properties();
    if let Err(err) = bridge.load() {
        warn!(
            "event=cli_reconcile module=cli status=error settings={} error={}",
            settings.display(),
            err
        );
    }
    bridge.save()?;
    Ok(())
}

fn print_registry(registry: &ExtensionRegistry) {
    println!("{:<24} {:<40} {:<8} ARCHIVE", "NAME", "IDENTITY", "ENABLED");
    for handle in registry.all() {
        let archive = handle
            .source_archive()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<24} {:<40} {:<8} {}",
            handle.info().name(),
            handle.identity(),
            handle.is_enabled(),
            archive
        );
    }
}

fn print_skipped(report: &LoadReport) {
    if report.skipped.is_empty() {
        return;
    }
    println!();
    println!("skipped archives:");
    for skipped in &report.skipped {
        println!("  {} ({:?})", skipped.archive.display(), skipped.reason);
    }
}
