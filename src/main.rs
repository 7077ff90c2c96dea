//! Arsenal - Main entry point
//!
//! Parses the command line, layers flags over the configuration file and
//! hands off to the library. Every path ends in an explicit exit code.

use arsenal::backup::BackupLedger;
use arsenal::cli::{BackupCommands, Cli, Commands, InstallArgs};
use arsenal::config_file::RunConfig;
use arsenal::error::ArsenalError;
use arsenal::process_guard::{self, InterruptFlag};
use arsenal::prompt::{AssumeYes, Prompter, TerminalPrompter};
use arsenal::session::{self, RunSummary};

use colored::Colorize;
use log::{debug, error, info};
use std::path::{Path, PathBuf};

/// Exit code after an operator interrupt
const EXIT_INTERRUPTED: i32 = 130;

/// Initialize the logger with appropriate settings
fn init_logger() {
    use tracing_subscriber::EnvFilter;

    // RUST_LOG overrides; the install log carries the operator-facing record
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Main application entry point
fn main() {
    init_logger();
    info!("arsenal starting up");

    // Stop in-flight pacman process groups on SIGINT/SIGTERM/SIGHUP
    if let Err(e) = process_guard::init_signal_handlers() {
        log::warn!("Failed to initialize signal handlers: {}", e);
    }
    debug!("Signal handlers initialized");

    let cli = Cli::parse_args();
    debug!("CLI arguments parsed");

    let code = match cli.command {
        Some(Commands::Validate { config }) => run_validate(&config),
        Some(Commands::Install(args)) => run_install(&args),
        Some(Commands::Backups {
            config,
            log_dir,
            action,
        }) => run_backups(config.as_deref(), log_dir, &action),
        None => {
            info!("No command specified, running interactive install");
            run_install(&InstallArgs::default())
        }
    };

    std::process::exit(code);
}

fn report_error(e: &ArsenalError) -> i32 {
    error!("{}", e);
    eprintln!("{} {}", "✗".red(), e);
    e.exit_code()
}

fn load_config(path: Option<&Path>) -> Result<RunConfig, ArsenalError> {
    match path {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            RunConfig::load_from_file(path).map_err(|e| ArsenalError::config(format!("{:#}", e)))
        }
        None => Ok(RunConfig::default()),
    }
}

fn run_validate(path: &Path) -> i32 {
    info!("Validating configuration file: {:?}", path);
    let result = load_config(Some(path)).and_then(|config| {
        config
            .validate()
            .map_err(|e| ArsenalError::validation(format!("{:#}", e)))
    });
    match result {
        Ok(()) => {
            println!("{} Configuration file is valid: {}", "✓".green(), path.display());
            0
        }
        Err(e) => report_error(&e),
    }
}

fn run_install(args: &InstallArgs) -> i32 {
    let mut config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return report_error(&e),
    };
    args.apply_to(&mut config);

    if let Some(save_path) = &args.save_config {
        return save_config(&config, save_path);
    }

    let prompter: Box<dyn Prompter> = if config.assume_yes {
        Box::new(AssumeYes)
    } else {
        Box::new(TerminalPrompter)
    };

    let interrupt = InterruptFlag::global();
    match session::run_install(&config, prompter.as_ref(), &interrupt) {
        Ok(Some(summary)) => {
            print_summary(&summary);
            if summary.interrupted() {
                EXIT_INTERRUPTED
            } else {
                0
            }
        }
        Ok(None) => 0,
        Err(e) => report_error(&e),
    }
}

fn save_config(config: &RunConfig, path: &Path) -> i32 {
    if let Err(e) = config.validate() {
        return report_error(&ArsenalError::validation(format!("{:#}", e)));
    }
    match config.save_to_file(path) {
        Ok(()) => {
            println!("{} Configuration saved to {}", "✓".green(), path.display());
            0
        }
        Err(e) => report_error(&ArsenalError::config(format!("{:#}", e))),
    }
}

fn print_summary(summary: &RunSummary) {
    let report = &summary.report;
    println!();
    println!("{}", "═".repeat(60));
    println!("{}", report.summary().bold());
    println!("  {} installed: {}", "✓".green(), report.installed.len());
    println!("  {} skipped:   {}", "➜".cyan(), report.skipped.len());
    println!("  {} failed:    {}", "✗".red(), report.failed.len());
    if !report.conflicts.is_empty() {
        println!("  {} file conflicts handled: {}", "⚠".yellow(), report.conflicts.len());
    }
    if let Some(secondary) = &report.secondary {
        println!(
            "  {} recovered by secondary pass: {}",
            "✓".green(),
            secondary.recovered.len()
        );
    }
    if !report.failed.is_empty() {
        println!("  Failed packages: {}", summary.lists.failed.display());
    }
    println!("  Skipped packages: {}", summary.lists.skipped.display());
    println!("  Backups: {}", summary.cleanup);
    if report.interrupted {
        println!("{}", "Run was interrupted".yellow());
    }
    println!("{}", "═".repeat(60));
}

fn run_backups(config: Option<&Path>, log_dir: Option<PathBuf>, action: &BackupCommands) -> i32 {
    let mut config = match load_config(config) {
        Ok(config) => config,
        Err(e) => return report_error(&e),
    };
    if let Some(dir) = log_dir {
        config.log_dir = dir;
    }

    let ledger = BackupLedger::for_log_dir(&config.log_dir);
    let result = match action {
        BackupCommands::List { package } => list_backups(&ledger, package.as_deref()),
        BackupCommands::Archive { yes } => {
            let question = format!(
                "Move every backup in {} to {}?",
                ledger.root().display(),
                config.archive_root().display()
            );
            if confirmed(*yes, &question) {
                ledger.archive_all(&config.archive_root()).map(|n| {
                    println!(
                        "{} Archived {} file(s) under {}",
                        "✓".green(),
                        n,
                        config.archive_root().display()
                    );
                })
            } else {
                println!("Nothing archived");
                Ok(())
            }
        }
        BackupCommands::Purge { yes } => {
            let question = format!("Delete every backup in {}?", ledger.root().display());
            if confirmed(*yes, &question) {
                ledger.purge_all().map(|n| {
                    println!("{} Deleted {} file(s)", "✓".green(), n);
                })
            } else {
                println!("Nothing deleted");
                Ok(())
            }
        }
        BackupCommands::Restore { package } => {
            ledger.restore_all(package.as_deref()).map(|n| {
                println!("{} Restored {} path(s)", "✓".green(), n);
            })
        }
    };

    match result {
        Ok(()) => 0,
        Err(e) => report_error(&e),
    }
}

/// `--yes`, or an explicit yes at the terminal (defaults to no)
fn confirmed(yes: bool, question: &str) -> bool {
    yes || TerminalPrompter.confirm(question, false).unwrap_or(false)
}

fn list_backups(ledger: &BackupLedger, package: Option<&str>) -> Result<(), ArsenalError> {
    let entries = match package {
        Some(name) => ledger.entries_for(name)?,
        None => ledger.entries()?,
    };
    if entries.is_empty() {
        println!("No backups in {}", ledger.root().display());
        return Ok(());
    }
    for entry in entries {
        println!(
            "{}  {:<24} {} -> {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.package,
            entry.original_path.display(),
            entry.content_copy.display()
        );
    }
    Ok(())
}
