use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config_file::RunConfig;
use crate::types::{CleanupAction, PackageSet, RemovalPolicy, SecondaryPass};

/// Arsenal - bulk installer for security tooling repositories
#[derive(Parser)]
#[command(name = "arsenal")]
#[command(about = "Install a whole pacman repository, group or list, remediating failures as it goes")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install packages (default when no command is given)
    Install(InstallArgs),
    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        config: PathBuf,
    },
    /// Inspect and manage the backup ledger
    Backups {
        /// Configuration file (for log_dir / archive_dir)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Log directory holding the ledger (overrides config)
        #[arg(long)]
        log_dir: Option<PathBuf>,

        #[command(subcommand)]
        action: BackupCommands,
    },
}

/// Options for an install run. Anything left unset falls back to the
/// configuration file, then to an interactive question.
#[derive(Args, Debug, Default, Clone)]
pub struct InstallArgs {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Save the effective configuration to file and exit
    #[arg(long)]
    pub save_config: Option<PathBuf>,

    /// Packages to install: all, group:<name> or file:<path>
    #[arg(short, long)]
    pub packages: Option<PackageSet>,

    /// What to do with backups afterwards: keep, archive or delete
    #[arg(long)]
    pub cleanup: Option<CleanupAction>,

    /// Retry failures with the AUR helper: ask, always or never
    #[arg(long)]
    pub secondary_pass: Option<SecondaryPass>,

    /// When an owning package may be removed: heuristic, dev-variant-only or never
    #[arg(long)]
    pub removal_policy: Option<RemovalPolicy>,

    /// Answer yes to every question and take defaults
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Directory for install.log, error files, lists and backups
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Install attempts per package
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Do not run the repository bootstrap
    #[arg(long)]
    pub no_bootstrap: bool,

    /// Clean the package cache after the run
    #[arg(long)]
    pub clean_cache: bool,
}

impl InstallArgs {
    /// Layer command line flags over a loaded configuration
    pub fn apply_to(&self, config: &mut RunConfig) {
        if let Some(set) = &self.packages {
            config.package_set = Some(set.clone());
        }
        if let Some(cleanup) = self.cleanup {
            config.cleanup = Some(cleanup);
        }
        if let Some(pass) = self.secondary_pass {
            config.secondary_pass = pass;
        }
        if let Some(policy) = self.removal_policy {
            config.removal_policy = policy;
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir = dir.clone();
        }
        if let Some(max) = self.max_attempts {
            config.max_attempts = max;
        }
        if self.yes {
            config.assume_yes = true;
        }
        if self.no_bootstrap {
            config.bootstrap = false;
        }
        if self.clean_cache {
            config.clean_cache = Some(true);
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum BackupCommands {
    /// List ledger entries
    List {
        /// Only entries for this package
        #[arg(short, long)]
        package: Option<String>,
    },
    /// Move all backups into a timestamped archive directory
    Archive {
        /// Do not ask for confirmation
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Delete all backups
    Purge {
        /// Do not ask for confirmation
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Copy backed-up content back to its original location
    Restore {
        /// Only entries for this package
        #[arg(short, long)]
        package: Option<String>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_no_args() {
        // Running with no args should succeed (defaults to install)
        let cli = Cli::try_parse_from(["arsenal"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_install_flags() {
        let cli = Cli::try_parse_from([
            "arsenal",
            "install",
            "--packages",
            "group:blackarch-webapp",
            "--cleanup",
            "archive",
            "--secondary-pass",
            "never",
            "--max-attempts",
            "3",
            "-y",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Install(args)) => {
                assert_eq!(
                    args.packages,
                    Some(PackageSet::Group("blackarch-webapp".to_string()))
                );
                assert_eq!(args.cleanup, Some(CleanupAction::Archive));
                assert_eq!(args.secondary_pass, Some(SecondaryPass::Never));
                assert_eq!(args.max_attempts, Some(3));
                assert!(args.yes);
            }
            _ => panic!("Expected Install command"),
        }
    }

    #[test]
    fn test_cli_rejects_bad_package_set() {
        assert!(Cli::try_parse_from(["arsenal", "install", "--packages", "some"]).is_err());
        assert!(Cli::try_parse_from(["arsenal", "install", "--cleanup", "burn"]).is_err());
    }

    #[test]
    fn test_cli_validate_command() {
        let cli = Cli::try_parse_from(["arsenal", "validate", "run.json"]).unwrap();
        match cli.command {
            Some(Commands::Validate { config }) => assert_eq!(config, PathBuf::from("run.json")),
            _ => panic!("Expected Validate command"),
        }
    }

    #[test]
    fn test_cli_backups_restore() {
        let cli = Cli::try_parse_from([
            "arsenal",
            "backups",
            "--log-dir",
            "/tmp/arsenal",
            "restore",
            "--package",
            "nmap",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Backups {
                log_dir, action, ..
            }) => {
                assert_eq!(log_dir, Some(PathBuf::from("/tmp/arsenal")));
                assert_eq!(
                    action,
                    BackupCommands::Restore {
                        package: Some("nmap".to_string())
                    }
                );
            }
            _ => panic!("Expected Backups command"),
        }
    }

    #[test]
    fn test_cli_backups_archive_needs_flag_to_skip_prompt() {
        let cli = Cli::try_parse_from(["arsenal", "backups", "archive"]).unwrap();
        match cli.command {
            Some(Commands::Backups { action, .. }) => {
                assert_eq!(action, BackupCommands::Archive { yes: false })
            }
            _ => panic!("Expected Backups command"),
        }

        let cli = Cli::try_parse_from(["arsenal", "backups", "purge", "-y"]).unwrap();
        match cli.command {
            Some(Commands::Backups { action, .. }) => {
                assert_eq!(action, BackupCommands::Purge { yes: true })
            }
            _ => panic!("Expected Backups command"),
        }
    }

    #[test]
    fn test_flags_override_config() {
        let args = InstallArgs {
            packages: Some(PackageSet::All),
            removal_policy: Some(RemovalPolicy::Never),
            yes: true,
            no_bootstrap: true,
            ..InstallArgs::default()
        };
        let mut config = RunConfig::default();
        args.apply_to(&mut config);

        assert_eq!(config.package_set, Some(PackageSet::All));
        assert_eq!(config.removal_policy, RemovalPolicy::Never);
        assert!(config.assume_yes);
        assert!(!config.bootstrap);
        assert_eq!(config.max_attempts, 2);
    }
}
