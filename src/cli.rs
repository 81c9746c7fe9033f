//! Command-line interface

use clap::{Args, Parser, Subcommand};
use core_runtime::config::ExportConfig;
use core_runtime::loader::ConfigLoader;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "vod-export", version, about = "Export VOD catalogs as .strm pointer trees")]
pub struct Cli {
    /// Shell-style vars file (`KEY=VALUE`); the environment overrides it.
    #[arg(long, short = 'c', global = true)]
    pub vars_file: Option<PathBuf>,

    /// Comma-separated account name patterns, overrides XC_NAMES.
    #[arg(long, global = true)]
    pub accounts: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Synchronize the pointer trees with the catalog (default).
    Run(RunArgs),
    /// Check the exported trees for missing or broken files.
    Verify(VerifyArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Plan and log every change without touching disk or cache.
    #[arg(long)]
    pub dry_run: bool,

    /// Delete every account tree and cache record before exporting.
    #[arg(long)]
    pub full_reset: bool,

    /// Print the run summary as JSON on stdout.
    #[arg(long)]
    pub summary_json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct VerifyArgs {
    /// Titles and paths printed per issue kind.
    #[arg(long, default_value_t = 10)]
    pub sample: usize,
}

impl Cli {
    /// The chosen subcommand, `run` when none was given
    pub fn subcommand(&self) -> Command {
        self.command
            .clone()
            .unwrap_or_else(|| Command::Run(RunArgs::default()))
    }

    /// Load the vars file and environment, then apply flag overrides
    pub fn load_config(&self) -> core_runtime::Result<ExportConfig> {
        let mut loader = ConfigLoader::new();
        if let Some(path) = &self.vars_file {
            loader = loader.with_vars_file(path)?;
        }
        let mut builder = loader.with_process_env().builder()?;

        if let Some(patterns) = &self.accounts {
            builder = builder.account_patterns(patterns.clone());
        }
        if let Some(Command::Run(args)) = &self.command {
            if args.dry_run {
                builder = builder.dry_run(true);
            }
            if args.full_reset {
                builder = builder.full_reset(true);
            }
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_command_is_run() {
        let cli = Cli::parse_from(["vod-export"]);
        assert!(matches!(cli.subcommand(), Command::Run(RunArgs { dry_run: false, .. })));
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::parse_from([
            "vod-export",
            "--accounts",
            "Demo*",
            "run",
            "--dry-run",
            "--summary-json",
        ]);
        assert_eq!(cli.accounts.as_deref(), Some("Demo*"));
        let Command::Run(args) = cli.subcommand() else {
            panic!("expected run");
        };
        assert!(args.dry_run && args.summary_json && !args.full_reset);
    }

    #[test]
    fn test_verify_sample() {
        let cli = Cli::parse_from(["vod-export", "verify", "--sample", "3"]);
        assert!(matches!(cli.subcommand(), Command::Verify(VerifyArgs { sample: 3 })));
    }

    #[test]
    fn test_vars_file_and_flags_override() {
        let dir = tempfile::TempDir::new().unwrap();
        let vars = dir.path().join("vars.env");
        std::fs::write(
            &vars,
            "export DISPATCHARR_API_PASS='secret'\nXC_NAMES=\"Alpha\"\nVOD_DRY_RUN=false\n",
        )
        .unwrap();

        let cli = Cli::parse_from([
            "vod-export",
            "--vars-file",
            vars.to_str().unwrap(),
            "--accounts",
            "Beta",
            "run",
            "--dry-run",
        ]);
        let config = cli.load_config().unwrap();

        assert_eq!(config.account_patterns, "Beta");
        assert!(config.features.dry_run);
        assert!(!config.features.full_reset);
    }
}
