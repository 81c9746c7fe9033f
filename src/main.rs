//! `vod-export`: mirror a Dispatcharr VOD catalog as `.strm` pointer trees.

mod cli;
mod verify;

use anyhow::{Context, Result};
use bridge_desktop::TokioFileSystem;
use clap::Parser;
use cli::{Cli, Command, RunArgs, VerifyArgs};
use core_library::AccountFilter;
use core_runtime::config::ExportConfig;
use core_runtime::logging::{init_logging, redact_if_sensitive, LoggingConfig};
use core_service::{CoreError, ExportService};
use core_sync::SyncError;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use verify::{Verifier, VerifyOptions};

/// Process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Ok = 0,
    Failure = 1,
    Config = 2,
    Connectivity = 3,
    Issues = 4,
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        ExitCode::from(exit as u8)
    }
}

fn classify(err: &anyhow::Error) -> Exit {
    if let Some(core) = err.downcast_ref::<CoreError>() {
        if core.is_config() {
            return Exit::Config;
        }
        if matches!(core, CoreError::Sync(SyncError::Connectivity(_))) {
            return Exit::Connectivity;
        }
    }
    if err.downcast_ref::<core_runtime::Error>().is_some() {
        return Exit::Config;
    }
    Exit::Failure
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Configuration error: {}", err);
            return Exit::Config.into();
        }
    };

    let logging = LoggingConfig::default()
        .with_level(config.log_level)
        .with_format(config.log_format);
    if let Err(err) = init_logging(logging) {
        eprintln!("{}", err);
    }

    let outcome = match cli.subcommand() {
        Command::Run(args) => run(config, args).await,
        Command::Verify(args) => verify(config, args).await,
    };

    match outcome {
        Ok(exit) => exit.into(),
        Err(err) => {
            error!("{:#}", err);
            classify(&err).into()
        }
    }
}

async fn run(config: ExportConfig, args: RunArgs) -> Result<Exit> {
    info!(
        catalog = %config.catalog.base_url,
        user = %config.catalog.username,
        password = %redact_if_sensitive("password", &config.catalog.password),
        accounts = %config.account_patterns,
        "Starting export"
    );

    let service = ExportService::bootstrap(config)
        .await
        .context("Failed to start the exporter")?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current entity");
            interrupt.cancel();
        }
    });

    let summary = service.run(cancel).await.context("Export run failed")?;

    if args.summary_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    if summary.cancelled {
        warn!("Run cancelled before completion");
        return Ok(Exit::Failure);
    }
    if summary.all_accounts_fatal() {
        error!("No matched account could be processed");
        return Ok(Exit::Connectivity);
    }
    Ok(Exit::Ok)
}

async fn verify(config: ExportConfig, args: VerifyArgs) -> Result<Exit> {
    let filter = AccountFilter::parse(&config.account_patterns)
        .map_err(|e| core_runtime::Error::Config(e.to_string()))?;

    let options = VerifyOptions {
        sidecars: config.features.write_sidecars,
        poster: config.features.write_artwork,
        fanart: config.features.write_artwork && config.metadata.has_tmdb(),
        sample_size: args.sample,
    };
    let verifier = Verifier::new(Arc::new(TokioFileSystem::new()), config.output, options);

    let report = verifier
        .run(&filter)
        .await
        .context("Failed to walk the output tree")?;
    println!("{}", verifier.display(&report));

    Ok(if report.is_clean() {
        Exit::Ok
    } else {
        Exit::Issues
    })
}
