use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use std::sync::Arc;

use winstrap::config::loader;
use winstrap::publish::HttpUploader;
use winstrap::{
    log_parsed, system, BootstrapConfig, ConsoleOperator, LogCollector, Orchestrator, PathLayout,
    Pipeline, PublishOptions, RunOptions, RunOutcome, SelfBuildOutcome, SelfBuilder, SystemRunner,
};

#[derive(Parser, Debug)]
#[command(name = "winstrap", version, about = "Bootstrap a toolchain builder machine")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run without prompting at confirmation checkpoints
    #[arg(long)]
    yes: bool,

    /// Custom home directory
    #[arg(long)]
    home: Option<PathBuf>,

    /// Run the post-build packaging step
    #[arg(long)]
    release: bool,

    /// Build the helper binary (self-build only)
    #[arg(long)]
    build: bool,

    /// Upload the helper binary (self-build only, implies --build)
    #[arg(long)]
    upload: bool,

    /// Architecture to build the helper for (self-build only)
    #[arg(long)]
    arch: Option<String>,

    /// Force a rebuild of the cross-compiler (self-build only)
    #[arg(long)]
    rebuild_toolchain: bool,

    /// JSON credential file holding an `access_token` (self-build only)
    #[arg(long)]
    credentials: Option<PathBuf>,

    /// Echo debug output to the console
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = loader::load_or_default(cli.config.as_deref()).context("loading configuration")?;
    let layout = PathLayout::resolve(cli.home.as_deref(), &config)?;

    let console_level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    let collector = init_logging(&layout, console_level);

    let result = match Pipeline::select(&config.target_os, system::host_os()) {
        Pipeline::Provision => provision(&cli, config, layout).await,
        Pipeline::SelfBuild => self_build(&cli, config).await,
    };

    if let Some(collector) = collector {
        if let Err(e) = collector.wait_for_empty().await {
            eprintln!("[Main] WARNING: Failed to flush logs: {}", e);
        }
    }
    result
}

/// Install the LogCollector as the global logger. A run without a log file
/// still proceeds.
fn init_logging(layout: &PathLayout, console_level: log::LevelFilter) -> Option<LogCollector> {
    let collector = match LogCollector::new(&layout.logs_dir(), console_level) {
        Ok(collector) => collector,
        Err(e) => {
            eprintln!("[Main] WARNING: LogCollector initialization failed: {}", e);
            return None;
        }
    };
    if let Err(e) = log::set_boxed_logger(Box::new(collector.clone()))
        .map(|()| log::set_max_level(log::LevelFilter::Debug))
    {
        eprintln!("[Main] WARNING: Failed to set LogCollector as global logger: {}", e);
        return None;
    }
    log::debug!(
        "[Main] Logging to {}",
        collector.session_log_path().display()
    );
    Some(collector)
}

async fn provision(cli: &Cli, config: BootstrapConfig, layout: PathLayout) -> Result<()> {
    let options = RunOptions {
        assume_yes: cli.yes,
        release: cli.release,
    };
    let operator = Arc::new(ConsoleOperator::new(config.confirm_token.clone()));
    let orchestrator = Orchestrator::new(config, options, layout, operator, Arc::new(SystemRunner));

    match orchestrator.run().await? {
        RunOutcome::Completed => log_parsed!("Run completed"),
        RunOutcome::Cancelled => log_parsed!("Run cancelled by operator"),
    }
    Ok(())
}

async fn self_build(cli: &Cli, config: BootstrapConfig) -> Result<()> {
    let options = PublishOptions {
        build: cli.build,
        upload: cli.upload,
        arch: cli.arch.clone(),
        rebuild_toolchain: cli.rebuild_toolchain,
    };

    let uploader = if options.upload {
        let credentials = match cli.credentials {
            Some(ref path) => path.clone(),
            None => default_credentials_path()?,
        };
        Some(
            HttpUploader::from_credentials(config.publish.upload_url.clone(), &credentials)
                .context("preparing upload")?,
        )
    } else {
        None
    };

    let builder = SelfBuilder::from_env(config, Arc::new(SystemRunner))?;
    let outcome = builder
        .run(&options, uploader.as_ref().map(|u| u as &dyn winstrap::publish::Uploader))
        .await?;

    match outcome {
        SelfBuildOutcome::NothingToDo => {
            Cli::command().print_help()?;
        }
        SelfBuildOutcome::Built { path, digest } => {
            log::info!("[Main] {} ready (sha256 {})", path.display(), digest);
        }
        SelfBuildOutcome::Published { name, .. } => {
            log::info!("[Main] Published {}", name);
        }
    }
    Ok(())
}

fn default_credentials_path() -> Result<PathBuf> {
    let dir = dirs::config_dir().context("cannot determine config directory")?;
    Ok(dir.join("winstrap").join("credentials.json"))
}
