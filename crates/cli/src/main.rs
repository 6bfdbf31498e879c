use anyhow::{bail, Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use shutter_cli::config::DEFAULT_CONFIG_PATH;
use shutter_cli::{log_provision, AppConfig, AppState};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "shutter")]
#[command(about = "Photo indexing, similarity and lexical search service", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the TOML config file (missing file means defaults)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API and run the outbox projector
    Serve(ServeArgs),

    /// Create missing search collections
    Provision,

    /// Project pending outbox jobs into the search index
    Project(ProjectArgs),

    /// Print per-collection document counts and the outbox backlog
    Stats,

    /// Drop and recreate all search collections
    #[command(name = "reset-index")]
    ResetIndex,

    /// Write the default configuration
    #[command(name = "init-config")]
    InitConfig(InitConfigArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Bind address, e.g. 127.0.0.1:3000 (overrides config and SHUTTER_BIND)
    #[arg(long)]
    bind: Option<String>,
}

#[derive(Args)]
struct ProjectArgs {
    /// Drain the outbox once and exit instead of polling
    #[arg(long)]
    once: bool,
}

#[derive(Args)]
struct InitConfigArgs {
    /// Destination file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    output: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    if !cli.verbose {
        for noisy in ["sqlx", "hyper", "reqwest"] {
            builder.filter_module(noisy, log::LevelFilter::Warn);
        }
    }
    builder.target(env_logger::Target::Stderr).init();

    if let Commands::InitConfig(args) = &cli.command {
        return run_init_config(args);
    }

    let config = AppConfig::load(&cli.config)?;
    match cli.command {
        Commands::Serve(args) => run_serve(config, args).await,
        Commands::Provision => run_provision(config).await,
        Commands::Project(args) => run_project(config, args).await,
        Commands::Stats => run_stats(config).await,
        Commands::ResetIndex => run_reset(config).await,
        Commands::InitConfig(_) => Ok(()),
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    let mut stdout = io::stdout().lock();
    if let Err(err) = writeln!(stdout, "{text}").and_then(|()| stdout.flush()) {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl-C: {err}");
    }
    log::info!("Shutdown requested");
}

async fn run_serve(mut config: AppConfig, args: ServeArgs) -> Result<()> {
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    let bind = config.bind.clone();
    let state = Arc::new(AppState::connect(config).await?);
    shutter_cli::serve(state, &bind, shutdown_signal()).await
}

async fn run_provision(config: AppConfig) -> Result<()> {
    let state = AppState::connect(config).await?;
    let report = state.lexical.provision().await;
    log_provision(&report);
    print_json(&json!({
        "created": report.created.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "existing": report.existing.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "failed": report.failed.iter().map(|(c, e)| json!({ "collection": c.to_string(), "error": e })).collect::<Vec<_>>(),
    }))?;
    if !report.failed.is_empty() {
        bail!("{} collection(s) could not be provisioned", report.failed.len());
    }
    Ok(())
}

async fn run_project(config: AppConfig, args: ProjectArgs) -> Result<()> {
    let state = AppState::connect(config).await?;
    if args.once {
        let report = state
            .projector
            .catch_up()
            .await
            .context("Failed to drain the projection outbox")?;
        return print_json(&serde_json::to_value(&report)?);
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    let projector = state.projector.clone();
    let task = tokio::spawn(async move { projector.run(stop_rx).await });
    shutdown_signal().await;
    let _ = stop_tx.send(true);
    task.await.context("Projector task panicked")?;
    Ok(())
}

async fn run_stats(config: AppConfig) -> Result<()> {
    let state = AppState::connect(config).await?;
    let stats = state.lexical.stats().await;
    let pending = state
        .projector
        .pending()
        .await
        .context("Failed to count pending projections")?;
    print_json(&json!({ "index": stats, "outboxPending": pending }))
}

async fn run_reset(config: AppConfig) -> Result<()> {
    let state = AppState::connect(config).await?;
    let report = state.lexical.reset().await;
    log_provision(&report);
    if !report.failed.is_empty() {
        bail!("{} collection(s) could not be recreated", report.failed.len());
    }
    log::info!("Search index reset");
    Ok(())
}

fn run_init_config(args: &InitConfigArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        bail!(
            "{} already exists; pass --force to overwrite",
            args.output.display()
        );
    }
    let raw = AppConfig::default().to_toml()?;
    std::fs::write(&args.output, raw)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    println!("Wrote default config to {}", args.output.display());
    Ok(())
}
