use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use sprout::prelude::*;
use sprout::{DEFAULT_CONFIG_PATH, fetch_user_info, telemetry};
use sprout_policy::{RetryError, retry};

#[derive(Parser)]
#[command(name = "sprout", version, about = "Keep farming accounts connected")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, env = "SPROUT_CONFIG", default_value = DEFAULT_CONFIG_PATH, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Farm every account until Ctrl-C.
    Farm(Inputs),
    /// Log in each account once and print its account summary.
    Status(Inputs),
}

#[derive(Args)]
struct Inputs {
    /// Private keys, one per line.
    #[arg(long, default_value = "config/data/farm.txt")]
    accounts: PathBuf,

    /// Proxies, one per line.
    #[arg(long, default_value = "config/data/proxy.txt")]
    proxies: PathBuf,

    /// Credential cache.
    #[arg(long, default_value = "data/tokens.json")]
    store: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    telemetry::init(&config.logging.level);

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            trigger.cancel();
        }
    });

    match cli.command {
        Command::Farm(inputs) => farm(config, inputs, shutdown).await,
        Command::Status(inputs) => status(config, inputs, shutdown).await,
    }
}

async fn farm(config: AppConfig, inputs: Inputs, shutdown: CancellationToken) -> Result<()> {
    let accounts = load_signers(&inputs.accounts)?;
    if accounts.is_empty() {
        bail!("no accounts found in {}", inputs.accounts.display());
    }
    let proxies = load_proxies(&inputs.proxies)?;

    let backend = SproutBackend::new(
        config.service.clone(),
        Duration::from_secs(config.session.connect_timeout),
    );
    let fleet = FleetSupervisor::new(
        &config.farm(),
        &config.service.extension_id,
        Arc::new(backend),
        Arc::new(JsonFileStore::new(inputs.store)),
        Arc::new(SystemClock),
        proxies,
    )?;

    let report = fleet.run(accounts, &shutdown).await;
    for (identity, exit) in &report.accounts {
        match exit {
            FarmExit::Stopped(summary) => tracing::info!(
                %identity,
                cycles = summary.cycles,
                failures = summary.failures,
                rotations = summary.rotations,
                "account stopped"
            ),
            FarmExit::NotStarted => tracing::info!(%identity, "account never started"),
            FarmExit::Halted(err) => tracing::error!(%identity, error = %err, "account halted"),
            FarmExit::Crashed(reason) => tracing::error!(%identity, %reason, "account crashed"),
        }
    }
    if report.halted() == report.accounts.len() {
        bail!("every account halted");
    }
    Ok(())
}

async fn status(config: AppConfig, inputs: Inputs, shutdown: CancellationToken) -> Result<()> {
    let accounts = load_signers(&inputs.accounts)?;
    let proxies = load_proxies(&inputs.proxies)?;
    let store = JsonFileStore::new(inputs.store);
    let policy = config.farm().backoff()?;
    let clock = SystemClock;

    for (index, signer) in accounts.iter().enumerate() {
        let proxy = &proxies[index % proxies.len()];
        let api = HttpAccountApi::new(&config.service, Some(proxy))?;
        let result = retry(&policy, config.retry.max_attempts, &shutdown, |attempt| {
            tracing::debug!(identity = %signer.identity(), attempt, "fetching account info");
            fetch_user_info(
                &api,
                signer.as_ref(),
                &clock,
                &store,
                &config.service.extension_id,
            )
        })
        .await;

        match result {
            Ok(info) => println!("{} {info}", signer.identity()),
            Err(RetryError::Cancelled) => return Ok(()),
            Err(RetryError::Exhausted { attempts, last }) => tracing::error!(
                identity = %signer.identity(),
                attempts,
                error = %last,
                "account info unavailable"
            ),
        }
    }
    Ok(())
}
