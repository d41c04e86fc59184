use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use asana_extractor::cli::{Cli, Commands};
use asana_extractor::config::{Config, LoggingConfig};
use asana_extractor::{
    create_transport, initialize_config, ExtractError, Extractor, InitOptions, Shutdown,
    StopReason,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle init command early as it doesn't need config loading
    if let Some(Commands::Init {
        config,
        no_prompt,
        force,
    }) = &cli.command
    {
        let mut logging = LoggingConfig::default();
        apply_logging_overrides(&mut logging, &cli);
        init_logging(&logging, cli.verbose);
        return initialize_config(InitOptions {
            config_path: config.clone(),
            no_prompt: *no_prompt,
            force: *force,
        })
        .await;
    }

    let source = Config::locate(cli.config.as_deref());
    let mut config = Config::load(source.as_deref())?;
    apply_cli_overrides(&mut config, &cli);
    init_logging(&config.logging, cli.verbose);

    info!("starting app");
    match &source {
        Some(path) => info!(path = %path.display(), "loaded configuration file"),
        None => info!("no configuration file found, using environment and defaults"),
    }

    if let Err(e) = config.validate() {
        error!(error = %e, "invalid configuration");
        return Err(e);
    }
    info!(app_name = %config.app.name, "app name");

    let transport = create_transport(&config.api)?;
    let extractor = Arc::new(Extractor::new(&config, transport)?);

    if let Some(count) = cli.burst {
        run_burst(&extractor, count).await;
        return Ok(());
    }

    let token = CancellationToken::new();
    spawn_signal_handler(token.clone());

    let mut shutdown = Shutdown::new(token);
    if let Some(seconds) = cli.max_runtime {
        shutdown = shutdown.with_max_runtime(Duration::from_secs(seconds));
    }

    let summary = extractor.run(&shutdown, config.poll.interval()).await;
    match summary.stop_reason {
        StopReason::Cancelled | StopReason::DeadlineExceeded => {}
        StopReason::RateLimited { retry_after } => {
            warn!(?retry_after, "stopped after being rate limited; restart once the window has passed");
        }
        StopReason::Failed(ref e) => {
            warn!(error = %e, "stopped after a failed extraction");
        }
    }

    Ok(())
}

fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if logging.format == "json" {
        let _ = subscriber.json().try_init();
    } else {
        let _ = subscriber.try_init();
    }
}

fn apply_logging_overrides(logging: &mut LoggingConfig, cli: &Cli) {
    if let Some(level) = &cli.log_level {
        logging.level.clone_from(level);
    }
    if let Some(format) = &cli.log_format {
        logging.format.clone_from(format);
    }
}

fn apply_cli_overrides(config: &mut Config, cli: &Cli) {
    if let Some(interval) = cli.interval {
        config.poll.interval_seconds = interval;
    }
    apply_logging_overrides(&mut config.logging, cli);
}

fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        token.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler, listening for Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

async fn run_burst(extractor: &Arc<Extractor>, count: usize) {
    info!(count, "starting concurrent user fetch burst");
    let results = extractor.burst_users(count).await;

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let rate_limited = results
        .iter()
        .filter(|r| matches!(r, Err(ExtractError::RateLimited { .. })))
        .count();
    let failed = results.len() - succeeded - rate_limited;

    info!(succeeded, rate_limited, failed, "burst finished");
}
