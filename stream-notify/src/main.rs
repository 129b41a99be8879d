use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use stream_notify::config::{AppConfig, DEFAULT_CONFIG_PATH};
use stream_notify::gateway::{GatewayClient, GatewayConfig};
use stream_notify::notification::{DiscordRestSink, NotificationDispatcher, TokioSleeper};
use stream_notify::presence::Expirer;
use stream_notify::utils::SystemClock;
use stream_notify::{StreamNotifier, logging};

/// Announces Discord voice channel go-live sessions.
#[derive(Debug, Parser)]
#[command(name = "stream-notify", version, about)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, env = "STREAM_NOTIFY_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Status text shown on the bot's profile.
    #[arg(long, env = "STREAM_NOTIFY_READY")]
    ready: Option<String>,

    /// Bot token, overriding `auth.token`.
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Also write logs to daily-rotated files in this directory.
    #[arg(long, env = "STREAM_NOTIFY_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let _log_guard = logging::init_logging(args.log_dir.as_deref())?;

    let mut config = AppConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(token) = args.token {
        config.auth.token = token;
    }
    if let Some(ready) = args.ready {
        config.ready_message = Some(ready);
    }
    config.validate()?;

    let authorization = config
        .auth
        .authorization()
        .context("no Discord credentials configured")?;
    let sink = Arc::new(DiscordRestSink::new(authorization)?);
    let dispatcher = NotificationDispatcher::with_options(
        sink,
        config.notification.retry_policy(),
        Arc::new(TokioSleeper),
        config.notification.max_in_flight,
    );
    let notifier = Arc::new(StreamNotifier::with_parts(
        Arc::new(config.guilds.clone()),
        dispatcher,
        Expirer::new(config.presence.ttl()),
        Arc::new(SystemClock),
    ));

    let gateway = GatewayClient::new(
        GatewayConfig::new(config.auth.gateway_token(), config.ready_message()),
        notifier,
    );

    let cancel = CancellationToken::new();
    let gateway_cancel = cancel.clone();
    let mut gateway_task = tokio::spawn(async move { gateway.run(gateway_cancel).await });

    info!(
        guilds = config.guilds.len(),
        status = %config.ready_message(),
        "stream-notify is running, press Ctrl-C to exit"
    );

    tokio::select! {
        result = &mut gateway_task => {
            let result = result.context("gateway task panicked")?;
            if let Err(e) = &result {
                error!(error = %e, "Gateway connection lost");
            }
            result?;
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            cancel.cancel();
            gateway_task.await.context("gateway task panicked")??;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
