use port_feed::file_io;
use port_feed::Error;
use port_feed::FeedConfig;
use port_feed::FeedNodeBuilder;
use port_feed::LogConfig;
use port_feed::Result;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let mut config = FeedConfig::new()?;
    if let Some(path) = std::env::args().nth(1) {
        config = config.with_override_config(&path)?;
    }
    let config = config.validate()?;

    // Initializing Logs
    let _guard = init_observability(&config.log)?;
    info!(?config, "configuration loaded");

    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());

    // Build Node; an unreachable store ends the process here
    let node = match FeedNodeBuilder::new(config, graceful_rx).build().await {
        Ok(node) => node,
        Err(e) => {
            error!(fatal = e.is_fatal(), "failed to start: {}", e);
            return Err(e);
        }
    };

    info!("Application started. Waiting for CTRL+C signal...");
    // Listen on Shutdown Signal
    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    // Start Node
    if let Err(e) = node.run().await {
        return exit_on(e);
    }

    info!("Exiting program.");
    Ok(())
}

/// Fatal errors end the process with a non-zero status; anything else is
/// logged and the process exits cleanly.
fn exit_on(e: Error) -> Result<()> {
    if e.is_fatal() {
        error!("node stops: {:?}", e);
        return Err(e);
    }
    warn!("node stopped after a recoverable error: {}", e);
    Ok(())
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        Error::SignalSenderClosed(format!("Failed to send shutdown signal: {}", e))
    })?;

    info!("Shutdown signal sent");
    Ok(())
}

/// Log to `log.log_dir/log.file_name` and stdout, filtered by `RUST_LOG`
/// (default `info`).
pub fn init_observability(log: &LogConfig) -> Result<WorkerGuard> {
    let log_file = file_io::open_file_for_append(&log.log_dir.join(&log.file_name))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_filter(env_filter());
    let stdout_layer = tracing_subscriber::fmt::layer().with_filter(env_filter());

    tracing_subscriber::registry().with(file_layer).with(stdout_layer).init();

    Ok(guard)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
