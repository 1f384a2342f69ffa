use orders_service::{Config, Server, init_logger_with_file};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment
    let _ = dotenvy::dotenv();

    // 2. Configuration
    let config = Config::from_env();

    // 3. Logging
    init_logger_with_file(&config.log.level, config.log.json, config.log.dir.as_deref())?;
    config.validate()?;

    tracing::info!(
        environment = %config.environment,
        queue = %config.amqp.queue,
        "Orders service starting..."
    );

    // 4. Signals
    let shutdown_token = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown_token.clone()));

    // 5. Run
    let server = Server::new(config);
    if let Err(e) = server.run(shutdown_token).await {
        tracing::error!("Server error: {e:#}");
        return Err(e);
    }

    tracing::info!("Orders service stopped");
    Ok(())
}

/// Cancel `token` on SIGINT or SIGTERM
async fn wait_for_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for SIGINT");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }

    token.cancel();
}
