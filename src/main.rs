use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the Mixlab application
///
/// Serves the REST API (with Swagger UI at `/swagger-ui`) until interrupted.
///
/// # Environment Variables
/// - `MIXLAB_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `MIXLAB_DATA_DIR`: Directory for formulation and cover storage (default: "mixlab_data")
/// - `MIXLAB_DEFAULT_BATCH_ML`: Default batch volume in ml (default: 500)
/// - `MIXLAB_MAX_COVER_BYTES`: Cover upload limit in bytes
/// - `API_KEY`: API key required in `x-api-key` when set
///
/// # Returns
/// * `Ok(())` - If the server starts and shuts down cleanly
/// * `Err(anyhow::Error)` - If startup or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mixlab_run=info".parse()?)
                .add_directive("api_rest=info".parse()?)
                .add_directive("mixlab_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr: SocketAddr = std::env::var("MIXLAB_REST_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:3000".into())
        .parse()?;

    tracing::info!("++ Starting Mixlab REST on {}", rest_addr);

    let state = api_rest::state_from_env()?;
    let app = api_rest::router(state);

    let listener = tokio::net::TcpListener::bind(rest_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("-- Mixlab stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
