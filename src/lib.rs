pub mod api;
pub mod config;
pub mod core_state;
pub mod db;
pub mod models;
pub mod pipeline;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Start the service: tracing, state, then the HTTP API until Ctrl-C.
pub fn run() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = config::AppConfig::from_env();
    let bind_addr = config.bind_addr;

    // Built outside the runtime: the blocking HTTP client owns its own
    // runtime and must also be dropped outside an async context.
    let core = Arc::new(core_state::CoreState::from_config(config).map_err(|e| e.to_string())?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start runtime: {e}"))?;

    let result = runtime.block_on(api::serve(core.clone(), bind_addr, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
        }
        tracing::info!("Shutdown requested");
    }));
    drop(runtime);
    drop(core);
    result
}
