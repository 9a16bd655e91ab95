//! Flex Daemon Library
//!
//! Wiring for the `flexd` binary: settings, the automation transport, the
//! bot task, and the Status API server. All behavior lives in the
//! workspace crates; this layer only connects them and owns shutdown.

use std::path::PathBuf;

use flexd_api::Api;
use flexd_bot::{default_config_path, load_settings, spawn_bot, StateHandle};
use flexd_core::prelude::*;
use flexd_driver::WebDriverTransport;

/// Command-line overrides applied on top of the settings file.
#[derive(Debug, Default)]
pub struct RunOptions {
    /// Settings file path; defaults to the platform config directory.
    pub config_path: Option<PathBuf>,
    /// Automation server URL override.
    pub server_url: Option<String>,
    /// Status API bind address override.
    pub bind: Option<String>,
}

/// Runs the daemon until ctrl-c or SIGTERM.
pub async fn run(options: RunOptions) -> Result<()> {
    color_eyre::install().map_err(|e| Error::config(format!("color-eyre install failed: {e}")))?;
    flexd_core::logging::init()?;

    let config_path = options.config_path.unwrap_or_else(default_config_path);
    let mut settings = load_settings(&config_path);
    if let Some(url) = options.server_url {
        settings.server.url = url;
    }
    if let Some(bind) = options.bind {
        settings.api.bind = bind;
    }
    info!(
        config = %config_path.display(),
        server = %settings.server.url,
        bind = %settings.api.bind,
        "flex daemon configured"
    );

    let transport = WebDriverTransport::with_timeouts(
        &settings.server.url,
        settings.server.connect_timeout(),
        settings.server.request_timeout(),
    )?;
    let store = StateHandle::with_log_limit(settings.api.log_limit);
    let (bot, session) = spawn_bot(transport, &settings, store.clone());

    let api = Api::new(bot.clone(), store, session);
    let result = flexd_api::serve(&settings.api.bind, api, shutdown_signal()).await;

    // Server is down; take the bot task with it
    bot.shutdown().await;
    info!("flex daemon stopped");
    result
}

/// Resolves on ctrl-c or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install ctrl-c handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => error!("failed to install SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
