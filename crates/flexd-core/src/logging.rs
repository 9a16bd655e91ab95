//! Logging configuration using tracing

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Initialize the logging subsystem
///
/// Logs go to stderr and to a daily-rolling file under
/// `~/.local/share/flex-daemon/logs/`.
/// Log level is controlled by the `FLEXD_LOG` environment variable.
///
/// # Examples
/// ```bash
/// FLEXD_LOG=debug flexd
/// FLEXD_LOG=flexd_driver=trace,info flexd
/// ```
pub fn init() -> Result<()> {
    let log_dir = get_log_directory()?;
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "flexd.log");

    // Default to info, allow override via FLEXD_LOG
    let env_filter = EnvFilter::try_from_env("FLEXD_LOG")
        .unwrap_or_else(|_| EnvFilter::new("flex_daemon=info,flexd_core=info,flexd_driver=info,flexd_bot=info,flexd_api=info,warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_timer(fmt::time::ChronoLocal::new("%H:%M:%S%.3f".to_string())),
        )
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .init();

    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("Flex Daemon starting");
    tracing::info!("Log directory: {}", log_dir.display());
    tracing::info!("═══════════════════════════════════════════════════════");

    Ok(())
}

/// Get the log directory path
fn get_log_directory() -> Result<PathBuf> {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    Ok(base.join("flex-daemon").join("logs"))
}
