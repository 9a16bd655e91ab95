//! Flex Daemon - headless Amazon Flex block-grabbing daemon
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;

use clap::Parser;
use flex_daemon::RunOptions;
use flexd_core::prelude::*;

/// Flex Daemon - automates Amazon Flex block grabbing over UiAutomator2
#[derive(Parser, Debug)]
#[command(name = "flexd")]
#[command(about = "Headless daemon that grabs Amazon Flex delivery blocks", long_about = None)]
struct Args {
    /// Path to config.toml (defaults to the platform config directory)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Automation server URL (overrides [server].url)
    #[arg(long, value_name = "URL")]
    server: Option<String>,

    /// Status API bind address (overrides [api].bind)
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    flex_daemon::run(RunOptions {
        config_path: args.config,
        server_url: args.server,
        bind: args.bind,
    })
    .await
}
