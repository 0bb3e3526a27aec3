//! # MAVLink-to-gRPC Bridge — Entry Point
//!
//! Parses CLI arguments, wires up logging, constructs the [`Bridge`], and
//! runs it until `SIGINT`/`SIGTERM`. Exit code 0 on clean shutdown, 1 on a
//! fatal startup error.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use mavlink_bridge::{logging, Args, Bridge};
use tracing::{error, info};
use tracing_subscriber::{filter::LevelFilter, prelude::*, Layer};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // -v: DEBUG, -vv and more: TRACE, default: INFO. Applies to both the
    // detailed stderr layer and the async logger's stdout layer.
    let log_level = match args.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    // The detailed diagnostic layer goes to stderr, or to a daily-rotated
    // file if `--log-file` names one. The guard must outlive the program for
    // file logging to keep flushing.
    let file_guard;
    let detailed_log_layer = if args.log_file.as_deref() == Some("stderr") {
        file_guard = None;
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(log_level)
            .boxed()
    } else {
        let log_path = std::path::Path::new(args.log_file.as_deref().unwrap_or("mavlink-bridge.log"));
        let log_dir = log_path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
        let log_filename = log_path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("mavlink-bridge.log"));
        let file_appender = tracing_appender::rolling::daily(log_dir, log_filename);
        let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
        file_guard = Some(guard);
        tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false)
            .with_filter(log_level)
            .boxed()
    };

    let async_logger_layer = logging::AsyncLogger::layer().with_filter(log_level);

    tracing_subscriber::registry()
        .with(detailed_log_layer)
        .with(async_logger_layer)
        .init();

    // Keep the guard alive for the program's duration; dropping it early
    // stops the non-blocking file writer from flushing.
    let _file_guard = file_guard;

    info!("starting mavlink-bridge {}", mavlink_bridge::VERSION);

    let bridge = match Bridge::new(&args.connection, &args.grpc, args.system_id, args.component_id) {
        Ok(bridge) => Arc::new(bridge),
        Err(e) => {
            error!("failed to construct bridge: {e:#}");
            logging::shutdown();
            std::process::exit(1);
        }
    };

    if let Err(e) = bridge.start().await {
        error!("failed to start bridge: {e:#}");
        logging::shutdown();
        std::process::exit(1);
    }

    info!(connection = %args.connection, grpc = %args.grpc, "bridge running");

    if let Err(e) = bridge.wait_for_shutdown_signal().await {
        error!("error while waiting for shutdown signal: {e:#}");
        logging::shutdown();
        std::process::exit(1);
    }

    info!("shutdown complete");
    logging::shutdown();
    Ok(())
}
