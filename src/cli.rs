//! # Command-Line Interface Module
//!
//! Argument parsing for the MAVLink-to-gRPC bridge. Follows the teacher's
//! `clap::Parser` derive conventions (`redhat-performance-rusty-comms`'s
//! `cli::Args`): styled help, `help_heading` grouping, and doc comments that
//! double as the generated `--help` text.

use clap::{
    builder::styling::{AnsiColor, Styles},
    Parser,
};

/// Replicates clap v3's coloring for `--help` output, matching the teacher.
fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Yellow.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// MAVLink-to-gRPC bridge — terminates MAVLink on a UDP or serial link and
/// exposes the traffic as a streaming gRPC service.
///
/// ## Connection URL grammars
///
/// - `udp://:PORT` — UDP listener on all interfaces, given port.
/// - `udp://HOST:PORT` — outbound UDP peer (currently rejected as
///   unimplemented; see spec.md section 9 open questions).
/// - `serial://DEVICE:BAUD` — serial device at the given baud rate.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None, styles = styles())]
pub struct Args {
    /// Connection URL for the vehicle-facing link.
    ///
    /// One of `udp://:PORT`, `udp://HOST:PORT`, or `serial://DEVICE:BAUD`.
    #[arg(short = 'c', long = "connection", default_value = "udp://:14550", help_heading = "Core Options")]
    pub connection: String,

    /// Bind address for the gRPC server (`HOST:PORT`).
    #[arg(short = 'g', long = "grpc", default_value = "0.0.0.0:50051", help_heading = "Core Options")]
    pub grpc: String,

    /// MAVLink system id this bridge identifies itself as when sending.
    #[arg(short = 's', long = "system-id", default_value_t = 1, help_heading = "Core Options")]
    pub system_id: u8,

    /// MAVLink component id this bridge identifies itself as when sending.
    #[arg(short = 'C', long = "component-id", default_value_t = 1, help_heading = "Core Options")]
    pub component_id: u8,

    /// Increase diagnostic log verbosity.
    ///
    /// Can be used multiple times:
    ///  -v: debug
    ///  -vv and more: trace
    /// By default, only INFO and above are shown.
    #[arg(short, long, action = clap::ArgAction::Count, help_heading = "Output and Logging")]
    pub verbose: u8,

    /// Where to send detailed diagnostic logs.
    ///
    /// A path writes daily-rotated, color-free log files there (the
    /// directory must exist). The literal value `stderr` disables file
    /// logging and writes detailed diagnostics to stderr instead. Defaults
    /// to `mavlink-bridge.log` in the current directory. This is separate
    /// from the colorized operator-facing summary lines on stdout, which
    /// are always shown regardless of this flag.
    #[arg(long = "log-file", help_heading = "Output and Logging")]
    pub log_file: Option<String>,
}

impl Default for Args {
    /// Clap defaults are only applied by `Args::parse`; this mirrors them
    /// for test construction, matching the teacher's
    /// `BenchmarkConfiguration`/`Args` test usage pattern.
    fn default() -> Self {
        Self {
            connection: "udp://:14550".to_string(),
            grpc: "0.0.0.0:50051".to_string(),
            system_id: 1,
            component_id: 1,
            verbose: 0,
            log_file: None,
        }
    }
}
