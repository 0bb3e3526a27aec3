//! # MAVLink-to-gRPC Bridge
//!
//! Terminates a MAVLink telemetry link (UDP or serial) and exposes its
//! traffic as a bidirectional streaming gRPC service. See `SPEC_FULL.md` for
//! the full component breakdown; in short:
//!
//! - [`transport`]: synchronous, non-blocking UDP/serial backends.
//! - [`engine`]: the protocol engine — framing, CRC, sequence tracking, the
//!   dedicated receive thread.
//! - [`router`]: mutex-guarded subscription fan-out.
//! - [`dialect`]: wire message ⇄ protobuf message conversion.
//! - [`pb`]: generated protobuf/gRPC types.
//! - [`rpc`]: the gRPC service implementation.
//! - [`bridge`]: wires the above together and owns the process lifecycle.

pub mod bridge;
pub mod cli;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod logging;
pub mod pb;
pub mod router;
pub mod rpc;
pub mod transport;

pub use bridge::Bridge;
pub use cli::Args;
pub use engine::ProtocolEngine;
pub use router::Router;

/// The current version of the bridge.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values, mirrored by [`cli::Args::default`].
pub mod defaults {
    /// Default connection URL: UDP listener on all interfaces, port 14550.
    pub const CONNECTION_URL: &str = "udp://:14550";

    /// Default gRPC bind address.
    pub const GRPC_ADDR: &str = "0.0.0.0:50051";

    /// Default MAVLink system id this bridge identifies itself as.
    pub const SYSTEM_ID: u8 = 1;

    /// Default MAVLink component id this bridge identifies itself as.
    pub const COMPONENT_ID: u8 = 1;
}
