//! Typed error enum for the bridge coordinator.
//!
//! Mirrors the teacher's `ipc::IpcError` split: components with a small,
//! closed set of failure modes get a `thiserror` enum; the coordinator and
//! CLI boundary work in `anyhow::Result` so callers don't need to match on
//! every inner variant. `Transport` and `ProtocolEngine` report failure via
//! the `bool` returns spec.md §4.1/§4.2 specify directly, so they have no
//! typed error of their own — only the coordinator, which turns those
//! booleans into a diagnosable `anyhow::Error`, needs one.

use thiserror::Error;

/// Failures raised by the bridge coordinator while parsing configuration or
/// wiring components together.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid connection url '{0}': expected udp://[HOST]:PORT or serial://DEVICE:BAUD")]
    InvalidConnectionUrl(String),

    #[error("udp client mode (udp://HOST:PORT with a non-empty HOST) is not implemented")]
    UdpClientModeUnimplemented,

    #[error("transport failed to start")]
    TransportStartFailed,

    #[error("failed to bind gRPC listener on {addr}")]
    Grpc {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
}
