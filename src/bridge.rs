//! # Bridge Coordinator (spec component C6)
//!
//! Parses the connection URL, constructs the protocol engine, router, and
//! RPC service, and wires the two data-flow directions together:
//! engine inbound → `dialect::to_structured` → `router::route_message`, and
//! RPC unary send → `dialect::to_wire` → `engine::send`. Owns the
//! idempotent `start`/`stop`/`wait` lifecycle the teacher's
//! `BenchmarkRunner` follows (`redhat-performance-rusty-comms`).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::{error, info};

use crate::dialect;
use crate::engine::ProtocolEngine;
use crate::error::BridgeError;
use crate::pb::mavlink_bridge_server::MavlinkBridgeServer;
use crate::router::Router;
use crate::rpc::{BridgeService, SendFn, ShutdownSignal};
use crate::transport::{SerialTransport, Transport, UdpTransport};

/// The parsed, backend-agnostic form of a `--connection` URL.
enum ParsedConnection {
    Udp { port: u16 },
    Serial { device: String, baud: u32 },
}

fn parse_connection_url(url: &str) -> Result<ParsedConnection> {
    if let Some(rest) = url.strip_prefix("udp://") {
        let Some((host, port)) = rest.rsplit_once(':') else {
            bail!(BridgeError::InvalidConnectionUrl(url.to_string()));
        };
        let port: u16 = port.parse().map_err(|_| BridgeError::InvalidConnectionUrl(url.to_string()))?;
        if host.is_empty() {
            return Ok(ParsedConnection::Udp { port });
        }
        bail!(BridgeError::UdpClientModeUnimplemented);
    }

    if let Some(rest) = url.strip_prefix("serial://") {
        let Some((device, baud)) = rest.rsplit_once(':') else {
            bail!(BridgeError::InvalidConnectionUrl(url.to_string()));
        };
        let baud: u32 = baud.parse().map_err(|_| BridgeError::InvalidConnectionUrl(url.to_string()))?;
        if device.is_empty() {
            bail!(BridgeError::InvalidConnectionUrl(url.to_string()));
        }
        return Ok(ParsedConnection::Serial {
            device: device.to_string(),
            baud,
        });
    }

    bail!(BridgeError::InvalidConnectionUrl(url.to_string()))
}

fn build_transport(parsed: &ParsedConnection) -> Box<dyn Transport> {
    match parsed {
        ParsedConnection::Udp { port } => Box::new(UdpTransport::listen_all_interfaces(*port, false)),
        ParsedConnection::Serial { device, baud } => Box::new(SerialTransport::new(device.clone(), *baud)),
    }
}

/// Owns the whole running bridge: engine, router, RPC service, and the
/// tokio server task serving it.
pub struct Bridge {
    engine: Arc<ProtocolEngine>,
    router: Arc<Router>,
    shutdown: Arc<ShutdownSignal>,
    grpc_addr: SocketAddr,
    running: AtomicBool,
}

impl Bridge {
    /// Parses `connection_url`, constructs the transport/engine/router, and
    /// wires the bidirectional callbacks. Does not open anything yet; call
    /// [`Bridge::start`] for that.
    pub fn new(connection_url: &str, grpc_addr: &str, system_id: u8, component_id: u8) -> Result<Self> {
        let parsed = parse_connection_url(connection_url)?;
        let transport = build_transport(&parsed);
        let grpc_addr: SocketAddr = grpc_addr
            .parse()
            .with_context(|| format!("invalid gRPC bind address '{grpc_addr}'"))?;

        let engine = Arc::new(ProtocolEngine::new(transport, system_id, component_id));
        let router = Arc::new(Router::new());

        let router_for_callback = router.clone();
        engine.set_message_callback(move |header, message| {
            let structured = dialect::to_structured(header, &message);
            router_for_callback.route_message(&structured);
        });

        Ok(Self {
            engine,
            router,
            shutdown: Arc::new(ShutdownSignal::new()),
            grpc_addr,
            running: AtomicBool::new(false),
        })
    }

    /// Starts the protocol engine and the gRPC server. Returns an error if
    /// the engine fails to open its transport, or if the gRPC listener
    /// fails to bind (e.g. the port is already in use); idempotent once
    /// running.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if !self.engine.start() {
            self.running.store(false, Ordering::Release);
            bail!(BridgeError::TransportStartFailed);
        }

        // Bind synchronously so a bad gRPC address surfaces as an ordinary
        // fatal startup error (spec.md section 7) instead of only being
        // logged from inside the spawned server task.
        let listener = match TcpListener::bind(self.grpc_addr).await {
            Ok(listener) => listener,
            Err(source) => {
                self.engine.stop();
                self.running.store(false, Ordering::Release);
                bail!(BridgeError::Grpc {
                    addr: self.grpc_addr,
                    source,
                });
            }
        };

        let engine_for_send = self.engine.clone();
        let send: SendFn = Arc::new(move |message| match dialect::to_wire(message) {
            Some(wire) => engine_for_send.send(&wire),
            None => false,
        });

        let service = BridgeService::new(self.router.clone(), send, self.shutdown.clone());
        let this = self.clone();

        tokio::spawn(async move {
            info!(grpc_addr = %this.grpc_addr, "gRPC server listening");
            let result = Server::builder()
                .add_service(MavlinkBridgeServer::new(service))
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await;

            if let Err(e) = result {
                error!("gRPC server exited with error: {e}");
            }
            this.running.store(false, Ordering::Release);
        });

        Ok(())
    }

    /// Signals shutdown: stops the engine's receive thread, wakes every
    /// outstanding RPC stream handler.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.engine.stop();
        self.shutdown.shutdown();
    }

    /// Installs `SIGINT`/`SIGTERM` handlers that call [`Bridge::stop`], then
    /// blocks until a signal arrives.
    pub async fn wait_for_shutdown_signal(self: &Arc<Self>) -> Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }

        self.stop();
        Ok(())
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn engine(&self) -> &Arc<ProtocolEngine> {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_udp_listener_url() {
        let parsed = parse_connection_url("udp://:14550").unwrap();
        assert!(matches!(parsed, ParsedConnection::Udp { port: 14550 }));
    }

    #[test]
    fn rejects_udp_client_mode_as_unimplemented() {
        let err = parse_connection_url("udp://10.0.0.5:14550").unwrap_err();
        assert!(err.to_string().contains("not implemented"));
    }

    #[test]
    fn parses_serial_url() {
        let parsed = parse_connection_url("serial:///dev/ttyUSB0:57600").unwrap();
        match parsed {
            ParsedConnection::Serial { device, baud } => {
                assert_eq!(device, "/dev/ttyUSB0");
                assert_eq!(baud, 57600);
            }
            _ => panic!("expected serial connection"),
        }
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(parse_connection_url("tcp://127.0.0.1:1234").is_err());
    }

    #[test]
    fn rejects_malformed_udp_url() {
        assert!(parse_connection_url("udp://nope").is_err());
    }

    #[tokio::test]
    async fn constructs_bridge_over_udp_without_starting() {
        let bridge = Bridge::new("udp://:0", "127.0.0.1:0", 1, 1).unwrap();
        assert_eq!(bridge.router().subscription_count(), 0);
        assert!(!bridge.engine().is_running());
    }

    #[test]
    fn rejects_invalid_grpc_address() {
        assert!(Bridge::new("udp://:14550", "not-an-address", 1, 1).is_err());
    }

    #[tokio::test]
    async fn start_surfaces_grpc_bind_failure() {
        // Occupy a port first so the bridge's own bind attempt fails.
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = occupied.local_addr().unwrap();

        let bridge = Arc::new(Bridge::new("udp://:0", &addr.to_string(), 1, 1).unwrap());
        let err = bridge.start().await.unwrap_err();
        assert!(err.to_string().contains("failed to bind gRPC listener"));
        assert!(!bridge.engine().is_running());
    }
}
