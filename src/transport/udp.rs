//! UDP datagram transport backend (spec.md section 4.1.1).

use std::collections::HashSet;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, warn};

use super::Transport;

/// UDP datagram backend with "learn on receive" endpoint discovery.
///
/// Whenever a datagram is received, its source `(addr, port)` is added to
/// `remote_endpoints` if not already present. `write` fans the buffer out to
/// every learned endpoint; if none have been learned yet and broadcast is
/// enabled, it sends once to the limited broadcast address instead.
pub struct UdpTransport {
    bind_addr: SocketAddr,
    broadcast: bool,
    socket: Option<UdpSocket>,
    remote_endpoints: HashSet<SocketAddr>,
}

impl UdpTransport {
    /// `bind_addr` is the local address/port to bind; use
    /// `Ipv4Addr::UNSPECIFIED` to listen on all interfaces.
    pub fn new(bind_addr: SocketAddr, broadcast: bool) -> Self {
        Self {
            bind_addr,
            broadcast,
            socket: None,
            remote_endpoints: HashSet::new(),
        }
    }

    /// Convenience constructor for `udp://:PORT` — all interfaces, given
    /// port.
    pub fn listen_all_interfaces(port: u16, broadcast: bool) -> Self {
        Self::new(SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), port), broadcast)
    }
}

impl Transport for UdpTransport {
    fn open(&mut self) -> bool {
        if self.socket.is_some() {
            return true;
        }

        let domain = match self.bind_addr {
            SocketAddr::V4(_) => Domain::IPV4,
            SocketAddr::V6(_) => Domain::IPV6,
        };

        let socket = match Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)) {
            Ok(s) => s,
            Err(e) => {
                warn!("failed to create UDP socket: {e}");
                return false;
            }
        };

        if let Err(e) = socket.set_reuse_address(true) {
            warn!("failed to set SO_REUSEADDR: {e}");
            return false;
        }

        if self.broadcast {
            if let Err(e) = socket.set_broadcast(true) {
                warn!("failed to enable broadcast: {e}");
                return false;
            }
        }

        if let Err(e) = socket.set_nonblocking(true) {
            warn!("failed to set non-blocking: {e}");
            return false;
        }

        if let Err(e) = socket.bind(&self.bind_addr.into()) {
            warn!("failed to bind UDP socket to {}: {e}", self.bind_addr);
            return false;
        }

        self.socket = Some(socket.into());
        debug!("UDP transport bound to {}", self.bind_addr);
        true
    }

    fn close(&mut self) {
        self.socket = None;
        self.remote_endpoints.clear();
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    fn read(&mut self, buf: &mut [u8]) -> isize {
        let Some(socket) = self.socket.as_ref() else {
            return -1;
        };

        match socket.recv_from(buf) {
            Ok((n, from)) => {
                if self.remote_endpoints.insert(from) {
                    debug!("learned new remote endpoint {from}");
                }
                n as isize
            }
            Err(e) if would_block(&e) => 0,
            Err(e) => {
                warn!("UDP read error: {e}");
                -1
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> isize {
        let Some(socket) = self.socket.as_ref() else {
            return -1;
        };

        if self.remote_endpoints.is_empty() {
            if self.broadcast {
                let broadcast_addr = SocketAddr::new(Ipv4Addr::BROADCAST.into(), self.bind_addr.port());
                return match socket.send_to(buf, broadcast_addr) {
                    Ok(n) => n as isize,
                    Err(e) if would_block(&e) => 0,
                    Err(e) => {
                        warn!("UDP broadcast write error: {e}");
                        -1
                    }
                };
            }
            // No known remotes and broadcast disabled: nothing to send to,
            // but this is not itself a transport failure.
            return 0;
        }

        let mut total: isize = 0;
        for &remote in &self.remote_endpoints {
            match socket.send_to(buf, remote) {
                Ok(n) => total += n as isize,
                Err(e) if would_block(&e) => {}
                Err(e) => {
                    warn!("UDP write error to {remote}: {e}");
                    return -1;
                }
            }
        }
        total
    }
}

fn would_block(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MAX_PACKET_LEN;

    #[test]
    fn open_close_is_idempotent_and_reusable() {
        let mut transport = UdpTransport::listen_all_interfaces(0, false);
        assert!(transport.open());
        assert!(transport.is_open());
        assert!(transport.open()); // idempotent
        transport.close();
        assert!(!transport.is_open());
        assert!(transport.open()); // reopenable
        transport.close();
    }

    #[test]
    fn read_returns_zero_with_no_data() {
        let mut transport = UdpTransport::listen_all_interfaces(0, false);
        assert!(transport.open());
        let mut buf = [0u8; MAX_PACKET_LEN];
        assert_eq!(transport.read(&mut buf), 0);
    }

    #[test]
    fn write_with_no_learned_endpoints_and_no_broadcast_is_a_noop() {
        let mut transport = UdpTransport::listen_all_interfaces(0, false);
        assert!(transport.open());
        assert_eq!(transport.write(&[1, 2, 3]), 0);
    }

    #[test]
    fn learns_remote_endpoint_on_receive_and_routes_write_back() {
        let mut server = UdpTransport::listen_all_interfaces(0, false);
        assert!(server.open());
        let server_addr = server.socket.as_ref().unwrap().local_addr().unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client.send_to(b"hello", server_addr).unwrap();

        let mut buf = [0u8; MAX_PACKET_LEN];
        // Poll briefly; the OS may not deliver the datagram instantly.
        let mut n = 0isize;
        for _ in 0..50 {
            n = server.read(&mut buf);
            if n != 0 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(n, 5);
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(server.remote_endpoints.len(), 1);

        client.set_nonblocking(true).unwrap();
        assert!(server.write(b"reply") > 0);
        let mut reply = [0u8; 16];
        let mut got = 0isize;
        for _ in 0..50 {
            match client.recv(&mut reply) {
                Ok(n) => {
                    got = n as isize;
                    break;
                }
                Err(e) if would_block(&e) => std::thread::sleep(std::time::Duration::from_millis(10)),
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(got, 5);
        assert_eq!(&reply[..5], b"reply");
    }
}
