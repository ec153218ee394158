//! UDP sockets built with socket2

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use crate::config::NetworkConfig;
use crate::error::NetworkError;
use crate::network::transport::{DatagramSink, PacketSource};

/// Create a UDP socket bound to `addr` with the configured buffer sizes
pub fn create_socket(addr: SocketAddr, config: &NetworkConfig) -> Result<Socket, NetworkError> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    // Buffer sizes are hints; the kernel may clamp them
    if let Err(e) = socket.set_send_buffer_size(config.send_buffer_size) {
        tracing::debug!("Could not set send buffer size: {}", e);
    }
    if let Err(e) = socket.set_recv_buffer_size(config.recv_buffer_size) {
        tracing::debug!("Could not set receive buffer size: {}", e);
    }

    socket
        .bind(&SockAddr::from(addr))
        .map_err(|e| NetworkError::BindFailed(format!("{}: {}", addr, e)))?;

    Ok(socket)
}

/// Resolve `host` and `port` to the first matching address
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr, NetworkError> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| NetworkError::InvalidAddress(format!("{}: {}", host, e)))?
        .next()
        .ok_or_else(|| NetworkError::InvalidAddress(host.to_string()))
}

/// Sending end, bound to an ephemeral port and aimed at one receiver
pub struct UdpSender {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpSender {
    pub fn new(target: SocketAddr, config: &NetworkConfig) -> Result<Self, NetworkError> {
        let local: SocketAddr = if target.is_ipv4() {
            (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket: UdpSocket = create_socket(local, config)?.into();

        tracing::info!("Streaming to {}", target);
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl DatagramSink for UdpSender {
    fn send_datagram(&self, datagram: &[u8]) -> io::Result<usize> {
        let sent = self.socket.send_to(datagram, self.target)?;
        if sent != datagram.len() {
            return Err(io::ErrorKind::WriteZero.into());
        }
        Ok(sent)
    }
}

/// Receiving end; reads time out after the configured poll timeout
pub struct UdpPacketSource {
    socket: UdpSocket,
    last_peer: Option<SocketAddr>,
}

impl UdpPacketSource {
    pub fn bind(config: &NetworkConfig) -> Result<Self, NetworkError> {
        let addr = SocketAddr::new(config.bind_address, config.port);
        let socket: UdpSocket = create_socket(addr, config)?.into();
        socket
            .set_read_timeout(Some(config.poll_timeout()))
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

        tracing::info!("Listening on {}", addr);
        Ok(Self {
            socket,
            last_peer: None,
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }

    /// Address of the most recent sender
    pub fn last_peer(&self) -> Option<SocketAddr> {
        self.last_peer
    }
}

impl PacketSource for UdpPacketSource {
    fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.peek_from(buf).map(|(n, _)| n)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (n, from) = self.socket.recv_from(buf)?;
        if self.last_peer != Some(from) {
            tracing::info!("Receiving from {}", from);
            self.last_peer = Some(from);
        }
        Ok(n)
    }
}
