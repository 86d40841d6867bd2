//! The touch channel's connection: a bound socket plus its resolved
//! destination, created and dropped as one value.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use async_trait::async_trait;
use tokio::net::UdpSocket;

use crate::binder::{BindOutcome, TransportBinder};
use crate::error::StreamError;

/// A usable connection. Dropping it closes the socket.
#[async_trait]
pub trait DatagramLink: Send {
    /// Send one datagram to the connection's destination.
    async fn send(&mut self, payload: &[u8]) -> Result<(), StreamError>;
}

/// Builds fresh connections on demand.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Link: DatagramLink + 'static;

    /// Resolve, create and bind a new connection.
    async fn connect(&self) -> Result<(Self::Link, BindOutcome), StreamError>;

    /// `host:port` for status lines.
    fn destination(&self) -> String;
}

// ── UDP ──────────────────────────────────────────────────────────

/// Resolves `host:port` and opens an interface-pinned UDP socket.
#[derive(Debug, Clone)]
pub struct UdpConnector {
    host: String,
    port: u16,
    binder: TransportBinder,
}

impl UdpConnector {
    pub fn new(host: impl Into<String>, port: u16, binder: TransportBinder) -> Self {
        Self {
            host: host.into(),
            port,
            binder,
        }
    }
}

#[async_trait]
impl Connector for UdpConnector {
    type Link = UdpLink;

    async fn connect(&self) -> Result<(UdpLink, BindOutcome), StreamError> {
        let dest = resolve(&self.host, self.port).await?;
        let socket = UdpSocket::bind(unspecified_for(&dest)).await?;
        let outcome = self.binder.bind(&socket);
        Ok((UdpLink { socket, dest }, outcome))
    }

    fn destination(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A connected-in-spirit UDP socket (we use `send_to`, never `connect`).
#[derive(Debug)]
pub struct UdpLink {
    socket: UdpSocket,
    dest: SocketAddr,
}

impl UdpLink {
    pub fn destination(&self) -> SocketAddr {
        self.dest
    }
}

#[async_trait]
impl DatagramLink for UdpLink {
    async fn send(&mut self, payload: &[u8]) -> Result<(), StreamError> {
        self.socket.send_to(payload, self.dest).await?;
        Ok(())
    }
}

/// Resolve `host:port` to the first address returned.
pub async fn resolve(host: &str, port: u16) -> Result<SocketAddr, StreamError> {
    let mut addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|source| StreamError::Resolve {
            host: host.to_string(),
            source,
        })?;
    addrs
        .next()
        .ok_or_else(|| StreamError::NoAddress(host.to_string()))
}

/// Wildcard local address in the same family as `dest`.
pub fn unspecified_for(dest: &SocketAddr) -> SocketAddr {
    match dest {
        SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn resolves_literal_addresses() {
        let addr = resolve("127.0.0.1", 8001).await.unwrap();
        assert_eq!(addr, "127.0.0.1:8001".parse().unwrap());
    }

    #[tokio::test]
    async fn unresolvable_host_is_a_resolve_error() {
        let err = resolve("no such host.invalid", 8001).await.unwrap_err();
        assert!(matches!(err, StreamError::Resolve { .. }));
    }

    #[test]
    fn wildcard_matches_family() {
        let v4: SocketAddr = "10.0.0.1:1".parse().unwrap();
        let v6: SocketAddr = "[::1]:1".parse().unwrap();
        assert!(unspecified_for(&v4).is_ipv4());
        assert!(unspecified_for(&v6).is_ipv6());
    }

    #[tokio::test]
    async fn udp_link_delivers_payload() {
        let rx = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = rx.local_addr().unwrap().port();

        let connector = UdpConnector::new("127.0.0.1", port, TransportBinder::default_route());
        assert_eq!(connector.destination(), format!("127.0.0.1:{port}"));
        let (mut link, outcome) = connector.connect().await.unwrap();
        assert!(!outcome.is_pinned());

        link.send(b"D\x01\x00\x02\x00").await.unwrap();
        let mut buf = [0u8; 16];
        let (n, _) = tokio::time::timeout(Duration::from_secs(2), rx.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"D\x01\x00\x02\x00");
    }
}
