use std::io;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::{debug, trace};

const MAX_DATAGRAM: usize = 2048;

/// Request/response primitive towards the vehicle.
///
/// One call carries exactly one request frame and yields exactly one reply
/// frame. Framing and timeouts belong to the link, not the transport.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, frame: &[u8]) -> io::Result<Vec<u8>>;

    async fn close(&self) {}
}

/// Opens transports for a vehicle address.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, host: &str, port: u16) -> io::Result<Box<dyn Transport>>;
}

/// Datagram transport for vehicles speaking the text SDK over UDP.
#[derive(Debug, Default, Clone, Copy)]
pub struct UdpConnector;

#[async_trait]
impl Connector for UdpConnector {
    async fn open(&self, host: &str, port: u16) -> io::Result<Box<dyn Transport>> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
        socket.connect((host, port)).await?;
        debug!(local = ?socket.local_addr().ok(), host, port, "udp socket ready");
        Ok(Box::new(UdpTransport { socket }))
    }
}

pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Replies to requests that already timed out may still arrive; drop
    /// them so they are not mistaken for the answer to the next request.
    fn drain_stale(&self) -> io::Result<()> {
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            match self.socket.try_recv(&mut buf) {
                Ok(len) => trace!(len, "discarding stale datagram"),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn request(&self, frame: &[u8]) -> io::Result<Vec<u8>> {
        self.drain_stale()?;
        self.socket.send(frame).await?;
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let len = self.socket.recv(&mut buf).await?;
        buf.truncate(len);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn udp_round_trip() {
        let vehicle = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = vehicle.local_addr().unwrap().port();

        let echo = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (len, peer) = vehicle.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[..len], b"command");
            vehicle.send_to(b"ok", peer).await.unwrap();
        });

        let transport = UdpConnector.open("127.0.0.1", port).await.unwrap();
        let reply = transport.request(b"command").await.unwrap();
        assert_eq!(reply, b"ok");
        echo.await.unwrap();
    }
}
