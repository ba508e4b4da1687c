use std::net::SocketAddr;
use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use tokio::net::UdpSocket;
use tokio::select;
use tokio::sync::watch;
use tracing::{debug, trace};

/// Largest datagram the device sends; anything bigger is truncated by the socket and then
///  rejected by header validation.
const RECEIVE_BUFFER_SIZE: usize = 2048;

/// This is an abstraction for the datagram socket talking to a single device, introduced to
///  decouple the session engine from the I/O for testing.
///
/// There are no retries and no ordering guarantees. An `Err` from either method is a transport
///  failure that ends the session.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PacketTransport: Send + Sync + 'static {
    async fn send(&self, packet: &[u8]) -> anyhow::Result<()>;

    /// Waits for the next datagram. After [PacketTransport::close], this returns an error.
    async fn recv(&self) -> anyhow::Result<Vec<u8>>;

    fn close(&self);
}

pub struct UdpTransport {
    socket: UdpSocket,
    peer: SocketAddr,
    closed: watch::Sender<bool>,
}

impl UdpTransport {
    pub async fn connect(peer: SocketAddr) -> anyhow::Result<UdpTransport> {
        let bind_addr: SocketAddr = if peer.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        }
        else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(peer).await?;
        debug!("UDP socket {:?} connected to {:?}", socket.local_addr()?, peer);

        let (closed, _) = watch::channel(false);
        Ok(UdpTransport {
            socket,
            peer,
            closed,
        })
    }
}

#[async_trait]
impl PacketTransport for UdpTransport {
    async fn send(&self, packet: &[u8]) -> anyhow::Result<()> {
        trace!("UDP socket: sending packet of {} bytes to {:?}", packet.len(), self.peer);
        if *self.closed.borrow() {
            anyhow::bail!("transport is closed");
        }
        self.socket.send(packet).await?;
        Ok(())
    }

    async fn recv(&self) -> anyhow::Result<Vec<u8>> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            anyhow::bail!("transport is closed");
        }

        let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];
        select! {
            result = self.socket.recv(&mut buf) => {
                let len = result?;
                trace!("UDP socket: received packet of {} bytes from {:?}", len, self.peer);
                buf.truncate(len);
                Ok(buf)
            }
            _ = closed.changed() => {
                anyhow::bail!("transport is closed")
            }
        }
    }

    fn close(&self) {
        debug!("closing UDP socket to {:?}", self.peer);
        self.closed.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::runtime::Builder;

    #[test]
    fn test_udp_transport_exchange_and_close() {
        let rt = Builder::new_current_thread()
            .enable_all()
            .build().unwrap();
        rt.block_on(async {
            let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            let transport = UdpTransport::connect(device.local_addr().unwrap()).await.unwrap();

            transport.send(&[1, 2, 3]).await.unwrap();
            let mut buf = [0u8; 16];
            let (len, client_addr) = device.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[..len], &[1, 2, 3]);

            device.send_to(&[4, 5], client_addr).await.unwrap();
            assert_eq!(transport.recv().await.unwrap(), vec![4, 5]);

            transport.close();
            assert!(transport.recv().await.is_err());
            assert!(transport.send(&[1]).await.is_err());
        });
    }
}
