//! In-memory stand-ins for the network side of a session

pub mod simulated_device;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use async_trait::async_trait;
use tokio::select;
use tokio::sync::{mpsc, watch, Mutex};

use crate::packet_transport::PacketTransport;

/// Datagram transport over in-process channels. Datagrams sent after the device end is dropped
///  are lost silently, like on a real network.
pub struct ChannelTransport {
    to_device: mpsc::UnboundedSender<Vec<u8>>,
    from_device: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    closed: watch::Sender<bool>,
    failing_sends: AtomicBool,
}

/// the device's side of a [ChannelTransport]
pub struct DeviceEnd {
    pub from_client: mpsc::UnboundedReceiver<Vec<u8>>,
    pub to_client: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelTransport {
    pub fn pair() -> (Arc<ChannelTransport>, DeviceEnd) {
        let (to_device, from_client) = mpsc::unbounded_channel();
        let (to_client, from_device) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);

        let transport = ChannelTransport {
            to_device,
            from_device: Mutex::new(from_device),
            closed,
            failing_sends: AtomicBool::new(false),
        };
        (Arc::new(transport), DeviceEnd { from_client, to_client })
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// makes every following `send` fail, like a socket whose route went away
    pub fn fail_sends(&self) {
        self.failing_sends.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl PacketTransport for ChannelTransport {
    async fn send(&self, packet: &[u8]) -> anyhow::Result<()> {
        if self.is_closed() {
            anyhow::bail!("transport is closed");
        }
        if self.failing_sends.load(Ordering::Relaxed) {
            anyhow::bail!("host unreachable");
        }
        let _ = self.to_device.send(packet.to_vec());
        Ok(())
    }

    async fn recv(&self) -> anyhow::Result<Vec<u8>> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            anyhow::bail!("transport is closed");
        }

        let mut from_device = self.from_device.lock().await;
        select! {
            packet = from_device.recv() => {
                match packet {
                    Some(packet) => Ok(packet),
                    None => anyhow::bail!("device end dropped"),
                }
            }
            _ = closed.changed() => {
                anyhow::bail!("transport is closed")
            }
        }
    }

    fn close(&self) {
        self.closed.send_replace(true);
    }
}
