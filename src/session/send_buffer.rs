use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

use crate::ack_tracker::TrackingId;
use crate::packet_id::PacketId;

/// a sequenced packet that was sent but is not acknowledged yet
#[derive(Debug)]
pub struct InFlightPacket {
    pub packet_id: PacketId,
    /// command frames, without the packet header: re-sends get a fresh header
    pub payload: Vec<u8>,
    pub tracking_ids: Vec<TrackingId>,
    pub last_sent: Instant,
    pub resend_count: u32,
}

/// Resend buffer, ordered by packet id. Packet ids are assigned in sending order, so the
///  oldest packet is always at the front.
#[derive(Default)]
pub struct SendBuffer {
    packets: VecDeque<InFlightPacket>,
}

impl SendBuffer {
    pub fn push(&mut self, packet: InFlightPacket) {
        self.packets.push_back(packet);
    }

    /// removes and returns all packets up to and including `ack_id`
    pub fn acknowledge(&mut self, ack_id: PacketId) -> Vec<InFlightPacket> {
        let mut result = Vec::new();
        while let Some(front) = self.packets.front() {
            if !front.packet_id.is_at_or_before(ack_id) {
                break;
            }
            if let Some(packet) = self.packets.pop_front() {
                trace!("packet {} acknowledged", packet.packet_id);
                result.push(packet);
            }
        }
        result
    }

    /// all retained packets from `first` onward, for answering a retransmit request
    pub fn packets_from(&mut self, first: PacketId) -> impl Iterator<Item = &mut InFlightPacket> {
        self.packets.iter_mut()
            .filter(move |p| first.is_at_or_before(p.packet_id))
    }

    /// packets that were last sent at least `timeout` ago
    pub fn due_for_resend(&mut self, now: Instant, timeout: Duration) -> impl Iterator<Item = &mut InFlightPacket> {
        self.packets.iter_mut()
            .filter(move |p| now.duration_since(p.last_sent) >= timeout)
    }

    pub fn clear(&mut self) {
        self.packets.clear();
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}
