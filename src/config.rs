use std::time::Duration;
use anyhow::bail;

use crate::packet_header::PacketHeader;
use crate::commands::FRAME_HEADER_LEN;

/// Tuning knobs for one [crate::atem::Atem] connection. All timing values are protocol-neutral
///  implementation choices and can be adjusted for networks with unusual latency.
#[derive(Debug, Clone)]
pub struct AtemConfig {
    /// UDP control port used when `connect` is called without an explicit port
    pub default_port: u16,

    /// Upper bound for an outgoing datagram including the 12-byte packet header. The device
    ///  drops bigger packets silently, and the length field of the packet header has 11 bits,
    ///  so this must not exceed 2047.
    pub max_packet_size: usize,

    pub handshake_timeout: Duration,
    pub max_handshake_attempts: u32,

    /// interval of the sweep that re-sends unacknowledged packets
    pub retransmit_interval: Duration,
    /// an unacknowledged packet is re-sent once it is older than this
    pub retransmit_timeout: Duration,
    /// after this many re-sends of a single packet, the connection is considered lost
    pub max_packet_retries: u32,

    /// acks for received packets are coalesced and flushed at this interval...
    pub ack_flush_interval: Duration,
    /// ... or immediately when this many packets are waiting to be acknowledged
    pub max_unacked_packets: usize,

    /// how long an out-of-order packet waits for the gap before it to be filled
    pub reorder_window: Duration,
    /// packets further ahead of the next expected id than this are dropped as out-of-window
    pub reorder_window_packets: u16,

    /// an established session with no datagram from the device for this long is disconnected
    pub connection_timeout: Duration,

    /// A tracked command that is not acknowledged within this time fails with a timeout. This
    ///  must exceed the time a packet is re-sent before the session gives up on it, so a packet
    ///  is never abandoned while the session still runs.
    pub command_timeout: Duration,

    /// maximum time the data transfer manager waits for each device response
    pub transfer_response_timeout: Duration,

    pub event_channel_capacity: usize,
}

impl Default for AtemConfig {
    fn default() -> Self {
        AtemConfig {
            default_port: 9910,
            max_packet_size: 1416,
            handshake_timeout: Duration::from_millis(1000),
            max_handshake_attempts: 5,
            retransmit_interval: Duration::from_millis(100),
            retransmit_timeout: Duration::from_millis(200),
            max_packet_retries: 10,
            ack_flush_interval: Duration::from_millis(10),
            max_unacked_packets: 16,
            reorder_window: Duration::from_millis(500),
            reorder_window_packets: 64,
            connection_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(5),
            transfer_response_timeout: Duration::from_secs(5),
            event_channel_capacity: 1024,
        }
    }
}

impl AtemConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_packet_size < PacketHeader::HEADER_LEN + FRAME_HEADER_LEN + 64 {
            bail!("max packet size {} is too small", self.max_packet_size);
        }
        if self.max_packet_size > PacketHeader::MAX_PACKET_LEN {
            bail!("max packet size {} exceeds the maximum the packet header can represent ({})", self.max_packet_size, PacketHeader::MAX_PACKET_LEN);
        }
        if self.max_handshake_attempts == 0 {
            bail!("at least one handshake attempt is required");
        }
        if self.handshake_timeout.is_zero()
            || self.retransmit_interval.is_zero()
            || self.retransmit_timeout.is_zero()
            || self.ack_flush_interval.is_zero()
            || self.connection_timeout.is_zero()
            || self.command_timeout.is_zero()
            || self.transfer_response_timeout.is_zero()
        {
            bail!("timeouts and intervals must be non-zero");
        }
        match self.retransmit_budget() {
            Some(budget) if self.command_timeout > budget => {}
            budget => bail!("command timeout {:?} must exceed the retransmit budget {:?}", self.command_timeout, budget),
        }
        if self.max_unacked_packets == 0 {
            bail!("max unacked packets must be at least 1");
        }
        if self.reorder_window_packets == 0 || self.reorder_window_packets >= 0x4000 {
            bail!("reorder window must be between 1 and 16383 packets");
        }
        if self.event_channel_capacity == 0 {
            bail!("event channel capacity must be at least 1");
        }
        Ok(())
    }

    /// upper bound for how long a packet is re-sent before the session is declared lost
    pub fn retransmit_budget(&self) -> Option<Duration> {
        self.retransmit_timeout.checked_add(self.retransmit_interval)?
            .checked_mul(self.max_packet_retries.saturating_add(1))
    }

    /// room for command frames in a single packet
    pub fn max_payload_len(&self) -> usize {
        self.max_packet_size - PacketHeader::HEADER_LEN
    }
}
