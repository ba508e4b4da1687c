use std::sync::Arc;
use std::time::Duration;
use bytes::BytesMut;
use tokio::time;

use crate::commands::{next_frame, Command, ProtocolVersion};
use crate::packet_header::{HandshakeAnswer, PacketFlags, PacketHeader};
use crate::packet_id::PacketId;
use crate::test_util::{ChannelTransport, DeviceEnd};

/// upper bound for waiting on the client in tests; with paused time this only elapses if the
///  client is stuck
const RECV_TIMEOUT: Duration = Duration::from_secs(60);

/// A scriptable device: tests drive the device's side of the protocol step by step.
pub struct SimulatedDevice {
    end: DeviceEnd,
    pub session_id: u16,
    next_packet_id: PacketId,
}

impl SimulatedDevice {
    pub fn new() -> (Arc<ChannelTransport>, SimulatedDevice) {
        let (transport, end) = ChannelTransport::pair();
        (transport, SimulatedDevice {
            end,
            session_id: 0,
            next_packet_id: PacketId::FIRST,
        })
    }

    pub async fn recv(&mut self) -> (PacketHeader, Vec<u8>) {
        let packet = time::timeout(RECV_TIMEOUT, self.end.from_client.recv()).await
            .expect("timed out waiting for a packet from the client")
            .expect("client transport dropped");
        let (header, payload) = PacketHeader::deser(&packet).expect("client sent an unparsable packet");
        (header, payload.to_vec())
    }

    pub fn try_recv(&mut self) -> Option<(PacketHeader, Vec<u8>)> {
        let packet = self.end.from_client.try_recv().ok()?;
        let (header, payload) = PacketHeader::deser(&packet).expect("client sent an unparsable packet");
        Some((header, payload.to_vec()))
    }

    /// drains everything the client sent so far
    pub fn drain(&mut self) -> Vec<(PacketHeader, Vec<u8>)> {
        let mut result = Vec::new();
        while let Some(packet) = self.try_recv() {
            result.push(packet);
        }
        result
    }

    /// waits for the hello packet, returning the provisional session id
    pub async fn expect_hello(&mut self) -> u16 {
        let (header, payload) = self.recv().await;
        assert!(header.flags.contains(PacketFlags::NEW_SESSION_ID), "expected hello, got {:?}", header);
        assert_eq!(payload, PacketHeader::HELLO_PAYLOAD.to_vec());
        header.session_id
    }

    /// answers the next hello with `session_id` and waits for the client's confirmation
    pub async fn accept(&mut self, session_id: u16) {
        let provisional = self.expect_hello().await;
        self.send_raw(PacketHeader::handshake_answer_packet(provisional, HandshakeAnswer::Accepted { session_id }));
        self.session_id = session_id;
        self.next_packet_id = PacketId::FIRST;

        let (header, _) = self.recv().await;
        assert!(header.flags.contains(PacketFlags::ACK_REPLY), "expected confirmation, got {:?}", header);
        assert_eq!(header.session_id, session_id);
    }

    pub async fn refuse(&mut self) {
        let provisional = self.expect_hello().await;
        self.send_raw(PacketHeader::handshake_answer_packet(provisional, HandshakeAnswer::Refused));
    }

    pub fn send_raw(&self, packet: Vec<u8>) {
        let _ = self.end.to_client.send(packet);
    }

    /// a sequenced packet with an explicit id, for reordering tests
    pub fn sequenced_packet(&self, packet_id: PacketId, commands: &[Command]) -> Vec<u8> {
        let mut payload = BytesMut::new();
        for command in commands {
            payload.extend_from_slice(&command.encode_frame(ProtocolVersion::LATEST).expect("test command does not encode"));
        }
        let mut header = PacketHeader::new(PacketFlags::ACK_REQUEST, self.session_id);
        header.packet_id = packet_id;
        header.ser_packet(&payload)
    }

    /// sends the commands in the next sequenced packet, returning its id
    pub fn send_commands(&mut self, commands: &[Command]) -> PacketId {
        let packet_id = self.next_packet_id;
        self.next_packet_id = packet_id.next();
        self.send_raw(self.sequenced_packet(packet_id, commands));
        packet_id
    }

    pub fn ack(&self, packet_id: PacketId) {
        self.send_raw(PacketHeader::ack_packet(self.session_id, packet_id));
    }

    pub fn request_retransmit(&self, from: PacketId) {
        self.send_raw(PacketHeader::retransmit_request_packet(self.session_id, from));
    }

    /// waits for the next packet carrying commands, skipping acks and other control packets
    pub async fn recv_commands(&mut self) -> (PacketHeader, Vec<Command>) {
        loop {
            let (header, payload) = self.recv().await;
            if header.flags.contains(PacketFlags::ACK_REQUEST) {
                return (header, decode_all(&payload));
            }
        }
    }
}

pub fn decode_all(payload: &[u8]) -> Vec<Command> {
    let mut buf = payload;
    let mut result = Vec::new();
    while let Some(frame) = next_frame(&mut buf).expect("client sent a malformed frame") {
        let command = Command::decode(frame.name, frame.payload, ProtocolVersion::LATEST)
            .expect("client sent an undecodable command")
            .expect("client sent an unknown command");
        result.push(command);
    }
    result
}
