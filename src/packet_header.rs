use anyhow::bail;
use bitflags::bitflags;
use bytes::{Buf, BufMut, BytesMut};

use crate::packet_id::PacketId;
use crate::util::safe_converter::PrecheckedCast;

bitflags! {
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
    pub struct PacketFlags: u8 {
        /// the packet carries a sequenced packet id and must be acknowledged
        const ACK_REQUEST = 0x01;
        const NEW_SESSION_ID = 0x02;
        const IS_RETRANSMIT = 0x04;
        /// the sender asks for all packets from `retransmit_from` onward
        const RETRANSMIT_REQUEST = 0x08;
        /// `ack_packet_id` acknowledges everything up to and including it
        const ACK_REPLY = 0x10;
    }
}

/// result codes in the first byte of a device's handshake answer
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HandshakeAnswer {
    Accepted { session_id: u16 },
    Refused,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PacketHeader {
    pub flags: PacketFlags,
    /// total packet length including this header
    pub length: u16,
    pub session_id: u16,
    pub ack_packet_id: PacketId,
    pub retransmit_from: PacketId,
    pub packet_id: PacketId,
}

impl PacketHeader {
    pub const HEADER_LEN: usize = 12;
    /// the length field has 11 bits
    pub const MAX_PACKET_LEN: usize = 0x07ff;

    pub const HELLO_PAYLOAD: [u8; 8] = [0x01, 0, 0, 0, 0, 0, 0, 0];
    const HANDSHAKE_ACCEPTED: u8 = 0x02;
    const HANDSHAKE_REFUSED: u8 = 0x03;

    pub fn new(flags: PacketFlags, session_id: u16) -> PacketHeader {
        PacketHeader {
            flags,
            length: Self::HEADER_LEN.prechecked_cast(),
            session_id,
            ack_packet_id: PacketId::ZERO,
            retransmit_from: PacketId::ZERO,
            packet_id: PacketId::ZERO,
        }
    }

    /// writes the header followed by `payload`, filling in the length field
    pub fn ser_packet(&self, payload: &[u8]) -> Vec<u8> {
        let len = Self::HEADER_LEN + payload.len();
        assert!(len <= Self::MAX_PACKET_LEN, "this is a bug: packet size must be checked before serializing");

        let mut buf = BytesMut::with_capacity(len);
        let len: u16 = len.prechecked_cast();
        buf.put_u16(((self.flags.bits() as u16) << 11) | len);
        buf.put_u16(self.session_id);
        buf.put_u16(self.ack_packet_id.to_raw());
        buf.put_u16(self.retransmit_from.to_raw());
        buf.put_u16(0);
        buf.put_u16(self.packet_id.to_raw());
        buf.put_slice(payload);
        buf.to_vec()
    }

    /// Parses the header of a received datagram and returns it together with the payload. The
    ///  length field must match the datagram's size.
    pub fn deser(packet: &[u8]) -> anyhow::Result<(PacketHeader, &[u8])> {
        if packet.len() < Self::HEADER_LEN {
            bail!("packet of {} bytes is shorter than the packet header", packet.len());
        }

        let mut buf = packet;
        let flags_and_len = buf.get_u16();
        let flags = PacketFlags::from_bits_truncate((flags_and_len >> 11) as u8);
        let length = flags_and_len & 0x07ff;
        if length as usize != packet.len() {
            bail!("packet length field {} does not match datagram size {}", length, packet.len());
        }

        let session_id = buf.get_u16();
        let ack_packet_id = PacketId::from_raw(buf.get_u16());
        let retransmit_from = PacketId::from_raw(buf.get_u16());
        let _reserved = buf.get_u16();
        let packet_id = PacketId::from_raw(buf.get_u16());

        Ok((PacketHeader {
            flags,
            length,
            session_id,
            ack_packet_id,
            retransmit_from,
            packet_id,
        }, buf))
    }

    pub fn hello_packet(provisional_session_id: u16) -> Vec<u8> {
        PacketHeader::new(PacketFlags::NEW_SESSION_ID, provisional_session_id)
            .ser_packet(&Self::HELLO_PAYLOAD)
    }

    /// the client's confirmation that it received the session id assigned by the device
    pub fn hello_confirmation_packet(session_id: u16) -> Vec<u8> {
        Self::ack_packet(session_id, PacketId::ZERO)
    }

    pub fn ack_packet(session_id: u16, ack_packet_id: PacketId) -> Vec<u8> {
        let mut header = PacketHeader::new(PacketFlags::ACK_REPLY, session_id);
        header.ack_packet_id = ack_packet_id;
        header.ser_packet(&[])
    }

    pub fn retransmit_request_packet(session_id: u16, retransmit_from: PacketId) -> Vec<u8> {
        let mut header = PacketHeader::new(PacketFlags::RETRANSMIT_REQUEST, session_id);
        header.retransmit_from = retransmit_from;
        header.ser_packet(&[])
    }

    pub fn parse_handshake_answer(payload: &[u8]) -> anyhow::Result<HandshakeAnswer> {
        match payload.first() {
            Some(&Self::HANDSHAKE_ACCEPTED) => {
                if payload.len() < 4 {
                    bail!("handshake answer is too short to carry a session id");
                }
                Ok(HandshakeAnswer::Accepted {
                    session_id: u16::from_be_bytes([payload[2], payload[3]]),
                })
            }
            Some(&Self::HANDSHAKE_REFUSED) => Ok(HandshakeAnswer::Refused),
            Some(other) => bail!("unknown handshake result code {:#04x}", other),
            None => bail!("empty handshake answer"),
        }
    }

    /// Device-side handshake answer. The client never sends this, it is here so that tests can
    ///  play the device's part.
    pub fn handshake_answer_packet(provisional_session_id: u16, answer: HandshakeAnswer) -> Vec<u8> {
        let payload = match answer {
            HandshakeAnswer::Accepted { session_id } => {
                let id = session_id.to_be_bytes();
                [Self::HANDSHAKE_ACCEPTED, 0, id[0], id[1], 0, 0, 0, 0]
            }
            HandshakeAnswer::Refused => [Self::HANDSHAKE_REFUSED, 0, 0, 0, 0, 0, 0, 0],
        };
        PacketHeader::new(PacketFlags::NEW_SESSION_ID, provisional_session_id)
            .ser_packet(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_hello_packet() {
        assert_eq!(
            PacketHeader::hello_packet(0x1abc),
            vec![0x10,20, 0x1a,0xbc, 0,0, 0,0, 0,0, 0,0, 1,0,0,0,0,0,0,0],
        );
    }

    #[test]
    fn test_ser_sequenced_packet() {
        let mut header = PacketHeader::new(PacketFlags::ACK_REQUEST | PacketFlags::IS_RETRANSMIT, 0x8123);
        header.packet_id = PacketId::from_raw(0x0102);
        assert_eq!(
            header.ser_packet(&[9, 9]),
            vec![0x28,14, 0x81,0x23, 0,0, 0,0, 0,0, 1,2, 9,9],
        );
    }

    #[test]
    fn test_ack_packet() {
        assert_eq!(
            PacketHeader::ack_packet(0x8001, PacketId::from_raw(0x7ffe)),
            vec![0x80,12, 0x80,0x01, 0x7f,0xfe, 0,0, 0,0, 0,0],
        );
    }

    #[test]
    fn test_deser() {
        let raw = vec![0x48,14, 0x80,0x05, 0,3, 0,4, 0,0, 0,9, 0xaa,0xbb];
        let (header, payload) = PacketHeader::deser(&raw).unwrap();
        assert_eq!(header.flags, PacketFlags::ACK_REQUEST | PacketFlags::RETRANSMIT_REQUEST);
        assert_eq!(header.length, 14);
        assert_eq!(header.session_id, 0x8005);
        assert_eq!(header.ack_packet_id, PacketId::from_raw(3));
        assert_eq!(header.retransmit_from, PacketId::from_raw(4));
        assert_eq!(header.packet_id, PacketId::from_raw(9));
        assert_eq!(payload, &[0xaa, 0xbb]);
    }

    #[rstest]
    #[case::too_short(vec![0x08,12, 0,0])]
    #[case::length_too_big(vec![0x08,13, 0,0, 0,0, 0,0, 0,0, 0,0])]
    #[case::length_too_small(vec![0x08,12, 0,0, 0,0, 0,0, 0,0, 0,0, 1])]
    fn test_deser_rejects(#[case] raw: Vec<u8>) {
        assert!(PacketHeader::deser(&raw).is_err());
    }

    #[rstest]
    #[case::accepted(vec![2,0,0x12,0x34,0,0,0,0], Some(HandshakeAnswer::Accepted { session_id: 0x1234 }))]
    #[case::refused(vec![3,0,0,0,0,0,0,0], Some(HandshakeAnswer::Refused))]
    #[case::unknown_code(vec![7,0,0,0], None)]
    #[case::truncated(vec![2,0], None)]
    #[case::empty(vec![], None)]
    fn test_parse_handshake_answer(#[case] payload: Vec<u8>, #[case] expected: Option<HandshakeAnswer>) {
        assert_eq!(PacketHeader::parse_handshake_answer(&payload).ok(), expected);
    }
}
