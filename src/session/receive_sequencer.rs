use std::time::Duration;
use rustc_hash::FxHashMap;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::packet_id::PacketId;

#[derive(Debug, Eq, PartialEq)]
pub enum ReceiveOutcome {
    /// payloads that became deliverable, in sequence order
    Deliver(Vec<Vec<u8>>),
    /// already delivered earlier, or already buffered
    Duplicate,
    /// Kept until the gap before it is filled. `request_retransmit_from` is set the first time
    ///  a given gap is noticed.
    Buffered { request_retransmit_from: Option<PacketId> },
    OutOfWindow,
}

/// a gap that was given up on when the reorder window elapsed
#[derive(Debug, Eq, PartialEq)]
pub struct SkippedGap {
    pub first_missing: PacketId,
    pub last_missing: PacketId,
}

/// Turns the device's sequenced packets back into an in-order stream. Packets ahead of the
///  next expected id are held back until the gap is filled or the reorder window elapses.
pub struct ReceiveSequencer {
    next_expected: PacketId,
    /// out-of-order packets with their arrival time
    buffered: FxHashMap<PacketId, (Instant, Vec<u8>)>,
    /// the value of `next_expected` for which a retransmit was requested already
    retransmit_requested_at: Option<PacketId>,
    /// number of accepted packets since the last ack was sent
    unacked: usize,
    window_packets: u16,
}

impl ReceiveSequencer {
    pub fn new(window_packets: u16) -> ReceiveSequencer {
        ReceiveSequencer {
            next_expected: PacketId::FIRST,
            buffered: Default::default(),
            retransmit_requested_at: None,
            unacked: 0,
            window_packets,
        }
    }

    pub fn reset(&mut self) {
        self.next_expected = PacketId::FIRST;
        self.buffered.clear();
        self.retransmit_requested_at = None;
        self.unacked = 0;
    }

    pub fn on_packet(&mut self, packet_id: PacketId, payload: Vec<u8>, now: Instant) -> ReceiveOutcome {
        let distance = packet_id.distance_from(self.next_expected);

        if distance == 0 {
            self.unacked += 1;
            let mut delivered = vec![payload];
            self.next_expected = self.next_expected.next();
            self.drain_contiguous(&mut delivered);
            return ReceiveOutcome::Deliver(delivered);
        }

        if distance >= PacketId::HALF_RANGE {
            trace!("packet {} was delivered before - discarding", packet_id);
            // the device did not get our ack, so it must be sent again
            self.unacked += 1;
            return ReceiveOutcome::Duplicate;
        }

        if distance >= self.window_packets {
            warn!("packet {} is {} packets ahead of the expected packet {} - dropping", packet_id, distance, self.next_expected);
            return ReceiveOutcome::OutOfWindow;
        }

        if self.buffered.contains_key(&packet_id) {
            trace!("packet {} is buffered already - discarding", packet_id);
            return ReceiveOutcome::Duplicate;
        }

        debug!("packet {} arrived before {} - buffering", packet_id, self.next_expected);
        self.buffered.insert(packet_id, (now, payload));

        let request_retransmit_from = if self.retransmit_requested_at == Some(self.next_expected) {
            None
        }
        else {
            self.retransmit_requested_at = Some(self.next_expected);
            Some(self.next_expected)
        };
        ReceiveOutcome::Buffered { request_retransmit_from }
    }

    fn drain_contiguous(&mut self, delivered: &mut Vec<Vec<u8>>) {
        while let Some((_, payload)) = self.buffered.remove(&self.next_expected) {
            trace!("delivering buffered packet {}", self.next_expected);
            self.unacked += 1;
            delivered.push(payload);
            self.next_expected = self.next_expected.next();
        }
    }

    /// Gives up on gaps whose following packet has waited for at least `window`. The missing
    ///  packets are skipped and the buffered packets behind them are delivered.
    pub fn expire(&mut self, now: Instant, window: Duration) -> (Vec<SkippedGap>, Vec<Vec<u8>>) {
        let mut gaps = Vec::new();
        let mut delivered = Vec::new();

        loop {
            let oldest_arrival = self.buffered.values()
                .map(|(arrived, _)| *arrived)
                .min();
            match oldest_arrival {
                Some(arrived) if now.duration_since(arrived) >= window => {}
                _ => break,
            }

            let next_available = self.buffered.keys()
                .copied()
                .min_by_key(|id| id.distance_from(self.next_expected));
            let Some(next_available) = next_available else {
                break;
            };

            warn!("packets {}..{} did not arrive within the reorder window - skipping", self.next_expected, next_available);
            gaps.push(SkippedGap {
                first_missing: self.next_expected,
                last_missing: next_available.prev(),
            });
            self.next_expected = next_available;
            self.drain_contiguous(&mut delivered);
        }

        (gaps, delivered)
    }

    /// the id up to which everything was received or skipped
    pub fn ack_id(&self) -> PacketId {
        self.next_expected.prev()
    }

    pub fn has_unacked(&self) -> bool {
        self.unacked > 0
    }

    pub fn is_ack_due(&self, max_unacked: usize) -> bool {
        self.unacked >= max_unacked
    }

    pub fn on_ack_sent(&mut self) {
        self.unacked = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn id(raw: u16) -> PacketId {
        PacketId::from_raw(raw)
    }

    /// feeds packets in the given order, returning the payloads in delivery order
    fn feed(sequencer: &mut ReceiveSequencer, order: &[u16], now: Instant) -> Vec<u8> {
        let mut result = Vec::new();
        for &raw in order {
            if let ReceiveOutcome::Deliver(payloads) = sequencer.on_packet(id(raw), vec![raw as u8], now) {
                result.extend(payloads.into_iter().flatten());
            }
        }
        result
    }

    #[rstest]
    #[case::in_order(vec![1,2,3,4])]
    #[case::swapped(vec![2,1,3,4])]
    #[case::reversed(vec![4,3,2,1])]
    #[case::interleaved(vec![3,1,4,2])]
    #[case::last_first(vec![4,1,2,3])]
    fn test_reordered_delivery_converges(#[case] order: Vec<u16>) {
        let mut sequencer = ReceiveSequencer::new(64);
        let delivered = feed(&mut sequencer, &order, Instant::now());
        assert_eq!(delivered, vec![1, 2, 3, 4]);
        assert_eq!(sequencer.ack_id(), id(4));
    }

    #[test]
    fn test_duplicates() {
        let now = Instant::now();
        let mut sequencer = ReceiveSequencer::new(64);
        assert_eq!(sequencer.on_packet(id(1), vec![1], now), ReceiveOutcome::Deliver(vec![vec![1]]));
        sequencer.on_ack_sent();

        assert_eq!(sequencer.on_packet(id(1), vec![1], now), ReceiveOutcome::Duplicate);
        assert!(sequencer.has_unacked());

        assert!(matches!(sequencer.on_packet(id(3), vec![3], now), ReceiveOutcome::Buffered { .. }));
        assert_eq!(sequencer.on_packet(id(3), vec![3], now), ReceiveOutcome::Duplicate);
    }

    #[test]
    fn test_retransmit_requested_once_per_gap() {
        let now = Instant::now();
        let mut sequencer = ReceiveSequencer::new(64);
        assert_eq!(sequencer.on_packet(id(3), vec![], now), ReceiveOutcome::Buffered { request_retransmit_from: Some(id(1)) });
        assert_eq!(sequencer.on_packet(id(4), vec![], now), ReceiveOutcome::Buffered { request_retransmit_from: None });
        assert!(matches!(sequencer.on_packet(id(1), vec![], now), ReceiveOutcome::Deliver(_)));
        assert_eq!(sequencer.on_packet(id(6), vec![], now), ReceiveOutcome::Buffered { request_retransmit_from: Some(id(2)) });
    }

    #[test]
    fn test_out_of_window() {
        let mut sequencer = ReceiveSequencer::new(8);
        assert_eq!(sequencer.on_packet(id(9), vec![], Instant::now()), ReceiveOutcome::OutOfWindow);
        assert!(!sequencer.has_unacked());
    }

    #[test]
    fn test_wraps_around() {
        let now = Instant::now();
        let mut sequencer = ReceiveSequencer::new(64);
        sequencer.next_expected = id(0x7fff);
        let delivered = feed(&mut sequencer, &[0, 0x7fff, 1], now);
        assert_eq!(delivered, vec![0xff, 0, 1]);
    }

    #[test]
    fn test_expire_skips_gap() {
        let now = Instant::now();
        let window = Duration::from_millis(500);
        let mut sequencer = ReceiveSequencer::new(64);
        feed(&mut sequencer, &[1], now);
        feed(&mut sequencer, &[4, 5], now);
        feed(&mut sequencer, &[8], now + Duration::from_millis(400));

        let (gaps, delivered) = sequencer.expire(now + Duration::from_millis(499), window);
        assert!(gaps.is_empty());
        assert!(delivered.is_empty());

        let (gaps, delivered) = sequencer.expire(now + Duration::from_millis(500), window);
        assert_eq!(gaps, vec![SkippedGap { first_missing: id(2), last_missing: id(3) }]);
        assert_eq!(delivered, vec![vec![4], vec![5]]);
        assert_eq!(sequencer.ack_id(), id(5));

        let (gaps, delivered) = sequencer.expire(now + Duration::from_millis(900), window);
        assert_eq!(gaps, vec![SkippedGap { first_missing: id(6), last_missing: id(7) }]);
        assert_eq!(delivered, vec![vec![8]]);
    }

    #[test]
    fn test_ack_due() {
        let now = Instant::now();
        let mut sequencer = ReceiveSequencer::new(64);
        feed(&mut sequencer, &[1, 2], now);
        assert!(!sequencer.is_ack_due(3));
        feed(&mut sequencer, &[3], now);
        assert!(sequencer.is_ack_due(3));
        sequencer.on_ack_sent();
        assert!(!sequencer.has_unacked());
    }
}
