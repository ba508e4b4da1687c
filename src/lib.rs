//! Client for the control protocol of ATEM style broadcast switchers, running over UDP.
//!
//! An [Atem] connects to one device, keeps a live mirror of the device's state ([AtemState])
//!  and delivers commands reliably on top of unordered, lossy datagrams.
//!
//! ## Design goals
//!
//! * The device is the source of truth: the mirrored state only ever reflects what the device
//!   reported, never what was requested
//! * Sending a command never blocks: it returns a handle that resolves when the device
//!   acknowledges the packet carrying it, or fails on timeout or disconnect
//! * Incoming packets are processed strictly in sequence by a single task
//!   * out-of-order packets are buffered until the gap is filled, or skipped once the reorder
//!     window elapses
//! * No automatic reconnect: a lost connection surfaces as an event, and reconnecting is up
//!   to the caller
//! * Uploads to the media pool run one at a time, chunk by chunk
//!
//! ## Header
//!
//! Packet header, all numbers in network byte order (BE):
//! ```ascii
//! 0:  flags (upper 5 bits) and packet length including the header (lower 11 bits): u16
//!     * 0x01 ACK_REQUEST: the packet is sequenced and must be acknowledged
//!     * 0x02 NEW_SESSION_ID: handshake
//!     * 0x04 IS_RETRANSMIT
//!     * 0x08 RETRANSMIT_REQUEST: please re-send starting at 'retransmit from'
//!     * 0x10 ACK_REPLY: acknowledges all packets up to and including 'ack packet id'
//! 2:  session id: u16
//! 4:  ack packet id: u16
//! 6:  retransmit from: u16
//! 8:  reserved: u16
//! 10: packet id: u16 (15 bit, wrapping)
//! 12: command frames
//! ```
//!
//! ## Handshake
//!
//! ```ascii
//! client                                    device
//!   NEW_SESSION_ID, provisional id,
//!    payload 01 00 00 00 00 00 00 00   ->
//!                                      <-   NEW_SESSION_ID, payload 02 00 <session id> ...
//!                                            (03: no free client slot)
//!   ACK_REPLY, session id              ->
//! ```
//!
//! After the handshake both sides number their sequenced packets starting at 1.
//!
//! ## Command frames
//!
//! ```ascii
//! 0: frame length including this header: u16
//! 2: reserved: u16
//! 4: name (4 ASCII characters)
//! 8: payload, layout depends on the name and the protocol version
//! ```

pub mod ack_tracker;
pub mod atem;
pub mod commands;
pub mod config;
pub mod data_transfer;
pub mod error;
pub mod events;
pub mod packet_header;
pub mod packet_id;
pub mod packet_transport;
pub mod session;
pub mod state;
pub mod state_sync;
pub mod util;

#[cfg(test)]
pub mod test_util;

pub use atem::Atem;
pub use config::AtemConfig;
pub use events::AtemEvent;
pub use state::AtemState;


#[cfg(test)]
mod test {
    use tracing::Level;

    #[ctor::ctor]
    fn init_test_logging() {
        tracing_subscriber::fmt()
            .with_max_level(Level::TRACE)
            .with_test_writer()
            .try_init()
            .ok();
    }
}
