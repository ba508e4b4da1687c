use thiserror::Error;

/// Failure of a single tracked command. Only the caller that issued the command sees it.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum CommandError {
    #[error("command was not acknowledged in time")]
    Timeout,
    #[error("connection lost before the command was acknowledged")]
    ConnectionLost,
    #[error("not connected")]
    NotConnected,
    #[error("rejected by the device: {0}")]
    Rejected(String),
    #[error("command could not be encoded: {0}")]
    Encoding(String),
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ConnectError {
    #[error("no handshake answer after {0} attempts")]
    HandshakeTimeout(u32),
    #[error("device refused the connection (no free client slot)")]
    Refused,
    #[error("a connection is already established or in progress")]
    AlreadyConnected,
    #[error("connection attempt aborted")]
    Aborted,
    #[error("transport error: {0}")]
    Transport(String),
}

/// Non-fatal problems with data received from the device. The affected packet or command is
///  dropped and the session continues.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ProtocolError {
    #[error("malformed packet: {0}")]
    MalformedPacket(String),
    #[error("malformed command frame: {0}")]
    MalformedCommand(String),
    #[error("failed to decode {name}: {detail}")]
    Decode { name: String, detail: String },
    #[error("packets {first_missing}..={last_missing} never arrived and were skipped")]
    SequenceGap { first_missing: u16, last_missing: u16 },
    #[error("packet {packet_id} is outside the receive window")]
    OutOfWindow { packet_id: u16 },
}
