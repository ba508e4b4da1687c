use tokio::sync::broadcast;
use tracing::trace;

use crate::commands::Command;
use crate::error::ProtocolError;
use crate::session::DisconnectReason;

/// Events of one [crate::Atem] connection, in the order the device's data was processed
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AtemEvent {
    Connected,
    Disconnected(DisconnectReason),
    /// non-fatal protocol problems; the offending data was dropped
    Error(ProtocolError),
    /// the dotted paths of the state nodes written by one received packet
    StateChanged(Vec<String>),
    CommandReceived(Command),
}

pub struct AtemEventNotifier {
    sender: broadcast::Sender<AtemEvent>,
}
impl AtemEventNotifier {
    pub fn new(capacity: usize) -> AtemEventNotifier {
        let (sender, _) = broadcast::channel(capacity);

        AtemEventNotifier {
            sender
        }
    }

    /// Subscribers that fall more than the channel capacity behind miss events and get
    ///  [broadcast::error::RecvError::Lagged].
    pub fn subscribe(&self) -> broadcast::Receiver<AtemEvent> {
        self.sender.subscribe()
    }

    pub fn send_event(&self, event: AtemEvent) {
        trace!("event: {:?}", event);
        let _ = self.sender.send(event);
    }
}
