use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::ack_tracker::PendingCommand;
use crate::commands::Command;
use crate::config::AtemConfig;
use crate::data_transfer::{DataTransferManager, PendingUpload, TransferPhase, TransferStore, UploadMetadata, UploadRequest};
use crate::error::CommandError;
use crate::events::{AtemEvent, AtemEventNotifier};
use crate::packet_transport::{PacketTransport, UdpTransport};
use crate::session::{CommandSender, SessionEngine, SessionEvent, SessionState, SessionStatus};
use crate::state::AtemState;
use crate::state_sync::apply_command;

/// A connection to one switcher.
///
/// It owns the session engine, the data transfer worker and a dispatcher task that applies
///  everything the device reports to the mirrored [AtemState] and publishes [AtemEvent]s.
///  `Atem::new` must be called inside a tokio runtime.
pub struct Atem {
    config: Arc<AtemConfig>,
    engine: SessionEngine,
    commands: CommandSender,
    transfers: Arc<DataTransferManager>,
    state: watch::Receiver<AtemState>,
    notifier: Arc<AtemEventNotifier>,
    dispatcher: JoinHandle<()>,
}

impl Drop for Atem {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

impl Atem {
    pub fn new(config: AtemConfig) -> anyhow::Result<Atem> {
        config.validate()?;
        let config = Arc::new(config);

        let (engine, session_events) = SessionEngine::spawn(config.clone());
        let commands = engine.command_sender();
        let transfers = Arc::new(DataTransferManager::spawn(config.clone(), commands.clone()));
        let notifier = Arc::new(AtemEventNotifier::new(config.event_channel_capacity));
        let (state_send, state) = watch::channel(AtemState::default());

        let dispatcher = tokio::spawn(dispatch(session_events, state_send, notifier.clone(), transfers.clone()));

        Ok(Atem {
            config,
            engine,
            commands,
            transfers,
            state,
            notifier,
            dispatcher,
        })
    }

    /// Connects to the device at `addr`, on the configured default port unless `port` is
    ///  given. Returns once the session is established.
    pub async fn connect(&self, addr: IpAddr, port: Option<u16>) -> anyhow::Result<()> {
        let peer = SocketAddr::new(addr, port.unwrap_or(self.config.default_port));
        info!("connecting to {}", peer);
        let transport = UdpTransport::connect(peer).await?;
        self.connect_with_transport(Arc::new(transport)).await
    }

    pub async fn connect_with_transport(&self, transport: Arc<dyn PacketTransport>) -> anyhow::Result<()> {
        self.engine.connect(transport).await?;
        Ok(())
    }

    /// Closes the connection. Pending commands as well as active and queued uploads fail
    ///  with [CommandError::ConnectionLost].
    pub async fn disconnect(&self) {
        let generation = self.engine.status().generation;
        self.engine.disconnect().await;
        self.transfers.on_connection_lost(generation);
    }

    pub fn send_command(&self, command: impl Into<Command>) -> PendingCommand {
        self.commands.send(command)
    }

    /// Queues an upload. Uploads run one at a time in the order they were requested.
    pub fn start_upload(&self, store: TransferStore, slot: u16, data: Bytes, metadata: UploadMetadata) -> PendingUpload {
        let status = self.engine.status();
        if !matches!(status.state, SessionState::Handshaking | SessionState::Established) {
            debug!("not connected - rejecting upload to {:?} slot {}", store, slot);
            return PendingUpload::failed(CommandError::NotConnected);
        }
        self.transfers.start_upload(UploadRequest { store, slot, data, metadata }, status.generation)
    }

    /// phase of the running upload, or of the last one
    pub fn transfer_phase(&self) -> Option<TransferPhase> {
        self.transfers.phase()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AtemEvent> {
        self.notifier.subscribe()
    }

    /// a snapshot of the mirrored device state
    pub fn state(&self) -> AtemState {
        self.state.borrow().clone()
    }

    /// notified whenever a received packet changed the mirrored state
    pub fn state_watch(&self) -> watch::Receiver<AtemState> {
        self.state.clone()
    }

    pub fn session_status(&self) -> SessionStatus {
        self.engine.status()
    }

    pub fn session_status_watch(&self) -> watch::Receiver<SessionStatus> {
        self.engine.status_watch()
    }
}

/// Turns session events into state updates and public events, in the order the session
///  engine produced them.
async fn dispatch(mut events: mpsc::UnboundedReceiver<SessionEvent>, state: watch::Sender<AtemState>, notifier: Arc<AtemEventNotifier>, transfers: Arc<DataTransferManager>) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Connected { generation, session_id } => {
                debug!("connected as session {:#06x}, generation {} - resetting state", session_id, generation);
                state.send_replace(AtemState::default());
                notifier.send_event(AtemEvent::Connected);
            }
            SessionEvent::Disconnected { generation, reason } => {
                transfers.on_connection_lost(generation);
                notifier.send_event(AtemEvent::Disconnected(reason));
            }
            SessionEvent::Commands(commands) => {
                let mut changed = Vec::new();
                for command in commands {
                    if command.is_data_transfer() {
                        transfers.on_device_command(command.clone());
                    }
                    state.send_if_modified(|s| {
                        let paths = apply_command(s, &command);
                        let modified = !paths.is_empty();
                        changed.extend(paths);
                        modified
                    });
                    notifier.send_event(AtemEvent::CommandReceived(command));
                }
                if !changed.is_empty() {
                    notifier.send_event(AtemEvent::StateChanged(changed));
                }
            }
            SessionEvent::ProtocolError(e) => {
                notifier.send_event(AtemEvent::Error(e));
            }
        }
    }
    debug!("session events closed - dispatcher shutting down");
}
