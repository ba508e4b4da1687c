//! The session engine: reliable, ordered delivery of command frames on top of unreliable
//!  datagrams.
//!
//! All session state is owned by a single spawned worker that loops over its control channel,
//!  the outbound command channel, incoming datagrams and two tickers (retransmission sweep and
//!  ack flush). Callers talk to it through [SessionEngine] and [CommandSender] only.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use bytes::BytesMut;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tracing::{debug, error, info, trace, warn};

use crate::ack_tracker::{AckTracker, CommandResponder, PendingCommand, TrackingId};
use crate::commands::{next_frame, Command, ProtocolVersion};
use crate::config::AtemConfig;
use crate::error::{CommandError, ConnectError, ProtocolError};
use crate::packet_header::{HandshakeAnswer, PacketFlags, PacketHeader};
use crate::packet_id::PacketId;
use crate::packet_transport::PacketTransport;
use crate::session::receive_sequencer::{ReceiveOutcome, ReceiveSequencer};
use crate::session::send_buffer::{InFlightPacket, SendBuffer};

pub mod receive_sequencer;
pub mod send_buffer;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionState {
    Idle,
    Handshaking,
    Established,
    Disconnected,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionStatus {
    pub state: SessionState,
    /// incremented by every connection attempt
    pub generation: u64,
    /// the id assigned by the device, while established
    pub session_id: Option<u16>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DisconnectReason {
    Requested,
    /// a packet was re-sent the maximum number of times without being acknowledged
    RetransmitExhausted,
    /// nothing was received from the device for the configured time
    ConnectionTimeout,
    TransportError(String),
}

/// What the engine reports to its owner, in processing order
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SessionEvent {
    Connected { generation: u64, session_id: u16 },
    Disconnected { generation: u64, reason: DisconnectReason },
    /// the decoded commands of one packet, in wire order
    Commands(Vec<Command>),
    ProtocolError(ProtocolError),
}

pub struct OutboundCommand {
    pub tracking_id: TrackingId,
    pub command: Command,
    pub responder: CommandResponder,
}

enum SessionControl {
    Connect {
        transport: Arc<dyn PacketTransport>,
        reply: oneshot::Sender<Result<u64, ConnectError>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
}

/// Submits commands to the session engine. Cloning is cheap; all clones share the tracking
///  id counter so ids are unique per engine.
#[derive(Clone)]
pub struct CommandSender {
    outbound: mpsc::UnboundedSender<OutboundCommand>,
    next_tracking_id: Arc<AtomicU64>,
}

impl CommandSender {
    /// Hands the command to the engine without waiting. The returned handle resolves when the
    ///  device acknowledges the packet carrying it.
    pub fn send(&self, command: impl Into<Command>) -> PendingCommand {
        let tracking_id = TrackingId(self.next_tracking_id.fetch_add(1, Ordering::Relaxed));
        let (pending, responder) = PendingCommand::new(tracking_id);

        let command = command.into();
        trace!("submitting {} as {}", command.name(), tracking_id);
        if let Err(e) = self.outbound.send(OutboundCommand { tracking_id, command, responder }) {
            let _ = e.0.responder.send(Err(CommandError::ConnectionLost));
        }
        pending
    }

    /// a sender that is not connected to an engine, for tests that play the engine's part
    #[cfg(test)]
    pub fn detached() -> (CommandSender, mpsc::UnboundedReceiver<OutboundCommand>) {
        let (outbound, outbound_recv) = mpsc::unbounded_channel();
        let sender = CommandSender {
            outbound,
            next_tracking_id: Arc::new(AtomicU64::new(1)),
        };
        (sender, outbound_recv)
    }
}

/// Handle to the spawned session worker. Dropping it stops the worker.
pub struct SessionEngine {
    control: mpsc::Sender<SessionControl>,
    commands: CommandSender,
    status: watch::Receiver<SessionStatus>,
    worker: JoinHandle<()>,
}

impl Drop for SessionEngine {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

impl SessionEngine {
    pub fn spawn(config: Arc<AtemConfig>) -> (SessionEngine, mpsc::UnboundedReceiver<SessionEvent>) {
        let (control_send, control_recv) = mpsc::channel(16);
        let (outbound_send, outbound_recv) = mpsc::unbounded_channel();
        let (event_send, event_recv) = mpsc::unbounded_channel();
        let (status_send, status_recv) = watch::channel(SessionStatus {
            state: SessionState::Idle,
            generation: 0,
            session_id: None,
        });

        let core = SessionCore::new(config, event_send, status_send);
        let worker = tokio::spawn(run(core, control_recv, outbound_recv));

        let engine = SessionEngine {
            control: control_send,
            commands: CommandSender {
                outbound: outbound_send,
                next_tracking_id: Arc::new(AtomicU64::new(1)),
            },
            status: status_recv,
            worker,
        };
        (engine, event_recv)
    }

    /// Performs the handshake over `transport` and returns the new connection generation once
    ///  the session is established.
    pub async fn connect(&self, transport: Arc<dyn PacketTransport>) -> Result<u64, ConnectError> {
        let (reply, result) = oneshot::channel();
        self.control.send(SessionControl::Connect { transport, reply }).await
            .map_err(|_| ConnectError::Aborted)?;
        result.await
            .unwrap_or(Err(ConnectError::Aborted))
    }

    /// Closes the session. All pending commands fail with [CommandError::ConnectionLost].
    pub async fn disconnect(&self) {
        let (reply, done) = oneshot::channel();
        if self.control.send(SessionControl::Disconnect { reply }).await.is_ok() {
            let _ = done.await;
        }
    }

    pub fn command_sender(&self) -> CommandSender {
        self.commands.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn status_watch(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }
}

async fn run(mut core: SessionCore, mut control: mpsc::Receiver<SessionControl>, mut outbound: mpsc::UnboundedReceiver<OutboundCommand>) {
    let mut retransmit_ticks = time::interval(core.config.retransmit_interval);
    retransmit_ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ack_ticks = time::interval(core.config.ack_flush_interval);
    ack_ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        select! {
            ctl = control.recv() => {
                match ctl {
                    Some(ctl) => core.on_control(ctl).await,
                    None => break,
                }
            }
            cmd = outbound.recv() => {
                match cmd {
                    Some(cmd) => {
                        let mut batch = vec![cmd];
                        while let Ok(cmd) = outbound.try_recv() {
                            batch.push(cmd);
                        }
                        core.on_outbound(batch).await;
                    }
                    None => break,
                }
            }
            packet = recv_packet(core.transport.clone()) => {
                core.on_datagram(packet).await
            }
            _ = retransmit_ticks.tick() => {
                core.on_retransmit_tick().await
            }
            _ = ack_ticks.tick() => {
                core.flush_ack().await
            }
        }
    }

    debug!("session engine shutting down");
    core.shutdown(DisconnectReason::Requested).await;
}

async fn recv_packet(transport: Option<Arc<dyn PacketTransport>>) -> anyhow::Result<Vec<u8>> {
    match transport {
        Some(transport) => transport.recv().await,
        None => std::future::pending().await,
    }
}

struct Handshake {
    reply: oneshot::Sender<Result<u64, ConnectError>>,
    provisional_session_id: u16,
    attempts: u32,
    last_attempt: Instant,
}

struct SessionCore {
    config: Arc<AtemConfig>,
    events: mpsc::UnboundedSender<SessionEvent>,
    status: watch::Sender<SessionStatus>,

    state: SessionState,
    generation: u64,
    transport: Option<Arc<dyn PacketTransport>>,
    session_id: u16,
    protocol_version: ProtocolVersion,
    handshake: Option<Handshake>,

    next_packet_id: PacketId,
    send_buffer: SendBuffer,
    receive_sequencer: ReceiveSequencer,
    ack_tracker: AckTracker,
    /// commands submitted during the handshake, already registered with the ack tracker
    queued: Vec<(TrackingId, Command)>,
    last_received: Instant,
}

impl SessionCore {
    fn new(config: Arc<AtemConfig>, events: mpsc::UnboundedSender<SessionEvent>, status: watch::Sender<SessionStatus>) -> SessionCore {
        let receive_sequencer = ReceiveSequencer::new(config.reorder_window_packets);
        SessionCore {
            config,
            events,
            status,
            state: SessionState::Idle,
            generation: 0,
            transport: None,
            session_id: 0,
            protocol_version: ProtocolVersion::LATEST,
            handshake: None,
            next_packet_id: PacketId::FIRST,
            send_buffer: Default::default(),
            receive_sequencer,
            ack_tracker: Default::default(),
            queued: Default::default(),
            last_received: Instant::now(),
        }
    }

    fn emit(&self, event: SessionEvent) {
        trace!("session event: {:?}", event);
        let _ = self.events.send(event);
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        let session_id = (state == SessionState::Established).then_some(self.session_id);
        self.status.send_replace(SessionStatus {
            state,
            generation: self.generation,
            session_id,
        });
    }

    async fn on_control(&mut self, ctl: SessionControl) {
        match ctl {
            SessionControl::Connect { transport, reply } => self.start_handshake(transport, reply).await,
            SessionControl::Disconnect { reply } => {
                self.shutdown(DisconnectReason::Requested).await;
                let _ = reply.send(());
            }
        }
    }

    async fn start_handshake(&mut self, transport: Arc<dyn PacketTransport>, reply: oneshot::Sender<Result<u64, ConnectError>>) {
        if matches!(self.state, SessionState::Handshaking | SessionState::Established) {
            debug!("connect requested while {:?} - rejecting", self.state);
            let _ = reply.send(Err(ConnectError::AlreadyConnected));
            return;
        }

        self.generation += 1;
        self.send_buffer.clear();
        self.receive_sequencer.reset();
        self.next_packet_id = PacketId::FIRST;
        self.protocol_version = ProtocolVersion::LATEST;
        self.session_id = 0;
        self.transport = Some(transport);

        let provisional_session_id = rand::random::<u16>() & 0x7fff;
        info!("connecting, generation {}", self.generation);
        self.handshake = Some(Handshake {
            reply,
            provisional_session_id,
            attempts: 0,
            last_attempt: Instant::now(),
        });
        self.set_state(SessionState::Handshaking);
        self.send_hello().await;
    }

    async fn send_hello(&mut self) {
        let Some(handshake) = self.handshake.as_mut() else {
            return;
        };
        handshake.attempts += 1;
        handshake.last_attempt = Instant::now();
        debug!("sending hello, attempt {}", handshake.attempts);

        let packet = PacketHeader::hello_packet(handshake.provisional_session_id);
        if let Err(e) = self.send_raw(&packet).await {
            self.fail_handshake(ConnectError::Transport(e.to_string())).await;
        }
    }

    async fn fail_handshake(&mut self, error: ConnectError) {
        warn!("connection attempt failed: {}", error);
        if let Some(transport) = self.transport.take() {
            transport.close();
        }
        self.ack_tracker.reject_all(CommandError::ConnectionLost);
        self.queued.clear();
        if let Some(handshake) = self.handshake.take() {
            let _ = handshake.reply.send(Err(error));
        }
        self.set_state(SessionState::Disconnected);
    }

    async fn send_raw(&self, packet: &[u8]) -> anyhow::Result<()> {
        match &self.transport {
            Some(transport) => transport.send(packet).await,
            None => anyhow::bail!("no transport"),
        }
    }

    /// Sends on the established session. A send failure ends the session, and `false` tells
    ///  the caller to stop working on it.
    async fn send_established(&mut self, packet: &[u8]) -> bool {
        match self.send_raw(packet).await {
            Ok(()) => true,
            Err(e) => {
                error!("error sending to the device: {}", e);
                self.shutdown(DisconnectReason::TransportError(e.to_string())).await;
                false
            }
        }
    }

    async fn on_datagram(&mut self, packet: anyhow::Result<Vec<u8>>) {
        let packet = match packet {
            Ok(packet) => packet,
            Err(e) => {
                error!("error receiving from the device: {}", e);
                match self.state {
                    SessionState::Handshaking => self.fail_handshake(ConnectError::Transport(e.to_string())).await,
                    _ => self.shutdown(DisconnectReason::TransportError(e.to_string())).await,
                }
                return;
            }
        };
        self.last_received = Instant::now();

        let (header, payload) = match PacketHeader::deser(&packet) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("dropping unparsable packet: {}", e);
                self.emit(SessionEvent::ProtocolError(ProtocolError::MalformedPacket(e.to_string())));
                return;
            }
        };
        trace!("received packet {:?}", header);

        match self.state {
            SessionState::Handshaking => self.on_handshake_packet(&header, payload).await,
            SessionState::Established => self.on_session_packet(&header, payload).await,
            _ => trace!("not connected - ignoring packet"),
        }
    }

    async fn on_handshake_packet(&mut self, header: &PacketHeader, payload: &[u8]) {
        if !header.flags.contains(PacketFlags::NEW_SESSION_ID) {
            trace!("ignoring packet during handshake");
            return;
        }

        match PacketHeader::parse_handshake_answer(payload) {
            Ok(HandshakeAnswer::Accepted { session_id }) => {
                self.session_id = session_id;
                if let Err(e) = self.send_raw(&PacketHeader::hello_confirmation_packet(session_id)).await {
                    self.fail_handshake(ConnectError::Transport(e.to_string())).await;
                    return;
                }

                info!("session {:#06x} established, generation {}", session_id, self.generation);
                self.last_received = Instant::now();
                self.set_state(SessionState::Established);
                if let Some(handshake) = self.handshake.take() {
                    let _ = handshake.reply.send(Ok(self.generation));
                }
                self.emit(SessionEvent::Connected { generation: self.generation, session_id });

                let queued = std::mem::take(&mut self.queued);
                if !queued.is_empty() {
                    debug!("sending {} commands queued during the handshake", queued.len());
                    self.send_commands(queued).await;
                }
            }
            Ok(HandshakeAnswer::Refused) => {
                self.fail_handshake(ConnectError::Refused).await;
            }
            Err(e) => {
                warn!("unparsable handshake answer: {}", e);
                self.emit(SessionEvent::ProtocolError(ProtocolError::MalformedPacket(e.to_string())));
            }
        }
    }

    async fn on_session_packet(&mut self, header: &PacketHeader, payload: &[u8]) {
        if header.flags.contains(PacketFlags::NEW_SESSION_ID) {
            // the device did not get our confirmation
            debug!("repeated handshake answer - confirming again");
            self.send_established(&PacketHeader::hello_confirmation_packet(self.session_id)).await;
            return;
        }
        if header.session_id != self.session_id {
            warn!("dropping packet for session {:#06x}, current session is {:#06x}", header.session_id, self.session_id);
            return;
        }

        if header.flags.contains(PacketFlags::ACK_REPLY) {
            self.on_ack(header.ack_packet_id);
        }
        if header.flags.contains(PacketFlags::RETRANSMIT_REQUEST)
            && !self.on_retransmit_request(header.retransmit_from).await {
            return;
        }
        if header.flags.contains(PacketFlags::ACK_REQUEST) {
            let outcome = self.receive_sequencer.on_packet(header.packet_id, payload.to_vec(), Instant::now());
            match outcome {
                ReceiveOutcome::Deliver(payloads) => {
                    for payload in payloads {
                        self.decode_payload(&payload);
                    }
                }
                ReceiveOutcome::Duplicate => {}
                ReceiveOutcome::Buffered { request_retransmit_from } => {
                    if let Some(from) = request_retransmit_from {
                        debug!("requesting retransmit from packet {}", from);
                        if !self.send_established(&PacketHeader::retransmit_request_packet(self.session_id, from)).await {
                            return;
                        }
                    }
                }
                ReceiveOutcome::OutOfWindow => {
                    self.emit(SessionEvent::ProtocolError(ProtocolError::OutOfWindow { packet_id: header.packet_id.to_raw() }));
                }
            }

            if self.receive_sequencer.is_ack_due(self.config.max_unacked_packets) {
                self.flush_ack().await;
            }
        }
    }

    /// Decodes the command frames of one packet in order. `_ver` takes effect immediately, so
    ///  frames after it are decoded with the version it announces.
    fn decode_payload(&mut self, payload: &[u8]) {
        let mut buf = payload;
        let mut commands = Vec::new();
        loop {
            match next_frame(&mut buf) {
                Ok(Some(frame)) => {
                    match Command::decode(frame.name, frame.payload, self.protocol_version) {
                        Ok(Some(command)) => {
                            if let Command::Version(version) = &command {
                                self.protocol_version = version.protocol_version();
                                debug!("device reports protocol version {}", self.protocol_version);
                            }
                            commands.push(command);
                        }
                        Ok(None) => {
                            trace!("skipping unknown command {}", frame.name);
                        }
                        Err(e) => {
                            warn!("failed to decode {}: {}", frame.name, e);
                            self.emit(SessionEvent::ProtocolError(ProtocolError::Decode {
                                name: frame.name.to_string(),
                                detail: e.to_string(),
                            }));
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("dropping rest of packet: {}", e);
                    self.emit(SessionEvent::ProtocolError(e));
                    break;
                }
            }
        }

        if !commands.is_empty() {
            self.emit(SessionEvent::Commands(commands));
        }
    }

    fn on_ack(&mut self, ack_id: PacketId) {
        for packet in self.send_buffer.acknowledge(ack_id) {
            for tracking_id in packet.tracking_ids {
                self.ack_tracker.resolve(tracking_id);
            }
        }
    }

    /// returns `false` if the session ended while re-sending
    async fn on_retransmit_request(&mut self, from: PacketId) -> bool {
        let now = Instant::now();
        let packets = self.send_buffer.packets_from(from)
            .map(|p| {
                p.last_sent = now;
                (p.packet_id, p.payload.clone())
            })
            .collect::<Vec<_>>();

        if packets.is_empty() {
            debug!("device requested retransmit from {}, but no packets from there are retained", from);
        }
        for (packet_id, payload) in packets {
            debug!("re-sending packet {} on request", packet_id);
            if !self.send_sequenced_packet(packet_id, &payload, true).await {
                return false;
            }
        }
        true
    }

    async fn on_outbound(&mut self, batch: Vec<OutboundCommand>) {
        let deadline = Instant::now() + self.config.command_timeout;
        let mut to_send = Vec::new();

        for cmd in batch {
            match self.state {
                SessionState::Idle | SessionState::Disconnected => {
                    debug!("not connected - rejecting {}", cmd.command.name());
                    let _ = cmd.responder.send(Err(CommandError::NotConnected));
                }
                SessionState::Handshaking => {
                    self.ack_tracker.register(cmd.tracking_id, cmd.responder, deadline);
                    self.queued.push((cmd.tracking_id, cmd.command));
                }
                SessionState::Established => {
                    self.ack_tracker.register(cmd.tracking_id, cmd.responder, deadline);
                    to_send.push((cmd.tracking_id, cmd.command));
                }
            }
        }

        if !to_send.is_empty() {
            self.send_commands(to_send).await;
        }
    }

    /// packs the command frames into as few packets as possible and sends them
    async fn send_commands(&mut self, commands: Vec<(TrackingId, Command)>) {
        let max_payload = self.config.max_payload_len();
        let mut payload = BytesMut::with_capacity(max_payload);
        let mut tracking_ids = Vec::new();

        for (tracking_id, command) in commands {
            if !self.ack_tracker.is_pending(tracking_id) {
                continue;
            }

            let frame = match command.encode_frame(self.protocol_version) {
                Ok(frame) => frame,
                Err(e) => {
                    self.ack_tracker.reject(tracking_id, CommandError::Encoding(e.to_string()));
                    continue;
                }
            };
            if frame.len() > max_payload {
                warn!("{} frame of {} bytes does not fit into a packet", command.name(), frame.len());
                self.ack_tracker.reject(tracking_id, CommandError::Encoding(format!("frame of {} bytes exceeds the packet payload limit of {}", frame.len(), max_payload)));
                continue;
            }

            if payload.len() + frame.len() > max_payload {
                let full = payload.split().to_vec();
                if !self.send_new_packet(full, std::mem::take(&mut tracking_ids)).await {
                    return;
                }
            }
            payload.extend_from_slice(&frame);
            tracking_ids.push(tracking_id);
        }

        if !tracking_ids.is_empty() {
            self.send_new_packet(payload.to_vec(), tracking_ids).await;
        }
    }

    async fn send_new_packet(&mut self, payload: Vec<u8>, tracking_ids: Vec<TrackingId>) -> bool {
        let packet_id = self.next_packet_id;
        self.next_packet_id = packet_id.next();
        trace!("sending packet {} with commands {:?}", packet_id, tracking_ids);

        if !self.send_sequenced_packet(packet_id, &payload, false).await {
            return false;
        }
        self.send_buffer.push(InFlightPacket {
            packet_id,
            payload,
            tracking_ids,
            last_sent: Instant::now(),
            resend_count: 0,
        });
        true
    }

    /// returns `false` if a send failure ended the session
    async fn send_sequenced_packet(&mut self, packet_id: PacketId, payload: &[u8], is_retransmit: bool) -> bool {
        let mut flags = PacketFlags::ACK_REQUEST;
        if is_retransmit {
            flags |= PacketFlags::IS_RETRANSMIT;
        }
        let mut header = PacketHeader::new(flags, self.session_id);
        header.packet_id = packet_id;

        self.send_established(&header.ser_packet(payload)).await
    }

    async fn flush_ack(&mut self) {
        if self.state != SessionState::Established || !self.receive_sequencer.has_unacked() {
            return;
        }
        let ack_id = self.receive_sequencer.ack_id();
        trace!("acknowledging up to packet {}", ack_id);
        self.receive_sequencer.on_ack_sent();
        self.send_established(&PacketHeader::ack_packet(self.session_id, ack_id)).await;
    }

    async fn on_retransmit_tick(&mut self) {
        let now = Instant::now();

        // a sent packet stays retained until it is acknowledged or runs out of retries, even if
        //  its commands timed out: later packets must not end up behind a gap on the device
        if !self.ack_tracker.expire(now).is_empty() {
            let tracker = &self.ack_tracker;
            self.queued.retain(|(id, _)| tracker.is_pending(*id));
        }

        match self.state {
            SessionState::Handshaking => self.check_handshake(now).await,
            SessionState::Established => {
                if now.duration_since(self.last_received) >= self.config.connection_timeout {
                    warn!("no data from the device for {:?} - connection lost", self.config.connection_timeout);
                    self.shutdown(DisconnectReason::ConnectionTimeout).await;
                    return;
                }
                if !self.resend_due_packets(now).await {
                    return;
                }
                self.expire_receive_gaps(now).await;
            }
            _ => {}
        }
    }

    async fn check_handshake(&mut self, now: Instant) {
        let Some(handshake) = &self.handshake else {
            return;
        };
        if now.duration_since(handshake.last_attempt) < self.config.handshake_timeout {
            return;
        }
        if handshake.attempts >= self.config.max_handshake_attempts {
            let attempts = handshake.attempts;
            self.fail_handshake(ConnectError::HandshakeTimeout(attempts)).await;
        }
        else {
            self.send_hello().await;
        }
    }

    /// returns `false` if the session ended, because a packet ran out of retries or a send failed
    async fn resend_due_packets(&mut self, now: Instant) -> bool {
        let max_retries = self.config.max_packet_retries;
        let mut exhausted = None;
        let mut due = Vec::new();
        for packet in self.send_buffer.due_for_resend(now, self.config.retransmit_timeout) {
            if packet.resend_count >= max_retries {
                exhausted = Some((packet.packet_id, packet.tracking_ids.clone()));
                break;
            }
            packet.resend_count += 1;
            packet.last_sent = now;
            due.push((packet.packet_id, packet.payload.clone()));
        }

        if let Some((packet_id, tracking_ids)) = exhausted {
            warn!("packet {} was not acknowledged after {} retries - connection lost", packet_id, max_retries);
            for id in tracking_ids {
                self.ack_tracker.reject(id, CommandError::Timeout);
            }
            self.shutdown(DisconnectReason::RetransmitExhausted).await;
            return false;
        }

        for (packet_id, payload) in due {
            debug!("re-sending unacknowledged packet {}", packet_id);
            if !self.send_sequenced_packet(packet_id, &payload, true).await {
                return false;
            }
        }
        true
    }

    async fn expire_receive_gaps(&mut self, now: Instant) {
        let (gaps, delivered) = self.receive_sequencer.expire(now, self.config.reorder_window);
        for gap in gaps {
            self.emit(SessionEvent::ProtocolError(ProtocolError::SequenceGap {
                first_missing: gap.first_missing.to_raw(),
                last_missing: gap.last_missing.to_raw(),
            }));
        }
        for payload in delivered {
            self.decode_payload(&payload);
        }
    }

    /// Ends the session: closes the transport, drops everything in flight and fails all
    ///  pending commands. A `Disconnected` event is emitted only if the session had been
    ///  established.
    async fn shutdown(&mut self, reason: DisconnectReason) {
        let was_established = self.state == SessionState::Established;

        if let Some(transport) = self.transport.take() {
            transport.close();
        }
        self.send_buffer.clear();
        self.receive_sequencer.reset();
        self.ack_tracker.reject_all(CommandError::ConnectionLost);
        self.queued.clear();
        if let Some(handshake) = self.handshake.take() {
            let _ = handshake.reply.send(Err(ConnectError::Aborted));
        }

        if self.state != SessionState::Idle {
            self.set_state(SessionState::Disconnected);
        }
        if was_established {
            info!("session {:#06x} disconnected: {:?}", self.session_id, reason);
            self.emit(SessionEvent::Disconnected { generation: self.generation, reason });
        }
    }
}
