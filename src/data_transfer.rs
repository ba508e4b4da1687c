//! Uploads of stills, clips and audio to the device's media pool.
//!
//! The device accepts one transfer at a time, so a single worker takes upload requests from a
//!  FIFO queue and runs each to completion before starting the next:
//!
//! ```ascii
//! client                          device
//!   LOCK {store, locked}     ->
//!                            <-   LKOB {store}            (LKST {store, unlocked}: refused)
//!   FTSD {id, store, slot,
//!         size, mode}        ->
//!                            <-   FTCD {id, chunk size, chunk count}
//!   FTDa {id, chunk}         ->   (one at a time, each acknowledged before the next;
//!   ...                            FTCD again once the granted count is used up)
//!   FTFD {id, name, ...}     ->
//!                            <-   FTDC {id}
//!   LOCK {store, unlocked}   ->
//!                            <-   LKST {store, unlocked}
//! ```
//!
//! `FTDE` at any point rejects the transfer.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use bytes::Bytes;
use tokio::select;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, trace, warn};

use crate::commands::{Command, LockObtained, LockRequest, LockState, TransferChunkParams, TransferComplete, TransferData, TransferError, TransferFileDescription, TransferUploadRequest};
use crate::config::AtemConfig;
use crate::error::CommandError;
use crate::session::CommandSender;

/// where on the device an upload goes
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TransferStore {
    Still,
    /// frames of the clip with the given index
    Clip(u8),
    /// the audio track of the clip with the given index
    Audio(u8),
}

impl TransferStore {
    pub fn store_id(&self) -> u16 {
        match self {
            TransferStore::Still => 0,
            TransferStore::Clip(clip) | TransferStore::Audio(clip) => *clip as u16 + 1,
        }
    }

    pub fn mode(&self) -> u16 {
        match self {
            TransferStore::Still | TransferStore::Clip(_) => 0x0001,
            TransferStore::Audio(_) => 0x0100,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UploadMetadata {
    pub name: String,
    pub description: String,
    pub hash: [u8; 16],
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UploadRequest {
    pub store: TransferStore,
    pub slot: u16,
    pub data: Bytes,
    pub metadata: UploadMetadata,
}

/// Progress of the active transfer. `Rejected` and `Aborted` can follow any non-terminal phase.
///  Once a transfer ends, its terminal phase stays visible until the next one starts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransferPhase {
    Requested,
    Locked,
    Transferring,
    Completing,
    Done,
    Rejected,
    Aborted,
}

/// Handle for the result of an upload
#[derive(Debug)]
pub struct PendingUpload {
    receiver: oneshot::Receiver<Result<(), CommandError>>,
}

impl PendingUpload {
    fn new() -> (PendingUpload, oneshot::Sender<Result<(), CommandError>>) {
        let (sender, receiver) = oneshot::channel();
        (PendingUpload { receiver }, sender)
    }

    /// an upload that failed before it was queued
    pub fn failed(error: CommandError) -> PendingUpload {
        let (pending, responder) = PendingUpload::new();
        let _ = responder.send(Err(error));
        pending
    }
}

impl Future for PendingUpload {
    type Output = Result<(), CommandError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(CommandError::ConnectionLost)))
    }
}

struct UploadJob {
    request: UploadRequest,
    /// the connection generation the upload was requested in
    generation: u64,
    responder: oneshot::Sender<Result<(), CommandError>>,
}

enum TransferInput {
    Upload(UploadJob),
    /// a transfer protocol command received from the device
    Device(Command),
    /// the connection of this generation (and all earlier ones) is gone
    ConnectionLost { generation: u64 },
}

/// Handle to the spawned transfer worker. Dropping it stops the worker.
pub struct DataTransferManager {
    inputs: mpsc::UnboundedSender<TransferInput>,
    phase: watch::Receiver<Option<TransferPhase>>,
    worker: JoinHandle<()>,
}

impl Drop for DataTransferManager {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

impl DataTransferManager {
    pub fn spawn(config: Arc<AtemConfig>, commands: CommandSender) -> DataTransferManager {
        let (inputs, inputs_recv) = mpsc::unbounded_channel();
        let (phase_send, phase) = watch::channel(None);
        let worker = TransferWorker {
            config,
            commands,
            inputs: inputs_recv,
            phase: phase_send,
            queue: Default::default(),
            device_backlog: Default::default(),
            next_transfer_id: 1,
        };
        DataTransferManager {
            inputs,
            phase,
            worker: tokio::spawn(worker.run()),
        }
    }

    /// phase of the active upload, or of the most recent one if none is active
    pub fn phase(&self) -> Option<TransferPhase> {
        *self.phase.borrow()
    }

    pub fn start_upload(&self, request: UploadRequest, generation: u64) -> PendingUpload {
        let (pending, responder) = PendingUpload::new();
        if let Err(e) = self.inputs.send(TransferInput::Upload(UploadJob { request, generation, responder })) {
            if let TransferInput::Upload(job) = e.0 {
                let _ = job.responder.send(Err(CommandError::ConnectionLost));
            }
        }
        pending
    }

    pub fn on_device_command(&self, command: Command) {
        let _ = self.inputs.send(TransferInput::Device(command));
    }

    /// Fails the active transfer and all queued uploads requested in `generation` or earlier.
    pub fn on_connection_lost(&self, generation: u64) {
        let _ = self.inputs.send(TransferInput::ConnectionLost { generation });
    }
}

struct TransferWorker {
    config: Arc<AtemConfig>,
    commands: CommandSender,
    inputs: mpsc::UnboundedReceiver<TransferInput>,
    phase: watch::Sender<Option<TransferPhase>>,
    queue: VecDeque<UploadJob>,
    /// device commands that arrived while waiting for an acknowledgement
    device_backlog: VecDeque<Command>,
    next_transfer_id: u16,
}

impl TransferWorker {
    async fn run(mut self) {
        loop {
            let Some(job) = self.queue.pop_front() else {
                match self.inputs.recv().await {
                    Some(input) => self.on_idle_input(input),
                    None => break,
                }
                continue;
            };

            info!("starting upload of {} bytes to {:?} slot {}", job.request.data.len(), job.request.store, job.request.slot);
            let result = self.upload(&job.request, job.generation).await;
            match &result {
                Ok(()) => info!("upload to {:?} slot {} done", job.request.store, job.request.slot),
                Err(CommandError::ConnectionLost) => {
                    warn!("upload to {:?} slot {} aborted: connection lost", job.request.store, job.request.slot);
                    self.fail_queued(job.generation);
                }
                Err(e) => warn!("upload to {:?} slot {} failed: {}", job.request.store, job.request.slot, e),
            }
            self.device_backlog.clear();
            let _ = job.responder.send(result);
        }
        debug!("data transfer worker shutting down");
        self.fail_queued(u64::MAX);
    }

    fn on_idle_input(&mut self, input: TransferInput) {
        match input {
            TransferInput::Upload(job) => self.queue.push_back(job),
            TransferInput::Device(command) => trace!("no active transfer - ignoring {}", command.name()),
            TransferInput::ConnectionLost { generation } => self.fail_queued(generation),
        }
    }

    fn fail_queued(&mut self, generation: u64) {
        let (failed, kept) = std::mem::take(&mut self.queue)
            .into_iter()
            .partition::<VecDeque<_>, _>(|job| job.generation <= generation);
        self.queue = kept;
        if !failed.is_empty() {
            debug!("failing {} queued uploads: connection lost", failed.len());
        }
        for job in failed {
            let _ = job.responder.send(Err(CommandError::ConnectionLost));
        }
    }

    fn set_phase(&self, request: &UploadRequest, phase: TransferPhase) {
        debug!("upload to {:?} slot {}: {:?}", request.store, request.slot, phase);
        self.phase.send_replace(Some(phase));
    }

    fn response_deadline(&self) -> Instant {
        Instant::now() + self.config.transfer_response_timeout
    }

    async fn upload(&mut self, request: &UploadRequest, generation: u64) -> Result<(), CommandError> {
        let size = u32::try_from(request.data.len())
            .map_err(|_| CommandError::Encoding(format!("{} bytes exceed the maximum upload size", request.data.len())))?;

        let store = request.store.store_id();
        self.set_phase(request, TransferPhase::Requested);
        let locked = match self.send_and_wait(LockRequest { store, locked: true }, generation).await {
            Ok(()) => self.wait_for_lock(store, generation).await,
            Err(e) => Err(e),
        };
        if let Err(e) = locked {
            self.set_phase(request, failed_phase(&e));
            // the device may still grant a request that timed out
            if !matches!(e, CommandError::Rejected(_) | CommandError::ConnectionLost) {
                self.unlock(store, generation).await;
            }
            return Err(e);
        }
        self.set_phase(request, TransferPhase::Locked);

        let result = self.transfer_locked(request, store, size, generation).await;
        match &result {
            Ok(()) => self.set_phase(request, TransferPhase::Done),
            Err(e) => self.set_phase(request, failed_phase(e)),
        }
        if !matches!(result, Err(CommandError::ConnectionLost)) {
            self.unlock(store, generation).await;
        }
        result
    }

    async fn wait_for_lock(&mut self, store: u16, generation: u64) -> Result<(), CommandError> {
        let deadline = self.response_deadline();
        loop {
            match self.next_device_command(generation, deadline).await? {
                Command::LockObtained(LockObtained { store: s }) if s == store => return Ok(()),
                Command::LockState(LockState { store: s, locked: false }) if s == store => {
                    return Err(CommandError::Rejected(format!("store {} is locked by another client", store)));
                }
                other => trace!("waiting for lock - ignoring {}", other.name()),
            }
        }
    }

    async fn transfer_locked(&mut self, request: &UploadRequest, store: u16, size: u32, generation: u64) -> Result<(), CommandError> {
        let transfer_id = self.next_transfer_id;
        self.next_transfer_id = self.next_transfer_id.wrapping_add(1);

        self.send_and_wait(TransferUploadRequest {
            transfer_id,
            store,
            slot: request.slot,
            size,
            mode: request.store.mode(),
        }, generation).await?;
        self.set_phase(request, TransferPhase::Transferring);

        // whole 4 byte words, so that no frame padding is needed
        let max_chunk = (self.config.max_payload_len() - TransferData::OVERHEAD) & !3;
        let data = &request.data;
        let mut offset = 0;
        while offset < data.len() {
            let params = self.wait_for_chunk_params(transfer_id, generation).await?;
            let chunk_size = max_chunk.min(params.chunk_size as usize);
            if chunk_size == 0 {
                return Err(CommandError::Rejected("device granted chunks of size 0".to_string()));
            }

            for _ in 0..params.chunk_count {
                if offset >= data.len() {
                    break;
                }
                let end = data.len().min(offset + chunk_size);
                trace!("sending bytes {}..{} of transfer {}", offset, end, transfer_id);
                self.send_and_wait(TransferData {
                    transfer_id,
                    data: data.slice(offset..end),
                }, generation).await?;
                self.check_transfer_error(transfer_id)?;
                offset = end;
            }
        }

        self.set_phase(request, TransferPhase::Completing);
        self.send_and_wait(TransferFileDescription {
            transfer_id,
            name: request.metadata.name.clone(),
            description: request.metadata.description.clone(),
            hash: request.metadata.hash,
        }, generation).await?;

        let deadline = self.response_deadline();
        loop {
            match self.next_device_command(generation, deadline).await? {
                Command::TransferComplete(TransferComplete { transfer_id: id }) if id == transfer_id => return Ok(()),
                Command::TransferError(TransferError { transfer_id: id, code }) if id == transfer_id => {
                    return Err(transfer_rejected(id, code));
                }
                other => trace!("waiting for completion - ignoring {}", other.name()),
            }
        }
    }

    async fn wait_for_chunk_params(&mut self, transfer_id: u16, generation: u64) -> Result<TransferChunkParams, CommandError> {
        let deadline = self.response_deadline();
        loop {
            match self.next_device_command(generation, deadline).await? {
                Command::TransferChunkParams(params) if params.transfer_id == transfer_id => return Ok(params),
                Command::TransferError(TransferError { transfer_id: id, code }) if id == transfer_id => {
                    return Err(transfer_rejected(id, code));
                }
                other => trace!("waiting for chunk parameters - ignoring {}", other.name()),
            }
        }
    }

    /// checks the commands that arrived while sending for a rejection of this transfer
    fn check_transfer_error(&self, transfer_id: u16) -> Result<(), CommandError> {
        for command in &self.device_backlog {
            if let Command::TransferError(TransferError { transfer_id: id, code }) = command {
                if *id == transfer_id {
                    return Err(transfer_rejected(*id, *code));
                }
            }
        }
        Ok(())
    }

    async fn unlock(&mut self, store: u16, generation: u64) {
        if let Err(e) = self.send_and_wait(LockRequest { store, locked: false }, generation).await {
            warn!("failed to release the lock on store {}: {}", store, e);
            return;
        }
        let deadline = self.response_deadline();
        loop {
            match self.next_device_command(generation, deadline).await {
                Ok(Command::LockState(LockState { store: s, locked: false })) if s == store => {
                    debug!("store {} unlocked", store);
                    return;
                }
                Ok(other) => trace!("waiting for unlock - ignoring {}", other.name()),
                Err(e) => {
                    debug!("no unlock confirmation for store {}: {}", store, e);
                    return;
                }
            }
        }
    }

    /// Sends a command and waits for its acknowledgement. Uploads requested in the meantime
    ///  are queued.
    async fn send_and_wait(&mut self, command: impl Into<Command>, generation: u64) -> Result<(), CommandError> {
        let mut pending = self.commands.send(command);
        loop {
            select! {
                result = &mut pending => {
                    // the upload was accepted while connected, so the session is gone by now
                    return result.map_err(|e| match e {
                        CommandError::NotConnected => CommandError::ConnectionLost,
                        e => e,
                    });
                }
                input = self.inputs.recv() => {
                    match input {
                        Some(TransferInput::Device(command)) => self.device_backlog.push_back(command),
                        Some(input) => self.on_input_while_active(input, generation)?,
                        None => return Err(CommandError::ConnectionLost),
                    }
                }
            }
        }
    }

    /// Waits for the next transfer command from the device, failing once `deadline` passes.
    ///  Callers waiting for a specific response pass the same deadline for every command they
    ///  skip.
    async fn next_device_command(&mut self, generation: u64, deadline: Instant) -> Result<Command, CommandError> {
        if let Some(command) = self.device_backlog.pop_front() {
            return Ok(command);
        }

        loop {
            select! {
                input = self.inputs.recv() => {
                    match input {
                        Some(TransferInput::Device(command)) => return Ok(command),
                        Some(input) => self.on_input_while_active(input, generation)?,
                        None => return Err(CommandError::ConnectionLost),
                    }
                }
                _ = time::sleep_until(deadline) => {
                    debug!("no response from the device within {:?}", self.config.transfer_response_timeout);
                    return Err(CommandError::Timeout);
                }
            }
        }
    }

    /// Handles inputs other than device commands during a transfer. Fails if the active
    ///  transfer's connection is gone.
    fn on_input_while_active(&mut self, input: TransferInput, generation: u64) -> Result<(), CommandError> {
        match input {
            TransferInput::Upload(job) => {
                debug!("transfer in progress - queueing upload to {:?} slot {}", job.request.store, job.request.slot);
                self.queue.push_back(job);
            }
            TransferInput::Device(command) => self.device_backlog.push_back(command),
            TransferInput::ConnectionLost { generation: lost } => {
                self.fail_queued(lost);
                if generation <= lost {
                    return Err(CommandError::ConnectionLost);
                }
                trace!("connection generation {} lost, active transfer belongs to {}", lost, generation);
            }
        }
        Ok(())
    }
}

fn failed_phase(error: &CommandError) -> TransferPhase {
    match error {
        CommandError::Rejected(_) => TransferPhase::Rejected,
        _ => TransferPhase::Aborted,
    }
}

fn transfer_rejected(transfer_id: u16, code: u8) -> CommandError {
    CommandError::Rejected(format!("transfer {} failed with error code {}", transfer_id, code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use rstest::rstest;
    use tokio::runtime::Builder;
    use crate::session::OutboundCommand;

    fn rt() -> tokio::runtime::Runtime {
        Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build().unwrap()
    }

    /// Plays the session engine's part: acknowledges every command the manager sends and
    ///  hands it to the test.
    struct FakeSession {
        outbound: mpsc::UnboundedReceiver<OutboundCommand>,
    }

    impl FakeSession {
        async fn next_command(&mut self) -> Command {
            let cmd = time::timeout(Duration::from_secs(60), self.outbound.recv()).await
                .expect("timed out waiting for a command")
                .expect("manager is gone");
            let _ = cmd.responder.send(Ok(()));
            cmd.command
        }

        async fn assert_idle(&mut self) {
            time::sleep(Duration::from_millis(100)).await;
            assert!(self.outbound.try_recv().is_err(), "no command expected");
        }
    }

    fn lock_request(locked: bool) -> Command {
        Command::LockRequest(LockRequest { store: 0, locked })
    }

    fn setup() -> (DataTransferManager, FakeSession) {
        let (sender, outbound) = CommandSender::detached();
        let manager = DataTransferManager::spawn(Arc::new(AtemConfig::default()), sender);
        (manager, FakeSession { outbound })
    }

    fn still_upload(slot: u16, len: usize) -> UploadRequest {
        UploadRequest {
            store: TransferStore::Still,
            slot,
            data: Bytes::from((0..len).map(|i| i as u8).collect::<Vec<_>>()),
            metadata: UploadMetadata {
                name: format!("still {}", slot),
                description: String::new(),
                hash: [slot as u8; 16],
            },
        }
    }

    /// runs a successful upload of `len` bytes in chunks of 1000 bytes up to the completion
    ///  command, returning the data chunks that were sent
    async fn run_until_completion(manager: &DataTransferManager, session: &mut FakeSession, slot: u16, len: usize) -> (u16, Vec<TransferData>) {
        assert_eq!(session.next_command().await, lock_request(true));
        manager.on_device_command(LockObtained { store: 0 }.into());

        let Command::TransferUploadRequest(request) = session.next_command().await else {
            panic!("expected an upload request");
        };
        assert_eq!(request.slot, slot);
        assert_eq!(request.size, len as u32);
        assert_eq!(request.mode, 1);
        manager.on_device_command(TransferChunkParams { transfer_id: request.transfer_id, chunk_size: 1000, chunk_count: 10 }.into());

        let mut chunks = Vec::new();
        loop {
            match session.next_command().await {
                Command::TransferData(data) => chunks.push(data),
                Command::TransferFileDescription(description) => {
                    assert_eq!(description.transfer_id, request.transfer_id);
                    assert_eq!(description.name, format!("still {}", slot));
                    break;
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        (request.transfer_id, chunks)
    }

    async fn finish(manager: &DataTransferManager, session: &mut FakeSession, transfer_id: u16) {
        manager.on_device_command(TransferComplete { transfer_id }.into());
        assert_eq!(session.next_command().await, lock_request(false));
        manager.on_device_command(LockState { store: 0, locked: false }.into());
    }

    #[rstest]
    #[case::still(TransferStore::Still, 0, 1)]
    #[case::clip(TransferStore::Clip(0), 1, 1)]
    #[case::clip_2(TransferStore::Clip(2), 3, 1)]
    #[case::audio(TransferStore::Audio(1), 2, 0x0100)]
    fn test_store(#[case] store: TransferStore, #[case] store_id: u16, #[case] mode: u16) {
        assert_eq!(store.store_id(), store_id);
        assert_eq!(store.mode(), mode);
    }

    #[test]
    fn test_upload() {
        rt().block_on(async {
            let (manager, mut session) = setup();
            assert_eq!(manager.phase(), None);
            let upload = manager.start_upload(still_upload(3, 2500), 1);

            let (transfer_id, chunks) = run_until_completion(&manager, &mut session, 3, 2500).await;
            assert_eq!(manager.phase(), Some(TransferPhase::Completing));
            assert_eq!(chunks.iter().map(|c| c.data.len()).collect::<Vec<_>>(), vec![1000, 1000, 500]);
            assert!(chunks.iter().all(|c| c.transfer_id == transfer_id));
            let data = chunks.iter().flat_map(|c| c.data.iter().copied()).collect::<Vec<_>>();
            assert_eq!(data, still_upload(3, 2500).data.to_vec());

            finish(&manager, &mut session, transfer_id).await;
            assert_eq!(upload.await, Ok(()));
            assert_eq!(manager.phase(), Some(TransferPhase::Done));
        });
    }

    #[test]
    fn test_chunks_are_limited_by_packet_size() {
        rt().block_on(async {
            let (manager, mut session) = setup();
            let upload = manager.start_upload(still_upload(0, 3000), 1);

            assert_eq!(session.next_command().await, lock_request(true));
            manager.on_device_command(LockObtained { store: 0 }.into());
            let Command::TransferUploadRequest(request) = session.next_command().await else {
                panic!("expected an upload request");
            };
            manager.on_device_command(TransferChunkParams { transfer_id: request.transfer_id, chunk_size: 8000, chunk_count: 1 }.into());

            let Command::TransferData(first) = session.next_command().await else {
                panic!("expected data");
            };
            // the rest needs another grant
            session.assert_idle().await;
            manager.on_device_command(TransferChunkParams { transfer_id: request.transfer_id, chunk_size: 8000, chunk_count: 5 }.into());
            let Command::TransferData(second) = session.next_command().await else {
                panic!("expected data");
            };
            let Command::TransferData(third) = session.next_command().await else {
                panic!("expected data");
            };

            let max_chunk = (AtemConfig::default().max_payload_len() - TransferData::OVERHEAD) & !3;
            assert_eq!(first.data.len(), max_chunk);
            assert_eq!(second.data.len(), max_chunk);
            assert_eq!(third.data.len(), 3000 - 2 * max_chunk);

            assert!(matches!(session.next_command().await, Command::TransferFileDescription(_)));
            finish(&manager, &mut session, request.transfer_id).await;
            assert_eq!(upload.await, Ok(()));
        });
    }

    #[test]
    fn test_lock_refused() {
        rt().block_on(async {
            let (manager, mut session) = setup();
            let upload = manager.start_upload(still_upload(1, 3000), 1);

            assert_eq!(session.next_command().await, lock_request(true));
            manager.on_device_command(LockState { store: 0, locked: false }.into());

            assert!(matches!(upload.await, Err(CommandError::Rejected(_))));
            assert_eq!(manager.phase(), Some(TransferPhase::Rejected));
            session.assert_idle().await;
        });
    }

    #[test]
    fn test_lock_timeout_releases_lock() {
        rt().block_on(async {
            let (manager, mut session) = setup();
            let upload = manager.start_upload(still_upload(1, 10), 1);
            assert_eq!(session.next_command().await, lock_request(true));

            // a grant arriving after the timeout must not leave the store locked
            assert_eq!(session.next_command().await, lock_request(false));
            manager.on_device_command(LockObtained { store: 0 }.into());
            manager.on_device_command(LockState { store: 0, locked: false }.into());

            assert_eq!(upload.await, Err(CommandError::Timeout));
            assert_eq!(manager.phase(), Some(TransferPhase::Aborted));
            session.assert_idle().await;
        });
    }

    #[test]
    fn test_unrelated_commands_do_not_extend_the_lock_wait() {
        rt().block_on(async {
            let (manager, mut session) = setup();
            let upload = manager.start_upload(still_upload(1, 10), 1);
            assert_eq!(session.next_command().await, lock_request(true));
            let started = Instant::now();

            let other_store_changes = async {
                loop {
                    time::sleep(Duration::from_secs(1)).await;
                    manager.on_device_command(LockState { store: 5, locked: true }.into());
                }
            };
            select! {
                command = session.next_command() => assert_eq!(command, lock_request(false)),
                _ = other_store_changes => {}
            }
            assert!(started.elapsed() < Duration::from_secs(6));

            manager.on_device_command(LockState { store: 0, locked: false }.into());
            assert_eq!(upload.await, Err(CommandError::Timeout));
        });
    }

    #[test]
    fn test_device_error_releases_lock() {
        rt().block_on(async {
            let (manager, mut session) = setup();
            let upload = manager.start_upload(still_upload(1, 10), 1);

            session.next_command().await;
            manager.on_device_command(LockObtained { store: 0 }.into());
            let Command::TransferUploadRequest(request) = session.next_command().await else {
                panic!("expected an upload request");
            };
            manager.on_device_command(TransferError { transfer_id: request.transfer_id, code: 1 }.into());

            assert_eq!(session.next_command().await, lock_request(false));
            manager.on_device_command(LockState { store: 0, locked: false }.into());
            assert!(matches!(upload.await, Err(CommandError::Rejected(_))));
        });
    }

    #[test]
    fn test_uploads_are_serialized() {
        rt().block_on(async {
            let (manager, mut session) = setup();
            let first = manager.start_upload(still_upload(1, 1500), 1);
            let second = manager.start_upload(still_upload(2, 500), 1);

            let (transfer_id, _) = run_until_completion(&manager, &mut session, 1, 1500).await;
            // the second upload does not start before the first one is complete
            session.assert_idle().await;

            finish(&manager, &mut session, transfer_id).await;
            assert_eq!(first.await, Ok(()));

            let (transfer_id, chunks) = run_until_completion(&manager, &mut session, 2, 500).await;
            assert_eq!(chunks.len(), 1);
            finish(&manager, &mut session, transfer_id).await;
            assert_eq!(second.await, Ok(()));
        });
    }

    #[test]
    fn test_connection_lost_clears_queue() {
        rt().block_on(async {
            let (manager, mut session) = setup();
            let active = manager.start_upload(still_upload(1, 1500), 1);
            let queued = manager.start_upload(still_upload(2, 1500), 1);
            let later = manager.start_upload(still_upload(3, 1500), 2);

            session.next_command().await;
            manager.on_connection_lost(1);

            assert_eq!(active.await, Err(CommandError::ConnectionLost));
            assert_eq!(queued.await, Err(CommandError::ConnectionLost));

            // the upload for the next connection starts, without unlocking the lost one
            assert_eq!(session.next_command().await, lock_request(true));
            manager.on_connection_lost(2);
            assert_eq!(later.await, Err(CommandError::ConnectionLost));
        });
    }

    #[test]
    fn test_stale_connection_lost_is_ignored() {
        rt().block_on(async {
            let (manager, mut session) = setup();
            let upload = manager.start_upload(still_upload(4, 100), 2);

            session.next_command().await;
            manager.on_connection_lost(1);
            manager.on_device_command(LockObtained { store: 0 }.into());

            let Command::TransferUploadRequest(request) = session.next_command().await else {
                panic!("expected an upload request");
            };
            manager.on_device_command(TransferChunkParams { transfer_id: request.transfer_id, chunk_size: 1000, chunk_count: 1 }.into());
            assert!(matches!(session.next_command().await, Command::TransferData(_)));
            assert!(matches!(session.next_command().await, Command::TransferFileDescription(_)));
            finish(&manager, &mut session, request.transfer_id).await;
            assert_eq!(upload.await, Ok(()));
        });
    }

    #[test]
    fn test_failed_upload() {
        rt().block_on(async {
            assert_eq!(PendingUpload::failed(CommandError::NotConnected).await, Err(CommandError::NotConnected));
        });
    }
}
