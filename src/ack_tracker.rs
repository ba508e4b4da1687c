use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::CommandError;

/// Correlation id of an outbound command. It is assigned when the command is submitted and is
///  independent of the packet id it is eventually sent with.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct TrackingId(pub u64);

impl Display for TrackingId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub type CommandResponder = oneshot::Sender<Result<(), CommandError>>;

/// Handle for the result of a submitted command. It resolves once the device acknowledges the
///  packet carrying the command, or fails on timeout or disconnect.
#[derive(Debug)]
pub struct PendingCommand {
    tracking_id: TrackingId,
    receiver: oneshot::Receiver<Result<(), CommandError>>,
}

impl PendingCommand {
    pub fn new(tracking_id: TrackingId) -> (PendingCommand, CommandResponder) {
        let (sender, receiver) = oneshot::channel();
        (PendingCommand { tracking_id, receiver }, sender)
    }

    pub fn tracking_id(&self) -> TrackingId {
        self.tracking_id
    }
}

impl Future for PendingCommand {
    type Output = Result<(), CommandError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| match result {
                Ok(result) => result,
                // the responder was dropped without an answer, which only happens when the
                //  session engine goes away
                Err(_) => Err(CommandError::ConnectionLost),
            })
    }
}

struct TrackedCommand {
    responder: CommandResponder,
    deadline: Instant,
}

/// Table of commands waiting for acknowledgement. Every tracking id is settled exactly once;
///  settling an unknown or already settled id is a no-op, so duplicate acks are harmless.
#[derive(Default)]
pub struct AckTracker {
    pending: FxHashMap<TrackingId, TrackedCommand>,
}

impl AckTracker {
    pub fn register(&mut self, tracking_id: TrackingId, responder: CommandResponder, deadline: Instant) {
        trace!("tracking command {}", tracking_id);
        self.pending.insert(tracking_id, TrackedCommand { responder, deadline });
    }

    pub fn resolve(&mut self, tracking_id: TrackingId) {
        self.settle(tracking_id, Ok(()));
    }

    pub fn reject(&mut self, tracking_id: TrackingId, error: CommandError) {
        self.settle(tracking_id, Err(error));
    }

    fn settle(&mut self, tracking_id: TrackingId, result: Result<(), CommandError>) {
        match self.pending.remove(&tracking_id) {
            Some(tracked) => {
                trace!("command {} settled: {:?}", tracking_id, result);
                // the caller may have dropped the handle, which is fine
                let _ = tracked.responder.send(result);
            }
            None => {
                trace!("command {} is not pending - ignoring", tracking_id);
            }
        }
    }

    pub fn reject_all(&mut self, error: CommandError) {
        if !self.pending.is_empty() {
            debug!("rejecting {} pending commands: {}", self.pending.len(), error);
        }
        for (_, tracked) in self.pending.drain() {
            let _ = tracked.responder.send(Err(error.clone()));
        }
    }

    /// fails all commands whose deadline has passed, returning their tracking ids
    pub fn expire(&mut self, now: Instant) -> Vec<TrackingId> {
        let expired = self.pending.iter()
            .filter(|(_, tracked)| tracked.deadline <= now)
            .map(|(&id, _)| id)
            .collect::<Vec<_>>();

        for &id in &expired {
            debug!("command {} timed out", id);
            self.reject(id, CommandError::Timeout);
        }
        expired
    }

    pub fn is_pending(&self, tracking_id: TrackingId) -> bool {
        self.pending.contains_key(&tracking_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use rstest::rstest;
    use tokio::runtime::Builder;

    fn rt() -> tokio::runtime::Runtime {
        Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build().unwrap()
    }

    #[rstest]
    #[case::resolve(Ok(()))]
    #[case::reject(Err(CommandError::Rejected("busy".to_string())))]
    fn test_settles_exactly_once(#[case] first: Result<(), CommandError>) {
        rt().block_on(async {
            let mut tracker = AckTracker::default();
            let (pending, responder) = PendingCommand::new(TrackingId(1));
            tracker.register(TrackingId(1), responder, Instant::now() + Duration::from_secs(1));
            assert!(tracker.is_pending(TrackingId(1)));

            match &first {
                Ok(()) => tracker.resolve(TrackingId(1)),
                Err(e) => tracker.reject(TrackingId(1), e.clone()),
            }
            // second settlement of the same id must not change anything
            tracker.reject(TrackingId(1), CommandError::Timeout);
            tracker.resolve(TrackingId(1));

            assert!(tracker.is_empty());
            assert_eq!(pending.await, first);
        });
    }

    #[test]
    fn test_unknown_id_is_noop() {
        rt().block_on(async {
            let mut tracker = AckTracker::default();
            let (_pending, responder) = PendingCommand::new(TrackingId(1));
            tracker.register(TrackingId(1), responder, Instant::now() + Duration::from_secs(1));

            tracker.resolve(TrackingId(99));
            tracker.reject(TrackingId(98), CommandError::Timeout);
            assert_eq!(tracker.len(), 1);
        });
    }

    #[test]
    fn test_reject_all() {
        rt().block_on(async {
            let mut tracker = AckTracker::default();
            let mut handles = Vec::new();
            for id in 1..=3 {
                let (pending, responder) = PendingCommand::new(TrackingId(id));
                tracker.register(TrackingId(id), responder, Instant::now() + Duration::from_secs(1));
                handles.push(pending);
            }

            tracker.reject_all(CommandError::ConnectionLost);
            assert!(tracker.is_empty());
            for pending in handles {
                assert_eq!(pending.await, Err(CommandError::ConnectionLost));
            }
        });
    }

    #[test]
    fn test_expire() {
        rt().block_on(async {
            let now = Instant::now();
            let mut tracker = AckTracker::default();
            let (early, responder) = PendingCommand::new(TrackingId(1));
            tracker.register(TrackingId(1), responder, now + Duration::from_millis(100));
            let (_late, responder) = PendingCommand::new(TrackingId(2));
            tracker.register(TrackingId(2), responder, now + Duration::from_millis(300));

            assert!(tracker.expire(now + Duration::from_millis(50)).is_empty());
            assert_eq!(tracker.expire(now + Duration::from_millis(100)), vec![TrackingId(1)]);
            assert!(tracker.is_pending(TrackingId(2)));
            assert_eq!(early.await, Err(CommandError::Timeout));
        });
    }

    #[test]
    fn test_dropped_responder_is_connection_lost() {
        rt().block_on(async {
            let (pending, responder) = PendingCommand::new(TrackingId(5));
            drop(responder);
            assert_eq!(pending.await, Err(CommandError::ConnectionLost));
        });
    }
}
