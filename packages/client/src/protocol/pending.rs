//! Request/reply correlation for commands that await a server response.
//!
//! Join, login, and queue each have at most one request outstanding at a
//! time. Registering a new request of a kind supersedes the previous one;
//! the superseded waiter is resolved immediately rather than left hanging.
//! Each slot resolves exactly once: a second matching reply finds the slot
//! empty and is dropped.

use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;

/// How long a correlated command waits for its reply.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a correlated command did not succeed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("the server did not reply in time")]
    Timeout,

    /// The server answered with an explicit failure message.
    #[error("{0}")]
    Rejected(String),

    #[error("the connection closed before the server replied")]
    Disconnected,

    #[error("superseded by a newer request of the same kind")]
    Superseded,

    #[error("not connected to a server")]
    NotConnected,
}

/// The identity the server confirmed for a login.
///
/// The confirmed name can differ from the requested one, e.g. guest logins
/// get a normalized name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginReply {
    pub name: String,
    pub guest: bool,
}

type Waiter<T> = oneshot::Sender<Result<T, RequestError>>;

struct Slot<T> {
    seq: u64,
    tx: Waiter<T>,
}

struct QueueSlot {
    seq: u64,
    /// The media id submitted with the request; replies for other ids
    /// belong to other submissions and must not resolve this one.
    submitted_id: String,
    tx: Waiter<()>,
}

#[derive(Default)]
struct Inner {
    next_seq: u64,
    join: Option<Slot<()>>,
    login: Option<Slot<LoginReply>>,
    queue: Option<QueueSlot>,
}

/// The set of in-flight correlated requests for one protocol client.
#[derive(Default)]
pub(crate) struct PendingRequests {
    inner: Mutex<Inner>,
}

impl PendingRequests {
    pub(crate) fn register_join(&self) -> (u64, oneshot::Receiver<Result<(), RequestError>>) {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.lock();
        let seq = inner.bump();
        if let Some(prev) = inner.join.replace(Slot { seq, tx }) {
            let _ = prev.tx.send(Err(RequestError::Superseded));
        }
        (seq, rx)
    }

    pub(crate) fn register_login(
        &self,
    ) -> (u64, oneshot::Receiver<Result<LoginReply, RequestError>>) {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.lock();
        let seq = inner.bump();
        if let Some(prev) = inner.login.replace(Slot { seq, tx }) {
            let _ = prev.tx.send(Err(RequestError::Superseded));
        }
        (seq, rx)
    }

    pub(crate) fn register_queue(
        &self,
        submitted_id: String,
    ) -> (u64, oneshot::Receiver<Result<(), RequestError>>) {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.lock();
        let seq = inner.bump();
        if let Some(prev) = inner.queue.replace(QueueSlot {
            seq,
            submitted_id,
            tx,
        }) {
            let _ = prev.tx.send(Err(RequestError::Superseded));
        }
        (seq, rx)
    }

    /// Resolve the outstanding join, if any.
    pub(crate) fn resolve_join(&self, result: Result<(), RequestError>) -> bool {
        match self.lock().join.take() {
            Some(slot) => slot.tx.send(result).is_ok(),
            None => false,
        }
    }

    pub(crate) fn resolve_login(&self, result: Result<LoginReply, RequestError>) -> bool {
        match self.lock().login.take() {
            Some(slot) => slot.tx.send(result).is_ok(),
            None => false,
        }
    }

    /// Resolve the outstanding queue request if `id` matches what was
    /// submitted. A mismatched id leaves the request pending.
    pub(crate) fn resolve_queue(&self, id: &str, result: Result<(), RequestError>) -> bool {
        let mut inner = self.lock();
        match inner.queue.take_if(|slot| slot.submitted_id == id) {
            Some(slot) => slot.tx.send(result).is_ok(),
            None => false,
        }
    }

    /// Drop the join slot after a timeout, but only if it still belongs to
    /// the timed-out request (a newer join may have replaced it).
    pub(crate) fn abandon_join(&self, seq: u64) {
        let mut inner = self.lock();
        if inner.join.as_ref().is_some_and(|slot| slot.seq == seq) {
            inner.join = None;
        }
    }

    pub(crate) fn abandon_login(&self, seq: u64) {
        let mut inner = self.lock();
        if inner.login.as_ref().is_some_and(|slot| slot.seq == seq) {
            inner.login = None;
        }
    }

    pub(crate) fn abandon_queue(&self, seq: u64) {
        let mut inner = self.lock();
        if inner.queue.as_ref().is_some_and(|slot| slot.seq == seq) {
            inner.queue = None;
        }
    }

    /// Resolve everything still pending with a failure. Called on teardown
    /// and on connection loss; a request left hanging forever is a leak.
    pub(crate) fn fail_all(&self) {
        let mut inner = self.lock();
        if let Some(slot) = inner.join.take() {
            let _ = slot.tx.send(Err(RequestError::Disconnected));
        }
        if let Some(slot) = inner.login.take() {
            let _ = slot.tx.send(Err(RequestError::Disconnected));
        }
        if let Some(slot) = inner.queue.take() {
            let _ = slot.tx.send(Err(RequestError::Disconnected));
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("pending request registry poisoned")
    }
}

impl Inner {
    fn bump(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}
