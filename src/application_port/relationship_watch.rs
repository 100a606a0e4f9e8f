use crate::domain_model::{Connection, LinkedConnection, ReceivedRequest, SentConnection, UserId};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub type SentListener = Box<dyn Fn(Vec<SentConnection>) + Send + Sync>;
pub type ReceivedListener = Box<dyn Fn(Vec<ReceivedRequest>) + Send + Sync>;
pub type LinkedListener = Box<dyn Fn(Vec<LinkedConnection>) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("subscription rejected: {0}")]
    Subscription(String),
    #[error("subscription closed before the first snapshot")]
    Closed,
}

/// Owns one live view's background work. Cancelling (or just dropping)
/// the handle releases the subscription, so a discarded view can never
/// leak its worker.
#[derive(Debug)]
pub struct WatchHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl WatchHandle {
    pub fn new(token: CancellationToken, task: JoinHandle<()>) -> Self {
        Self { token, task: Some(task) }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancel and wait for the worker to wind down.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Live, eventually-consistent views of a viewer's connections. Each view
/// holds its own subscription so independent UI surfaces can tear down in
/// any order; every emission is a fully-replaced list, not a diff.
#[async_trait::async_trait]
pub trait RelationshipWatch: Send + Sync {
    /// Connections sent by the viewer, pending or accepted, with the
    /// receiver's profile resolved.
    async fn watch_sent(
        &self,
        viewer: UserId,
        on_change: SentListener,
    ) -> Result<WatchHandle, WatchError>;

    /// Pending requests addressed to the viewer, with the sender's
    /// profile resolved.
    async fn watch_received(
        &self,
        viewer: UserId,
        on_change: ReceivedListener,
    ) -> Result<WatchHandle, WatchError>;

    /// Every pending or accepted connection the viewer participates in,
    /// annotated with the direction and the counterpart id.
    async fn watch_all(
        &self,
        viewer: UserId,
        on_change: LinkedListener,
    ) -> Result<WatchHandle, WatchError>;

    /// One-shot lookup of the connection between `viewer` and `other`, in
    /// either direction and any status. Internally a subscribe-then-drop
    /// on the first snapshot, not a live view.
    async fn check_status(
        &self,
        viewer: UserId,
        other: UserId,
    ) -> Result<Option<Connection>, WatchError>;
}
