use crate::domain_model::{ConnectionId, ConnectionStatus, UserId};

/// The receiver's answer to a pending request. Both outcomes are terminal.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Decision {
    Accepted,
    Rejected,
}

impl Decision {
    pub fn status(&self) -> ConnectionStatus {
        match self {
            Decision::Accepted => ConnectionStatus::Accepted,
            Decision::Rejected => ConnectionStatus::Rejected,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("cannot send a request to yourself")]
    SelfRequest,
    #[error("a live connection between this pair already exists")]
    AlreadyLinked,
    #[error("connection not found")]
    NotFound,
    #[error("request already resolved")]
    AlreadyResolved,
    #[error("write failed: {0}")]
    Write(String),
}

/// Connection lifecycle: `pending -> accepted` or `pending -> rejected`,
/// nothing leaves a terminal state, and there is no sender-side cancel.
#[async_trait::async_trait]
pub trait ConnectionService: Send + Sync {
    /// Create a pending request from `sender` to `receiver` with a
    /// server-assigned request time.
    async fn send_request(
        &self,
        sender: UserId,
        receiver: UserId,
    ) -> Result<ConnectionId, ConnectError>;

    /// Resolve a pending request, stamping the server-assigned response
    /// time.
    async fn respond_to_request(
        &self,
        connection: &ConnectionId,
        decision: Decision,
    ) -> Result<(), ConnectError>;
}
