use crate::domain_model::{Profile, UserId};
use crate::domain_port::{Document, DocumentId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

pub const CONNECTIONS_COLLECTION: &str = "connections";

#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct ConnectionId(pub DocumentId);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `Pending` is the only non-terminal state: a request is answered exactly
/// once, by the receiver, and never deleted by this subsystem.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Pending => "pending",
            ConnectionStatus::Accepted => "accepted",
            ConnectionStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConnectionStatus::Pending)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ConnectionStatus::Pending),
            "accepted" => Ok(ConnectionStatus::Accepted),
            "rejected" => Ok(ConnectionStatus::Rejected),
            other => Err(format!("unknown status `{other}`")),
        }
    }
}

/// A directed request between two users that may mature into a
/// bidirectional relationship.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub status: ConnectionStatus,
    pub requested_at: DateTime<Utc>,
    /// Set on the accept/reject transition, absent while pending.
    pub responded_at: Option<DateTime<Utc>>,
}

impl Connection {
    /// Coerce a raw store document into the strict record shape. Anything
    /// malformed is rejected here so undefined fields never propagate.
    pub fn from_document(doc: &Document) -> Result<Self, DecodeError> {
        let sender_id = require_user(doc, "senderId")?;
        let receiver_id = require_user(doc, "receiverId")?;
        if sender_id == receiver_id {
            return Err(DecodeError::Malformed {
                field: "receiverId",
                reason: "sender and receiver are the same user".to_owned(),
            });
        }

        let status = require_str(doc, "status")?
            .parse::<ConnectionStatus>()
            .map_err(|reason| DecodeError::Malformed { field: "status", reason })?;
        let requested_at = require_time(doc, "requestedAt")?;
        let responded_at = optional_time(doc, "respondedAt")?;

        Ok(Self {
            id: ConnectionId(doc.id.clone()),
            sender_id,
            receiver_id,
            status,
            requested_at,
            responded_at,
        })
    }

    /// True when this record connects exactly the pair `{a, b}`, in either
    /// direction.
    pub fn links(&self, a: UserId, b: UserId) -> bool {
        (self.sender_id == a && self.receiver_id == b)
            || (self.sender_id == b && self.receiver_id == a)
    }

    pub fn counterpart_of(&self, viewer: UserId) -> Option<UserId> {
        if self.sender_id == viewer {
            Some(self.receiver_id)
        } else if self.receiver_id == viewer {
            Some(self.sender_id)
        } else {
            None
        }
    }
}

// region enriched views

/// A sent connection with the receiver's profile resolved.
#[derive(Debug, Clone)]
pub struct SentConnection {
    pub connection: Connection,
    pub peer: Profile,
}

/// A pending incoming request with the sender's profile resolved.
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub connection: Connection,
    pub peer: Profile,
}

/// A connection as seen from one viewer's side, with the direction made
/// explicit.
#[derive(Debug, Clone)]
pub struct LinkedConnection {
    pub connection: Connection,
    pub is_sender: bool,
    pub is_receiver: bool,
    pub other_user_id: UserId,
}

impl LinkedConnection {
    /// `None` when the viewer is not a participant. Exactly one of the
    /// direction flags is true on the result.
    pub fn annotate(connection: Connection, viewer: UserId) -> Option<Self> {
        let other_user_id = connection.counterpart_of(viewer)?;
        let is_sender = connection.sender_id == viewer;
        Some(Self {
            is_receiver: !is_sender,
            is_sender,
            other_user_id,
            connection,
        })
    }
}

// endregion

// region field coercion

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` is malformed: {reason}")]
    Malformed {
        field: &'static str,
        reason: String,
    },
}

pub fn require_str<'d>(doc: &'d Document, field: &'static str) -> Result<&'d str, DecodeError> {
    match doc.field(field) {
        None => Err(DecodeError::MissingField(field)),
        Some(value) => value.as_str().ok_or_else(|| DecodeError::Malformed {
            field,
            reason: "expected a string".to_owned(),
        }),
    }
}

pub fn require_user(doc: &Document, field: &'static str) -> Result<UserId, DecodeError> {
    require_str(doc, field)?
        .parse::<UserId>()
        .map_err(|e| DecodeError::Malformed { field, reason: e.to_string() })
}

pub fn require_time(
    doc: &Document,
    field: &'static str,
) -> Result<DateTime<Utc>, DecodeError> {
    parse_time(require_str(doc, field)?, field)
}

/// Absent and `null` both mean "not set"; anything else must parse.
pub fn optional_time(
    doc: &Document,
    field: &'static str,
) -> Result<Option<DateTime<Utc>>, DecodeError> {
    match doc.field(field) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => {
            let raw = value.as_str().ok_or_else(|| DecodeError::Malformed {
                field,
                reason: "expected a timestamp string".to_owned(),
            })?;
            parse_time(raw, field).map(Some)
        }
    }
}

fn parse_time(raw: &str, field: &'static str) -> Result<DateTime<Utc>, DecodeError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DecodeError::Malformed { field, reason: e.to_string() })
}

// endregion
