use crate::application_port::{ConnectError, ConnectionService, Decision};
use crate::domain_model::{
    CONNECTIONS_COLLECTION, Connection, ConnectionId, ConnectionStatus, UserId,
};
use crate::domain_port::{DocumentStore, Filter, StoreError, StoreQuery, WritePatch, WriteValue};
use serde_json::json;
use std::sync::Arc;

pub struct StoreConnectionService {
    store: Arc<dyn DocumentStore>,
}

impl StoreConnectionService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// A pending or accepted connection between the pair, in either
    /// direction, blocks a new request. Rejected pairs may reconnect.
    async fn live_link_exists(&self, a: UserId, b: UserId) -> Result<bool, ConnectError> {
        let involved = Filter::AnyOf(vec![
            Filter::eq("senderId", a.to_string()),
            Filter::eq("receiverId", a.to_string()),
        ]);
        let docs = self
            .store
            .run_query(CONNECTIONS_COLLECTION, StoreQuery::filtered(involved))
            .await
            .map_err(map_store)?;

        Ok(decode_connections(&docs)
            .any(|c| c.links(a, b) && c.status != ConnectionStatus::Rejected))
    }
}

#[async_trait::async_trait]
impl ConnectionService for StoreConnectionService {
    async fn send_request(
        &self,
        sender: UserId,
        receiver: UserId,
    ) -> Result<ConnectionId, ConnectError> {
        if sender == receiver {
            return Err(ConnectError::SelfRequest);
        }
        if self.live_link_exists(sender, receiver).await? {
            return Err(ConnectError::AlreadyLinked);
        }

        let fields: WritePatch = vec![
            ("senderId".to_owned(), WriteValue::Json(json!(sender.to_string()))),
            ("receiverId".to_owned(), WriteValue::Json(json!(receiver.to_string()))),
            (
                "status".to_owned(),
                WriteValue::Json(json!(ConnectionStatus::Pending.as_str())),
            ),
            ("requestedAt".to_owned(), WriteValue::ServerTime),
        ];
        let id = self
            .store
            .insert(CONNECTIONS_COLLECTION, fields)
            .await
            .map_err(map_store)?;

        tracing::debug!(%sender, %receiver, connection = %id, "connection request sent");
        Ok(ConnectionId(id))
    }

    async fn respond_to_request(
        &self,
        connection: &ConnectionId,
        decision: Decision,
    ) -> Result<(), ConnectError> {
        let doc = self
            .store
            .get(CONNECTIONS_COLLECTION, &connection.0)
            .await
            .map_err(map_store)?
            .ok_or(ConnectError::NotFound)?;
        let current = Connection::from_document(&doc).map_err(|e| {
            ConnectError::Write(format!("stored connection is malformed: {e}"))
        })?;

        if current.status.is_terminal() {
            return Err(ConnectError::AlreadyResolved);
        }

        let patch: WritePatch = vec![
            (
                "status".to_owned(),
                WriteValue::Json(json!(decision.status().as_str())),
            ),
            ("respondedAt".to_owned(), WriteValue::ServerTime),
        ];
        self.store
            .update(CONNECTIONS_COLLECTION, &connection.0, patch)
            .await
            .map_err(map_store)?;

        tracing::debug!(connection = %connection, status = %decision.status(), "request resolved");
        Ok(())
    }
}

/// Decode a batch, quarantining malformed documents with a warning.
pub(crate) fn decode_connections(
    docs: &[crate::domain_port::Document],
) -> impl Iterator<Item = Connection> + '_ {
    docs.iter().filter_map(|doc| match Connection::from_document(doc) {
        Ok(connection) => Some(connection),
        Err(e) => {
            tracing::warn!(doc = %doc.id, error = %e, "quarantined malformed connection document");
            None
        }
    })
}

fn map_store(e: StoreError) -> ConnectError {
    match e {
        StoreError::NotFound(_) => ConnectError::NotFound,
        other => ConnectError::Write(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra_memory::MemoryDocumentStore;

    fn uid(name: &str) -> UserId {
        UserId(uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, name.as_bytes()))
    }

    fn service() -> (Arc<MemoryDocumentStore>, StoreConnectionService) {
        let store = Arc::new(MemoryDocumentStore::new());
        let service = StoreConnectionService::new(store.clone());
        (store, service)
    }

    #[tokio::test]
    async fn send_request_creates_a_pending_connection() {
        let (store, service) = service();
        let id = service.send_request(uid("a"), uid("b")).await.unwrap();

        let doc = store
            .get(CONNECTIONS_COLLECTION, &id.0)
            .await
            .unwrap()
            .unwrap();
        let connection = Connection::from_document(&doc).unwrap();
        assert_eq!(connection.status, ConnectionStatus::Pending);
        assert_eq!(connection.sender_id, uid("a"));
        assert_eq!(connection.receiver_id, uid("b"));
        assert!(connection.responded_at.is_none());
    }

    #[tokio::test]
    async fn self_request_is_rejected() {
        let (_, service) = service();
        let err = service.send_request(uid("a"), uid("a")).await.unwrap_err();
        assert!(matches!(err, ConnectError::SelfRequest));
    }

    #[tokio::test]
    async fn duplicate_request_over_a_live_pair_is_rejected() {
        let (_, service) = service();
        service.send_request(uid("a"), uid("b")).await.unwrap();

        // both directions count as the same pair
        let err = service.send_request(uid("b"), uid("a")).await.unwrap_err();
        assert!(matches!(err, ConnectError::AlreadyLinked));
    }

    #[tokio::test]
    async fn rejected_pair_may_reconnect() {
        let (_, service) = service();
        let id = service.send_request(uid("a"), uid("b")).await.unwrap();
        service
            .respond_to_request(&id, Decision::Rejected)
            .await
            .unwrap();

        assert!(service.send_request(uid("a"), uid("b")).await.is_ok());
    }

    #[tokio::test]
    async fn accepting_stamps_the_response_time() {
        let (store, service) = service();
        let id = service.send_request(uid("a"), uid("b")).await.unwrap();
        service
            .respond_to_request(&id, Decision::Accepted)
            .await
            .unwrap();

        let doc = store
            .get(CONNECTIONS_COLLECTION, &id.0)
            .await
            .unwrap()
            .unwrap();
        let connection = Connection::from_document(&doc).unwrap();
        assert_eq!(connection.status, ConnectionStatus::Accepted);
        assert!(connection.responded_at.is_some());
    }

    #[tokio::test]
    async fn a_resolved_request_cannot_be_answered_again() {
        let (_, service) = service();
        let id = service.send_request(uid("a"), uid("b")).await.unwrap();
        service
            .respond_to_request(&id, Decision::Accepted)
            .await
            .unwrap();

        let err = service
            .respond_to_request(&id, Decision::Rejected)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::AlreadyResolved));
    }

    #[tokio::test]
    async fn responding_to_an_unknown_connection_is_not_found() {
        let (_, service) = service();
        let ghost = ConnectionId(crate::domain_port::DocumentId("missing".to_owned()));
        let err = service
            .respond_to_request(&ghost, Decision::Accepted)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::NotFound));
    }

    #[tokio::test]
    async fn store_outage_surfaces_as_a_write_error() {
        let (store, service) = service();
        store.set_offline(true);

        let err = service.send_request(uid("a"), uid("b")).await.unwrap_err();
        assert!(matches!(err, ConnectError::Write(_)));
    }
}
