use crate::application_port::{
    LinkedListener, ReceivedListener, RelationshipWatch, SentListener, WatchError, WatchHandle,
};
use crate::domain_model::{
    CONNECTIONS_COLLECTION, Connection, ConnectionStatus, LinkedConnection, Profile,
    ReceivedRequest, SentConnection, UserId,
};
use crate::domain_port::{ChangeFeed, DocumentStore, Filter, QuerySnapshot, UserDirectory};
use futures_util::future::join_all;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::connection_service_impl::decode_connections;

/// The relationship synchronizer: keeps per-view live lists consistent
/// with the store without polling. Each view owns an independent
/// subscription, so UI surfaces can tear down in any order; the price is
/// one profile lookup per record per view, acceptable because connection
/// counts per user are small.
pub struct StoreRelationshipWatch {
    store: Arc<dyn DocumentStore>,
    directory: Arc<dyn UserDirectory>,
}

impl StoreRelationshipWatch {
    pub fn new(store: Arc<dyn DocumentStore>, directory: Arc<dyn UserDirectory>) -> Self {
        Self { store, directory }
    }

    async fn subscribe(&self, filter: Filter) -> Result<ChangeFeed, WatchError> {
        self.store
            .watch(CONNECTIONS_COLLECTION, filter)
            .await
            .map_err(|e| WatchError::Subscription(e.to_string()))
    }
}

#[async_trait::async_trait]
impl RelationshipWatch for StoreRelationshipWatch {
    async fn watch_sent(
        &self,
        viewer: UserId,
        on_change: SentListener,
    ) -> Result<WatchHandle, WatchError> {
        let feed = self.subscribe(sent_filter(viewer)).await?;
        let directory = self.directory.clone();
        let on_change = Arc::new(on_change);

        Ok(spawn_view(feed, viewer, "sent", move |snapshot| {
            let directory = directory.clone();
            let on_change = on_change.clone();
            async move {
                let lookups = decode_connections(&snapshot.docs)
                    .collect::<Vec<_>>()
                    .into_iter()
                    .map(|connection| {
                        let directory = directory.clone();
                        async move {
                            let peer = resolve_peer(&*directory, connection.receiver_id).await?;
                            Some(SentConnection { connection, peer })
                        }
                    });
                let enriched: Vec<SentConnection> =
                    join_all(lookups).await.into_iter().flatten().collect();
                (*on_change)(enriched);
            }
        }))
    }

    async fn watch_received(
        &self,
        viewer: UserId,
        on_change: ReceivedListener,
    ) -> Result<WatchHandle, WatchError> {
        let feed = self.subscribe(received_filter(viewer)).await?;
        let directory = self.directory.clone();
        let on_change = Arc::new(on_change);

        Ok(spawn_view(feed, viewer, "received", move |snapshot| {
            let directory = directory.clone();
            let on_change = on_change.clone();
            async move {
                let lookups = decode_connections(&snapshot.docs)
                    .collect::<Vec<_>>()
                    .into_iter()
                    .map(|connection| {
                        let directory = directory.clone();
                        async move {
                            let peer = resolve_peer(&*directory, connection.sender_id).await?;
                            Some(ReceivedRequest { connection, peer })
                        }
                    });
                let enriched: Vec<ReceivedRequest> =
                    join_all(lookups).await.into_iter().flatten().collect();
                (*on_change)(enriched);
            }
        }))
    }

    async fn watch_all(
        &self,
        viewer: UserId,
        on_change: LinkedListener,
    ) -> Result<WatchHandle, WatchError> {
        let feed = self.subscribe(involved_filter(viewer)).await?;
        let on_change = Arc::new(on_change);

        Ok(spawn_view(feed, viewer, "all", move |snapshot| {
            let on_change = on_change.clone();
            async move {
                let linked: Vec<LinkedConnection> = decode_connections(&snapshot.docs)
                    .filter_map(|c| LinkedConnection::annotate(c, viewer))
                    .collect();
                (*on_change)(linked);
            }
        }))
    }

    async fn check_status(
        &self,
        viewer: UserId,
        other: UserId,
    ) -> Result<Option<Connection>, WatchError> {
        let mut feed = self.subscribe(pair_scan_filter(viewer)).await?;
        let snapshot = feed.next().await.ok_or(WatchError::Closed)?;
        // dropping the feed here releases the one-shot subscription
        Ok(decode_connections(&snapshot.docs).find(|c| c.links(viewer, other)))
    }
}

/// One worker per view, owned by the returned handle. A closed feed
/// stalls the view with a warning; there is no auto-reconnect.
fn spawn_view<F, Fut>(
    mut feed: ChangeFeed,
    viewer: UserId,
    label: &'static str,
    mut on_snapshot: F,
) -> WatchHandle
where
    F: FnMut(QuerySnapshot) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let token = CancellationToken::new();
    let worker = token.clone();
    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = worker.cancelled() => break,
                maybe = feed.next() => {
                    let Some(snapshot) = maybe else {
                        tracing::warn!(%viewer, view = label, "subscription ended, view stalled");
                        break;
                    };
                    on_snapshot(snapshot).await;
                }
            }
        }
    });
    WatchHandle::new(token, task)
}

/// A failed or missing lookup drops the record: the view under-reports
/// rather than failing outright.
async fn resolve_peer(directory: &dyn UserDirectory, user: UserId) -> Option<Profile> {
    match directory.get_by_id(user).await {
        Ok(Some(profile)) => Some(profile),
        Ok(None) => {
            tracing::debug!(%user, "peer profile missing, record dropped");
            None
        }
        Err(e) => {
            tracing::warn!(%user, error = %e, "peer profile lookup failed, record dropped");
            None
        }
    }
}

fn live_statuses() -> Filter {
    Filter::any_in(
        "status",
        vec![
            json!(ConnectionStatus::Pending.as_str()),
            json!(ConnectionStatus::Accepted.as_str()),
        ],
    )
}

fn sent_filter(viewer: UserId) -> Filter {
    Filter::And(vec![
        Filter::eq("senderId", viewer.to_string()),
        live_statuses(),
    ])
}

fn received_filter(viewer: UserId) -> Filter {
    Filter::And(vec![
        Filter::eq("receiverId", viewer.to_string()),
        Filter::eq("status", ConnectionStatus::Pending.as_str()),
    ])
}

fn involved_filter(viewer: UserId) -> Filter {
    Filter::And(vec![pair_scan_filter(viewer), live_statuses()])
}

/// Any connection the viewer participates in, regardless of status.
fn pair_scan_filter(viewer: UserId) -> Filter {
    Filter::AnyOf(vec![
        Filter::eq("senderId", viewer.to_string()),
        Filter::eq("receiverId", viewer.to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_impl::{StoreConnectionService, StoreUserDirectory};
    use crate::application_port::{ConnectionService, Decision};
    use crate::domain_model::USERS_COLLECTION;
    use crate::domain_port::{DocumentId, WritePatch, WriteValue};
    use crate::infra_memory::MemoryDocumentStore;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn uid(name: &str) -> UserId {
        UserId(uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, name.as_bytes()))
    }

    async fn seed_profile(store: &MemoryDocumentStore, name: &str) -> UserId {
        let user = uid(name);
        let fields: WritePatch = vec![
            ("uid".to_owned(), WriteValue::Json(json!(user.to_string()))),
            ("name".to_owned(), WriteValue::Json(json!(name))),
            ("createdAt".to_owned(), WriteValue::ServerTime),
        ];
        store
            .put(USERS_COLLECTION, &DocumentId(user.to_string()), fields)
            .await
            .unwrap();
        user
    }

    struct Fixture {
        store: Arc<MemoryDocumentStore>,
        service: StoreConnectionService,
        watch: StoreRelationshipWatch,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryDocumentStore::new());
        let directory = Arc::new(StoreUserDirectory::new(store.clone()));
        Fixture {
            service: StoreConnectionService::new(store.clone()),
            watch: StoreRelationshipWatch::new(store.clone(), directory),
            store,
        }
    }

    fn collect<T: Send + 'static>() -> (Box<dyn Fn(Vec<T>) + Send + Sync>, mpsc::UnboundedReceiver<Vec<T>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = Box::new(move |batch: Vec<T>| {
            let _ = tx.send(batch);
        });
        (listener, rx)
    }

    async fn next_emit<T>(rx: &mut mpsc::UnboundedReceiver<Vec<T>>) -> Vec<T> {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("no emission within a second")
            .expect("listener channel closed")
    }

    #[tokio::test]
    async fn sent_view_emits_only_the_viewers_requests_enriched() {
        let f = fixture();
        let alice = seed_profile(&f.store, "alice").await;
        let bob = seed_profile(&f.store, "bob").await;
        let carol = seed_profile(&f.store, "carol").await;

        let (listener, mut rx) = collect::<SentConnection>();
        let _handle = f.watch.watch_sent(alice, listener).await.unwrap();
        assert!(next_emit(&mut rx).await.is_empty());

        f.service.send_request(alice, bob).await.unwrap();
        f.service.send_request(carol, alice).await.unwrap();

        let sent = next_emit(&mut rx).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].connection.sender_id, alice);
        assert_eq!(sent[0].peer.user_id, bob);
        assert_eq!(sent[0].peer.name, "bob");
    }

    #[tokio::test]
    async fn received_view_emits_only_pending_requests_to_the_viewer() {
        let f = fixture();
        let alice = seed_profile(&f.store, "alice").await;
        let bob = seed_profile(&f.store, "bob").await;

        let (listener, mut rx) = collect::<ReceivedRequest>();
        let _handle = f.watch.watch_received(bob, listener).await.unwrap();
        assert!(next_emit(&mut rx).await.is_empty());

        let id = f.service.send_request(alice, bob).await.unwrap();
        let pending = next_emit(&mut rx).await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].connection.receiver_id, bob);
        assert_eq!(pending[0].peer.user_id, alice);

        // acceptance removes the request from the pending view
        f.service
            .respond_to_request(&id, Decision::Accepted)
            .await
            .unwrap();
        let after = next_emit(&mut rx).await;
        assert!(after.is_empty());
    }

    #[tokio::test]
    async fn records_without_a_resolvable_peer_are_dropped() {
        let f = fixture();
        let alice = seed_profile(&f.store, "alice").await;
        let ghost = uid("ghost"); // no profile document

        let (listener, mut rx) = collect::<SentConnection>();
        let _handle = f.watch.watch_sent(alice, listener).await.unwrap();
        assert!(next_emit(&mut rx).await.is_empty());

        f.service.send_request(alice, ghost).await.unwrap();
        let sent = next_emit(&mut rx).await;
        assert!(sent.is_empty());
    }

    #[tokio::test]
    async fn unified_view_annotates_direction_and_counterpart() {
        let f = fixture();
        let alice = seed_profile(&f.store, "alice").await;
        let bob = seed_profile(&f.store, "bob").await;
        let carol = seed_profile(&f.store, "carol").await;

        let (listener, mut rx) = collect::<LinkedConnection>();
        let _handle = f.watch.watch_all(alice, listener).await.unwrap();
        assert!(next_emit(&mut rx).await.is_empty());

        f.service.send_request(alice, bob).await.unwrap();
        let _ = next_emit(&mut rx).await;
        f.service.send_request(carol, alice).await.unwrap();

        let linked = next_emit(&mut rx).await;
        assert_eq!(linked.len(), 2);
        for record in &linked {
            assert!(record.is_sender ^ record.is_receiver);
            let expected = if record.is_sender { record.connection.receiver_id } else { record.connection.sender_id };
            assert_eq!(record.other_user_id, expected);
        }
    }

    #[tokio::test]
    async fn malformed_documents_never_surface() {
        let f = fixture();
        let alice = seed_profile(&f.store, "alice").await;

        let (listener, mut rx) = collect::<LinkedConnection>();
        let _handle = f.watch.watch_all(alice, listener).await.unwrap();
        assert!(next_emit(&mut rx).await.is_empty());

        // a connection document without a receiver is quarantined
        f.store
            .insert(
                CONNECTIONS_COLLECTION,
                vec![
                    ("senderId".to_owned(), WriteValue::Json(json!(alice.to_string()))),
                    ("status".to_owned(), WriteValue::Json(json!("pending"))),
                ],
            )
            .await
            .unwrap();

        let emitted = next_emit(&mut rx).await;
        assert!(emitted.is_empty());
    }

    #[tokio::test]
    async fn check_status_sees_a_fresh_request_as_pending() {
        let f = fixture();
        let alice = seed_profile(&f.store, "alice").await;
        let bob = seed_profile(&f.store, "bob").await;

        f.service.send_request(alice, bob).await.unwrap();

        let found = f.watch.check_status(bob, alice).await.unwrap().unwrap();
        assert_eq!(found.status, ConnectionStatus::Pending);
        assert!(found.links(alice, bob));

        let none = f.watch.check_status(alice, uid("stranger")).await.unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn dropping_the_handle_stops_delivery() {
        let f = fixture();
        let alice = seed_profile(&f.store, "alice").await;
        let bob = seed_profile(&f.store, "bob").await;

        let (listener, mut rx) = collect::<SentConnection>();
        let handle = f.watch.watch_sent(alice, listener).await.unwrap();
        assert!(next_emit(&mut rx).await.is_empty());

        handle.shutdown().await;
        f.service.send_request(alice, bob).await.unwrap();

        // the worker is gone: the channel either closes or stays silent
        let quiet = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(matches!(quiet, Ok(None) | Err(_)));
    }

    #[tokio::test]
    async fn denied_subscription_surfaces_at_registration() {
        let f = fixture();
        let alice = uid("alice");
        f.store.set_offline(true);

        let (listener, _rx) = collect::<SentConnection>();
        let err = f.watch.watch_sent(alice, listener).await.unwrap_err();
        assert!(matches!(err, WatchError::Subscription(_)));
    }

    #[tokio::test]
    async fn accept_flows_to_the_senders_live_view_without_sender_action() {
        let f = fixture();
        let alice = seed_profile(&f.store, "alice").await;
        let bob = seed_profile(&f.store, "bob").await;

        let (sent_listener, mut sent_rx) = collect::<SentConnection>();
        let _sent = f.watch.watch_sent(alice, sent_listener).await.unwrap();
        let (recv_listener, mut recv_rx) = collect::<ReceivedRequest>();
        let _recv = f.watch.watch_received(bob, recv_listener).await.unwrap();
        assert!(next_emit(&mut sent_rx).await.is_empty());
        assert!(next_emit(&mut recv_rx).await.is_empty());

        // Alice requests; both live views catch up on their own.
        f.service.send_request(alice, bob).await.unwrap();

        let pending = next_emit(&mut recv_rx).await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].connection.sender_id, alice);

        let sent = next_emit(&mut sent_rx).await;
        assert_eq!(sent[0].connection.status, ConnectionStatus::Pending);

        // Bob accepts; Alice's view flips to accepted without her acting.
        f.service
            .respond_to_request(&pending[0].connection.id, Decision::Accepted)
            .await
            .unwrap();

        let sent = next_emit(&mut sent_rx).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].connection.status, ConnectionStatus::Accepted);
        assert!(sent[0].connection.responded_at.is_some());
    }
}
