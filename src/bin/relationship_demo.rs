//! Manually-run walkthrough of the connection lifecycle against the
//! in-process store: one member requests, the other accepts, and both
//! live views catch up without either side refreshing.

use peerlink::application_impl::{
    StoreConnectionService, StoreRelationshipWatch, StoreUserDirectory,
};
use peerlink::application_port::{ConnectionService, Decision, RelationshipWatch};
use peerlink::domain_model::{USERS_COLLECTION, UserId};
use peerlink::domain_port::{DocumentId, DocumentStore, WritePatch, WriteValue};
use peerlink::infra_memory::MemoryDocumentStore;
use peerlink::logger::Logger;
use peerlink::settings::{Cli, Parser, parse_settings};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

async fn seed_member(
    store: &MemoryDocumentStore,
    name: &str,
    skills: &[&str],
) -> anyhow::Result<UserId> {
    let user = UserId(uuid::Uuid::new_v4());
    let fields: WritePatch = vec![
        ("uid".to_owned(), WriteValue::Json(json!(user.to_string()))),
        ("name".to_owned(), WriteValue::Json(json!(name))),
        ("skillsHave".to_owned(), WriteValue::Json(json!(skills))),
        ("createdAt".to_owned(), WriteValue::ServerTime),
    ];
    store
        .put(USERS_COLLECTION, &DocumentId(user.to_string()), fields)
        .await?;
    Ok(user)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let logger = Logger::bootstrap();
    let settings = parse_settings(cli.settings.as_deref())?;
    logger.apply_filter(cli.log.as_deref().unwrap_or(&settings.log.filter))?;

    // region wiring

    let store = Arc::new(MemoryDocumentStore::new());
    let directory = Arc::new(StoreUserDirectory::with_scan_cap(
        store.clone(),
        settings.directory.scan_cap,
    ));
    let connections = StoreConnectionService::new(store.clone());
    let watch = StoreRelationshipWatch::new(store.clone(), directory);

    // endregion

    // region live views

    let asha = seed_member(&store, "Asha", &["Rust", "UI Design"]).await?;
    let rohan = seed_member(&store, "Rohan", &["Python", "Data Analysis"]).await?;

    let sent_view = watch
        .watch_sent(
            asha,
            Box::new(|batch| {
                for record in &batch {
                    tracing::info!(
                        peer = %record.peer.name,
                        status = %record.connection.status,
                        "sent view"
                    );
                }
            }),
        )
        .await?;

    let received_view = watch
        .watch_received(
            rohan,
            Box::new(|batch| {
                for record in &batch {
                    tracing::info!(from = %record.peer.name, "received view: pending request");
                }
            }),
        )
        .await?;

    // endregion

    // region lifecycle

    let request = connections.send_request(asha, rohan).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    connections
        .respond_to_request(&request, Decision::Accepted)
        .await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    if let Some(link) = watch.check_status(asha, rohan).await? {
        tracing::info!(status = %link.status, "pair status after the round trip");
    }

    // endregion

    sent_view.shutdown().await;
    received_view.shutdown().await;

    Ok(())
}
