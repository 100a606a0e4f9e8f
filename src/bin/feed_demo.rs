//! Manually-run pagination walkthrough: the discovery feed on the
//! degraded path first (no composite index registered), then on the
//! primary compound query once the index exists, plus a directory search
//! and a skill match at the end.

use peerlink::application_impl::{StoreCandidateFeed, StoreUserDirectory};
use peerlink::application_port::CandidateFeed;
use peerlink::domain_model::{USERS_COLLECTION, UserId};
use peerlink::domain_port::{DocumentId, DocumentStore, UserDirectory, WritePatch, WriteValue};
use peerlink::infra_memory::MemoryDocumentStore;
use peerlink::logger::Logger;
use peerlink::settings::{Cli, Parser, Settings, parse_settings};
use serde_json::json;
use std::sync::Arc;

const SKILL_POOL: [&str; 5] = [
    "React",
    "Python",
    "Rust",
    "Photography",
    "Public Speaking",
];

async fn seed_member(
    store: &MemoryDocumentStore,
    name: &str,
    college: &str,
    skills: &[&str],
) -> anyhow::Result<UserId> {
    let user = UserId(uuid::Uuid::new_v4());
    let fields: WritePatch = vec![
        ("uid".to_owned(), WriteValue::Json(json!(user.to_string()))),
        ("name".to_owned(), WriteValue::Json(json!(name))),
        ("college".to_owned(), WriteValue::Json(json!(college))),
        ("skillsHave".to_owned(), WriteValue::Json(json!(skills))),
        ("createdAt".to_owned(), WriteValue::ServerTime),
    ];
    store
        .put(USERS_COLLECTION, &DocumentId(user.to_string()), fields)
        .await?;
    Ok(user)
}

async fn drive(
    store: Arc<MemoryDocumentStore>,
    viewer: UserId,
    settings: &Settings,
    path: &str,
) -> anyhow::Result<()> {
    let feed = StoreCandidateFeed::new(store, settings.feed.page_size, settings.feed.overfetch);

    let mut page_no = 1;
    let mut page = feed.fetch_page(viewer, false).await?;
    loop {
        tracing::info!(path, page = page_no, count = page.candidates.len(), "fetched page");
        for candidate in &page.candidates {
            tracing::debug!(name = %candidate.name, "candidate");
        }
        if page.exhausted {
            break;
        }
        page = feed.fetch_page(viewer, true).await?;
        page_no += 1;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let logger = Logger::bootstrap();
    let settings = parse_settings(cli.settings.as_deref())?;
    logger.apply_filter(cli.log.as_deref().unwrap_or(&settings.log.filter))?;

    // region seed

    let store = Arc::new(MemoryDocumentStore::new());
    for n in 1usize..=23 {
        let college = if n % 2 == 0 { "Hilltop College" } else { "Riverside Institute" };
        let skills = [SKILL_POOL[n % SKILL_POOL.len()]];
        seed_member(&store, &format!("Member {n:02}"), college, &skills).await?;
    }
    let viewer = seed_member(&store, "Viewer", "Hilltop College", &["Rust"]).await?;

    // endregion

    // region pagination

    // no composite index yet: every page goes through the degraded query
    drive(store.clone(), viewer, &settings, "degraded").await?;

    store.ensure_composite_index(USERS_COLLECTION, &["uid", "createdAt"]);
    drive(store.clone(), viewer, &settings, "primary").await?;

    // endregion

    // region directory

    let directory = StoreUserDirectory::with_scan_cap(store.clone(), settings.directory.scan_cap);

    let hits = directory.search("hilltop", viewer, 5).await?;
    tracing::info!(count = hits.len(), "search hits for `hilltop`");

    let wanted = vec!["python".to_owned()];
    let matches = directory.match_by_skills(&wanted, viewer, 5).await?;
    tracing::info!(count = matches.len(), "members offering python");

    // endregion

    Ok(())
}
