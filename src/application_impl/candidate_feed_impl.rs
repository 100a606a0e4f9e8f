use crate::application_port::{CandidateFeed, FeedError, FeedPage};
use crate::domain_model::{Profile, USERS_COLLECTION, UserId};
use crate::domain_port::{DocCursor, DocumentStore, Filter, OrderBy, StoreError, StoreQuery};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The discovery paginator. Holds one cursor's worth of state, scoped to
/// the current viewer; the primary compound query is degraded to a
/// createdAt-only ordering with client-side filtering when the store has
/// no composite index for it.
pub struct StoreCandidateFeed {
    store: Arc<dyn DocumentStore>,
    page_size: usize,
    /// Extra documents fetched on the degraded path to compensate for
    /// client-side filtering.
    overfetch: usize,
    state: Mutex<FeedState>,
}

#[derive(Default)]
struct FeedState {
    viewer: Option<UserId>,
    cursor: Option<DocCursor>,
    exhausted: bool,
    /// Ids committed so far, for cross-page deduplication.
    seen: HashSet<UserId>,
    in_flight: bool,
}

struct Fetched {
    profiles: Vec<Profile>,
    cursor: Option<DocCursor>,
    exhausted: bool,
}

impl StoreCandidateFeed {
    pub fn new(store: Arc<dyn DocumentStore>, page_size: usize, overfetch: usize) -> Self {
        Self {
            store,
            page_size,
            overfetch,
            state: Mutex::new(FeedState::default()),
        }
    }

    async fn fetch(
        &self,
        viewer: UserId,
        cursor: Option<DocCursor>,
    ) -> Result<Fetched, FeedError> {
        let primary = StoreQuery {
            filter: Filter::neq("uid", viewer.to_string()),
            // the store demands the inequality field as the first sort key
            order_by: vec![OrderBy::asc("uid"), OrderBy::desc("createdAt")],
            limit: Some(self.page_size),
            start_after: cursor.clone(),
        };

        match self.store.run_query(USERS_COLLECTION, primary).await {
            Ok(docs) => {
                let exhausted = docs.len() < self.page_size;
                let cursor = docs.last().map(|d| DocCursor(d.id.clone()));
                let profiles = docs
                    .iter()
                    .filter_map(|doc| match Profile::from_document(doc) {
                        Ok(p) if p.user_id != viewer => Some(p),
                        Ok(_) => None,
                        Err(e) => {
                            tracing::warn!(doc = %doc.id, error = %e, "quarantined malformed profile document");
                            None
                        }
                    })
                    .collect();
                Ok(Fetched { profiles, cursor, exhausted })
            }
            Err(StoreError::QueryUnsupported(reason)) => {
                tracing::debug!(%viewer, %reason, "compound discovery query unsupported, degrading");
                self.fetch_degraded(viewer, cursor).await
            }
            Err(e) => Err(FeedError::Store(e.to_string())),
        }
    }

    /// Degraded path: single-field ordering plus client-side filtering.
    /// The cursor advances to the last *kept* document, not the last
    /// fetched one; resuming after a filtered-out document would skip
    /// whatever followed it in this fetch.
    async fn fetch_degraded(
        &self,
        viewer: UserId,
        cursor: Option<DocCursor>,
    ) -> Result<Fetched, FeedError> {
        let requested = self.page_size + self.overfetch;
        let query = StoreQuery {
            filter: Filter::All,
            order_by: vec![OrderBy::desc("createdAt")],
            limit: Some(requested),
            start_after: cursor,
        };
        let docs = self
            .store
            .run_query(USERS_COLLECTION, query)
            .await
            .map_err(|e| FeedError::Store(e.to_string()))?;

        let mut profiles = Vec::with_capacity(self.page_size);
        let mut last_kept: Option<DocCursor> = None;
        let mut truncated = false;
        for doc in &docs {
            if profiles.len() == self.page_size {
                truncated = true;
                break;
            }
            match Profile::from_document(doc) {
                Ok(p) if p.user_id == viewer => {}
                Ok(p) => {
                    last_kept = Some(DocCursor(doc.id.clone()));
                    profiles.push(p);
                }
                Err(e) => {
                    tracing::warn!(doc = %doc.id, error = %e, "quarantined malformed profile document");
                }
            }
        }

        // when a whole fetch was filtered away, advance past it anyway so
        // the feed cannot wedge on the same window
        let cursor = last_kept.or_else(|| docs.last().map(|d| DocCursor(d.id.clone())));
        let exhausted = !truncated && docs.len() < requested;

        Ok(Fetched { profiles, cursor, exhausted })
    }
}

#[async_trait::async_trait]
impl CandidateFeed for StoreCandidateFeed {
    async fn fetch_page(
        &self,
        viewer: UserId,
        continuation: bool,
    ) -> Result<FeedPage, FeedError> {
        let cursor = {
            let mut st = self.state.lock().await;
            if continuation && st.viewer == Some(viewer) {
                if st.in_flight || st.exhausted {
                    // already running, or nothing left: the request is ignored
                    return Ok(FeedPage {
                        candidates: Vec::new(),
                        exhausted: st.exhausted,
                    });
                }
            } else {
                // first page, or the viewer changed underneath the feed
                *st = FeedState {
                    viewer: Some(viewer),
                    ..FeedState::default()
                };
            }
            st.in_flight = true;
            st.cursor.clone()
        };

        let outcome = self.fetch(viewer, cursor).await;

        let mut st = self.state.lock().await;
        if st.viewer != Some(viewer) {
            // a viewer change reset the feed while this fetch was in
            // flight; its results must not be committed
            tracing::debug!(%viewer, "discarding page fetched for a superseded viewer");
            return Ok(FeedPage::default());
        }
        st.in_flight = false;
        let fetched = outcome?;

        st.exhausted = fetched.exhausted;
        if fetched.cursor.is_some() {
            st.cursor = fetched.cursor;
        }

        let mut fresh = Vec::with_capacity(fetched.profiles.len());
        for profile in fetched.profiles {
            if st.seen.insert(profile.user_id) {
                fresh.push(profile);
            }
        }

        Ok(FeedPage {
            candidates: fresh,
            exhausted: st.exhausted,
        })
    }

    async fn is_exhausted(&self) -> bool {
        self.state.lock().await.exhausted
    }
}
