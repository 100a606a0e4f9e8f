use crate::domain_model::{Profile, USERS_COLLECTION, UserId};
use crate::domain_port::{
    DirectoryError, DocumentId, DocumentStore, Filter, OrderBy, StoreQuery, UserDirectory,
};
use std::sync::Arc;

const DEFAULT_SCAN_CAP: usize = 200;

/// Store-backed directory reader. Keyword and skill matching are
/// client-side filters over a bounded ordered fetch; the store offers no
/// full-text search.
pub struct StoreUserDirectory {
    store: Arc<dyn DocumentStore>,
    scan_cap: usize,
}

impl StoreUserDirectory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store, scan_cap: DEFAULT_SCAN_CAP }
    }

    pub fn with_scan_cap(store: Arc<dyn DocumentStore>, scan_cap: usize) -> Self {
        Self { store, scan_cap }
    }

    async fn scan(&self, order_by: OrderBy) -> Result<Vec<Profile>, DirectoryError> {
        let docs = self
            .store
            .run_query(
                USERS_COLLECTION,
                StoreQuery {
                    filter: Filter::All,
                    order_by: vec![order_by],
                    limit: Some(self.scan_cap),
                    start_after: None,
                },
            )
            .await
            .map_err(|e| DirectoryError::Store(e.to_string()))?;

        Ok(docs
            .iter()
            .filter_map(|doc| match Profile::from_document(doc) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    tracing::warn!(doc = %doc.id, error = %e, "quarantined malformed profile document");
                    None
                }
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl UserDirectory for StoreUserDirectory {
    async fn get_by_id(&self, user: UserId) -> Result<Option<Profile>, DirectoryError> {
        let doc = self
            .store
            .get(USERS_COLLECTION, &DocumentId(user.to_string()))
            .await
            .map_err(|e| DirectoryError::Store(e.to_string()))?;

        Ok(doc.and_then(|doc| match Profile::from_document(&doc) {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::warn!(%user, error = %e, "quarantined malformed profile document");
                None
            }
        }))
    }

    async fn search(
        &self,
        term: &str,
        viewer: UserId,
        limit: usize,
    ) -> Result<Vec<Profile>, DirectoryError> {
        let needle = term.to_lowercase();
        let profiles = self.scan(OrderBy::asc("name")).await?;

        Ok(profiles
            .into_iter()
            .filter(|p| p.user_id != viewer)
            .filter(|p| {
                contains(Some(&p.name), &needle)
                    || contains(p.college.as_deref(), &needle)
                    || contains(p.branch.as_deref(), &needle)
            })
            .take(limit)
            .collect())
    }

    async fn match_by_skills(
        &self,
        wanted: &[String],
        viewer: UserId,
        limit: usize,
    ) -> Result<Vec<Profile>, DirectoryError> {
        let wanted: Vec<String> = wanted.iter().map(|s| s.to_lowercase()).collect();
        let profiles = self.scan(OrderBy::desc("createdAt")).await?;

        Ok(profiles
            .into_iter()
            .filter(|p| p.user_id != viewer)
            .filter(|p| {
                p.skills_have.iter().any(|offered| {
                    let offered = offered.to_lowercase();
                    wanted.iter().any(|w| offered.contains(w.as_str()))
                })
            })
            .take(limit)
            .collect())
    }
}

fn contains(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(needle))
}
