use crate::domain_model::{Profile, UserId};

/// One committed page of discovery candidates. `exhausted` is sticky
/// until the feed is reset by a first-page fetch or a viewer change.
#[derive(Debug, Default)]
pub struct FeedPage {
    pub candidates: Vec<Profile>,
    pub exhausted: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("store error: {0}")]
    Store(String),
}

/// Cursor-paginated candidate discovery, excluding the viewer. The "when
/// to fetch" policy (scroll proximity, explicit action) lives with the
/// caller; the feed only exposes the fetch itself and its exhaustion
/// state.
#[async_trait::async_trait]
pub trait CandidateFeed: Send + Sync {
    /// Fetch the next page for `viewer`. A non-continuation call (or a
    /// viewer change) resets the feed and returns the first page; a
    /// continuation while exhausted or while another fetch is in flight
    /// is ignored and yields an empty page.
    async fn fetch_page(
        &self,
        viewer: UserId,
        continuation: bool,
    ) -> Result<FeedPage, FeedError>;

    async fn is_exhausted(&self) -> bool;
}
