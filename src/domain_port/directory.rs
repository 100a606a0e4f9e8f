use crate::domain_model::{Profile, UserId};

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("store error: {0}")]
    Store(String),
}

/// Read-side view over member profiles, consumed by the relationship
/// views for enrichment and by discovery surfaces for search.
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    /// Point lookup. A missing or malformed profile is `None`, never an
    /// error: callers drop the affected record instead of failing the
    /// whole view.
    async fn get_by_id(&self, user: UserId) -> Result<Option<Profile>, DirectoryError>;

    /// Case-insensitive substring match over name, college and branch,
    /// excluding the viewer.
    async fn search(
        &self,
        term: &str,
        viewer: UserId,
        limit: usize,
    ) -> Result<Vec<Profile>, DirectoryError>;

    /// Profiles whose offered skills overlap `wanted`, excluding the
    /// viewer. Matching is a case-insensitive substring test per skill.
    async fn match_by_skills(
        &self,
        wanted: &[String],
        viewer: UserId,
        limit: usize,
    ) -> Result<Vec<Profile>, DirectoryError>;
}
