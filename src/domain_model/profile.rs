use crate::domain_model::UserId;
use crate::domain_model::connection::{DecodeError, require_str, require_time, require_user};
use crate::domain_port::Document;
use chrono::{DateTime, Utc};

pub const USERS_COLLECTION: &str = "users";

/// A member's public profile summary. Documents in the `users` collection
/// are keyed by the user id and carry a matching `uid` field (the feed's
/// inequality filter runs over that field).
#[derive(Debug, Clone)]
pub struct Profile {
    pub user_id: UserId,
    pub name: String,
    pub college: Option<String>,
    pub branch: Option<String>,
    pub bio: Option<String>,
    pub skills_have: Vec<String>,
    pub skills_want: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    /// `uid`, `name` and `createdAt` are required; everything else is
    /// optional and defaulted. Skill entries that are not strings are
    /// dropped rather than failing the whole document.
    pub fn from_document(doc: &Document) -> Result<Self, DecodeError> {
        Ok(Self {
            user_id: require_user(doc, "uid")?,
            name: require_str(doc, "name")?.to_owned(),
            college: optional_str(doc, "college"),
            branch: optional_str(doc, "branch"),
            bio: optional_str(doc, "bio"),
            skills_have: str_list(doc, "skillsHave"),
            skills_want: str_list(doc, "skillsWant"),
            created_at: require_time(doc, "createdAt")?,
        })
    }
}

fn optional_str(doc: &Document, field: &str) -> Option<String> {
    doc.str_field(field).map(str::to_owned)
}

fn str_list(doc: &Document, field: &str) -> Vec<String> {
    doc.field(field)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}
