use serde_json::Value;
use std::fmt;

// region documents

/// Store-assigned document identifier. Opaque to everything above the
/// store boundary.
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct DocumentId(pub String);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A schema-less document: raw field map plus its id. Coercion into the
/// strict domain records happens above this boundary and must quarantine
/// anything malformed.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: DocumentId,
    pub fields: serde_json::Map<String, Value>,
}

impl Document {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

/// Field value in a write. `ServerTime` is resolved to the store clock at
/// commit, never on the client.
#[derive(Debug, Clone)]
pub enum WriteValue {
    Json(Value),
    ServerTime,
}

pub type WritePatch = Vec<(String, WriteValue)>;

// endregion

// region queries

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    Eq(String, Value),
    Neq(String, Value),
    In(String, Vec<Value>),
    /// Disjunction, matching any branch.
    AnyOf(Vec<Filter>),
    /// Conjunction, matching every branch.
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(field.to_owned(), value.into())
    }

    pub fn neq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Neq(field.to_owned(), value.into())
    }

    pub fn any_in(field: &str, values: Vec<Value>) -> Self {
        Filter::In(field.to_owned(), values)
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, value) => doc.field(field) == Some(value),
            // an inequality never matches a document missing the field
            Filter::Neq(field, value) => {
                doc.field(field).is_some_and(|actual| actual != value)
            }
            Filter::In(field, values) => {
                doc.field(field).is_some_and(|actual| values.contains(actual))
            }
            Filter::AnyOf(branches) => branches.iter().any(|b| b.matches(doc)),
            Filter::And(branches) => branches.iter().all(|b| b.matches(doc)),
        }
    }

    pub fn has_inequality(&self) -> bool {
        match self {
            Filter::Neq(..) => true,
            Filter::AnyOf(branches) | Filter::And(branches) => {
                branches.iter().any(Filter::has_inequality)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SortDir {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct OrderBy {
    pub field: String,
    pub dir: SortDir,
}

impl OrderBy {
    pub fn asc(field: &str) -> Self {
        Self { field: field.to_owned(), dir: SortDir::Asc }
    }

    pub fn desc(field: &str) -> Self {
        Self { field: field.to_owned(), dir: SortDir::Desc }
    }
}

/// Position marker for paginated queries: results resume strictly after
/// the referenced document.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DocCursor(pub DocumentId);

#[derive(Debug, Clone)]
pub struct StoreQuery {
    pub filter: Filter,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<usize>,
    pub start_after: Option<DocCursor>,
}

impl StoreQuery {
    pub fn filtered(filter: Filter) -> Self {
        Self {
            filter,
            order_by: Vec::new(),
            limit: None,
            start_after: None,
        }
    }

    /// An inequality filter combined with more than one sort field needs a
    /// precomputed composite index on the store side.
    pub fn is_compound(&self) -> bool {
        self.filter.has_inequality() && self.order_by.len() > 1
    }
}

// endregion

// region subscriptions

/// One pushed change batch: the full result set of the subscribed filter
/// as of some store state. Deliveries are at-least-once and eventually
/// consistent; there is no ordering across distinct subscriptions.
#[derive(Debug, Clone)]
pub struct QuerySnapshot {
    pub docs: Vec<Document>,
}

/// Live subscription handle. Dropping it releases the subscription; the
/// store prunes the registration on its next push.
#[derive(Debug)]
pub struct ChangeFeed {
    rx: tokio::sync::mpsc::UnboundedReceiver<QuerySnapshot>,
}

impl ChangeFeed {
    pub fn new(rx: tokio::sync::mpsc::UnboundedReceiver<QuerySnapshot>) -> Self {
        Self { rx }
    }

    /// Next change batch, or `None` once the store side has gone away.
    pub async fn next(&mut self) -> Option<QuerySnapshot> {
        self.rx.recv().await
    }
}

// endregion

// region store port

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("write rejected: {0}")]
    Write(String),
    #[error("document not found: {0}")]
    NotFound(DocumentId),
    #[error("query unsupported without a composite index: {0}")]
    QueryUnsupported(String),
    #[error("subscription denied: {0}")]
    SubscriptionDenied(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> Result<Option<Document>, StoreError>;

    /// Create a document under a store-assigned id.
    async fn insert(
        &self,
        collection: &str,
        fields: WritePatch,
    ) -> Result<DocumentId, StoreError>;

    /// Create or replace a document under a caller-chosen id.
    async fn put(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: WritePatch,
    ) -> Result<(), StoreError>;

    /// Partial update of an existing document.
    async fn update(
        &self,
        collection: &str,
        id: &DocumentId,
        patch: WritePatch,
    ) -> Result<(), StoreError>;

    async fn run_query(
        &self,
        collection: &str,
        query: StoreQuery,
    ) -> Result<Vec<Document>, StoreError>;

    /// Open a live subscription over `filter`. The current result set is
    /// pushed immediately, then again after every relevant change.
    async fn watch(
        &self,
        collection: &str,
        filter: Filter,
    ) -> Result<ChangeFeed, StoreError>;
}

// endregion
