use crate::domain_port::{
    ChangeFeed, Document, DocumentId, DocumentStore, Filter, OrderBy, QuerySnapshot, SortDir,
    StoreError, StoreQuery, WritePatch, WriteValue,
};
use chrono::{SecondsFormat, Utc};
use dashmap::DashMap;
use nanoid::nanoid;
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::mpsc;

struct Watcher {
    filter: Filter,
    tx: mpsc::UnboundedSender<QuerySnapshot>,
}

#[derive(Default)]
struct CollectionCell {
    /// Insertion-ordered; updates patch in place.
    docs: RwLock<Vec<Document>>,
    watchers: Mutex<Vec<Watcher>>,
}

/// In-process document store with the remote store's observable
/// semantics: opaque server-assigned ids, server-resolved timestamps,
/// whole-result-set snapshot pushes per subscription, and composite-index
/// gating of compound queries.
///
/// Used by the demo binaries and tests. `set_offline` makes every
/// operation fail the way an unreachable remote would, to drive the error
/// surfaces; extend with more fault switches as needed.
pub struct MemoryDocumentStore {
    collections: DashMap<String, Arc<CollectionCell>>,
    /// collection -> registered sort-field chains usable with an
    /// inequality filter.
    composite_indexes: DashMap<String, Vec<Vec<String>>>,
    offline: AtomicBool,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
            composite_indexes: DashMap::new(),
            offline: AtomicBool::new(false),
        }
    }

    /// Register a composite index for `collection` over the given sort
    /// chain. Without a matching registration, a compound query fails
    /// with `QueryUnsupported`.
    pub fn ensure_composite_index(&self, collection: &str, fields: &[&str]) {
        let chain: Vec<String> = fields.iter().map(|f| (*f).to_owned()).collect();
        let mut entry = self
            .composite_indexes
            .entry(collection.to_owned())
            .or_default();
        if !entry.contains(&chain) {
            entry.push(chain);
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, AtomicOrdering::SeqCst);
    }

    fn is_offline(&self) -> bool {
        self.offline.load(AtomicOrdering::SeqCst)
    }

    fn cell(&self, collection: &str) -> Arc<CollectionCell> {
        self.collections
            .entry(collection.to_owned())
            .or_default()
            .clone()
    }

    fn has_index(&self, collection: &str, order_by: &[OrderBy]) -> bool {
        let chain: Vec<String> = order_by.iter().map(|o| o.field.clone()).collect();
        self.composite_indexes
            .get(collection)
            .is_some_and(|chains| chains.contains(&chain))
    }

    /// Push the current matching result set to every live subscriber;
    /// subscribers whose receiving side is gone are pruned here.
    fn notify(cell: &CollectionCell) {
        let docs = cell.docs.read().unwrap_or_else(PoisonError::into_inner).clone();
        let mut watchers = cell.watchers.lock().unwrap_or_else(PoisonError::into_inner);
        watchers.retain(|w| {
            let matching: Vec<Document> =
                docs.iter().filter(|d| w.filter.matches(d)).cloned().collect();
            w.tx.send(QuerySnapshot { docs: matching }).is_ok()
        });
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> Result<Option<Document>, StoreError> {
        if self.is_offline() {
            return Err(StoreError::Unavailable("store offline".to_owned()));
        }

        let cell = self.cell(collection);
        let docs = cell.docs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(docs.iter().find(|d| &d.id == id).cloned())
    }

    async fn insert(
        &self,
        collection: &str,
        fields: WritePatch,
    ) -> Result<DocumentId, StoreError> {
        if self.is_offline() {
            return Err(StoreError::Write("store offline".to_owned()));
        }

        let id = DocumentId(nanoid!(20));
        let doc = Document {
            id: id.clone(),
            fields: resolve_patch(serde_json::Map::new(), fields),
        };

        let cell = self.cell(collection);
        cell.docs.write().unwrap_or_else(PoisonError::into_inner).push(doc);
        Self::notify(&cell);

        Ok(id)
    }

    async fn put(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: WritePatch,
    ) -> Result<(), StoreError> {
        if self.is_offline() {
            return Err(StoreError::Write("store offline".to_owned()));
        }

        let cell = self.cell(collection);
        {
            let mut docs = cell.docs.write().unwrap_or_else(PoisonError::into_inner);
            let replaced = resolve_patch(serde_json::Map::new(), fields);
            match docs.iter_mut().find(|d| &d.id == id) {
                Some(doc) => doc.fields = replaced,
                None => docs.push(Document { id: id.clone(), fields: replaced }),
            }
        }
        Self::notify(&cell);

        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        id: &DocumentId,
        patch: WritePatch,
    ) -> Result<(), StoreError> {
        if self.is_offline() {
            return Err(StoreError::Write("store offline".to_owned()));
        }

        let cell = self.cell(collection);
        {
            let mut docs = cell.docs.write().unwrap_or_else(PoisonError::into_inner);
            let doc = docs
                .iter_mut()
                .find(|d| &d.id == id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            doc.fields = resolve_patch(doc.fields.clone(), patch);
        }
        Self::notify(&cell);

        Ok(())
    }

    async fn run_query(
        &self,
        collection: &str,
        query: StoreQuery,
    ) -> Result<Vec<Document>, StoreError> {
        if self.is_offline() {
            return Err(StoreError::Unavailable("store offline".to_owned()));
        }
        if query.is_compound() && !self.has_index(collection, &query.order_by) {
            let chain: Vec<&str> =
                query.order_by.iter().map(|o| o.field.as_str()).collect();
            return Err(StoreError::QueryUnsupported(format!(
                "no composite index on `{collection}` for ({})",
                chain.join(", ")
            )));
        }

        let cell = self.cell(collection);
        let mut docs: Vec<Document> = {
            let docs = cell.docs.read().unwrap_or_else(PoisonError::into_inner);
            docs.iter().filter(|d| query.filter.matches(d)).cloned().collect()
        };

        if !query.order_by.is_empty() {
            docs.sort_by(|a, b| cmp_docs(a, b, &query.order_by));
        }

        if let Some(cursor) = &query.start_after {
            // resume strictly after the referenced document; a cursor that
            // no longer resolves restarts from the top
            if let Some(pos) = docs.iter().position(|d| d.id == cursor.0) {
                docs.drain(..=pos);
            }
        }

        if let Some(limit) = query.limit {
            docs.truncate(limit);
        }

        Ok(docs)
    }

    async fn watch(
        &self,
        collection: &str,
        filter: Filter,
    ) -> Result<ChangeFeed, StoreError> {
        if self.is_offline() {
            return Err(StoreError::SubscriptionDenied("store offline".to_owned()));
        }

        let cell = self.cell(collection);
        let (tx, rx) = mpsc::unbounded_channel();

        // initial snapshot first, then the registration: the subscriber
        // always observes the state it subscribed against
        let initial: Vec<Document> = {
            let docs = cell.docs.read().unwrap_or_else(PoisonError::into_inner);
            docs.iter().filter(|d| filter.matches(d)).cloned().collect()
        };
        let _ = tx.send(QuerySnapshot { docs: initial });

        cell.watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Watcher { filter, tx });

        Ok(ChangeFeed::new(rx))
    }
}

fn resolve_patch(
    mut fields: serde_json::Map<String, Value>,
    patch: WritePatch,
) -> serde_json::Map<String, Value> {
    for (name, value) in patch {
        let resolved = match value {
            WriteValue::Json(v) => v,
            WriteValue::ServerTime => Value::String(server_time()),
        };
        fields.insert(name, resolved);
    }
    fields
}

/// Fixed-width RFC 3339 so lexicographic order equals chronological order.
fn server_time() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn cmp_docs(a: &Document, b: &Document, order_by: &[OrderBy]) -> Ordering {
    for key in order_by {
        let av = a.field(&key.field).unwrap_or(&Value::Null);
        let bv = b.field(&key.field).unwrap_or(&Value::Null);
        let mut ord = cmp_values(av, bv);
        if key.dir == SortDir::Desc {
            ord = ord.reverse();
        }
        if ord != Ordering::Equal {
            return ord;
        }
    }
    // document id as the final tiebreaker keeps pagination stable
    a.id.cmp(&b.id)
}

fn cmp_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a)
            .cmp(&rank(b))
            .then_with(|| a.to_string().cmp(&b.to_string())),
    }
}
