//! Document, snapshot and subscription types shared by every store implementation.

use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;

/// Field map of a stored document.
pub type Fields = serde_json::Map<String, Value>;

/// A stored document: store-assigned id plus its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Ordering applied to every snapshot a subscription delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Ascending,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Descending,
        }
    }

    /// Sort documents in place. Ties keep insertion order.
    pub fn sort(&self, documents: &mut [Document]) {
        documents.sort_by(|a, b| {
            let ordering = compare_values(a.get(&self.field), b.get(&self.field));
            match self.direction {
                Direction::Ascending => ordering,
                Direction::Descending => ordering.reverse(),
            }
        });
    }
}

/// Equality filter for `DocumentStore::query`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEquals {
    pub field: String,
    pub value: Value,
}

impl FieldEquals {
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, document: &Document) -> bool {
        document.get(&self.field) == Some(&self.value)
    }
}

/// One operation of an all-or-nothing batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    Update {
        collection: String,
        id: String,
        fields: Fields,
    },
    Delete {
        collection: String,
        id: String,
    },
}

impl BatchOp {
    pub fn update(collection: &str, id: &str, fields: Fields) -> Self {
        BatchOp::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
        }
    }

    pub fn delete(collection: &str, id: &str) -> Self {
        BatchOp::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn collection(&self) -> &str {
        match self {
            BatchOp::Update { collection, .. } | BatchOp::Delete { collection, .. } => collection,
        }
    }
}

/// Full contents of one collection as of a store revision.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub revision: i64,
    pub documents: Vec<Document>,
}

/// Live sequence of full snapshots for one collection.
///
/// The first call to `next`/`try_next` yields the state at subscription time;
/// later calls yield each newer snapshot the store publishes. Intermediate
/// snapshots may be coalesced, which is safe because every emission replaces
/// the previous one entirely. Dropping the subscription releases the listener.
pub struct Subscription {
    collection: String,
    order_by: OrderBy,
    receiver: watch::Receiver<Arc<Snapshot>>,
    primed: bool,
}

impl Subscription {
    pub fn new(
        collection: impl Into<String>,
        order_by: OrderBy,
        receiver: watch::Receiver<Arc<Snapshot>>,
    ) -> Self {
        Self {
            collection: collection.into(),
            order_by,
            receiver,
            primed: false,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Return the next pending emission without waiting.
    pub fn try_next(&mut self) -> Option<Snapshot> {
        if self.primed && !matches!(self.receiver.has_changed(), Ok(true)) {
            return None;
        }
        self.primed = true;
        let latest = self.receiver.borrow_and_update().clone();
        Some(self.ordered(&latest))
    }

    /// Wait for the next emission. Returns `None` once the store is gone.
    pub async fn next(&mut self) -> Option<Snapshot> {
        if let Some(snapshot) = self.try_next() {
            return Some(snapshot);
        }
        self.receiver.changed().await.ok()?;
        let latest = self.receiver.borrow_and_update().clone();
        Some(self.ordered(&latest))
    }

    fn ordered(&self, snapshot: &Snapshot) -> Snapshot {
        let mut documents = snapshot.documents.clone();
        self.order_by.sort(&mut documents);
        Snapshot {
            revision: snapshot.revision,
            documents,
        }
    }
}

/// Shallow merge of a partial update; `null` removes the field.
pub fn merge_fields(target: &mut Fields, patch: Fields) {
    for (key, value) in patch {
        if value.is_null() {
            target.remove(&key);
        } else {
            target.insert(key, value);
        }
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
