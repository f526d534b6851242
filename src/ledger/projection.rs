//! In-memory projections of store collections.
//!
//! A projection only changes in two ways: its contents are replaced wholesale
//! by the newest snapshot its subscription delivered, or an optimistic writer
//! places a tentative entry on top that it later commits or reverts.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::db::{Document, DocumentStore, Fields, OrderBy, Subscription};
use crate::errors::AppError;

/// A typed view of one store collection.
pub trait Record: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    const COLLECTION: &'static str;

    fn order_by() -> OrderBy;

    fn id(&self) -> &str;

    fn from_document(document: &Document) -> Result<Self, AppError> {
        let mut fields = document.fields.clone();
        fields.insert("id".to_string(), Value::String(document.id.clone()));
        serde_json::from_value(Value::Object(fields)).map_err(|e| {
            AppError::Internal(format!(
                "Malformed {} document {}: {}",
                Self::COLLECTION,
                document.id,
                e
            ))
        })
    }

    /// Stored fields; the id lives outside the document body.
    fn to_fields(&self) -> Result<Fields, AppError> {
        match serde_json::to_value(self)? {
            Value::Object(mut fields) => {
                fields.remove("id");
                Ok(fields)
            }
            _ => Err(AppError::Internal(format!(
                "{} record did not serialize to an object",
                Self::COLLECTION
            ))),
        }
    }
}

/// An optimistic local change that remembers what it replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct Tentative<T> {
    pub prior: T,
    pub proposed: T,
}

struct ProjectionState<T> {
    subscription: Subscription,
    items: Vec<T>,
    overlay: HashMap<String, T>,
}

impl<T: Record> ProjectionState<T> {
    /// Replace contents with the newest delivered snapshot, if any.
    fn drain(&mut self) {
        let Some(snapshot) = self.subscription.try_next() else {
            return;
        };

        self.items = snapshot
            .documents
            .iter()
            .filter_map(|document| match T::from_document(document) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::warn!("Skipping document: {}", e);
                    None
                }
            })
            .collect();
    }

    fn view(&self) -> Vec<T> {
        self.items
            .iter()
            .map(|item| self.overlay.get(item.id()).unwrap_or(item).clone())
            .collect()
    }
}

/// Live, ordered copy of one collection.
pub struct LiveProjection<T: Record> {
    state: Mutex<ProjectionState<T>>,
}

impl<T: Record> LiveProjection<T> {
    pub async fn open(store: &dyn DocumentStore) -> Result<Self, AppError> {
        let subscription = store.subscribe(T::COLLECTION, T::order_by()).await?;

        let mut state = ProjectionState {
            subscription,
            items: Vec::new(),
            overlay: HashMap::new(),
        };
        state.drain();

        tracing::info!(
            "Opened {} projection with {} records",
            T::COLLECTION,
            state.items.len()
        );
        Ok(Self {
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ProjectionState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current ordered contents, tentative entries applied.
    pub fn snapshot(&self) -> Vec<T> {
        let mut state = self.lock();
        state.drain();
        state.view()
    }

    pub fn find(&self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        self.snapshot().into_iter().find(|item| predicate(item))
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.find(|item| item.id() == id)
    }

    /// Show `proposed` in place of the current record with the same id.
    ///
    /// Returns `None` when no such record is projected.
    pub fn apply_tentative(&self, proposed: T) -> Option<Tentative<T>> {
        let mut state = self.lock();
        state.drain();

        let prior = state
            .overlay
            .get(proposed.id())
            .or_else(|| state.items.iter().find(|item| item.id() == proposed.id()))
            .cloned()?;

        state
            .overlay
            .insert(proposed.id().to_string(), proposed.clone());
        Some(Tentative { prior, proposed })
    }

    /// The write landed; the store snapshot takes over.
    pub fn commit(&self, tentative: &Tentative<T>) {
        let mut state = self.lock();
        state.overlay.remove(tentative.proposed.id());
    }

    /// The write failed; put the prior record back until the store says otherwise.
    pub fn revert(&self, tentative: Tentative<T>) {
        let mut state = self.lock();
        let id = tentative.prior.id().to_string();
        state.overlay.remove(&id);
        if let Some(item) = state.items.iter_mut().find(|item| item.id() == id) {
            *item = tentative.prior;
        }
    }
}

/// Decoded sequence of full snapshots handed to external subscribers.
pub struct Feed<T: Record> {
    subscription: Subscription,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> Feed<T> {
    pub async fn open(store: &dyn DocumentStore) -> Result<Self, AppError> {
        Ok(Self {
            subscription: store.subscribe(T::COLLECTION, T::order_by()).await?,
            _record: PhantomData,
        })
    }

    /// Wait for the next full, ordered set. `None` once the store is gone.
    pub async fn next(&mut self) -> Option<Vec<T>> {
        let snapshot = self.subscription.next().await?;
        Some(
            snapshot
                .documents
                .iter()
                .filter_map(|document| T::from_document(document).ok())
                .collect(),
        )
    }
}
