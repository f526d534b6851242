//! Document store contract and its SQLite implementation.
//!
//! Every write runs in one transaction, bumps the store revision once and then
//! publishes a full snapshot of each touched collection to its subscribers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};
use tokio::sync::watch;

use super::document::{
    merge_fields, BatchOp, Document, FieldEquals, Fields, OrderBy, Snapshot, Subscription,
};
use crate::errors::AppError;
use crate::models::RevisionInfo;

/// Real-time document store primitives the ledger is built on.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Live sequence of full, ordered snapshots of a collection.
    async fn subscribe(&self, collection: &str, order_by: OrderBy)
        -> Result<Subscription, AppError>;

    /// Insert a document and return its new id.
    async fn create(&self, collection: &str, fields: Fields) -> Result<String, AppError>;

    /// Merge `fields` into an existing document.
    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), AppError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), AppError>;

    async fn query(&self, collection: &str, filter: &FieldEquals)
        -> Result<Vec<Document>, AppError>;

    /// Apply every operation or none of them.
    async fn batch_write(&self, ops: Vec<BatchOp>) -> Result<(), AppError>;

    async fn revision(&self) -> Result<RevisionInfo, AppError>;

    async fn revision_id(&self) -> Result<i64, AppError> {
        Ok(self.revision().await?.revision_id)
    }
}

/// SQLite-backed document store.
pub struct SqliteStore {
    pool: SqlitePool,
    channels: Mutex<HashMap<String, watch::Sender<Arc<Snapshot>>>>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live subscriptions on a collection.
    pub fn subscriber_count(&self, collection: &str) -> usize {
        self.channels()
            .get(collection)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<String, watch::Sender<Arc<Snapshot>>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read a collection and the revision it reflects in one transaction.
    async fn load_snapshot(&self, collection: &str) -> Result<Snapshot, AppError> {
        let mut tx = self.pool.begin().await?;

        let revision: i64 = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&mut *tx)
            .await?
            .get("revision_id");
        let documents = fetch_collection(&mut tx, collection).await?;

        tx.commit().await?;

        Ok(Snapshot {
            revision,
            documents,
        })
    }

    /// Push fresh snapshots of the touched collections to their subscribers.
    async fn publish(&self, collections: &[&str]) {
        let mut seen: Vec<&str> = Vec::new();
        for &collection in collections {
            if seen.contains(&collection) {
                continue;
            }
            seen.push(collection);

            let watched = self.channels().contains_key(collection);
            if !watched {
                continue;
            }

            match self.load_snapshot(collection).await {
                Ok(snapshot) => {
                    if let Some(sender) = self.channels().get(collection) {
                        offer(sender, snapshot);
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to publish snapshot of {}: {}", collection, e);
                }
            }
        }
    }
}

/// Replace the channel value when the snapshot is newer than what it holds.
fn offer(sender: &watch::Sender<Arc<Snapshot>>, snapshot: Snapshot) {
    let snapshot = Arc::new(snapshot);
    sender.send_if_modified(move |current| {
        if snapshot.revision > current.revision {
            *current = snapshot;
            true
        } else {
            false
        }
    });
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn subscribe(
        &self,
        collection: &str,
        order_by: OrderBy,
    ) -> Result<Subscription, AppError> {
        validate_name("collection", collection)?;
        validate_name("order field", &order_by.field)?;

        let snapshot = self.load_snapshot(collection).await?;

        let receiver = {
            let mut channels = self.channels();
            match channels.get(collection) {
                Some(sender) => {
                    offer(sender, snapshot);
                    sender.subscribe()
                }
                None => {
                    let (sender, receiver) = watch::channel(Arc::new(snapshot));
                    channels.insert(collection.to_string(), sender);
                    receiver
                }
            }
        };

        tracing::debug!("New subscription on {}", collection);
        Ok(Subscription::new(collection, order_by, receiver))
    }

    async fn create(&self, collection: &str, fields: Fields) -> Result<String, AppError> {
        validate_name("collection", collection)?;

        let id = uuid::Uuid::new_v4().to_string();
        let data = serde_json::to_string(&fields)?;
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO documents (collection, id, data, updated_at) VALUES (?, ?, ?, ?)")
            .bind(collection)
            .bind(&id)
            .bind(&data)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        self.publish(&[collection]).await;
        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), AppError> {
        validate_name("collection", collection)?;

        let mut tx = self.pool.begin().await?;
        apply_update(&mut tx, collection, id, fields).await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        self.publish(&[collection]).await;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), AppError> {
        validate_name("collection", collection)?;

        let mut tx = self.pool.begin().await?;
        apply_delete(&mut tx, collection, id).await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        self.publish(&[collection]).await;
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        filter: &FieldEquals,
    ) -> Result<Vec<Document>, AppError> {
        validate_name("collection", collection)?;
        validate_name("filter field", &filter.field)?;

        let mut conn = self.pool.acquire().await?;
        let documents = fetch_collection(&mut conn, collection).await?;

        Ok(documents
            .into_iter()
            .filter(|document| filter.matches(document))
            .collect())
    }

    async fn batch_write(&self, ops: Vec<BatchOp>) -> Result<(), AppError> {
        if ops.is_empty() {
            return Ok(());
        }
        for op in &ops {
            validate_name("collection", op.collection())?;
        }

        let touched: Vec<String> = ops.iter().map(|op| op.collection().to_string()).collect();

        // Dropping the transaction on error rolls every operation back
        let mut tx = self.pool.begin().await?;

        for op in ops {
            match op {
                BatchOp::Update {
                    collection,
                    id,
                    fields,
                } => apply_update(&mut tx, &collection, &id, fields).await?,
                BatchOp::Delete { collection, id } => {
                    apply_delete(&mut tx, &collection, &id).await?
                }
            }
        }

        // Increment revision once for the entire batch
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        let touched: Vec<&str> = touched.iter().map(String::as_str).collect();
        self.publish(&touched).await;
        Ok(())
    }

    async fn revision(&self) -> Result<RevisionInfo, AppError> {
        let row = sqlx::query("SELECT revision_id, generated_at FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(RevisionInfo {
            revision_id: row.get("revision_id"),
            generated_at: row.get("generated_at"),
        })
    }
}

async fn bump_revision(tx: &mut Transaction<'_, Sqlite>) -> Result<(), AppError> {
    let now = Utc::now().to_rfc3339();
    sqlx::query("UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1")
        .bind(&now)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn fetch_collection(
    conn: &mut SqliteConnection,
    collection: &str,
) -> Result<Vec<Document>, AppError> {
    let rows = sqlx::query("SELECT id, data FROM documents WHERE collection = ? ORDER BY seq")
        .bind(collection)
        .fetch_all(&mut *conn)
        .await?;

    rows.iter().map(document_from_row).collect()
}

async fn apply_update(
    conn: &mut SqliteConnection,
    collection: &str,
    id: &str,
    patch: Fields,
) -> Result<(), AppError> {
    let row = sqlx::query("SELECT id, data FROM documents WHERE collection = ? AND id = ?")
        .bind(collection)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    let mut document = row
        .as_ref()
        .map(document_from_row)
        .transpose()?
        .ok_or_else(|| AppError::NotFound(format!("Document {}/{} not found", collection, id)))?;

    merge_fields(&mut document.fields, patch);
    let data = serde_json::to_string(&document.fields)?;
    let now = Utc::now().to_rfc3339();

    sqlx::query("UPDATE documents SET data = ?, updated_at = ? WHERE collection = ? AND id = ?")
        .bind(&data)
        .bind(&now)
        .bind(collection)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

async fn apply_delete(
    conn: &mut SqliteConnection,
    collection: &str,
    id: &str,
) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
        .bind(collection)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Document {}/{} not found",
            collection, id
        )));
    }
    Ok(())
}

fn document_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Document, AppError> {
    let id: String = row.get("id");
    let data: String = row.get("data");
    let fields: Fields = serde_json::from_str(&data)
        .map_err(|e| AppError::Internal(format!("Corrupt document {}: {}", id, e)))?;
    Ok(Document::new(id, fields))
}

fn validate_name(kind: &str, name: &str) -> Result<(), AppError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!("Invalid {} name: {:?}", kind, name)))
    }
}
