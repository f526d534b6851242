//! Datastore API endpoints.

use axum::extract::State;

use super::{error, success, ApiResult};
use crate::db::DocumentStore;
use crate::models::{Datastore, RevisionInfo};
use crate::AppState;

/// GET /api/datastore - Both collections as currently projected.
pub async fn get_datastore(State(state): State<AppState>) -> ApiResult<Datastore> {
    match state.ledger.datastore().await {
        Ok(datastore) => {
            let revision_id = datastore.revision_id;
            success(datastore, revision_id)
        }
        Err(e) => error(e, 0),
    }
}

/// GET /api/datastore/revision - Get the current revision info.
pub async fn get_revision(State(state): State<AppState>) -> ApiResult<RevisionInfo> {
    match state.store.revision().await {
        Ok(info) => {
            let revision_id = info.revision_id;
            success(info, revision_id)
        }
        Err(e) => error(e, 0),
    }
}
