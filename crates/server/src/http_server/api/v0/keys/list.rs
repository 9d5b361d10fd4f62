use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Extension;

use common::principal::Principal;

use crate::http_server::envelope::{ok_envelope, ApiError};
use crate::manager::KeyManager;
use crate::ServiceState;

/// GET /v0/keys/: list key ids. With query parameters of the form
/// `id=versionHash`, only the ids whose hash changed come back; the
/// daemon polls with this to find stale cache entries.
pub async fn handler(
    State(state): State<ServiceState>,
    Extension(_principal): Extension<Principal>,
    Query(filter): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let ids = get_keys_core(state.manager(), &filter)?;
    ok_envelope(ids)
}

pub fn get_keys_core(
    manager: &KeyManager,
    filter: &HashMap<String, String>,
) -> Result<Vec<String>, ApiError> {
    let ids = if filter.is_empty() {
        manager.get_all_key_ids()?
    } else {
        manager.get_updated_key_ids(filter)?
    };
    Ok(ids)
}
