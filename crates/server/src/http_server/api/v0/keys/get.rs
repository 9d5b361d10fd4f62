use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Extension;

use common::access::AccessType;
use common::key::{Key, VersionStatus};
use common::principal::Principal;
use common::response::Code;

use crate::http_server::envelope::{ok_envelope, ApiError};
use crate::manager::KeyManager;
use crate::ServiceState;

use super::check_access;

/// GET /v0/keys/{keyID}/: fetch a key. The optional `status` query
/// parameter (a JSON-quoted status name) sets the minimum version
/// status returned; the default hides inactive versions.
pub async fn handler(
    State(state): State<ServiceState>,
    Extension(principal): Extension<Principal>,
    Path(key_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let key = get_key_core(
        state.manager(),
        &principal,
        &key_id,
        query.get("status").map(|s| s.as_str()),
    )?;
    ok_envelope(key)
}

pub fn get_key_core(
    manager: &KeyManager,
    principal: &Principal,
    key_id: &str,
    status: Option<&str>,
) -> Result<Key, ApiError> {
    let min_status = match status {
        Some(text) => serde_json::from_str::<VersionStatus>(text)
            .map_err(|e| ApiError::new(Code::BadRequestData, e.to_string()))?,
        None => VersionStatus::Active,
    };

    let key = manager.get_key(key_id, min_status)?;
    check_access(principal, &key.acl, AccessType::Read, key_id)?;
    Ok(key)
}
