use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Extension;

use common::access::AccessType;
use common::key::VersionStatus;
use common::principal::Principal;

use crate::http_server::envelope::{ok_envelope, ApiError};
use crate::manager::KeyManager;
use crate::ServiceState;

use super::check_access;

/// DELETE /v0/keys/{keyID}/: remove the key and every version of it.
pub async fn handler(
    State(state): State<ServiceState>,
    Extension(principal): Extension<Principal>,
    Path(key_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    delete_key_core(state.manager(), &principal, &key_id)?;
    ok_envelope(Option::<()>::None)
}

pub fn delete_key_core(
    manager: &KeyManager,
    principal: &Principal,
    key_id: &str,
) -> Result<(), ApiError> {
    let key = manager.get_key(key_id, VersionStatus::Inactive)?;
    check_access(principal, &key.acl, AccessType::Admin, key_id)?;
    manager.delete_key(key_id)?;
    tracing::info!(key = key_id, by = %principal.id(), "key deleted");
    Ok(())
}
