use axum::extract::rejection::FormRejection;
use axum::extract::{Form, Path, State};
use axum::response::IntoResponse;
use axum::Extension;
use serde::Deserialize;

use common::access::AccessType;
use common::key::VersionStatus;
use common::principal::Principal;
use common::response::Code;

use crate::http_server::envelope::{ok_envelope, ApiError};
use crate::manager::KeyManager;
use crate::ServiceState;

use super::{check_access, decode_data_param};

#[derive(Debug, Deserialize)]
pub struct AddVersionForm {
    pub data: Option<String>,
}

/// POST /v0/keys/{keyID}/versions/: append a new active version and
/// return its id.
pub async fn add_handler(
    State(state): State<ServiceState>,
    Extension(principal): Extension<Principal>,
    Path(key_id): Path<String>,
    form: Result<Form<AddVersionForm>, FormRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Form(form) = form.map_err(|e| ApiError::new(Code::BadRequestData, e.to_string()))?;
    let version_id =
        post_version_core(state.manager(), &principal, &key_id, form.data.as_deref())?;
    ok_envelope(version_id)
}

pub fn post_version_core(
    manager: &KeyManager,
    principal: &Principal,
    key_id: &str,
    data: Option<&str>,
) -> Result<u64, ApiError> {
    let decoded = decode_data_param(data)?;
    let key = manager.get_key(key_id, VersionStatus::Active)?;
    check_access(principal, &key.acl, AccessType::Write, key_id)?;
    Ok(manager.add_version(key_id, &decoded)?)
}

#[derive(Debug, Deserialize)]
pub struct UpdateVersionForm {
    pub status: Option<String>,
}

/// PUT /v0/keys/{keyID}/versions/{versionID}/: apply a status
/// transition; promotion demotes the previous primary atomically.
pub async fn update_handler(
    State(state): State<ServiceState>,
    Extension(principal): Extension<Principal>,
    Path((key_id, version_id)): Path<(String, String)>,
    form: Result<Form<UpdateVersionForm>, FormRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Form(form) = form.map_err(|e| ApiError::new(Code::BadRequestData, e.to_string()))?;
    put_version_core(
        state.manager(),
        &principal,
        &key_id,
        &version_id,
        form.status.as_deref(),
    )?;
    ok_envelope(Option::<()>::None)
}

pub fn put_version_core(
    manager: &KeyManager,
    principal: &Principal,
    key_id: &str,
    version_id: &str,
    status: Option<&str>,
) -> Result<(), ApiError> {
    let status = status
        .ok_or_else(|| ApiError::new(Code::BadRequestData, "Missing parameter 'status'"))?;
    let status: VersionStatus = serde_json::from_str(status)
        .map_err(|e| ApiError::new(Code::BadRequestData, e.to_string()))?;
    let version_id: u64 = version_id
        .parse()
        .map_err(|_| ApiError::new(Code::BadRequestData, "Parameter 'versionID' is not an integer"))?;

    let key = manager.get_key(key_id, VersionStatus::Active)?;
    check_access(principal, &key.acl, AccessType::Write, key_id)?;
    manager.update_version(key_id, version_id, status)?;
    Ok(())
}
