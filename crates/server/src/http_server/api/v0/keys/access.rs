use axum::extract::rejection::FormRejection;
use axum::extract::{Form, Path, State};
use axum::response::IntoResponse;
use axum::Extension;
use serde::Deserialize;

use common::access::{Access, AccessType, Acl};
use common::key::VersionStatus;
use common::principal::Principal;
use common::response::Code;

use crate::http_server::envelope::{ok_envelope, ApiError};
use crate::manager::KeyManager;
use crate::ServiceState;

use super::{acl_error_code, check_access};

/// GET /v0/keys/{keyID}/access/: read a key's ACL.
///
/// Deliberately requires authentication only, no Read access: someone
/// locked out of a key must be able to discover whom to ask.
pub async fn get_handler(
    State(state): State<ServiceState>,
    Extension(_principal): Extension<Principal>,
    Path(key_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let acl = get_access_core(state.manager(), &key_id)?;
    ok_envelope(acl)
}

pub fn get_access_core(manager: &KeyManager, key_id: &str) -> Result<Acl, ApiError> {
    Ok(manager.get_key(key_id, VersionStatus::Active)?.acl)
}

#[derive(Debug, Deserialize)]
pub struct PutAccessForm {
    /// JSON list of ACL entries.
    pub acl: Option<String>,
    /// Legacy form: one JSON entry.
    pub access: Option<String>,
}

/// PUT /v0/keys/{keyID}/access/: apply ACL mutations in order.
pub async fn put_handler(
    State(state): State<ServiceState>,
    Extension(principal): Extension<Principal>,
    Path(key_id): Path<String>,
    form: Result<Form<PutAccessForm>, FormRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Form(form) = form.map_err(|e| ApiError::new(Code::BadRequestData, e.to_string()))?;
    put_access_core(
        &state,
        &principal,
        &key_id,
        form.acl.as_deref(),
        form.access.as_deref(),
    )?;
    ok_envelope(Option::<()>::None)
}

pub fn put_access_core(
    state: &ServiceState,
    principal: &Principal,
    key_id: &str,
    acl_param: Option<&str>,
    access_param: Option<&str>,
) -> Result<(), ApiError> {
    let entries: Vec<Access> = match (acl_param, access_param) {
        (Some(acl), _) => {
            serde_json::from_str(acl).map_err(|e| ApiError::new(Code::BadAcl, e.to_string()))?
        }
        (None, Some(access)) => {
            let single: Access = serde_json::from_str(access)
                .map_err(|e| ApiError::new(Code::BadAcl, e.to_string()))?;
            vec![single]
        }
        (None, None) => {
            return Err(ApiError::new(Code::BadRequestData, "Missing parameter 'acl'"));
        }
    };

    for entry in &entries {
        // None access is revocation and skips id validation, so stale
        // entries stay removable.
        if entry.access_type == AccessType::None {
            continue;
        }
        entry
            .validate_id()
            .map_err(|e| ApiError::new(acl_error_code(&e), e.to_string()))?;
        for validator in state.validators() {
            validator(entry.principal_type, &entry.id)
                .map_err(|e| ApiError::new(acl_error_code(&e), e.to_string()))?;
        }
    }

    let key = state.manager().get_key(key_id, VersionStatus::Active)?;
    check_access(principal, &key.acl, AccessType::Admin, key_id)?;
    state.manager().put_access(key_id, &entries)?;
    Ok(())
}
