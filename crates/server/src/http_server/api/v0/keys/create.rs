use axum::extract::rejection::FormRejection;
use axum::extract::{Form, State};
use axum::response::IntoResponse;
use axum::Extension;
use serde::Deserialize;

use common::access::Acl;
use common::key::valid_key_id;
use common::principal::Principal;
use common::response::Code;

use crate::http_server::envelope::{ok_envelope, ApiError};
use crate::manager::new_key;
use crate::ServiceState;

use super::{acl_error_code, decode_data_param, parse_acl_param};

#[derive(Debug, Deserialize)]
pub struct CreateForm {
    pub id: Option<String>,
    pub data: Option<String>,
    pub acl: Option<String>,
}

/// POST /v0/keys/: create a key with its initial primary version.
/// Returns the new version id.
pub async fn handler(
    State(state): State<ServiceState>,
    Extension(principal): Extension<Principal>,
    form: Result<Form<CreateForm>, FormRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Form(form) = form.map_err(|e| ApiError::new(Code::BadRequestData, e.to_string()))?;
    let version_id = create_key_core(
        &state,
        &principal,
        form.id.as_deref(),
        form.data.as_deref(),
        form.acl.as_deref(),
    )?;
    ok_envelope(version_id)
}

pub fn create_key_core(
    state: &ServiceState,
    principal: &Principal,
    id: Option<&str>,
    data: Option<&str>,
    acl: Option<&str>,
) -> Result<u64, ApiError> {
    let id = id.ok_or_else(|| ApiError::new(Code::NoKeyId, "Missing parameter 'id'"))?;
    if data.is_none() {
        return Err(ApiError::new(Code::NoKeyData, "Missing parameter 'data'"));
    }

    let acl = match acl {
        Some(text) => parse_acl_param(text)?,
        None => Acl::default(),
    };

    // Only humans and services create keys, and a service must hand
    // administration to at least two humans up front.
    if principal.is_service() {
        acl.validate_has_multiple_human_admins().map_err(|_| {
            ApiError::new(
                Code::NoMultipleHumanAdminsInAcl,
                "Parameter 'acl' does not have multiple human admins",
            )
        })?;
    } else if !principal.is_user() {
        return Err(ApiError::new(
            Code::Unauthorized,
            format!(
                "Must be a user (or SPIFFE if multiple human admins in ACL) to create keys, principal is {}",
                principal.id()
            ),
        ));
    }

    let decoded = decode_data_param(data)?;
    if !valid_key_id(id) {
        return Err(ApiError::new(
            Code::BadKeyFormat,
            format!("KeyID includes unsupported characters {}", id),
        ));
    }

    // Integrator-registered validators run over the submitted entries.
    for entry in acl.iter() {
        for validator in state.validators() {
            validator(entry.principal_type, &entry.id)
                .map_err(|e| ApiError::new(acl_error_code(&e), e.to_string()))?;
        }
    }

    let key = new_key(id, acl, decoded, principal, state.default_access());
    let version_id = key
        .versions
        .get_primary()
        .map(|v| v.id)
        .unwrap_or_default();
    state.manager().add_new_key(key)?;
    Ok(version_id)
}
