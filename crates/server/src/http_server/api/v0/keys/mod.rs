use base64::prelude::*;

use common::access::{AccessType, Acl, AclError};
use common::principal::Principal;
use common::response::Code;

use crate::http_server::envelope::ApiError;

pub mod access;
pub mod create;
pub mod delete;
pub mod get;
pub mod list;
pub mod versions;

/// Decode the base64 `data` form field, distinguishing a missing field,
/// an undecodable one, and decoded-but-empty material.
pub(crate) fn decode_data_param(data: Option<&str>) -> Result<Vec<u8>, ApiError> {
    let data = data.ok_or_else(|| ApiError::new(Code::NoKeyData, "Missing parameter 'data'"))?;
    let decoded = BASE64_STANDARD
        .decode(data.as_bytes())
        .map_err(|e| ApiError::new(Code::BadRequestData, e.to_string()))?;
    if decoded.is_empty() {
        return Err(ApiError::new(Code::NoKeyData, "Parameter 'data' is empty"));
    }
    Ok(decoded)
}

pub(crate) fn acl_error_code(err: &AclError) -> Code {
    match err {
        AclError::BadPrincipalIdentifier { .. } => Code::BadPrincipalIdentifier,
        AclError::NoMultipleHumanAdmins => Code::NoMultipleHumanAdminsInAcl,
        _ => Code::BadAcl,
    }
}

/// Parse and validate the JSON `acl` form field.
pub(crate) fn parse_acl_param(acl: &str) -> Result<Acl, ApiError> {
    let acl: Acl =
        serde_json::from_str(acl).map_err(|e| ApiError::new(Code::BadAcl, e.to_string()))?;
    acl.validate()
        .map_err(|e| ApiError::new(acl_error_code(&e), e.to_string()))?;
    Ok(acl)
}

/// Evaluate the ACL and convert a denial into the Unauthorized envelope.
pub(crate) fn check_access(
    principal: &Principal,
    acl: &Acl,
    required: AccessType,
    key_id: &str,
) -> Result<(), ApiError> {
    match principal.can_access(acl, required) {
        Some(reason) => {
            tracing::debug!(key = key_id, reason = %reason, "authorized");
            Ok(())
        }
        None => Err(ApiError::new(
            Code::Unauthorized,
            format!(
                "{} does not have {} access to {}",
                principal.id(),
                required,
                key_id
            ),
        )),
    }
}
