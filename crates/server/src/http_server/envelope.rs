use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::Json;

use common::response::{Code, Response};

use crate::manager::ManagerError;

/// Hostname reported in every envelope. Set once at startup.
static HOST: OnceLock<String> = OnceLock::new();

pub fn set_host(host: &str) {
    let _ = HOST.set(host.to_string());
}

fn host() -> String {
    HOST.get().cloned().unwrap_or_else(|| "localhost".to_string())
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or_default()
}

/// A failed operation: a knox subcode plus an operator-readable message.
/// Converts into the error envelope with the mapped HTTP status.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub code: Code,
    pub message: String,
}

impl ApiError {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Knox subcode to HTTP status.
pub fn http_status(code: Code) -> StatusCode {
    match code {
        Code::Ok => StatusCode::OK,
        Code::NoKeyId
        | Code::KeyIdentifierExists
        | Code::NoKeyData
        | Code::BadRequestData
        | Code::BadKeyFormat
        | Code::BadPrincipalIdentifier
        | Code::BadAcl
        | Code::NoMultipleHumanAdminsInAcl => StatusCode::BAD_REQUEST,
        Code::KeyVersionDoesNotExist | Code::KeyIdentifierDoesNotExist | Code::NotFound => {
            StatusCode::NOT_FOUND
        }
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        Code::Unauthorized => StatusCode::FORBIDDEN,
        Code::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        Code::NotYetImplemented => StatusCode::NOT_IMPLEMENTED,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> AxumResponse {
        tracing::warn!(code = ?self.code, message = %self.message, "request failed");
        let body = Response {
            status: "error".to_string(),
            code: self.code,
            host: host(),
            timestamp: now_nanos(),
            message: self.message,
            data: None,
        };
        (http_status(self.code), Json(body)).into_response()
    }
}

impl From<ManagerError> for ApiError {
    fn from(err: ManagerError) -> Self {
        use common::key::KeyError;
        let message = err.to_string();
        let code = match &err {
            ManagerError::KeyExists(_) => Code::KeyIdentifierExists,
            ManagerError::KeyNotFound(_) => Code::KeyIdentifierDoesNotExist,
            ManagerError::Internal(_) | ManagerError::Crypto(_) => Code::InternalServerError,
            ManagerError::Key(KeyError::VersionNotFound(_)) => Code::KeyVersionDoesNotExist,
            ManagerError::Key(_) => Code::BadRequestData,
        };
        ApiError::new(code, message)
    }
}

/// Wrap operation data in the ok envelope.
pub fn ok_envelope<T: serde::Serialize>(data: T) -> Result<Json<Response>, ApiError> {
    let data = serde_json::to_value(data).map_err(|e| {
        ApiError::new(Code::InternalServerError, format!("encode error: {}", e))
    })?;
    Ok(Json(Response {
        status: "ok".to_string(),
        code: Code::Ok,
        host: host(),
        timestamp: now_nanos(),
        message: String::new(),
        data: Some(data),
    }))
}

/// Fallback for unrouted paths: the knox 404 envelope, not a bare body.
pub async fn not_found_handler() -> AxumResponse {
    ApiError::new(Code::NotFound, "").into_response()
}
