use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use common::response::Code;

use crate::auth::{authenticate_request, PeerCertificate, PipelineOutcome, RequestContext};
use crate::ServiceState;

use super::envelope::ApiError;

/// Authentication decorator: run the provider chain against the
/// Authorization header and the TLS peer projection, and stash the
/// resulting principal mux in request extensions for the handlers.
///
/// Also the access-log point: every request is logged with its method,
/// path, and all authenticated principal ids. Form parameters are never
/// logged here, so key material cannot leak into logs.
pub async fn authentication(
    State(state): State<ServiceState>,
    mut req: Request,
    next: Next,
) -> Response {
    let auth_header = req
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let ctx = RequestContext {
        peer_certificate: req.extensions().get::<PeerCertificate>().cloned(),
    };

    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match authenticate_request(state.providers(), &auth_header, &ctx).await {
        PipelineOutcome::Authenticated(principal) => {
            tracing::info!(
                %method,
                %path,
                principal = %principal.id(),
                auth_type = principal.kind(),
                fallback_principals = ?principal.ids(),
                "access"
            );
            req.extensions_mut().insert(principal);
            next.run(req).await
        }
        PipelineOutcome::Unauthenticated(message) => {
            tracing::info!(%method, %path, error = %message, "unauthenticated");
            ApiError::new(Code::Unauthenticated, message).into_response()
        }
    }
}
