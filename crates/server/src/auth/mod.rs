use std::collections::HashSet;

use async_trait::async_trait;

use common::principal::Principal;

mod mtls;
mod spiffe;
mod user;

pub use mtls::MtlsProvider;
pub use spiffe::{SpiffeFallbackProvider, SpiffeProvider};
pub use user::{mock_user_provider, BearerUserProvider};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no peer certs configured")]
    NoPeerCertificate,
    #[error("failed to verify client's certificate")]
    UntrustedChain,
    #[error("certificate is not valid for hostname {0}")]
    HostnameMismatch(String),
    #[error("no spiffe identity in certificate")]
    NoSpiffeId,
    #[error("more than one service identity specified in certificate")]
    MultipleSpiffeIds,
    #[error("service identity was not a valid SPIFFE ID")]
    BadSpiffeId,
    #[error("identity provider request failed: {0}")]
    IdentityEndpoint(String),
    #[error("invalid access token")]
    BadToken,
}

/// Verified projection of the TLS peer, handed over by the transport
/// layer. Certificate parsing and signature checks are the terminator's
/// job; providers only consume the names it extracted and the issuer it
/// chained to.
#[derive(Debug, Clone, Default)]
pub struct PeerCertificate {
    /// Fingerprint of the root the presented chain verified against.
    pub issuer_fingerprint: String,
    /// DNS names the leaf certificate is valid for.
    pub subject_names: Vec<String>,
    /// URI SANs on the leaf certificate.
    pub uri_sans: Vec<String>,
}

/// The trust anchors cert-based providers accept, as root fingerprints.
#[derive(Debug, Clone, Default)]
pub struct CertPool {
    anchors: HashSet<String>,
}

impl CertPool {
    pub fn new(anchors: impl IntoIterator<Item = String>) -> Self {
        CertPool {
            anchors: anchors.into_iter().collect(),
        }
    }

    /// Require a peer certificate chained to one of our anchors.
    pub fn verify<'a>(
        &self,
        peer: Option<&'a PeerCertificate>,
    ) -> Result<&'a PeerCertificate, AuthError> {
        let cert = peer.ok_or(AuthError::NoPeerCertificate)?;
        if !self.anchors.contains(&cert.issuer_fingerprint) {
            return Err(AuthError::UntrustedChain);
        }
        Ok(cert)
    }
}

/// Per-request material the providers may consult.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub peer_certificate: Option<PeerCertificate>,
}

/// An authentication backend. The two tag bytes select the provider from
/// the Authorization header; the rest of the header is its payload.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Name used in request logs.
    fn name(&self) -> &'static str;

    fn version_byte(&self) -> u8 {
        b'0'
    }

    fn type_byte(&self) -> u8;

    async fn authenticate(
        &self,
        payload: &str,
        ctx: &RequestContext,
    ) -> Result<Principal, AuthError>;
}

/// Header-tag match: byte 0 is the provider version, byte 1 its type,
/// the remainder the payload.
pub fn provider_match<'h>(provider: &dyn Provider, header: &'h str) -> Option<&'h str> {
    let bytes = header.as_bytes();
    if bytes.len() > 2 && bytes[0] == provider.version_byte() && bytes[1] == provider.type_byte() {
        Some(&header[2..])
    } else {
        None
    }
}

/// Outcome of running the full provider chain against one request.
pub enum PipelineOutcome {
    /// At least one provider authenticated. The mux's default is the
    /// first success in provider order.
    Authenticated(Principal),
    /// Every matching provider failed; carries the last failure, or a
    /// no-provider message when nothing matched.
    Unauthenticated(String),
}

/// Run every matching provider and collect the successes into a mux.
pub async fn authenticate_request(
    providers: &[Box<dyn Provider>],
    auth_header: &str,
    ctx: &RequestContext,
) -> PipelineOutcome {
    let mut members: Vec<(String, Principal)> = Vec::new();
    let mut last_error = "No matching authentication providers found".to_string();

    for provider in providers {
        let Some(payload) = provider_match(provider.as_ref(), auth_header) else {
            continue;
        };
        match provider.authenticate(payload, ctx).await {
            Ok(principal) => members.push((provider.name().to_string(), principal)),
            Err(err) => {
                tracing::debug!(provider = provider.name(), error = %err, "provider failed");
                last_error = err.to_string();
            }
        }
    }

    if members.is_empty() {
        return PipelineOutcome::Unauthenticated(last_error);
    }
    let default = members[0].1.clone();
    PipelineOutcome::Authenticated(Principal::mux(default, members))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider {
        type_byte: u8,
        principal: Option<Principal>,
    }

    #[async_trait]
    impl Provider for FixedProvider {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn type_byte(&self) -> u8 {
            self.type_byte
        }

        async fn authenticate(
            &self,
            _payload: &str,
            _ctx: &RequestContext,
        ) -> Result<Principal, AuthError> {
            self.principal.clone().ok_or(AuthError::BadToken)
        }
    }

    #[test]
    fn header_tag_selection() {
        let p = FixedProvider {
            type_byte: b'u',
            principal: None,
        };
        assert_eq!(provider_match(&p, "0utoken"), Some("token"));
        assert_eq!(provider_match(&p, "0mtoken"), None);
        assert_eq!(provider_match(&p, "0u"), None);
        assert_eq!(provider_match(&p, ""), None);
    }

    #[tokio::test]
    async fn first_success_is_the_default() {
        let providers: Vec<Box<dyn Provider>> = vec![
            Box::new(FixedProvider {
                type_byte: b't',
                principal: Some(Principal::machine("host1")),
            }),
            Box::new(FixedProvider {
                type_byte: b't',
                principal: Some(Principal::service("example.com", "svc")),
            }),
        ];
        let outcome =
            authenticate_request(&providers, "0thost1", &RequestContext::default()).await;
        match outcome {
            PipelineOutcome::Authenticated(p) => {
                assert_eq!(p.id(), "host1");
                assert_eq!(p.ids().len(), 2);
            }
            PipelineOutcome::Unauthenticated(msg) => panic!("expected auth, got: {}", msg),
        }
    }

    #[tokio::test]
    async fn no_matching_provider_reports_it() {
        let providers: Vec<Box<dyn Provider>> = vec![Box::new(FixedProvider {
            type_byte: b'u',
            principal: Some(Principal::user("alice", [])),
        })];
        match authenticate_request(&providers, "0mhost", &RequestContext::default()).await {
            PipelineOutcome::Unauthenticated(msg) => {
                assert!(msg.contains("No matching authentication providers"))
            }
            PipelineOutcome::Authenticated(_) => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn provider_error_surfaces_when_nothing_succeeds() {
        let providers: Vec<Box<dyn Provider>> = vec![Box::new(FixedProvider {
            type_byte: b'u',
            principal: None,
        })];
        match authenticate_request(&providers, "0utoken", &RequestContext::default()).await {
            PipelineOutcome::Unauthenticated(msg) => assert!(msg.contains("invalid access token")),
            PipelineOutcome::Authenticated(_) => panic!("expected failure"),
        }
    }
}
