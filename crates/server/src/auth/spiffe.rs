use async_trait::async_trait;

use common::access::{parse_spiffe, SPIFFE_SCHEME};
use common::principal::Principal;

use super::{AuthError, CertPool, Provider, RequestContext};

/// Service authentication over mutual TLS: same chain verification as
/// the mTLS provider, but the identity comes from the certificate's
/// SPIFFE URI SAN and the token is ignored.
pub struct SpiffeProvider {
    pool: CertPool,
}

impl SpiffeProvider {
    pub fn new(pool: CertPool) -> Self {
        SpiffeProvider { pool }
    }

    fn principal_from(&self, ctx: &RequestContext) -> Result<Principal, AuthError> {
        let cert = self.pool.verify(ctx.peer_certificate.as_ref())?;
        let mut spiffe_uris = cert
            .uri_sans
            .iter()
            .filter(|u| u.starts_with(SPIFFE_SCHEME));
        let uri = spiffe_uris.next().ok_or(AuthError::NoSpiffeId)?;
        if spiffe_uris.next().is_some() {
            return Err(AuthError::MultipleSpiffeIds);
        }
        let (domain, path) = parse_spiffe(uri).ok_or(AuthError::BadSpiffeId)?;
        Ok(Principal::service(domain, path))
    }
}

#[async_trait]
impl Provider for SpiffeProvider {
    fn name(&self) -> &'static str {
        "spiffe"
    }

    fn type_byte(&self) -> u8 {
        b's'
    }

    async fn authenticate(
        &self,
        _payload: &str,
        ctx: &RequestContext,
    ) -> Result<Principal, AuthError> {
        self.principal_from(ctx)
    }
}

/// A SPIFFE provider that advertises the mTLS type byte, so a client
/// sending machine-style credentials can still be recognized by its
/// service identity. Register it after the mTLS provider: list order
/// decides which successful principal becomes the default.
pub struct SpiffeFallbackProvider {
    inner: SpiffeProvider,
}

impl SpiffeFallbackProvider {
    pub fn new(pool: CertPool) -> Self {
        SpiffeFallbackProvider {
            inner: SpiffeProvider::new(pool),
        }
    }
}

#[async_trait]
impl Provider for SpiffeFallbackProvider {
    fn name(&self) -> &'static str {
        "spiffe-fallback"
    }

    fn type_byte(&self) -> u8 {
        b't'
    }

    async fn authenticate(
        &self,
        _payload: &str,
        ctx: &RequestContext,
    ) -> Result<Principal, AuthError> {
        self.inner.principal_from(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{authenticate_request, PeerCertificate, PipelineOutcome};
    use crate::auth::MtlsProvider;

    fn pool() -> CertPool {
        CertPool::new(["rootca".to_string()])
    }

    fn ctx(uris: &[&str]) -> RequestContext {
        RequestContext {
            peer_certificate: Some(PeerCertificate {
                issuer_fingerprint: "rootca".to_string(),
                subject_names: vec![],
                uri_sans: uris.iter().map(|u| u.to_string()).collect(),
            }),
        }
    }

    #[tokio::test]
    async fn extracts_the_single_spiffe_identity() {
        let p = SpiffeProvider::new(pool());
        let principal = p
            .authenticate("ignored", &ctx(&["spiffe://example.com/serviceA"]))
            .await
            .unwrap();
        assert_eq!(principal.id(), "spiffe://example.com/serviceA");
    }

    #[tokio::test]
    async fn rejects_zero_or_many_identities() {
        let p = SpiffeProvider::new(pool());
        assert!(matches!(
            p.authenticate("x", &ctx(&[])).await,
            Err(AuthError::NoSpiffeId)
        ));
        assert!(matches!(
            p.authenticate(
                "x",
                &ctx(&["spiffe://example.com/a", "spiffe://example.com/b"])
            )
            .await,
            Err(AuthError::MultipleSpiffeIds)
        ));
        assert!(matches!(
            p.authenticate("x", &ctx(&["spiffe://example.com"])).await,
            Err(AuthError::BadSpiffeId)
        ));
    }

    #[tokio::test]
    async fn fallback_recognizes_machine_style_requests() {
        // The client presents an mTLS-tagged header whose hostname does
        // not match the certificate; the fallback provider still
        // authenticates it by its SPIFFE identity.
        let providers: Vec<Box<dyn Provider>> = vec![
            Box::new(MtlsProvider::new(pool())),
            Box::new(SpiffeFallbackProvider::new(pool())),
        ];
        let ctx = ctx(&["spiffe://example.com/serviceA"]);
        match authenticate_request(&providers, "0twronghost", &ctx).await {
            PipelineOutcome::Authenticated(p) => {
                assert_eq!(p.id(), "spiffe://example.com/serviceA");
                assert!(p.is_service());
            }
            PipelineOutcome::Unauthenticated(msg) => panic!("expected auth, got: {}", msg),
        }
    }
}
