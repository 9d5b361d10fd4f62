use async_trait::async_trait;

use common::principal::Principal;

use super::{AuthError, CertPool, Provider, RequestContext};

/// Machine authentication over mutual TLS. The presented chain must
/// verify against the configured CA pool, and the hostname in the token
/// must be one the certificate is valid for.
pub struct MtlsProvider {
    pool: CertPool,
}

impl MtlsProvider {
    pub fn new(pool: CertPool) -> Self {
        MtlsProvider { pool }
    }
}

#[async_trait]
impl Provider for MtlsProvider {
    fn name(&self) -> &'static str {
        "mtls"
    }

    fn type_byte(&self) -> u8 {
        b't'
    }

    async fn authenticate(
        &self,
        payload: &str,
        ctx: &RequestContext,
    ) -> Result<Principal, AuthError> {
        let cert = self.pool.verify(ctx.peer_certificate.as_ref())?;
        if !cert.subject_names.iter().any(|n| n == payload) {
            return Err(AuthError::HostnameMismatch(payload.to_string()));
        }
        Ok(Principal::machine(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::PeerCertificate;

    fn pool() -> CertPool {
        CertPool::new(["rootca".to_string()])
    }

    fn ctx(issuer: &str, names: &[&str]) -> RequestContext {
        RequestContext {
            peer_certificate: Some(PeerCertificate {
                issuer_fingerprint: issuer.to_string(),
                subject_names: names.iter().map(|n| n.to_string()).collect(),
                uri_sans: vec![],
            }),
        }
    }

    #[tokio::test]
    async fn authenticates_matching_hostname() {
        let p = MtlsProvider::new(pool());
        let principal = p
            .authenticate("web01.example.com", &ctx("rootca", &["web01.example.com"]))
            .await
            .unwrap();
        assert_eq!(principal, Principal::machine("web01.example.com"));
    }

    #[tokio::test]
    async fn rejects_wrong_hostname_and_untrusted_chain() {
        let p = MtlsProvider::new(pool());
        assert!(matches!(
            p.authenticate("other.example.com", &ctx("rootca", &["web01.example.com"]))
                .await,
            Err(AuthError::HostnameMismatch(_))
        ));
        assert!(matches!(
            p.authenticate("web01.example.com", &ctx("evilca", &["web01.example.com"]))
                .await,
            Err(AuthError::UntrustedChain)
        ));
        assert!(matches!(
            p.authenticate("web01.example.com", &RequestContext::default())
                .await,
            Err(AuthError::NoPeerCertificate)
        ));
    }
}
