use std::sync::Arc;

use common::access::{min_spiffe_path_components, Access, PrincipalValidator};

use crate::auth::{
    mock_user_provider, BearerUserProvider, CertPool, MtlsProvider, Provider,
    SpiffeFallbackProvider, SpiffeProvider,
};
use crate::keydb::{ChaChaCryptor, Db, TempDb};
use crate::manager::KeyManager;
use crate::ServiceConfig;

const IDENTITY_ENDPOINT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Shared handle passed to every request handler.
#[derive(Clone)]
pub struct State {
    manager: Arc<KeyManager>,
    providers: Arc<Vec<Box<dyn Provider>>>,
    default_access: Arc<Vec<Access>>,
    validators: Arc<Vec<PrincipalValidator>>,
    hostname: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("no authentication providers configured")]
    NoProviders,
}

impl State {
    pub fn new(
        manager: KeyManager,
        providers: Vec<Box<dyn Provider>>,
        default_access: Vec<Access>,
        validators: Vec<PrincipalValidator>,
        hostname: impl Into<String>,
    ) -> Self {
        State {
            manager: Arc::new(manager),
            providers: Arc::new(providers),
            default_access: Arc::new(default_access),
            validators: Arc::new(validators),
            hostname: hostname.into(),
        }
    }

    /// Assemble manager and provider chain from config. The storage
    /// backend is the in-memory store; production deployments inject
    /// their own `Db` through `State::new`.
    pub fn from_config(config: &ServiceConfig) -> Result<State, StateError> {
        let db: Box<dyn Db> = Box::new(TempDb::new());
        let cryptor = ChaChaCryptor::new(0, &config.master_key);
        let manager = KeyManager::new(db, Box::new(cryptor));

        let mut providers: Vec<Box<dyn Provider>> = Vec::new();
        if !config.trusted_issuers.is_empty() {
            let pool = CertPool::new(config.trusted_issuers.iter().cloned());
            providers.push(Box::new(MtlsProvider::new(pool.clone())));
            providers.push(Box::new(SpiffeProvider::new(pool.clone())));
            providers.push(Box::new(SpiffeFallbackProvider::new(pool)));
        }
        match &config.user_auth_endpoint {
            Some(endpoint) => providers.push(Box::new(BearerUserProvider::new(
                endpoint,
                IDENTITY_ENDPOINT_TIMEOUT,
            ))),
            None => {
                tracing::warn!("no user auth endpoint configured; using the mock user provider");
                providers.push(Box::new(mock_user_provider()));
            }
        }
        if providers.is_empty() {
            return Err(StateError::NoProviders);
        }

        let validators = vec![min_spiffe_path_components(
            config.service_prefix_min_components,
        )];

        Ok(State::new(
            manager,
            providers,
            config.default_access.clone(),
            validators,
            config.hostname.clone(),
        ))
    }

    pub fn manager(&self) -> &KeyManager {
        &self.manager
    }

    pub fn providers(&self) -> &[Box<dyn Provider>] {
        &self.providers
    }

    pub fn default_access(&self) -> &[Access] {
        &self.default_access
    }

    pub fn validators(&self) -> &[PrincipalValidator] {
        &self.validators
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }
}
