/**
 * Request authentication: the provider chain that turns an
 * Authorization header plus TLS peer material into a Principal.
 */
pub mod auth;
/**
 * Server configuration.
 */
pub mod config;
/**
 * The HTTP surface: the /v0 route table, the response envelope,
 * and the authentication middleware.
 */
pub mod http_server;
/**
 * Storage layer contract and the envelope cryptor that seals key
 * material at rest.
 */
pub mod keydb;
/**
 * The key manager: the single write path for all key mutations.
 */
pub mod manager;
/**
 * Process bootstrap: logging, graceful shutdown, service spawn.
 */
pub mod process;
/**
 * Shared per-request state handle.
 */
pub mod state;

pub use config::Config as ServiceConfig;
pub use process::{spawn_service, start_service, ShutdownHandle};
pub use state::State as ServiceState;
