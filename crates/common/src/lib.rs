/**
 * Access control types and the ACL engine.
 *  - Access levels and principal types
 *  - ACL validation and mutation semantics
 */
pub mod access;
/**
 * Client transport for talking to a knox server.
 *  - Uncached HTTP client with retry and multi-auth fallback
 *  - Caching client layered over the daemon's key files
 *  - File client for applications that read from disk only
 */
pub mod client;
/**
 * The versioned key data model.
 *  - Key, KeyVersion, KeyVersionList
 *  - Version status state machine and the version-list hash
 */
pub mod key;
/**
 * Structured keyset view over a key's versions.
 * Each version stores a single-subkey keyset; this module
 * aggregates them and exposes a metadata projection.
 */
pub mod keyset;
/**
 * Authenticated principals and ACL evaluation.
 */
pub mod principal;
/**
 * The response envelope and status subcodes shared by the
 * server and every client.
 */
pub mod response;

pub mod prelude {
    pub use crate::access::{Access, AccessType, Acl, PrincipalType};
    pub use crate::client::{AuthHandler, HttpClient, UncachedClient};
    pub use crate::key::{Key, KeyVersion, KeyVersionList, VersionStatus};
    pub use crate::principal::Principal;
    pub use crate::response::{Code, Response};
}
