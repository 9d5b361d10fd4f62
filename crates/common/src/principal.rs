use std::collections::HashSet;

use crate::access::{AccessType, Acl, PrincipalType, SPIFFE_SCHEME};

/// An authenticated identity, as produced by the server's authentication
/// pipeline. `Mux` carries every identity a single request authenticated
/// as; the first one is the default and the rest are fallbacks for
/// authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    User {
        id: String,
        groups: HashSet<String>,
    },
    Machine {
        hostname: String,
    },
    Service {
        domain: String,
        path: String,
    },
    Mux {
        default: Box<Principal>,
        /// Provider name to principal, in authentication order. Includes
        /// the default under the provider that produced it.
        members: Vec<(String, Principal)>,
    },
}

impl Principal {
    pub fn user(id: impl Into<String>, groups: impl IntoIterator<Item = String>) -> Self {
        Principal::User {
            id: id.into(),
            groups: groups.into_iter().collect(),
        }
    }

    pub fn machine(hostname: impl Into<String>) -> Self {
        Principal::Machine {
            hostname: hostname.into(),
        }
    }

    pub fn service(domain: impl Into<String>, path: impl Into<String>) -> Self {
        Principal::Service {
            domain: domain.into(),
            path: path.into(),
        }
    }

    pub fn mux(default: Principal, members: Vec<(String, Principal)>) -> Self {
        Principal::Mux {
            default: Box::new(default),
            members,
        }
    }

    /// The id checked against ACL entries and written to request logs.
    pub fn id(&self) -> String {
        match self {
            Principal::User { id, .. } => id.clone(),
            Principal::Machine { hostname } => hostname.clone(),
            Principal::Service { domain, path } => {
                format!("{}{}/{}", SPIFFE_SCHEME, domain, path)
            }
            Principal::Mux { default, .. } => default.id(),
        }
    }

    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Principal::User { .. } => "user",
            Principal::Machine { .. } => "machine",
            Principal::Service { .. } => "service",
            Principal::Mux { .. } => "mux",
        }
    }

    /// Ids of every authenticated identity, default first. Logged so
    /// operators can see which fallback identities a request carried.
    pub fn ids(&self) -> Vec<String> {
        match self {
            Principal::Mux { default, members } => {
                let mut ids = vec![default.id()];
                for (_, p) in members {
                    let id = p.id();
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
                ids
            }
            other => vec![other.id()],
        }
    }

    /// The default identity: the principal itself, or the first
    /// authenticated member of a mux.
    pub fn default_principal(&self) -> &Principal {
        match self {
            Principal::Mux { default, .. } => default,
            other => other,
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self.default_principal(), Principal::User { .. })
    }

    pub fn is_service(&self) -> bool {
        matches!(self.default_principal(), Principal::Service { .. })
    }

    /// Evaluate the ACL for the required access level. On success the
    /// returned string is a short audit-log reason identifying the entry
    /// that matched. A mux succeeds if any member succeeds, reporting the
    /// first match.
    pub fn can_access(&self, acl: &Acl, required: AccessType) -> Option<String> {
        match self {
            Principal::User { id, groups } => {
                for a in acl.iter() {
                    match a.principal_type {
                        PrincipalType::User => {
                            if a.id == *id && a.access_type.can_access(required) {
                                return Some(format!("0u{}", id));
                            }
                        }
                        PrincipalType::UserGroup => {
                            if groups.contains(&a.id) && a.access_type.can_access(required) {
                                return Some(format!("0g{}", a.id));
                            }
                        }
                        _ => {}
                    }
                }
                None
            }
            Principal::Machine { hostname } => {
                for a in acl.iter() {
                    match a.principal_type {
                        PrincipalType::Machine => {
                            if a.id == *hostname && a.access_type.can_access(required) {
                                return Some(format!("0m{}", hostname));
                            }
                        }
                        PrincipalType::MachinePrefix => {
                            if hostname.starts_with(&a.id) && a.access_type.can_access(required) {
                                return Some(format!("0p{}", a.id));
                            }
                        }
                        _ => {}
                    }
                }
                None
            }
            Principal::Service { .. } => {
                let spiffe_id = self.id();
                for a in acl.iter() {
                    match a.principal_type {
                        PrincipalType::Service => {
                            if a.id == spiffe_id && a.access_type.can_access(required) {
                                return Some(format!("0s{}", spiffe_id));
                            }
                        }
                        PrincipalType::ServicePrefix => {
                            if spiffe_id.starts_with(&a.id) && a.access_type.can_access(required) {
                                return Some(format!("0n{}", a.id));
                            }
                        }
                        _ => {}
                    }
                }
                None
            }
            Principal::Mux { default, members } => {
                if let Some(reason) = default.can_access(acl, required) {
                    return Some(reason);
                }
                members
                    .iter()
                    .filter(|(_, p)| p != default.as_ref())
                    .find_map(|(_, p)| p.can_access(acl, required))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Access;

    fn acl(entries: Vec<Access>) -> Acl {
        Acl(entries)
    }

    #[test]
    fn user_matches_by_id_and_group() {
        let u = Principal::user("alice", ["eng".to_string()]);
        let by_id = acl(vec![Access::new(PrincipalType::User, "alice", AccessType::Read)]);
        assert_eq!(u.can_access(&by_id, AccessType::Read).unwrap(), "0ualice");
        assert!(u.can_access(&by_id, AccessType::Write).is_none());

        let by_group = acl(vec![Access::new(
            PrincipalType::UserGroup,
            "eng",
            AccessType::Admin,
        )]);
        assert_eq!(u.can_access(&by_group, AccessType::Write).unwrap(), "0geng");
    }

    #[test]
    fn machine_matches_exact_and_prefix() {
        let m = Principal::machine("web042.example.com");
        let exact = acl(vec![Access::new(
            PrincipalType::Machine,
            "web042.example.com",
            AccessType::Read,
        )]);
        assert_eq!(
            m.can_access(&exact, AccessType::Read).unwrap(),
            "0mweb042.example.com"
        );

        let prefix = acl(vec![Access::new(PrincipalType::MachinePrefix, "web", AccessType::Read)]);
        assert_eq!(m.can_access(&prefix, AccessType::Read).unwrap(), "0pweb");

        let other = acl(vec![Access::new(PrincipalType::Machine, "db01", AccessType::Admin)]);
        assert!(m.can_access(&other, AccessType::Read).is_none());
    }

    #[test]
    fn service_matches_spiffe_and_prefix() {
        let s = Principal::service("example.com", "team/svc");
        assert_eq!(s.id(), "spiffe://example.com/team/svc");

        let exact = acl(vec![Access::new(
            PrincipalType::Service,
            "spiffe://example.com/team/svc",
            AccessType::Read,
        )]);
        assert_eq!(
            s.can_access(&exact, AccessType::Read).unwrap(),
            "0sspiffe://example.com/team/svc"
        );

        let prefix = acl(vec![Access::new(
            PrincipalType::ServicePrefix,
            "spiffe://example.com/team/",
            AccessType::Read,
        )]);
        assert_eq!(
            s.can_access(&prefix, AccessType::Read).unwrap(),
            "0nspiffe://example.com/team/"
        );
    }

    #[test]
    fn mux_falls_back_past_the_default() {
        let machine = Principal::machine("host1");
        let service = Principal::service("example.com", "svc");
        let mux = Principal::mux(
            machine.clone(),
            vec![
                ("mtls".to_string(), machine),
                ("spiffe-fallback".to_string(), service),
            ],
        );

        // Only the service is on the ACL; the mux still gets through.
        let entries = acl(vec![Access::new(
            PrincipalType::Service,
            "spiffe://example.com/svc",
            AccessType::Write,
        )]);
        assert_eq!(
            mux.can_access(&entries, AccessType::Write).unwrap(),
            "0sspiffe://example.com/svc"
        );
        assert_eq!(mux.id(), "host1");
        assert_eq!(
            mux.ids(),
            vec!["host1".to_string(), "spiffe://example.com/svc".to_string()]
        );
        assert!(!mux.is_user());
        assert!(!mux.is_service());
    }
}
