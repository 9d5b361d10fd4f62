use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const SPIFFE_SCHEME: &str = "spiffe://";

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AclError {
    #[error("Invalid AccessType to convert")]
    InvalidAccessType,
    #[error("Invalid PrincipalType to convert")]
    InvalidPrincipalType,
    #[error("ACL contains None access entries")]
    NoneAccessEntry,
    #[error("duplicate ACL entry for {0} {1}")]
    DuplicateEntry(PrincipalType, String),
    #[error("invalid principal identifier '{id}' for type {ptype}")]
    BadPrincipalIdentifier { ptype: PrincipalType, id: String },
    #[error("ACL does not have multiple human admins")]
    NoMultipleHumanAdmins,
}

/// Permission level granted by an ACL entry. Levels are strictly ordered:
/// `Admin` implies `Write` implies `Read` implies `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessType {
    None,
    Read,
    Write,
    Admin,
}

impl AccessType {
    /// Whether a grant at this level covers the required level.
    pub fn can_access(self, required: AccessType) -> bool {
        self >= required
    }

    fn name(self) -> &'static str {
        match self {
            AccessType::None => "None",
            AccessType::Read => "Read",
            AccessType::Write => "Write",
            AccessType::Admin => "Admin",
        }
    }
}

impl std::fmt::Display for AccessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for AccessType {
    type Err = AclError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(AccessType::None),
            "Read" => Ok(AccessType::Read),
            "Write" => Ok(AccessType::Write),
            "Admin" => Ok(AccessType::Admin),
            _ => Err(AclError::InvalidAccessType),
        }
    }
}

impl Serialize for AccessType {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for AccessType {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let text = String::deserialize(d)?;
        text.parse().map_err(D::Error::custom)
    }
}

/// Kind of principal an ACL entry applies to. The `*Prefix` variants match
/// any principal whose id starts with the entry id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrincipalType {
    User,
    UserGroup,
    Machine,
    MachinePrefix,
    Service,
    ServicePrefix,
}

impl PrincipalType {
    fn name(self) -> &'static str {
        match self {
            PrincipalType::User => "User",
            PrincipalType::UserGroup => "UserGroup",
            PrincipalType::Machine => "Machine",
            PrincipalType::MachinePrefix => "MachinePrefix",
            PrincipalType::Service => "Service",
            PrincipalType::ServicePrefix => "ServicePrefix",
        }
    }
}

impl std::fmt::Display for PrincipalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for PrincipalType {
    type Err = AclError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "User" => Ok(PrincipalType::User),
            "UserGroup" => Ok(PrincipalType::UserGroup),
            "Machine" => Ok(PrincipalType::Machine),
            "MachinePrefix" => Ok(PrincipalType::MachinePrefix),
            "Service" => Ok(PrincipalType::Service),
            "ServicePrefix" => Ok(PrincipalType::ServicePrefix),
            _ => Err(AclError::InvalidPrincipalType),
        }
    }
}

impl Serialize for PrincipalType {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for PrincipalType {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let text = String::deserialize(d)?;
        text.parse().map_err(D::Error::custom)
    }
}

/// One ACL entry: a principal matcher plus the level it grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Access {
    #[serde(rename = "type")]
    pub principal_type: PrincipalType,
    pub id: String,
    #[serde(rename = "access")]
    pub access_type: AccessType,
}

impl Access {
    pub fn new(principal_type: PrincipalType, id: impl Into<String>, access_type: AccessType) -> Self {
        Access {
            principal_type,
            id: id.into(),
            access_type,
        }
    }

    /// Run the built-in identifier validator for this entry's type.
    pub fn validate_id(&self) -> Result<(), AclError> {
        let bad = || AclError::BadPrincipalIdentifier {
            ptype: self.principal_type,
            id: self.id.clone(),
        };
        match self.principal_type {
            PrincipalType::User
            | PrincipalType::UserGroup
            | PrincipalType::Machine
            | PrincipalType::MachinePrefix => {
                if self.id.is_empty() {
                    return Err(bad());
                }
            }
            PrincipalType::Service => {
                parse_spiffe(&self.id).ok_or_else(bad)?;
            }
            PrincipalType::ServicePrefix => {
                validate_service_prefix(&self.id, 1).map_err(|_| bad())?;
            }
        }
        Ok(())
    }
}

/// Split `spiffe://<domain>/<path>` into its domain and path.
pub fn parse_spiffe(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix(SPIFFE_SCHEME)?;
    let (domain, path) = rest.split_once('/')?;
    if domain.is_empty() || path.is_empty() {
        return None;
    }
    Some((domain, path))
}

/// Service-prefix ids must be SPIFFE URIs ending in `/` with at least
/// `min_components` path components beyond the trust domain; an operator
/// may require more to force prefixes to be specific.
pub fn validate_service_prefix(id: &str, min_components: usize) -> Result<(), AclError> {
    let bad = || AclError::BadPrincipalIdentifier {
        ptype: PrincipalType::ServicePrefix,
        id: id.to_string(),
    };
    if !id.ends_with('/') {
        return Err(bad());
    }
    let (_, path) = parse_spiffe(id).ok_or_else(bad)?;
    let components = path
        .trim_end_matches('/')
        .split('/')
        .filter(|c| !c.is_empty())
        .count();
    if components < min_components.max(1) {
        return Err(bad());
    }
    Ok(())
}

/// Extra validation hook integrators can register alongside the built-ins.
pub type PrincipalValidator = Box<dyn Fn(PrincipalType, &str) -> Result<(), AclError> + Send + Sync>;

/// Validator requiring `ServicePrefix` ids to carry at least `min` path
/// components beyond the trust domain.
pub fn min_spiffe_path_components(min: usize) -> PrincipalValidator {
    Box::new(move |ptype, id| {
        if ptype == PrincipalType::ServicePrefix {
            validate_service_prefix(id, min)?;
        }
        Ok(())
    })
}

/// Ordered list of ACL entries. Invariants: no `None` entries, no two
/// entries with the same `(type, id)`, all ids valid for their type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Acl(pub Vec<Access>);

impl Acl {
    /// The one sanctioned mutation. `None` access removes any entry with
    /// the same `(type, id)`; anything else replaces it (last write wins).
    pub fn add(&self, access: Access) -> Acl {
        let mut entries: Vec<Access> = self
            .0
            .iter()
            .filter(|a| !(a.principal_type == access.principal_type && a.id == access.id))
            .cloned()
            .collect();
        if access.access_type != AccessType::None {
            entries.push(access);
        }
        Acl(entries)
    }

    /// Check the structural invariants plus the built-in id validators.
    pub fn validate(&self) -> Result<(), AclError> {
        let mut seen = std::collections::HashSet::new();
        for a in &self.0 {
            if a.access_type == AccessType::None {
                return Err(AclError::NoneAccessEntry);
            }
            if !seen.insert((a.principal_type, a.id.clone())) {
                return Err(AclError::DuplicateEntry(a.principal_type, a.id.clone()));
            }
            a.validate_id()?;
        }
        Ok(())
    }

    /// A key created by a non-user principal must name at least two human
    /// admins (`User` or `UserGroup` entries at `Admin`), so people can
    /// still administer it.
    pub fn validate_has_multiple_human_admins(&self) -> Result<(), AclError> {
        let humans = self
            .0
            .iter()
            .filter(|a| {
                matches!(
                    a.principal_type,
                    PrincipalType::User | PrincipalType::UserGroup
                ) && a.access_type == AccessType::Admin
            })
            .count();
        if humans < 2 {
            return Err(AclError::NoMultipleHumanAdmins);
        }
        Ok(())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Access> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_type_ordering() {
        assert!(AccessType::Admin.can_access(AccessType::Write));
        assert!(AccessType::Write.can_access(AccessType::Read));
        assert!(AccessType::Read.can_access(AccessType::None));
        assert!(!AccessType::Read.can_access(AccessType::Write));
        assert!(!AccessType::None.can_access(AccessType::Read));
    }

    #[test]
    fn access_wire_shape() {
        let a = Access::new(PrincipalType::User, "testuser", AccessType::Write);
        let text = serde_json::to_string(&a).unwrap();
        assert_eq!(
            text,
            r#"{"type":"User","id":"testuser","access":"Write"}"#
        );
        let back: Access = serde_json::from_str(&text).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn unknown_access_type_is_rejected() {
        let err = serde_json::from_str::<Access>(r#"{"type":"foo","id":"bar","access":"test"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("Invalid PrincipalType"));
        let err = serde_json::from_str::<Access>(r#"{"type":"User","id":"bar","access":"test"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("Invalid AccessType"));
    }

    #[test]
    fn add_is_idempotent_and_replaces() {
        let a = Access::new(PrincipalType::User, "u1", AccessType::Read);
        let acl = Acl::default().add(a.clone());
        assert_eq!(acl.add(a.clone()), acl);

        // Last write wins on access level.
        let upgraded = acl.add(Access::new(PrincipalType::User, "u1", AccessType::Admin));
        assert_eq!(upgraded.len(), 1);
        assert_eq!(upgraded.0[0].access_type, AccessType::Admin);
    }

    #[test]
    fn add_with_none_removes() {
        let acl = Acl::default()
            .add(Access::new(PrincipalType::User, "u1", AccessType::Read))
            .add(Access::new(PrincipalType::Machine, "host1", AccessType::Read));
        let pruned = acl.add(Access::new(PrincipalType::User, "u1", AccessType::None));
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned.0[0].principal_type, PrincipalType::Machine);

        // Removing an absent entry is a no-op.
        let same = pruned.add(Access::new(PrincipalType::User, "ghost", AccessType::None));
        assert_eq!(same, pruned);
    }

    #[test]
    fn validate_rejects_duplicates_and_none() {
        let dup = Acl(vec![
            Access::new(PrincipalType::User, "u1", AccessType::Read),
            Access::new(PrincipalType::User, "u1", AccessType::Admin),
        ]);
        assert!(matches!(dup.validate(), Err(AclError::DuplicateEntry(..))));

        let none = Acl(vec![Access::new(PrincipalType::User, "u1", AccessType::None)]);
        assert!(matches!(none.validate(), Err(AclError::NoneAccessEntry)));

        let empty_id = Acl(vec![Access::new(PrincipalType::Machine, "", AccessType::Read)]);
        assert!(matches!(
            empty_id.validate(),
            Err(AclError::BadPrincipalIdentifier { .. })
        ));
    }

    #[test]
    fn service_ids_must_be_spiffe() {
        let ok = Access::new(
            PrincipalType::Service,
            "spiffe://example.com/serviceA",
            AccessType::Read,
        );
        ok.validate_id().unwrap();

        let bad = Access::new(PrincipalType::Service, "example.com/serviceA", AccessType::Read);
        assert!(bad.validate_id().is_err());
    }

    #[test]
    fn service_prefix_rules() {
        validate_service_prefix("spiffe://example.com/team/", 1).unwrap();
        validate_service_prefix("spiffe://example.com/team/svc/", 2).unwrap();
        // missing trailing slash
        assert!(validate_service_prefix("spiffe://example.com/team", 1).is_err());
        // no path component beyond the domain
        assert!(validate_service_prefix("spiffe://example.com/", 1).is_err());
        // not enough components for a stricter validator
        assert!(validate_service_prefix("spiffe://example.com/team/", 2).is_err());
    }

    #[test]
    fn human_admin_count() {
        let acl = Acl(vec![
            Access::new(PrincipalType::User, "u1", AccessType::Admin),
            Access::new(PrincipalType::Machine, "host", AccessType::Admin),
        ]);
        assert!(acl.validate_has_multiple_human_admins().is_err());

        let acl = acl.add(Access::new(PrincipalType::UserGroup, "sec", AccessType::Admin));
        acl.validate_has_multiple_human_admins().unwrap();
    }
}
