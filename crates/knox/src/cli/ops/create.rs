use clap::Args;

use common::access::Acl;
use common::keyset;

use crate::cli::op::{ErrorStatus, Op, OpContext};

/// Create a new key with the input as the primary version. Key data is
/// read from stdin unless a key template generates it.
#[derive(Args, Debug, Clone)]
pub struct Create {
    /// Key identifier
    pub key_id: String,

    /// JSON ACL for the created key
    #[arg(long)]
    pub acl: Option<String>,

    /// Generate the initial version from a key template instead of
    /// stdin (see 'knox key-templates')
    #[arg(long)]
    pub key_template: Option<String>,
}

pub(crate) fn parse_acl(acl: Option<&str>) -> Result<Acl, ErrorStatus> {
    let Some(text) = acl else {
        return Ok(Acl::default());
    };
    let acl: Acl = serde_json::from_str(text)
        .map_err(|e| ErrorStatus::client(format!("Error parsing ACL: {}", e)))?;
    acl.validate()
        .map_err(|e| ErrorStatus::client(format!("Error parsing ACL: {}", e)))?;
    acl.validate_has_multiple_human_admins()
        .map_err(|e| ErrorStatus::client(format!("Error parsing ACL: {}", e)))?;
    Ok(acl)
}

pub(crate) fn read_data_from_stdin() -> Result<Vec<u8>, ErrorStatus> {
    use std::io::Read;
    eprintln!("Reading from stdin...");
    let mut data = Vec::new();
    std::io::stdin()
        .read_to_end(&mut data)
        .map_err(|e| ErrorStatus::client(format!("problem reading key data: {}", e)))?;
    Ok(data)
}

#[async_trait::async_trait]
impl Op for Create {
    type Error = ErrorStatus;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let data = match &self.key_template {
            Some(name) => {
                let template = keyset::template_by_name(name)
                    .map_err(|e| ErrorStatus::client(e.to_string()))?;
                keyset::obeys_naming_rule(template, &self.key_id)
                    .map_err(|e| ErrorStatus::client(e.to_string()))?;
                keyset::new_keyset(template).map_err(|e| ErrorStatus::client(e.to_string()))?
            }
            None => read_data_from_stdin()?,
        };

        let acl = parse_acl(self.acl.as_deref())?;
        let version_id = ctx
            .client
            .create_key(&self.key_id, &data, &acl)
            .await
            .map_err(|e| ErrorStatus::server(format!("Error adding version: {}", e)))?;
        Ok(format!("Created key with initial version {}", version_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::access::{Access, AccessType, PrincipalType};

    #[test]
    fn acl_parsing_validates_client_side() {
        assert!(parse_acl(None).unwrap().is_empty());
        assert!(parse_acl(Some("NOTJSON")).is_err());

        // one human admin is not enough when an ACL is supplied
        let one_admin = serde_json::to_string(&vec![Access::new(
            PrincipalType::User,
            "u1",
            AccessType::Admin,
        )])
        .unwrap();
        let err = parse_acl(Some(&one_admin)).unwrap_err();
        assert!(!err.server_side());

        let two_admins = serde_json::to_string(&vec![
            Access::new(PrincipalType::User, "u1", AccessType::Admin),
            Access::new(PrincipalType::User, "u2", AccessType::Admin),
        ])
        .unwrap();
        assert_eq!(parse_acl(Some(&two_admins)).unwrap().len(), 2);
    }
}
