use clap::Args;

use common::access::{AccessType, PrincipalType};

use crate::cli::op::{ErrorStatus, Op, OpContext};

/// Grant, change, or revoke one principal's access on a key. An access
/// level of `None` removes the entry.
#[derive(Args, Debug, Clone)]
pub struct Access {
    /// Key identifier
    pub key_id: String,

    /// Principal type (User, UserGroup, Machine, MachinePrefix,
    /// Service, ServicePrefix)
    #[arg(short = 't', long = "type")]
    pub principal_type: String,

    /// Principal identifier
    #[arg(short = 'i', long = "id")]
    pub principal_id: String,

    /// Access level (None, Read, Write, Admin)
    #[arg(short = 'a', long = "access")]
    pub access: String,
}

#[async_trait::async_trait]
impl Op for Access {
    type Error = ErrorStatus;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let principal_type: PrincipalType = self
            .principal_type
            .parse()
            .map_err(|e: common::access::AclError| ErrorStatus::client(e.to_string()))?;
        let access_type: AccessType = self
            .access
            .parse()
            .map_err(|e: common::access::AclError| ErrorStatus::client(e.to_string()))?;

        let entry =
            common::access::Access::new(principal_type, self.principal_id.clone(), access_type);
        ctx.client
            .put_access(&self.key_id, &[entry])
            .await
            .map_err(|e| ErrorStatus::server(format!("Error updating access: {}", e)))?;
        Ok(format!(
            "Set {} access for {} on {}.",
            self.access, self.principal_id, self.key_id
        ))
    }
}
