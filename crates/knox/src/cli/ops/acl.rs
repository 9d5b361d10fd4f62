use clap::Args;

use crate::cli::op::{ErrorStatus, Op, OpContext};

/// Print a key's ACL. Requires authentication but no access on the key,
/// so anyone can discover whom to ask for a grant.
#[derive(Args, Debug, Clone)]
pub struct Acl {
    /// Key identifier
    pub key_id: String,
}

#[async_trait::async_trait]
impl Op for Acl {
    type Error = ErrorStatus;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let acl = ctx
            .client
            .get_acl(&self.key_id)
            .await
            .map_err(|e| ErrorStatus::server(format!("Error getting ACL: {}", e)))?;
        serde_json::to_string_pretty(&acl).map_err(|e| ErrorStatus::client(e.to_string()))
    }
}
