use clap::Args;

use common::key::VersionStatus;

use crate::cli::op::{ErrorStatus, Op, OpContext};

/// Move an inactive version back to active.
#[derive(Args, Debug, Clone)]
pub struct Reactivate {
    /// Key identifier
    pub key_id: String,
    /// Version to reactivate
    pub version: String,
}

#[async_trait::async_trait]
impl Op for Reactivate {
    type Error = ErrorStatus;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        ctx.client
            .update_version(&self.key_id, &self.version, VersionStatus::Active)
            .await
            .map_err(|e| ErrorStatus::server(format!("Error reactivating version: {}", e)))?;
        Ok(format!("Reactivated {} successfully.", self.version))
    }
}
