use clap::Args;

use common::key::VersionStatus;

use crate::cli::op::{ErrorStatus, Op, OpContext};

/// Move an active version to inactive.
#[derive(Args, Debug, Clone)]
pub struct Deactivate {
    /// Key identifier
    pub key_id: String,
    /// Version to deactivate
    pub version: String,
}

#[async_trait::async_trait]
impl Op for Deactivate {
    type Error = ErrorStatus;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        ctx.client
            .update_version(&self.key_id, &self.version, VersionStatus::Inactive)
            .await
            .map_err(|e| ErrorStatus::server(format!("Error deactivating version: {}", e)))?;
        Ok(format!("Deactivated {} successfully.", self.version))
    }
}
