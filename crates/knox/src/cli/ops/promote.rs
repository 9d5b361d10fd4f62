use clap::Args;

use common::key::VersionStatus;

use crate::cli::op::{ErrorStatus, Op, OpContext};

/// Make an active version the primary; the current primary becomes
/// active in the same step.
#[derive(Args, Debug, Clone)]
pub struct Promote {
    /// Key identifier
    pub key_id: String,
    /// Version to promote
    pub version: String,
}

#[async_trait::async_trait]
impl Op for Promote {
    type Error = ErrorStatus;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        ctx.client
            .update_version(&self.key_id, &self.version, VersionStatus::Primary)
            .await
            .map_err(|e| ErrorStatus::server(format!("Error promoting version: {}", e)))?;
        Ok(format!("Promoted {} successfully.", self.version))
    }
}
