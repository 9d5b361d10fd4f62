use clap::Args;

use crate::cli::op::{ErrorStatus, Op, OpContext};

/// Delete a key and every version of it. Requires admin access.
#[derive(Args, Debug, Clone)]
pub struct Delete {
    /// Key identifier
    pub key_id: String,
}

#[async_trait::async_trait]
impl Op for Delete {
    type Error = ErrorStatus;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        ctx.client
            .delete_key(&self.key_id)
            .await
            .map_err(|e| ErrorStatus::server(format!("Error deleting key: {}", e)))?;
        Ok(format!("Deleted {} successfully.", self.key_id))
    }
}
