use std::collections::HashMap;

use clap::Args;

use crate::cli::op::{ErrorStatus, Op, OpContext};

/// List key ids and poll for changes: every id given as an argument is
/// sent with a placeholder hash, so only ids that exist come back.
#[derive(Args, Debug, Clone)]
pub struct Keys {
    /// Key ids to check; with none given, every key id is listed
    pub key_ids: Vec<String>,
}

#[async_trait::async_trait]
impl Op for Keys {
    type Error = ErrorStatus;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let filter: HashMap<String, String> = self
            .key_ids
            .iter()
            .map(|id| (id.clone(), "NONE".to_string()))
            .collect();
        let ids = ctx
            .client
            .get_keys(&filter)
            .await
            .map_err(|e| ErrorStatus::server(format!("Error getting keys: {}", e)))?;
        Ok(ids.join("\n"))
    }
}
