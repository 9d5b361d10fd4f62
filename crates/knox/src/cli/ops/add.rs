use clap::Args;

use common::key::VersionStatus;
use common::keyset;

use crate::cli::op::{ErrorStatus, Op, OpContext};

use super::create::read_data_from_stdin;

/// Add a new key version; it starts in the active state.
#[derive(Args, Debug, Clone)]
pub struct Add {
    /// Key identifier
    pub key_id: String,

    /// Generate the new version from a key template instead of stdin
    #[arg(long)]
    pub key_template: Option<String>,
}

#[async_trait::async_trait]
impl Op for Add {
    type Error = ErrorStatus;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let data = match &self.key_template {
            Some(name) => {
                let template = keyset::template_by_name(name)
                    .map_err(|e| ErrorStatus::client(e.to_string()))?;
                keyset::obeys_naming_rule(template, &self.key_id)
                    .map_err(|e| ErrorStatus::client(e.to_string()))?;
                // every existing version's subkey id must be known so
                // the fresh one cannot collide
                let all_versions = ctx
                    .client
                    .network_get_key_with_status(&self.key_id, VersionStatus::Inactive)
                    .await
                    .map_err(|e| ErrorStatus::server(format!("error getting key: {}", e)))?;
                keyset::add_keyset(template, &all_versions.versions)
                    .map_err(|e| ErrorStatus::client(e.to_string()))?
            }
            None => read_data_from_stdin()?,
        };

        let version_id = ctx
            .client
            .add_version(&self.key_id, &data)
            .await
            .map_err(|e| ErrorStatus::server(format!("Error adding version: {}", e)))?;
        Ok(format!("Added key version {}", version_id))
    }
}
