use clap::Args;

use common::key::VersionStatus;

use crate::cli::op::{ErrorStatus, Op, OpContext};

/// List version ids for a key.
#[derive(Args, Debug, Clone)]
pub struct Versions {
    /// Key identifier
    pub key_id: String,

    /// Minimum state to return (inactive, active, or primary)
    #[arg(short = 's', long, default_value = "active")]
    pub state: String,

    /// Show each version's state alongside its id
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

#[async_trait::async_trait]
impl Op for Versions {
    type Error = ErrorStatus;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let status: VersionStatus = self
            .state
            .parse()
            .map_err(|e: String| ErrorStatus::client(e))?;
        let key = ctx
            .client
            .get_key_with_status(&self.key_id, status)
            .await
            .map_err(|e| ErrorStatus::server(format!("Error getting key: {}", e)))?;

        let lines: Vec<String> = key
            .versions
            .iter()
            .map(|v| {
                if self.verbose {
                    format!("{} \"{}\"", v.id, v.status)
                } else {
                    v.id.to_string()
                }
            })
            .collect();
        Ok(lines.join("\n"))
    }
}
