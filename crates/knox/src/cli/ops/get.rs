use clap::Args;

use common::key::VersionStatus;
use common::keyset;

use crate::cli::op::{ErrorStatus, Op, OpContext};

/// Get key data. Prints the primary version unless told otherwise.
#[derive(Args, Debug, Clone)]
pub struct Get {
    /// Key identifier
    pub key_id: String,

    /// Print this specific version instead of the primary
    #[arg(short = 'v', long = "key-version")]
    pub version: Option<String>,

    /// Print the full key object as JSON
    #[arg(short = 'j', long)]
    pub json: bool,

    /// Force a network call, bypassing the cache
    #[arg(short = 'n', long)]
    pub network: bool,

    /// Include inactive versions (only with -j)
    #[arg(short = 'a', long)]
    pub all: bool,

    /// Combine primary and active versions into one keyset
    #[arg(long)]
    pub keyset: bool,

    /// Print keyset metadata without revealing key material
    #[arg(long)]
    pub keyset_info: bool,
}

#[async_trait::async_trait]
impl Op for Get {
    type Error = ErrorStatus;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        if self.keyset || self.keyset_info {
            if !keyset::is_keyset_id(&self.key_id) {
                return Err(ErrorStatus::client(format!(
                    "key {} does not use a recognized keyset prefix",
                    self.key_id
                )));
            }
            // primary and active versions only; the network copy avoids
            // a stale cache mixing into the combined keyset
            let key = ctx
                .client
                .network_get_key(&self.key_id)
                .await
                .map_err(|e| ErrorStatus::server(format!("Error getting key: {}", e)))?;
            let (combined, version_map) = keyset::aggregate(&key.versions)
                .map_err(|e| ErrorStatus::client(e.to_string()))?;
            if self.keyset {
                return Ok(String::from_utf8_lossy(&combined.encode()).into_owned());
            }
            let info = keyset::KeysetInfo::new(&combined, &version_map);
            return serde_json::to_string_pretty(&info)
                .map_err(|e| ErrorStatus::client(e.to_string()));
        }

        let key = if self.all {
            // requesting the inactive floor returns every version
            if self.network {
                ctx.client
                    .network_get_key_with_status(&self.key_id, VersionStatus::Inactive)
                    .await
            } else {
                ctx.client
                    .get_key_with_status(&self.key_id, VersionStatus::Inactive)
                    .await
            }
        } else if self.network {
            ctx.client.network_get_key(&self.key_id).await
        } else {
            ctx.client.get_key(&self.key_id).await
        }
        .map_err(|e| ErrorStatus::server(format!("Error getting key: {}", e)))?;

        if self.json {
            return serde_json::to_string(&key).map_err(|e| ErrorStatus::client(e.to_string()));
        }

        match &self.version {
            None => {
                let primary = key
                    .versions
                    .get_primary()
                    .ok_or_else(|| ErrorStatus::client("Key has no primary version."))?;
                Ok(String::from_utf8_lossy(&primary.data).into_owned())
            }
            Some(wanted) => key
                .versions
                .iter()
                .find(|v| v.id.to_string() == *wanted)
                .map(|v| String::from_utf8_lossy(&v.data).into_owned())
                .ok_or_else(|| ErrorStatus::client("Key version not found.")),
        }
    }
}
