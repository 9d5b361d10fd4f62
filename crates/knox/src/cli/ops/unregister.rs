use clap::Args;

use knox_cli::keys_file::KeysFile;
use knox_cli::REGISTER_FILE;

use crate::cli::op::{ErrorStatus, Op, OpContext};

/// Remove a key from the register; the daemon deletes its cache file on
/// the next pass.
#[derive(Args, Debug, Clone)]
pub struct Unregister {
    /// Key identifier to unregister
    #[arg(short = 'k', long = "key")]
    pub key: String,
}

#[async_trait::async_trait]
impl Op for Unregister {
    type Error = ErrorStatus;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut keys_file = KeysFile::new(ctx.daemon_dir.join(REGISTER_FILE));
        keys_file
            .lock()
            .map_err(|e| ErrorStatus::client(format!("There was an error obtaining file lock: {}", e)))?;
        let result = keys_file.remove(&[self.key.clone()]);
        keys_file
            .unlock()
            .map_err(|e| ErrorStatus::client(format!("There was an error unlocking register file: {}", e)))?;
        result.map_err(|e| {
            ErrorStatus::client(format!("There was an error unregistering key {}: {}", self.key, e))
        })?;
        Ok(format!("Successfully unregistered {}.", self.key))
    }
}
