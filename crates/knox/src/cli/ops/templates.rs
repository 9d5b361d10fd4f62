use clap::Args;

use common::keyset;

use crate::cli::op::{ErrorStatus, Op, OpContext};

/// List the supported key templates for `create --key-template` and
/// `add --key-template`.
#[derive(Args, Debug, Clone)]
pub struct KeyTemplates {}

#[async_trait::async_trait]
impl Op for KeyTemplates {
    type Error = ErrorStatus;
    type Output = String;

    async fn execute(&self, _ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        Ok(keyset::template_names().join("\n"))
    }
}
