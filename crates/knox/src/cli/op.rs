use std::path::PathBuf;

use common::client::{ClientError, HttpClient, UncachedClient};
use knox_cli::auth::default_auth_handlers;
use knox_cli::token_file_path;

use super::args::Args;

/// Command failure, split into the two classes the exit status exposes:
/// a client-side problem (bad arguments, IO, validation) or a non-OK
/// answer from the server. Scripts rely on the distinction.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ErrorStatus {
    pub message: String,
    pub server_side: bool,
}

impl ErrorStatus {
    pub fn client(message: impl Into<String>) -> Self {
        ErrorStatus {
            message: message.into(),
            server_side: false,
        }
    }

    pub fn server(message: impl Into<String>) -> Self {
        ErrorStatus {
            message: message.into(),
            server_side: true,
        }
    }

    pub fn server_side(&self) -> bool {
        self.server_side
    }
}

impl From<ClientError> for ErrorStatus {
    fn from(err: ClientError) -> Self {
        ErrorStatus {
            server_side: err.is_server_side(),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for ErrorStatus {
    fn from(err: std::io::Error) -> Self {
        ErrorStatus::client(err.to_string())
    }
}

#[derive(Clone)]
pub struct OpContext {
    /// Knox client: cache-aware reads, network writes.
    pub client: HttpClient,
    /// Directory holding the register file and per-key cache files.
    pub daemon_dir: PathBuf,
    /// Location of the cached login token.
    pub token_file: PathBuf,
    /// OAuth token endpoint used by `knox login`.
    pub token_endpoint: Option<String>,
    /// OAuth client id used by `knox login`.
    pub oauth_client_id: Option<String>,
}

impl OpContext {
    pub fn new(args: &Args) -> Result<Self, ErrorStatus> {
        let token_file = token_file_path(args.token_file.clone());
        let handlers = default_auth_handlers(token_file.clone());
        let uncached = UncachedClient::new(
            args.remote.clone(),
            handlers,
            env!("CARGO_PKG_VERSION"),
        );
        Ok(OpContext {
            client: HttpClient::new(Some(args.dir.clone()), uncached),
            daemon_dir: args.dir.clone(),
            token_file,
            token_endpoint: args.token_endpoint.clone(),
            oauth_client_id: args.client_id.clone(),
        })
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::cli::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::cli::op::Op>::Error),
            )*
        }

        impl OpError {
            /// Whether the failure came back from the server; selects
            /// exit status 2 over 1.
            pub fn is_server_side(&self) -> bool {
                match self {
                    $(OpError::$variant(e) => e.server_side(),)*
                }
            }
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}
