// CLI modules
mod cli;

use clap::{Parser, Subcommand};
use cli::args::Args;
use cli::op::Op;
use cli::{
    Access, Acl, Add, Create, Daemon, Deactivate, Delete, Get, KeyTemplates, Keys, Login,
    Promote, Reactivate, Register, Unregister, Versions,
};

command_enum! {
    (Create, Create),
    (Get, Get),
    (Keys, Keys),
    (Versions, Versions),
    (Add, Add),
    (Promote, Promote),
    (Deactivate, Deactivate),
    (Reactivate, Reactivate),
    (Delete, Delete),
    (Acl, Acl),
    (Access, Access),
    (Register, Register),
    (Unregister, Unregister),
    (Daemon, Daemon),
    (Login, Login),
    (KeyTemplates, KeyTemplates),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let ctx = match cli::op::OpContext::new(&args) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            // scripts distinguish "I called it wrong" (1) from
            // "the server said no" (2)
            std::process::exit(if e.is_server_side() { 2 } else { 1 });
        }
    }
}
