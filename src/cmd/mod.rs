//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to the appropriate
//! subcommand handler: [`run`] or [`validate`]. Each handler lives in
//! its own submodule.

pub mod run;
pub mod validate;

use crate::cli::{Cli, Commands};
use crate::error::WaybillError;

pub async fn dispatch(cli: Cli) -> Result<(), WaybillError> {
    match cli.command {
        Some(Commands::Run(args)) => run::execute(*args).await,
        Some(Commands::Validate(ref args)) => validate::execute(args),
        None => {
            print_welcome();
            Ok(())
        }
    }
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        "\n  waybill v{version} \u{2014} artifact-tracking HTTP proxy sidecar\n\n  \
         No command provided. To get started:\n\n    \
         waybill run                       Start the sidecar (built-in routing config)\n    \
         waybill run -c waybill.yaml       Start with a specific config file\n    \
         waybill validate waybill.yaml     Check a config without starting\n    \
         waybill --help                    See all commands and options\n"
    );
}
