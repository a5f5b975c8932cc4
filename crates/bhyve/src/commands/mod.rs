//! Command handlers. Each one authenticates first; the client holds no
//! session across process runs.

mod devices;
mod login;
mod watch;

use bhyve_api::BhyveClient;

use crate::cli::Command;
use crate::error::CliError;

pub async fn dispatch(cmd: Command, client: &BhyveClient) -> Result<(), CliError> {
    match cmd {
        Command::Login(args) => login::handle(&args, client).await,
        Command::Devices(args) => devices::handle(&args, client).await,
        Command::Watch(args) => watch::handle(&args, client).await,
    }
}
