use bhyve_api::BhyveClient;

use crate::cli::DevicesArgs;
use crate::error::CliError;

pub async fn handle(args: &DevicesArgs, client: &BhyveClient) -> Result<(), CliError> {
    client.authenticate().await?;
    let devices = client.list_devices().await?;

    let rendered = if args.compact {
        serde_json::to_string(&devices)?
    } else {
        serde_json::to_string_pretty(&devices)?
    };
    println!("{rendered}");
    Ok(())
}
