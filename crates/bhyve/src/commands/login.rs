use secrecy::ExposeSecret;

use bhyve_api::BhyveClient;

use crate::cli::LoginArgs;
use crate::error::CliError;

pub async fn handle(args: &LoginArgs, client: &BhyveClient) -> Result<(), CliError> {
    let session = client.authenticate().await?;

    println!("user_id: {}", session.user_id());
    if args.show_token {
        println!("token:   {}", session.token().expose_secret());
    }
    Ok(())
}
