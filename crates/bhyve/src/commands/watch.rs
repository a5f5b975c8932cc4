use tokio::sync::broadcast::error::RecvError;

use bhyve_api::{BhyveClient, ClientEvent, Error};

use crate::cli::WatchArgs;
use crate::error::CliError;

/// Print every stream message until Ctrl-C or the connection closes.
///
/// A close preceded by a transport error is reported as that error.
pub async fn handle(args: &WatchArgs, client: &BhyveClient) -> Result<(), CliError> {
    client.authenticate().await?;

    let mut events = client.subscribe();
    let handle = client.connect_stream()?;
    let mut last_error: Option<Error> = None;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("interrupted, closing stream");
                handle.disconnect();
                handle.closed().await;
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(ClientEvent::Message(text)) => print_message(&text, args.pretty),
                Ok(ClientEvent::Error(err)) => {
                    tracing::warn!(error = %err, "stream error");
                    last_error = Some(err);
                }
                Ok(ClientEvent::Closed(closed)) => {
                    tracing::info!(code = ?closed.code, reason = %closed.reason, "stream closed");
                    return last_error.map_or(Ok(()), |err| Err(err.into()));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "output fell behind the stream");
                }
                Err(RecvError::Closed) => return Ok(()),
            }
        }
    }
}

fn print_message(text: &str, pretty: bool) {
    if pretty {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
            if let Ok(rendered) = serde_json::to_string_pretty(&value) {
                println!("{rendered}");
                return;
            }
        }
    }
    println!("{text}");
}
