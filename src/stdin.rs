use crate::station::Station;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Reads commands from the console, one per line.
pub fn start(station: Station) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    error!("Error while reading stdin: {e}");
                    break;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            if let Err(e) = station.handle_command(&line).await {
                warn!("Command {:?} failed: {e}", line.trim());
            }
        }
    });
}
