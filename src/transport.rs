//! Newline-delimited JSON over stdio, plus the frame ticker.

use std::time::Duration;

use stagelink_core::{FrameClock, InboundMessage, OutboundMessage};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Decode one envelope per stdin line and queue it for the controller.
/// Lines that fail to decode are logged and skipped.
pub async fn read_inbound(tx: mpsc::Sender<InboundMessage>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match InboundMessage::from_json(line) {
                    Ok(message) => {
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "discarding undecodable message"),
                }
            }
            Ok(None) => {
                info!("client closed stdin");
                break;
            }
            Err(e) => {
                error!(error = %e, "failed to read from stdin");
                break;
            }
        }
    }
}

/// Write every dispatched message to stdout as one JSON line. Anything still
/// queued at shutdown is flushed before returning.
pub async fn write_outbound(mut rx: broadcast::Receiver<OutboundMessage>, shutdown: CancellationToken) {
    let mut stdout = tokio::io::stdout();
    loop {
        let received = tokio::select! {
            () = shutdown.cancelled() => break,
            received = rx.recv() => received,
        };
        match received {
            Ok(message) => {
                if let Err(e) = write_line(&mut stdout, &message).await {
                    error!(error = %e, "failed to write to stdout");
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "outbound writer lagged, dropped messages");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    while let Ok(message) = rx.try_recv() {
        if write_line(&mut stdout, &message).await.is_err() {
            break;
        }
    }
}

async fn write_line(stdout: &mut tokio::io::Stdout, message: &OutboundMessage) -> std::io::Result<()> {
    let mut line = message.to_json()?;
    line.push('\n');
    stdout.write_all(line.as_bytes()).await?;
    stdout.flush().await
}

/// Stand-in for the host's update loop: advance the clock every `period`.
pub async fn drive_clock(clock: FrameClock, period: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = interval.tick() => clock.advance(),
        }
    }
}
