//! NDJSON bridge over stdio. Requests come in one JSON object per line and
//! are answered with one response line carrying the same id. Query results,
//! progress and edit lifecycle notifications go out as unsolicited event
//! lines, so slow statements never hold up the request stream.

mod handler;
mod protocol;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;

use crate::{cli::Args, core::events, error::AppResult};

use handler::BridgeHandler;
use protocol::{BridgeRequest, BridgeResponse, EventLine};

pub fn run(args: Args) -> AppResult<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| crate::error::AppError::Internal(e.to_string()))?;

    rt.block_on(serve(args))
}

async fn serve(args: Args) -> AppResult<()> {
    let (event_tx, mut event_rx) = events::channel();
    let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel();
    let mut handler = BridgeHandler::new(args, event_tx, ctrl_tx);
    handler.open_startup_database()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = BufWriter::new(tokio::io::stdout());

    tracing::info!("bridge ready");
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let resp = match serde_json::from_str::<BridgeRequest>(trimmed) {
                    Ok(req) => handler.handle(req).await,
                    Err(e) => BridgeResponse::unparsable(&e),
                };
                write_line(&mut stdout, &resp).await?;
            }
            Some(msg) = ctrl_rx.recv() => {
                handler.apply_control(msg).await;
            }
            Some(event) = event_rx.recv() => {
                write_line(&mut stdout, &EventLine::new(&event)).await?;
            }
        }
    }
    tracing::info!("stdin closed, shutting down");
    Ok(())
}

async fn write_line<W, T>(out: &mut W, value: &T) -> AppResult<()>
where
    W: AsyncWriteExt + Unpin,
    T: serde::Serialize,
{
    let mut buf = serde_json::to_vec(value)?;
    buf.push(b'\n');
    out.write_all(&buf).await?;
    out.flush().await?;
    Ok(())
}
