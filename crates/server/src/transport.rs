use std::sync::Arc;

use shared::{domain::ConnectionId, protocol::CommandMessage};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tracing::{debug, warn};

use crate::app_state::AppState;

/// Serves one client: newline-delimited JSON commands in, one JSON string
/// reply per command out. The session is dropped when the stream ends.
pub(crate) async fn serve<S>(
    state: Arc<AppState>,
    connection: ConnectionId,
    stream: S,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    let result = serve_frames(&state, connection, &mut reader, &mut writer).await;

    if let Some(username) = state.api.sessions.disconnect(connection) {
        debug!(%connection, %username, "session ended");
    }
    result
}

async fn serve_frames<R, W>(
    state: &Arc<AppState>,
    connection: ConnectionId,
    reader: &mut R,
    writer: &mut W,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let limit = state.max_frame_bytes;
    // One extra byte tells an exactly-full frame from an oversized one.
    let bound = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = (&mut *reader)
            .take(bound)
            .read_until(b'\n', &mut line)
            .await?;
        if read == 0 {
            return Ok(());
        }

        let terminated = line.last() == Some(&b'\n');
        if !terminated && line.len() > limit {
            warn!(%connection, limit, "frame too large, closing connection");
            write_reply(writer, &format!("Error: message exceeds {limit} bytes")).await?;
            return Ok(());
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let reply = match serde_json::from_slice::<CommandMessage>(&line) {
            Ok(message) => {
                let state = Arc::clone(state);
                tokio::task::spawn_blocking(move || state.api.dispatch(connection, &message))
                    .await?
            }
            Err(error) => {
                warn!(%connection, %error, "malformed message");
                format!("Error: malformed message: {error}")
            }
        };
        write_reply(writer, &reply).await?;
    }
}

async fn write_reply<W>(writer: &mut W, reply: &str) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut frame = serde_json::to_vec(reply)?;
    frame.push(b'\n');
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
