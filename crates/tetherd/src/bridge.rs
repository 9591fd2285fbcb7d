//! Newline-delimited JSON bridge to the upstream connection.
//!
//! Upstream signals arrive one JSON object per line on the reader; every
//! outbound send is written as one JSON object per line on the writer.

use async_trait::async_trait;
use serde::Serialize;
use tether_sync::{Lifecycle, SendError, TextSender, UpstreamSignal};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Feed upstream signals into `lifecycle` until the reader closes or
/// `cancel` fires. Malformed lines are logged and skipped.
///
/// Returns the number of signals handled.
pub async fn read_signals<R>(
    reader: R,
    lifecycle: &Lifecycle,
    cancel: CancellationToken,
) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut handled = 0;

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<UpstreamSignal>(line) {
            Ok(signal) => {
                lifecycle.handle(signal);
                handled += 1;
            }
            Err(e) => warn!(error = %e, "skipping malformed upstream line"),
        }
    }

    Ok(handled)
}

#[derive(Serialize)]
struct OutboundLine<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    client_msg_id: &'a str,
    server_msg_id: &'a str,
    chat_jid: &'a str,
    text: &'a str,
}

/// [`TextSender`] that writes each send as a JSON line and assigns the
/// server id locally.
pub struct LineSender<W> {
    out: Mutex<W>,
}

impl<W> LineSender<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

#[async_trait]
impl<W> TextSender for LineSender<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send_text(
        &self,
        chat_jid: &str,
        text: &str,
        client_msg_id: &str,
    ) -> Result<String, SendError> {
        let server_msg_id = Uuid::new_v4().to_string();
        let mut line = serde_json::to_vec(&OutboundLine {
            kind: "send",
            client_msg_id,
            server_msg_id: &server_msg_id,
            chat_jid,
            text,
        })
        .map_err(|e| SendError::new(e.to_string()))?;
        line.push(b'\n');

        let mut out = self.out.lock().await;
        out.write_all(&line)
            .await
            .map_err(|e| SendError::new(format!("upstream write failed: {e}")))?;
        out.flush()
            .await
            .map_err(|e| SendError::new(format!("upstream write failed: {e}")))?;

        debug!(client_msg_id, server_msg_id = %server_msg_id, "send written upstream");
        Ok(server_msg_id)
    }
}
