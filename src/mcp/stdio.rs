//! Standard-streams transport: one JSON-RPC message per line.
//!
//! stdout carries protocol traffic only; logging is configured to write to stderr.

use super::McpServer;
use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::info;

/// Serves stdin/stdout until stdin reaches EOF.
pub async fn run(server: McpServer) -> Result<()> {
    info!("MCP server listening on stdio");
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    serve(server, stdin, stdout).await?;
    info!("stdin closed, shutting down");
    Ok(())
}

/// Reads newline-delimited messages from `reader`, writing each response as one line.
pub async fn serve<R, W>(server: McpServer, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await.context("Failed to read from stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(response) = server.handle_line(line).await {
            writer
                .write_all(response.as_bytes())
                .await
                .context("Failed to write response")?;
            writer.write_all(b"\n").await.context("Failed to write response")?;
            writer.flush().await.context("Failed to flush stdout")?;
        }
    }
    Ok(())
}
