//! Single-file downloads and the header block shared with archive downloads.

use std::path::Path;

use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::ServeError;

/// Base name of `path` as offered to the client, made safe for a quoted
/// header value.
pub fn download_name(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "download".to_string());

    file_name.replace(['"', '\r', '\n'], "'")
}

/// Response header block for an attachment named `file_name`.
pub fn attachment_header(file_name: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: application/octet-stream\r\n\
         Content-Disposition: attachment; filename=\"{}\"\r\n\
         \r\n",
        file_name
    )
}

/// Send `path` as an attachment: header block, then the file's bytes from
/// offset zero.
///
/// The file is opened before anything is written, so a file that cannot be
/// opened produces no response at all. Once the header is out, an error
/// simply ends the transfer early.
pub async fn stream_file<W>(path: &Path, writer: &mut W) -> Result<u64, ServeError>
where
    W: AsyncWrite + Unpin,
{
    let mut file = fs::File::open(path).await?;

    writer
        .write_all(attachment_header(&download_name(path)).as_bytes())
        .await?;

    let sent = tokio::io::copy(&mut file, writer).await?;
    writer.flush().await?;

    debug!("Sent {} bytes from {}", sent, path.display());
    Ok(sent)
}
