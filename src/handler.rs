//! Per-connection request handling.
//!
//! A connection carries exactly one request. It is parsed, routed and
//! answered, and then the connection is closed. Any rejection (malformed
//! request, traversal attempt, unknown route, missing target) closes the
//! connection without writing a single response byte.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::io::SyncIoBridge;
use tracing::{debug, info};

use crate::archive::{write_archive, ArchiveSummary};
use crate::config::Config;
use crate::download::{attachment_header, download_name, stream_file};
use crate::error::ServeError;
use crate::listing::{self, ListingOptions, LISTING_HEADER};
use crate::paths::{relative_slash_path, resolve};
use crate::request::{read_request, skip_headers, Route};
use crate::AppState;

/// Serve one request on `stream`.
///
/// Both halves of the stream are owned here, so returning (on success or on
/// any error) releases the connection.
pub async fn handle_connection<S>(stream: S, state: AppState) -> Result<(), ServeError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    let request = read_request(&mut reader).await?;
    skip_headers(&mut reader).await?;
    let route = request.route()?;

    // Containment checks compare canonical paths on both sides
    let root = state.root_dir.canonicalize()?;

    let mut writer = match route {
        Route::Browse(relative) => browse(&root, &relative, writer, &state.config).await?,
        Route::Download(relative) => download(&root, &relative, writer, &state.config).await?,
    };

    writer.shutdown().await?;
    Ok(())
}

/// Look up `relative` on disk, mapping a missing target to `NotFound`.
async fn target_metadata(path: &Path, relative: &str) -> Result<std::fs::Metadata, ServeError> {
    fs::metadata(path)
        .await
        .map_err(|_| ServeError::NotFound(relative.to_string()))
}

async fn browse<W>(
    root: &Path,
    relative: &str,
    mut writer: W,
    config: &Config,
) -> Result<W, ServeError>
where
    W: AsyncWrite + Unpin,
{
    info!("Browse {}", relative);

    let dir = resolve(root, relative)?;
    if !target_metadata(&dir, relative).await?.is_dir() {
        return Err(ServeError::NotADirectory);
    }

    let entries = listing::read_entries(root, &dir).await?;
    let body = listing::render(
        &relative_slash_path(root, &dir),
        entries,
        ListingOptions::from_config(config),
    );

    writer.write_all(LISTING_HEADER.as_bytes()).await?;
    writer.write_all(body.as_bytes()).await?;
    writer.flush().await?;

    Ok(writer)
}

async fn download<W>(
    root: &Path,
    relative: &str,
    mut writer: W,
    config: &Config,
) -> Result<W, ServeError>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    info!("Download {}", relative);

    let path = resolve(root, relative)?;
    let metadata = target_metadata(&path, relative).await?;

    if metadata.is_file() {
        stream_file(&path, &mut writer).await?;
        Ok(writer)
    } else if metadata.is_dir() {
        stream_archive(root.to_path_buf(), path, writer, config).await
    } else {
        Err(ServeError::UnsupportedFileType)
    }
}

/// Send `dir` as a ZIP attachment.
///
/// The tree walk is blocking filesystem work, so it runs on the blocking
/// pool and writes to the connection through a [`SyncIoBridge`].
async fn stream_archive<W>(
    root: PathBuf,
    dir: PathBuf,
    mut writer: W,
    config: &Config,
) -> Result<W, ServeError>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    // The header goes out before the walk starts; from here on a failure
    // can only cut the archive short
    let zip_name = format!("{}.zip", download_name(&dir));
    writer
        .write_all(attachment_header(&zip_name).as_bytes())
        .await?;

    let compression = config.archive_compression;
    let buffer_size = config.copy_buffer_size.max(1);
    let mut bridge = SyncIoBridge::new(writer);

    // The bridge blocks on the runtime handle, which is only allowed off the
    // async worker threads

    let (summary, writer) = tokio::task::spawn_blocking(
        move || -> Result<(ArchiveSummary, W), ServeError> {
            let mut sink = BufWriter::with_capacity(buffer_size, &mut bridge);
            let summary = write_archive(&root, &dir, &mut sink, compression)?;
            sink.flush()?;
            // Release the borrow of the bridge before taking the writer back
            drop(sink);
            Ok((summary, bridge.into_inner()))
        },
    )
    .await
    .map_err(|err| ServeError::Io(std::io::Error::other(err.to_string())))??;

    debug!(
        "Archive {} done: {} directories, {} files, {} skipped, {} truncated",
        zip_name, summary.directories, summary.files, summary.skipped, summary.truncated
    );

    Ok(writer)
}
