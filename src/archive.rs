//! Streaming ZIP archives of directory trees.
//!
//! The archive is produced while the tree is walked: each directory and file
//! becomes an entry as soon as it is visited, and only the central directory
//! is written at the end. Nothing is buffered beyond the entry being
//! written, and the sink never needs to seek.

use std::fs::File;
use std::io::{self, Read, Seek, Write};
use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::config::ArchiveCompression;
use crate::error::ServeError;
use crate::paths::{is_within, relative_slash_path};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Entries at or above this size need Zip64 records.
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// What ended up in an archive
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub directories: u64,
    pub files: u64,
    /// Walk entries or files that could not be read and were left out
    pub skipped: u64,
    /// Files whose content was cut short by a read error
    pub truncated: u64,
}

/// Kind of node visited by the walk
enum Node {
    Directory,
    File { len: u64 },
}

/// Write a ZIP archive of everything below `dir` into `sink`.
///
/// Entry names are relative to `dir` and use `/` separators; directories end
/// in `/`. `dir` itself gets no entry. A symbolic link is archived only when
/// it resolves to a regular file inside `root` (the canonical served root),
/// the same rule a direct download of that link obeys; links are never
/// descended into. Unreadable entries are skipped and the walk continues;
/// only a failure to write to `sink` aborts the archive.
pub fn write_archive<W>(
    root: &Path,
    dir: &Path,
    sink: &mut W,
    compression: ArchiveCompression,
) -> Result<ArchiveSummary, ServeError>
where
    W: Write,
{
    let mut zip = ZipWriter::new_stream(sink);
    let options = SimpleFileOptions::default().compression_method(compression.method());
    let mut summary = ArchiveSummary::default();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    // follow_links stays off: a linked directory must not pull in a second
    // tree, possibly from outside the root
    for entry in WalkDir::new(dir).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Skipping unreadable entry in {}: {}", dir.display(), err);
                summary.skipped += 1;
                continue;
            }
        };

        let file_type = entry.file_type();
        let node = if file_type.is_dir() {
            Node::Directory
        } else if file_type.is_file() {
            let len = entry.metadata().map(|m| m.len()).unwrap_or(0);
            Node::File { len }
        } else if file_type.is_symlink() {
            match linked_file(root, entry.path()) {
                Some(len) => Node::File { len },
                None => continue,
            }
        } else {
            debug!("Not archiving {}: not a regular file", entry.path().display());
            continue;
        };

        let name = relative_slash_path(dir, entry.path());
        visit(&mut zip, entry.path(), &name, node, options, &mut buffer, &mut summary)?;
    }

    zip.finish()?;
    Ok(summary)
}

/// Size of the file behind `link`, if the link ends at a regular file inside
/// `root`.
fn linked_file(root: &Path, link: &Path) -> Option<u64> {
    let target = match link.canonicalize() {
        Ok(target) => target,
        Err(err) => {
            debug!("Not archiving dangling link {}: {}", link.display(), err);
            return None;
        }
    };

    if !is_within(root, &target) {
        warn!(
            "Not archiving {}: points outside the shared root",
            link.display()
        );
        return None;
    }

    match target.metadata() {
        Ok(metadata) if metadata.is_file() => Some(metadata.len()),
        _ => {
            debug!("Not archiving {}: link to a non-file", link.display());
            None
        }
    }
}

fn visit<W>(
    zip: &mut ZipWriter<W>,
    path: &Path,
    name: &str,
    node: Node,
    options: SimpleFileOptions,
    buffer: &mut [u8],
    summary: &mut ArchiveSummary,
) -> Result<(), ServeError>
where
    W: Write + Seek,
{
    match node {
        Node::Directory => {
            zip.add_directory(format!("{}/", name), options.unix_permissions(0o755))?;
            summary.directories += 1;
        }
        Node::File { len } => {
            let mut input = match File::open(path) {
                Ok(file) => file,
                Err(err) => {
                    warn!("Skipping {}: {}", path.display(), err);
                    summary.skipped += 1;
                    return Ok(());
                }
            };

            let file_options = options
                .unix_permissions(0o644)
                .large_file(len >= ZIP64_THRESHOLD);
            zip.start_file(name, file_options)?;

            if let Err(err) = copy_into_entry(&mut input, zip, buffer)? {
                warn!("Read of {} failed mid-entry, truncating: {}", path.display(), err);
                summary.truncated += 1;
            }
            summary.files += 1;
        }
    }

    Ok(())
}

/// Copy `input` into the current entry. The outer error is a sink failure
/// and aborts the archive; the inner one is a read failure on the source
/// file, which only ends this entry.
fn copy_into_entry<R, W>(
    input: &mut R,
    output: &mut W,
    buffer: &mut [u8],
) -> io::Result<Result<u64, io::Error>>
where
    R: Read,
    W: Write,
{
    let mut copied = 0u64;
    loop {
        let n = match input.read(buffer) {
            Ok(0) => return Ok(Ok(copied)),
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Ok(Err(err)),
        };
        output.write_all(&buffer[..n])?;
        copied += n as u64;
    }
}
