//! HTML directory listings.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::config::Config;
use crate::error::ServeError;
use crate::paths::relative_slash_path;

/// Status line and (empty) header block sent before a listing.
pub const LISTING_HEADER: &str = "HTTP/1.1 200 OK\r\n\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

/// One immediate child of a listed directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Path relative to the served root, `/`-separated
    pub relative_path: String,
    pub name: String,
    pub kind: EntryKind,
}

/// Rendering switches taken from [`Config`]
#[derive(Debug, Clone, Copy)]
pub struct ListingOptions {
    pub escape_names: bool,
    pub sort_entries: bool,
}

impl ListingOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            escape_names: config.escape_names,
            sort_entries: config.sort_entries,
        }
    }
}

/// Enumerate the immediate children of `dir` in filesystem order.
///
/// `root` and `dir` must both be canonical. Symlinks are classified by what
/// they point to; dangling links are listed as files.
pub async fn read_entries(root: &Path, dir: &Path) -> Result<Vec<DirectoryEntry>, ServeError> {
    let mut entries = Vec::new();
    let mut read_dir = fs::read_dir(dir).await?;

    while let Some(entry) = read_dir.next_entry().await? {
        let entry_path: PathBuf = entry.path();
        let is_dir = fs::metadata(&entry_path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);

        entries.push(DirectoryEntry {
            relative_path: relative_slash_path(root, &entry_path),
            name: entry.file_name().to_string_lossy().to_string(),
            kind: if is_dir {
                EntryKind::Directory
            } else {
                EntryKind::File
            },
        });
    }

    Ok(entries)
}

/// Directories first, then case-insensitive by name.
fn sort_entries(entries: &mut [DirectoryEntry]) {
    entries.sort_by(|a, b| match (a.kind, b.kind) {
        (EntryKind::Directory, EntryKind::File) => std::cmp::Ordering::Less,
        (EntryKind::File, EntryKind::Directory) => std::cmp::Ordering::Greater,
        _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
    });
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Percent-encode a root-relative path for use in a link. `/` is encoded
/// too, so the whole path travels as a single segment.
pub fn link_target(relative_path: &str) -> String {
    urlencoding::encode(relative_path).into_owned()
}

/// Render the listing document for `dir_relative` (the listed directory's
/// path relative to the root).
pub fn render(dir_relative: &str, mut entries: Vec<DirectoryEntry>, options: ListingOptions) -> String {
    if options.sort_entries {
        sort_entries(&mut entries);
    }

    let display = |name: &str| {
        if options.escape_names {
            escape_html(name)
        } else {
            name.to_string()
        }
    };

    let mut html = String::new();
    html.push_str("<html><head><title>Files</title></head><body>");
    let _ = write!(html, "<h1>/{}</h1>", display(dir_relative));
    let _ = write!(
        html,
        "<a href=\"/download/{}\">Download folder</a><br>",
        link_target(dir_relative)
    );
    html.push_str("<ul>");

    for entry in &entries {
        let target = link_target(&entry.relative_path);
        let name = display(&entry.name);
        match entry.kind {
            EntryKind::Directory => {
                let _ = write!(
                    html,
                    "<li><a href=\"/browse/{target}/\">{name}</a>: <a href=\"/download/{target}\">Download</a></li>"
                );
            }
            EntryKind::File => {
                let _ = write!(html, "<li><a href=\"/download/{target}\">{name}</a></li>");
            }
        }
    }

    html.push_str("</ul></body></html>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn options() -> ListingOptions {
        ListingOptions {
            escape_names: true,
            sort_entries: false,
        }
    }

    fn entry(relative_path: &str, kind: EntryKind) -> DirectoryEntry {
        DirectoryEntry {
            relative_path: relative_path.to_string(),
            name: relative_path.rsplit('/').next().unwrap().to_string(),
            kind,
        }
    }

    #[tokio::test]
    async fn test_read_entries_lists_immediate_children() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        std::fs::write(root.join("a.txt"), "a").unwrap();
        std::fs::create_dir_all(root.join("sub/deeper")).unwrap();
        std::fs::write(root.join("sub/b.txt"), "b").unwrap();

        let entries: HashSet<_> = read_entries(&root, &root)
            .await
            .unwrap()
            .into_iter()
            .map(|e| (e.relative_path, e.kind))
            .collect();
        let expected: HashSet<_> = [
            ("a.txt".to_string(), EntryKind::File),
            ("sub".to_string(), EntryKind::Directory),
        ]
        .into_iter()
        .collect();
        assert_eq!(entries, expected);

        let nested: HashSet<_> = read_entries(&root, &root.join("sub"))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.relative_path)
            .collect();
        assert_eq!(
            nested,
            ["sub/b.txt".to_string(), "sub/deeper".to_string()]
                .into_iter()
                .collect::<HashSet<_>>()
        );
    }

    #[tokio::test]
    async fn test_read_entries_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        assert!(read_entries(&root, &root).await.unwrap().is_empty());
    }

    #[test]
    fn test_render_empty_listing() {
        let html = render("", Vec::new(), options());
        assert!(html.starts_with("<html>"));
        assert!(html.contains("<a href=\"/download/\">Download folder</a>"));
        assert!(html.contains("<ul></ul>"));
        assert!(html.ends_with("</html>"));
    }

    #[test]
    fn test_render_links() {
        let html = render(
            "",
            vec![
                entry("photos", EntryKind::Directory),
                entry("report.pdf", EntryKind::File),
            ],
            options(),
        );
        assert!(html.contains(
            "<li><a href=\"/browse/photos/\">photos</a>: <a href=\"/download/photos\">Download</a></li>"
        ));
        assert!(html.contains("<li><a href=\"/download/report.pdf\">report.pdf</a></li>"));
    }

    #[test]
    fn test_render_encodes_nested_paths() {
        let html = render(
            "my docs",
            vec![entry("my docs/a b.txt", EntryKind::File)],
            options(),
        );
        assert!(html.contains("href=\"/download/my%20docs\">Download folder"));
        assert!(html.contains("href=\"/download/my%20docs%2Fa%20b.txt\">a b.txt</a>"));
    }

    #[test]
    fn test_render_escapes_names() {
        let entries = vec![DirectoryEntry {
            relative_path: "<b>.txt".to_string(),
            name: "<b>.txt".to_string(),
            kind: EntryKind::File,
        }];

        let html = render("", entries.clone(), options());
        assert!(html.contains(">&lt;b&gt;.txt</a>"));
        assert!(!html.contains("<b>"));

        let raw = render(
            "",
            entries,
            ListingOptions {
                escape_names: false,
                sort_entries: false,
            },
        );
        assert!(raw.contains("><b>.txt</a>"));
    }

    #[test]
    fn test_render_sorted() {
        let html = render(
            "",
            vec![
                entry("b.txt", EntryKind::File),
                entry("Zed", EntryKind::Directory),
                entry("A.txt", EntryKind::File),
            ],
            ListingOptions {
                escape_names: true,
                sort_entries: true,
            },
        );
        let zed = html.find(">Zed<").unwrap();
        let a = html.find(">A.txt<").unwrap();
        let b = html.find(">b.txt<").unwrap();
        assert!(zed < a && a < b);
    }
}
