//! Resolution of client-supplied paths against the served root.
//!
//! Every path that reaches the filesystem goes through [`resolve`], which
//! guarantees the result is the root itself or something below it.

use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::warn;

use crate::error::ServeError;

/// Cheap textual check run before any resolution. A `..` anywhere in the
/// string or any backslash is refused, even when the resolved path would
/// have stayed under the root.
pub fn is_traversal_attempt(path: &str) -> bool {
    path.contains("..") || path.contains('\\')
}

/// Join the `/`-separated `relative` onto `root` one segment at a time.
///
/// `/sub/file`, `sub//file` and `sub/./file` all mean `<root>/sub/file`.
/// A `..` segment, a NUL byte or a segment that is not a plain file name
/// is rejected.
fn build_path(root: &Path, relative: &str) -> Result<PathBuf, ServeError> {
    let mut result = root.to_path_buf();

    // Segments come from a URL, so split on `/` only. Empty segments are
    // leading, trailing or doubled slashes.
    for segment in relative.split('/') {
        match segment {
            "" | "." => continue,
            // resolve() has already refused these; build_path refuses them
            // on its own as well
            ".." => {
                warn!("Parent segment in path: {:?}", relative);
                return Err(ServeError::PathTraversal);
            }
            _ if segment.contains('\0') => {
                warn!("Path segment contains null byte: {:?}", segment);
                return Err(ServeError::PathTraversal);
            }
            _ => {
                // Exactly one normal component, so no drive prefix or root
                // can slip in through a single segment
                let mut components = Path::new(segment).components();
                match (components.next(), components.next()) {
                    (Some(Component::Normal(name)), None) => result.push(name),
                    _ => {
                        warn!("Segment is not a plain name: {:?}", segment);
                        return Err(ServeError::PathTraversal);
                    }
                }
            }
        }
    }

    Ok(result)
}

/// Canonicalize `path` even when its tail does not exist yet: the deepest
/// existing ancestor is canonicalized and the missing components are
/// appended back unchanged.
fn canonicalize_existing_prefix(path: &Path) -> io::Result<PathBuf> {
    let mut missing = Vec::new();
    let mut current = path;

    loop {
        match current.canonicalize() {
            Ok(mut canonical) => {
                canonical.extend(missing.iter().rev());
                return Ok(canonical);
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                match (current.parent(), current.file_name()) {
                    (Some(parent), Some(name)) => {
                        missing.push(name.to_os_string());
                        current = parent;
                    }
                    _ => return Err(err),
                }
            }
            Err(err) => return Err(err),
        }
    }
}

/// Whether `path` is `root` or lies below it. Both must already be
/// canonical; the comparison is per component, so `/data` does not contain
/// `/database`.
pub fn is_within(root: &Path, path: &Path) -> bool {
    path.starts_with(root)
}

/// Resolve a percent-decoded, root-relative path into a canonical absolute
/// path inside `root`.
///
/// Existence is not required; callers check existence and file type after
/// resolution. Symbolic links are followed during canonicalization, so a link
/// pointing outside the root is refused.
pub fn resolve(root: &Path, relative: &str) -> Result<PathBuf, ServeError> {
    if is_traversal_attempt(relative) {
        warn!("Rejected traversal attempt: {:?}", relative);
        return Err(ServeError::PathTraversal);
    }

    let built_path = build_path(root, relative)?;
    let canonical_root = root.canonicalize()?;
    let canonical_path = canonicalize_existing_prefix(&built_path)?;

    if !is_within(&canonical_root, &canonical_path) {
        warn!(
            "Symlink escape attempt: {:?} resolved to {:?} which is outside {:?}",
            built_path, canonical_path, canonical_root
        );
        return Err(ServeError::PathTraversal);
    }

    Ok(canonical_path)
}

/// Path of `full_path` relative to `base`, with `/` separators regardless of
/// platform. Empty when the two are equal or `full_path` is not below `base`.
pub fn relative_slash_path(base: &Path, full_path: &Path) -> String {
    full_path
        .strip_prefix(base)
        .map(|relative| {
            relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}
