//! Request-line parsing and routing.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::ServeError;
use crate::paths::is_traversal_attempt;

const BROWSE_PREFIX: &str = "/browse/";
const DOWNLOAD_PREFIX: &str = "/download/";

/// Longest request or header line accepted, terminator included.
pub const MAX_LINE_LEN: usize = 8 * 1024;

/// A parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    /// Target exactly as sent by the client
    pub target: String,
    /// Percent-decoded target, always starting with `/`
    pub path: String,
}

/// Where a request is dispatched to. The payload is the path relative to
/// the served root, still unresolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Browse(String),
    Download(String),
}

impl Request {
    /// Parse the first line of a request.
    ///
    /// The line must split on single spaces into exactly method, target and
    /// protocol version, and the method must be `GET`. Trailing empty tokens
    /// (a line ending in spaces) are ignored. The decoded target gets the
    /// traversal pre-check before anything touches the filesystem.
    pub fn parse(line: &str) -> Result<Self, ServeError> {
        let line = line.trim_end_matches(['\r', '\n']);

        let mut parts: Vec<&str> = line.split(' ').collect();
        while parts.len() > 1 && parts.last().is_some_and(|p| p.is_empty()) {
            parts.pop();
        }
        let [method, target, _version] = parts.as_slice() else {
            return Err(ServeError::MalformedRequest(line.to_string()));
        };

        if *method != "GET" {
            return Err(ServeError::UnsupportedMethod(method.to_string()));
        }

        let target = target.trim();
        if !has_valid_escapes(target) {
            return Err(ServeError::InvalidEncoding);
        }

        let mut path = urlencoding::decode(target)
            .map_err(|_| ServeError::InvalidEncoding)?
            .into_owned();

        // Malformed clients: the result no longer matches any route
        if !path.starts_with('/') {
            path.push('/');
        }

        if is_traversal_attempt(&path) {
            return Err(ServeError::PathTraversal);
        }

        Ok(Self {
            method: method.to_string(),
            target: target.to_string(),
            path,
        })
    }

    /// Map the decoded path onto a route.
    pub fn route(&self) -> Result<Route, ServeError> {
        if self.path == "/" {
            return Ok(Route::Browse(String::new()));
        }

        if let Some(rest) = self.path.strip_prefix(BROWSE_PREFIX) {
            Ok(Route::Browse(rest.to_string()))
        } else if let Some(rest) = self.path.strip_prefix(DOWNLOAD_PREFIX) {
            Ok(Route::Download(rest.to_string()))
        } else {
            Err(ServeError::NoRoute(self.path.clone()))
        }
    }
}

/// Every `%` must start a two-hex-digit escape; `urlencoding::decode`
/// would otherwise keep `%ZZ` or a dangling `%` as literal text.
fn has_valid_escapes(target: &str) -> bool {
    let bytes = target.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            match bytes.get(i + 1..i + 3) {
                Some([hi, lo]) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => i += 3,
                _ => return false,
            }
        } else {
            i += 1;
        }
    }
    true
}

/// Read one raw line, `\n` included.
///
/// EOF before any byte is a closed connection. A line longer than
/// [`MAX_LINE_LEN`] without a newline drops the connection.
async fn read_line_bytes<R>(reader: &mut R) -> Result<Vec<u8>, ServeError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let read = (&mut *reader)
        .take(MAX_LINE_LEN as u64)
        .read_until(b'\n', &mut line)
        .await?;

    if read == 0 {
        return Err(ServeError::ConnectionClosed);
    }
    if read == MAX_LINE_LEN && line.last() != Some(&b'\n') {
        return Err(ServeError::LineTooLong(MAX_LINE_LEN));
    }
    Ok(line)
}

/// Read and parse the request line.
pub async fn read_request<R>(reader: &mut R) -> Result<Request, ServeError>
where
    R: AsyncBufRead + Unpin,
{
    let line = read_line_bytes(reader).await?;
    let line = String::from_utf8(line).map_err(|err| {
        ServeError::MalformedRequest(String::from_utf8_lossy(err.as_bytes()).into_owned())
    })?;
    Request::parse(&line)
}

/// Consume header lines up to and including the blank line that ends the
/// header block.
///
/// Headers are never interpreted, so they are compared as raw bytes: obs-text
/// (say a Latin-1 `User-Agent`) is discarded like anything else.
pub async fn skip_headers<R>(reader: &mut R) -> Result<(), ServeError>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let line = read_line_bytes(reader).await?;
        if matches!(line.as_slice(), b"\r\n" | b"\n" | b"\r") {
            return Ok(());
        }
    }
}
