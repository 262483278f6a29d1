use thiserror::Error;

/// Reasons a connection is closed before (or while) a response is written.
///
/// None of these are ever rendered onto the wire: a rejected request is
/// answered by closing the connection without writing a single byte.
#[derive(Error, Debug)]
pub enum ServeError {
    #[error("Connection closed before the request was complete")]
    ConnectionClosed,

    #[error("Malformed request line: {0:?}")]
    MalformedRequest(String),

    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("Line exceeds {0} bytes")]
    LineTooLong(usize),

    #[error("Request target has a malformed escape or is not valid UTF-8")]
    InvalidEncoding,

    #[error("Path is outside root directory")]
    PathTraversal,

    #[error("No route for path: {0}")]
    NoRoute(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Directory operation not allowed on file")]
    NotADirectory,

    #[error("Path is neither a regular file nor a directory")]
    UnsupportedFileType,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl ServeError {
    /// Whether the failure was a deliberate refusal of the request rather than
    /// an I/O problem while serving it.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, ServeError::Io(_) | ServeError::Zip(_))
    }
}
