//! Minimal file-sharing server.
//!
//! Each connection carries one `GET` request and receives either an HTML
//! listing of a directory under the served root, the raw bytes of a file,
//! or a ZIP archive of a directory tree streamed as it is walked. Rejected
//! requests are answered by closing the connection without a response.

pub mod archive;
pub mod config;
pub mod download;
pub mod error;
pub mod handler;
pub mod listing;
pub mod paths;
pub mod request;
pub mod server;

use std::path::PathBuf;
use std::sync::Arc;

pub use config::Config;
pub use error::ServeError;

/// State shared (read-only) by every connection
#[derive(Clone)]
pub struct AppState {
    /// Root directory to serve files from
    pub root_dir: PathBuf,
    /// Configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState with the given root directory and default config.
    pub fn new(root_dir: PathBuf) -> Self {
        Self {
            root_dir,
            config: Arc::new(Config::default()),
        }
    }

    /// Create a new AppState with the given root directory and config.
    pub fn with_config(root_dir: PathBuf, config: Config) -> Self {
        Self {
            root_dir,
            config: Arc::new(config),
        }
    }
}
