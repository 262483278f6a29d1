use std::path::Path;

use serde::{Deserialize, Serialize};

/// Compression used for directory archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveCompression {
    /// Entries are stored without compression
    Stored,
    /// Entries are DEFLATE-compressed
    #[default]
    Deflated,
}

impl ArchiveCompression {
    pub fn method(self) -> zip::CompressionMethod {
        match self {
            ArchiveCompression::Stored => zip::CompressionMethod::Stored,
            ArchiveCompression::Deflated => zip::CompressionMethod::Deflated,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTML-escape file names in directory listings
    #[serde(default = "default_escape_names")]
    pub escape_names: bool,

    /// Sort listings (directories first, then by name) instead of using
    /// filesystem enumeration order
    #[serde(default)]
    pub sort_entries: bool,

    /// Compression method for directory downloads
    #[serde(default)]
    pub archive_compression: ArchiveCompression,

    /// Buffer size (in bytes) between the archive writer and the connection
    #[serde(default = "default_copy_buffer_size")]
    pub copy_buffer_size: usize,
}

fn default_escape_names() -> bool {
    true
}

fn default_copy_buffer_size() -> usize {
    64 * 1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            escape_names: default_escape_names(),
            sort_entries: false,
            archive_compression: ArchiveCompression::default(),
            copy_buffer_size: default_copy_buffer_size(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
