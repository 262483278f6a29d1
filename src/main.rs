use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dropshare::{server, AppState, Config};

#[derive(Parser, Debug)]
#[command(name = "dropshare")]
#[command(about = "Share a directory over HTTP: browse listings, download files or whole folders as ZIP")]
#[command(version)]
struct Cli {
    /// Port to listen on
    #[arg(env = "DROPSHARE_PORT")]
    port: u16,

    /// Directory to share
    #[arg(env = "DROPSHARE_ROOT")]
    root: PathBuf,

    /// Address to bind to
    #[arg(short, long, env = "DROPSHARE_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// Log every connection, not just served requests
    #[arg(short, long, env = "DROPSHARE_VERBOSE")]
    verbose: bool,

    /// TOML file with listing and archive settings
    #[arg(short, long, env = "DROPSHARE_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    fn listen_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.bind, self.port).parse()
    }

    fn load_config(&self) -> Result<Config, Box<dyn std::error::Error>> {
        match &self.config {
            Some(path) => Config::from_file(path),
            None => Ok(Config::default()),
        }
    }
}

/// `RUST_LOG` wins over `--verbose` when set.
fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "dropshare=debug" } else { "dropshare=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive.into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// The shared root must exist and be a directory. Its canonical form is what
/// every later containment check compares against.
fn shared_root(root: &Path) -> Result<PathBuf, String> {
    let canonical = root
        .canonicalize()
        .map_err(|err| format!("Cannot share {}: {}", root.display(), err))?;

    if !canonical.is_dir() {
        return Err(format!("Not a directory: {}", canonical.display()));
    }
    Ok(canonical)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli.load_config()?;
    let root_dir = shared_root(&cli.root)?;
    let addr = cli.listen_addr()?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        "Sharing {} on {}",
        root_dir.display(),
        listener.local_addr()?
    );

    server::serve(listener, AppState::with_config(root_dir, config)).await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cli_positional_arguments() {
        let cli = Cli::try_parse_from(["dropshare", "8080", "/srv/share"]).unwrap();
        assert_eq!(cli.port, 8080);
        assert_eq!(cli.root, PathBuf::from("/srv/share"));
        assert_eq!(cli.listen_addr().unwrap(), "0.0.0.0:8080".parse().unwrap());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_rejects_bad_port() {
        assert!(Cli::try_parse_from(["dropshare", "http", "/srv"]).is_err());
        assert!(Cli::try_parse_from(["dropshare", "70000", "/srv"]).is_err());
    }

    #[test]
    fn test_shared_root_validation() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();

        assert_eq!(
            shared_root(temp_dir.path()).unwrap(),
            temp_dir.path().canonicalize().unwrap()
        );
        assert!(shared_root(&file).is_err());
        assert!(shared_root(&temp_dir.path().join("missing")).is_err());
    }
}
