use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{debug, warn};

use crate::handler::handle_connection;
use crate::AppState;

/// Accept connections forever, serving each on its own task.
///
/// Per-connection failures stay inside their task. There are no read or
/// write timeouts: a stalled client keeps its task (and any open file)
/// until the peer goes away.
pub async fn serve(listener: TcpListener, state: AppState) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!("Failed to accept connection: {}", err);
                continue;
            }
        };

        let state = state.clone();
        tokio::spawn(async move {
            serve_connection(stream, peer, state).await;
        });
    }
}

async fn serve_connection(stream: tokio::net::TcpStream, peer: SocketAddr, state: AppState) {
    debug!("Accepted connection from {}", peer);

    match handle_connection(stream, state).await {
        Ok(()) => debug!("Served {}", peer),
        Err(err) if err.is_rejection() => debug!("Dropped request from {}: {}", peer, err),
        Err(err) => debug!("Connection with {} failed: {}", peer, err),
    }
}
