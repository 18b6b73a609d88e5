//! The lobby: accepts every client connection and routes it to a service by
//! connection type.

use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

use crate::errors::{NetError, NetResult};
use crate::net::wait_for_shutdown;
use crate::server::ShardServer;

const CONN_CLI_TO_AUTH: u8 = 10;
const CONN_CLI_TO_GAME: u8 = 11;
const CONN_CLI_TO_FILE: u8 = 16;
const CONN_CLI_TO_CSR: u8 = 20;
const CONN_CLI_TO_GATE_KEEPER: u8 = 22;

/// Accept loop. A protocol error during dispatch drops the one offending
/// socket; the loop keeps accepting until shutdown.
pub async fn run(listener: TcpListener, server: Arc<ShardServer>) {
    let local = listener
        .local_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());
    tracing::info!(addr = %local, "Lobby running");

    let mut shutdown_rx = server.shutdown.subscribe();
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            () = wait_for_shutdown(&mut shutdown_rx) => break,
        };
        match accepted {
            Ok((stream, _)) => {
                let server = server.clone();
                tokio::spawn(async move {
                    if let Err(err) = dispatch(stream, server).await {
                        match err {
                            NetError::Hangup => {}
                            other => tracing::warn!(error = %other, "Lobby dispatch failed"),
                        }
                    }
                });
            }
            Err(err) => {
                tracing::warn!(error = %err, "Accept failed");
            }
        }
    }
    tracing::info!("Lobby stopped");
}

/// Read the connection header and hand the socket to its service.
async fn dispatch(mut stream: TcpStream, server: Arc<ShardServer>) -> NetResult<()> {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());

    // Connection header: type, header size, build id, build type, branch id,
    // product uuid. Only the type matters for routing.
    let conn_type = stream.read_u8().await?;
    let _header_size = stream.read_u16_le().await?;
    let _build_id = stream.read_u32_le().await?;
    let _build_type = stream.read_u32_le().await?;
    let _branch_id = stream.read_u32_le().await?;
    let mut product_id = [0u8; 16];
    stream.read_exact(&mut product_id).await?;

    match conn_type {
        CONN_CLI_TO_GATE_KEEPER => {
            tokio::spawn(crate::gate::run_client(stream, server));
        }
        CONN_CLI_TO_FILE => {
            tokio::spawn(crate::file::run_client(stream, server));
        }
        CONN_CLI_TO_AUTH => {
            tokio::spawn(crate::auth::server::run_client(stream, server));
        }
        CONN_CLI_TO_GAME => {
            tokio::spawn(crate::game::server::run_client(stream, server));
        }
        CONN_CLI_TO_CSR => {
            tracing::warn!(%peer, "CSR client rejected");
        }
        unknown => {
            tracing::warn!(%peer, conn_type = unknown, "Unknown connection type");
        }
    }
    Ok(())
}
