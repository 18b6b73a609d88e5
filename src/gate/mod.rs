//! Gatekeeper service: hands out the file and auth server addresses.

use std::io::Write;
use std::sync::Arc;

use byteorder::{LittleEndian, WriteBytesExt};
use tokio::net::TcpStream;

use crate::errors::{NetError, NetResult};
use crate::net::crypt::{self, CryptRead, CryptWrite};
use crate::net::wait_for_shutdown;
use crate::server::ShardServer;

const CLI_PING_REQUEST: u16 = 0;
const CLI_FILE_SERV_IP_ADDRESS_REQUEST: u16 = 1;
const CLI_AUTH_SERV_IP_ADDRESS_REQUEST: u16 = 2;

const SRV_PING_REPLY: u16 = 0;
const SRV_FILE_SERV_IP_ADDRESS_REPLY: u16 = 1;
const SRV_AUTH_SERV_IP_ADDRESS_REPLY: u16 = 2;

/// Append a `u16`-counted UTF-16 string, the layout used for advertised
/// addresses.
pub fn write_wide_string(buffer: &mut Vec<u8>, value: &str) {
    let units: Vec<u16> = value.encode_utf16().collect();
    let _ = buffer.write_u16::<LittleEndian>(units.len() as u16);
    for unit in units {
        let _ = buffer.write_u16::<LittleEndian>(unit);
    }
}

pub async fn run_client(stream: TcpStream, server: Arc<ShardServer>) {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());
    let _guard = server.gate_clients.register();
    let mut shutdown_rx = server.shutdown.subscribe();

    let result = tokio::select! {
        result = client_loop(stream, &server) => result,
        () = wait_for_shutdown(&mut shutdown_rx) => Err(NetError::Shutdown),
    };

    match result {
        Ok(()) | Err(NetError::Hangup) | Err(NetError::Shutdown) => {}
        Err(err) => tracing::warn!(%peer, error = %err, "Gate client dropped"),
    }
}

async fn client_loop(stream: TcpStream, server: &Arc<ShardServer>) -> NetResult<()> {
    let (mut read_half, write_half) = stream.into_split();

    // Gate header: size, (ignored) token uuid
    let mut header = [0u8; 20];
    tokio::io::AsyncReadExt::read_exact(&mut read_half, &mut header).await?;
    let size = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if size != 20 {
        return Err(NetError::Protocol(format!("bad gate header size {size}")));
    }

    let keys = server
        .config
        .gate_keys
        .as_ref()
        .ok_or(NetError::Shutdown)?;
    let (mut read, mut write) = crypt::establish(read_half, write_half, keys).await?;

    loop {
        let msg_id = read.read_u16().await?;
        match msg_id {
            CLI_PING_REQUEST => cb_ping(&mut read, &mut write).await?,
            CLI_FILE_SERV_IP_ADDRESS_REQUEST => {
                let trans_id = read.read_u32().await?;
                read.read_u8().await?; // from patcher (ignored)
                let mut reply = Vec::new();
                reply.write_u16::<LittleEndian>(SRV_FILE_SERV_IP_ADDRESS_REPLY)?;
                reply.write_u32::<LittleEndian>(trans_id)?;
                write_wide_string(&mut reply, &server.config.file_server_addr);
                write.send(&reply).await?;
            }
            CLI_AUTH_SERV_IP_ADDRESS_REQUEST => {
                let trans_id = read.read_u32().await?;
                let mut reply = Vec::new();
                reply.write_u16::<LittleEndian>(SRV_AUTH_SERV_IP_ADDRESS_REPLY)?;
                reply.write_u32::<LittleEndian>(trans_id)?;
                write_wide_string(&mut reply, &server.config.auth_server_addr);
                write.send(&reply).await?;
            }
            unknown => {
                return Err(NetError::Protocol(format!(
                    "invalid gate message id {unknown}"
                )));
            }
        }
    }
}

async fn cb_ping<R, W>(read: &mut CryptRead<R>, write: &mut CryptWrite<W>) -> NetResult<()>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let ping_time = read.read_u32().await?;
    let trans_id = read.read_u32().await?;
    let payload_size = read.read_u32().await? as usize;
    if payload_size > 0x10000 {
        return Err(NetError::Malformed("oversized ping payload"));
    }
    let payload = read.read_buffer(payload_size).await?;

    let mut reply = Vec::new();
    reply.write_u16::<LittleEndian>(SRV_PING_REPLY)?;
    reply.write_u32::<LittleEndian>(ping_time)?;
    reply.write_u32::<LittleEndian>(trans_id)?;
    reply.write_u32::<LittleEndian>(payload_size as u32)?;
    reply.write_all(&payload)?;
    write.send(&reply).await?;
    Ok(())
}
