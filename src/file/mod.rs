//! File service: per-build manifests and (stubbed) chunked downloads.
//!
//! Unlike the other services this one is never encrypted, and every message
//! in both directions carries its own `{u32 size, u32 msg_id}` frame.

pub mod manifest;

use std::path::PathBuf;
use std::sync::Arc;

use byteorder::{LittleEndian, WriteBytesExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::errors::{NetError, NetResult, NetResultCode};
use crate::net::wait_for_shutdown;
use crate::server::ShardServer;
use manifest::FileManifest;

const CLI_PING_REQUEST: u32 = 0;
const CLI_BUILD_ID_REQUEST: u32 = 10;
const CLI_MANIFEST_REQUEST: u32 = 20;
const CLI_DOWNLOAD_REQUEST: u32 = 21;
const CLI_MANIFEST_ENTRY_ACK: u32 = 22;
const CLI_DOWNLOAD_CHUNK_ACK: u32 = 23;

const SRV_PING_REPLY: u32 = 0;
const SRV_BUILD_ID_REPLY: u32 = 10;
const SRV_MANIFEST_REPLY: u32 = 20;

pub async fn run_client(stream: TcpStream, server: Arc<ShardServer>) {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());
    let _guard = server.file_clients.register();
    let mut shutdown_rx = server.shutdown.subscribe();

    let result = tokio::select! {
        result = client_loop(stream, &server, &peer) => result,
        () = wait_for_shutdown(&mut shutdown_rx) => Err(NetError::Shutdown),
    };

    match result {
        Ok(()) | Err(NetError::Hangup) | Err(NetError::Shutdown) => {}
        Err(err) => tracing::warn!(%peer, error = %err, "File client dropped"),
    }
}

struct FileClient {
    stream: TcpStream,
    reader_id: u32,
}

impl FileClient {
    async fn read_u32(&mut self) -> NetResult<u32> {
        Ok(self.stream.read_u32_le().await?)
    }

    /// Prefix the reply body with its total size and send.
    async fn send_reply(&mut self, body: &[u8]) -> NetResult<()> {
        let mut framed = Vec::with_capacity(body.len() + 4);
        WriteBytesExt::write_u32::<LittleEndian>(&mut framed, (body.len() + 4) as u32)?;
        framed.extend_from_slice(body);
        self.stream.write_all(&framed).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

async fn client_loop(stream: TcpStream, server: &Arc<ShardServer>, peer: &str) -> NetResult<()> {
    let mut client = FileClient {
        stream,
        reader_id: 0,
    };

    // File header: size, build id, server type
    let size = client.read_u32().await?;
    if size != 12 {
        return Err(NetError::Protocol(format!("bad file header size {size}")));
    }
    client.read_u32().await?; // build id
    client.read_u32().await?; // server type

    loop {
        client.read_u32().await?; // message size (redundant over TCP)
        let msg_id = client.read_u32().await?;
        match msg_id {
            CLI_PING_REQUEST => {
                let ping_time = client.read_u32().await?;
                let mut body = Vec::new();
                WriteBytesExt::write_u32::<LittleEndian>(&mut body, SRV_PING_REPLY)?;
                WriteBytesExt::write_u32::<LittleEndian>(&mut body, ping_time)?;
                client.send_reply(&body).await?;
            }
            CLI_BUILD_ID_REQUEST => {
                let trans_id = client.read_u32().await?;
                let mut body = Vec::new();
                WriteBytesExt::write_u32::<LittleEndian>(&mut body, SRV_BUILD_ID_REPLY)?;
                WriteBytesExt::write_u32::<LittleEndian>(&mut body, trans_id)?;
                WriteBytesExt::write_u32::<LittleEndian>(&mut body, NetResultCode::NetSuccess.to_u32())?;
                WriteBytesExt::write_u32::<LittleEndian>(&mut body, server.config.build_id)?;
                client.send_reply(&body).await?;
            }
            CLI_MANIFEST_REQUEST => cb_manifest(&mut client, server, peer).await?,
            CLI_MANIFEST_ENTRY_ACK => {
                // TCP already guarantees delivery; drain and ignore.
                client.read_u32().await?; // trans id
                client.read_u32().await?; // reader id
            }
            CLI_DOWNLOAD_REQUEST | CLI_DOWNLOAD_CHUNK_ACK => {
                tracing::warn!(%peer, msg_id, "File download request not supported");
                return Err(NetError::Protocol("download not supported".to_string()));
            }
            unknown => {
                return Err(NetError::Protocol(format!(
                    "invalid file message id {unknown}"
                )));
            }
        }
    }
}

async fn cb_manifest(
    client: &mut FileClient,
    server: &Arc<ShardServer>,
    peer: &str,
) -> NetResult<()> {
    let trans_id = client.read_u32().await?;

    // Manifest name: fixed 260-unit UTF-16 block
    let mut name_units = [0u16; 260];
    for unit in &mut name_units {
        *unit = client.stream.read_u16_le().await?;
    }
    name_units[259] = 0;
    let end = name_units.iter().position(|&u| u == 0).unwrap_or(259);
    let mfs_name = String::from_utf16_lossy(&name_units[..end]);

    let build_id = client.read_u32().await?;
    if build_id != 0 && server.config.build_id != 0 && build_id != server.config.build_id {
        tracing::warn!(%peer, build_id, "Wrong build id in manifest request");
        return Err(NetError::Protocol("wrong build id".to_string()));
    }

    let mut body = Vec::new();
    WriteBytesExt::write_u32::<LittleEndian>(&mut body, SRV_MANIFEST_REPLY)?;
    WriteBytesExt::write_u32::<LittleEndian>(&mut body, trans_id)?;

    // Manifest names may not contain path characters.
    if mfs_name.contains(['.', '/', '\\', ':']) {
        tracing::warn!(%peer, manifest = %mfs_name, "Invalid manifest request");
        WriteBytesExt::write_u32::<LittleEndian>(&mut body, NetResultCode::NetFileNotFound.to_u32())?;
        WriteBytesExt::write_u32::<LittleEndian>(&mut body, 0)?; // Reader ID
        WriteBytesExt::write_u32::<LittleEndian>(&mut body, 0)?; // File count
        WriteBytesExt::write_u32::<LittleEndian>(&mut body, 0)?; // Data packet size
        return client.send_reply(&body).await;
    }

    let path = PathBuf::from(&server.config.file_root).join(format!("{mfs_name}.mfs"));
    match FileManifest::load(&path) {
        Ok(manifest) => {
            client.reader_id += 1;
            WriteBytesExt::write_u32::<LittleEndian>(&mut body, NetResultCode::NetSuccess.to_u32())?;
            WriteBytesExt::write_u32::<LittleEndian>(&mut body, client.reader_id)?;
            WriteBytesExt::write_u32::<LittleEndian>(&mut body, manifest.file_count())?;
            let size_slot = body.len();
            WriteBytesExt::write_u32::<LittleEndian>(&mut body, 0)?;
            let data_size = manifest.encode(&mut body)?;
            body[size_slot..size_slot + 4].copy_from_slice(&data_size.to_le_bytes());
        }
        Err(_) => {
            tracing::warn!(%peer, manifest = %path.display().to_string(), "Requested missing manifest");
            WriteBytesExt::write_u32::<LittleEndian>(&mut body, NetResultCode::NetFileNotFound.to_u32())?;
            WriteBytesExt::write_u32::<LittleEndian>(&mut body, 0)?;
            WriteBytesExt::write_u32::<LittleEndian>(&mut body, 0)?;
            WriteBytesExt::write_u32::<LittleEndian>(&mut body, 0)?;
        }
    }
    client.send_reply(&body).await
}
