//! Game service client pump: handshake, join, and buffer propagation.

use std::sync::Arc;

use byteorder::{LittleEndian, WriteBytesExt};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use super::host;
use super::{GameClient, HostHandle, HostMessage};
use crate::auth::{AuthMessage, DaemonReply};
use crate::errors::{NetError, NetResult, NetResultCode};
use crate::net::channel::ReplyPort;
use crate::net::crypt::{self, CryptRead};
use crate::net::wait_for_shutdown;
use crate::server::ShardServer;

const CLI_PING_REQUEST: u16 = 0;
const CLI_JOIN_AGE_REQUEST: u16 = 1;
const CLI_PROPAGATE_BUFFER: u16 = 2;
const CLI_GAME_MGR_MSG: u16 = 3;

const SRV_PING_REPLY: u16 = 0;
const SRV_JOIN_AGE_REPLY: u16 = 1;

pub async fn run_client(stream: TcpStream, server: Arc<ShardServer>) {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());
    let _guard = server.game_clients.register();
    let mut shutdown_rx = server.shutdown.subscribe();

    let mut session = Session {
        server: server.clone(),
        host: None,
        client: None,
        reply_port: ReplyPort::new(),
        peer: peer.clone(),
    };

    let result = tokio::select! {
        result = session.run(stream) => result,
        () = wait_for_shutdown(&mut shutdown_rx) => Err(NetError::Shutdown),
    };

    match &result {
        Ok(()) | Err(NetError::Hangup) | Err(NetError::Shutdown) => {}
        Err(err) => tracing::warn!(%peer, error = %err, "Game client dropped"),
    }

    // Detach from the host on every exit path.
    if let (Some(host), Some(client)) = (&session.host, &session.client) {
        let player_id = client.player_id();
        host.clients.lock().await.remove(&player_id);
        host.channel.post(HostMessage::Disconnect {
            player_id,
            reply: session.reply_port.guard(DaemonReply::internal_error()),
        });
        let _ = session.reply_port.recv().await;
    }
}

struct Session {
    server: Arc<ShardServer>,
    host: Option<HostHandle>,
    client: Option<Arc<GameClient>>,
    reply_port: ReplyPort<DaemonReply>,
    peer: String,
}

impl Session {
    async fn run(&mut self, stream: TcpStream) -> NetResult<()> {
        let (mut read_half, write_half) = stream.into_split();

        // Game header: size, account uuid, age instance uuid
        let mut header = [0u8; 36];
        read_half.read_exact(&mut header).await?;
        let size = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        if size != 36 {
            return Err(NetError::Protocol(format!("bad game header size {size}")));
        }
        let client_uuid = crate::types::read_uuid(&mut std::io::Cursor::new(&header[4..20]))?;

        let keys = self
            .server
            .config
            .game_keys
            .as_ref()
            .ok_or(NetError::Shutdown)?;
        let (mut read, write) = crypt::establish(read_half, write_half, keys).await?;

        let client = Arc::new(GameClient::new(client_uuid, write));
        self.client = Some(client.clone());

        loop {
            let msg_id = read.read_u16().await?;
            match msg_id {
                CLI_PING_REQUEST => {
                    let ping_time = read.read_u32().await?;
                    let mut reply = Vec::new();
                    reply.write_u16::<LittleEndian>(SRV_PING_REPLY)?;
                    reply.write_u32::<LittleEndian>(ping_time)?;
                    client.send(&reply).await?;
                }
                CLI_JOIN_AGE_REQUEST => self.cb_join(&mut read, &client).await?,
                CLI_PROPAGATE_BUFFER => {
                    let Some(host) = &self.host else {
                        return Err(NetError::Protocol(
                            "propagate before joining an age".to_string(),
                        ));
                    };
                    let msg_type = read.read_u32().await?;
                    let size = read.read_u32().await? as usize;
                    if size > 0x100000 {
                        return Err(NetError::Malformed("oversized propagate buffer"));
                    }
                    let buffer = read.read_buffer(size).await?;
                    host.channel.post(HostMessage::Propagate {
                        client: client.clone(),
                        msg_type,
                        buffer,
                        reply: self.reply_port.guard(DaemonReply::internal_error()),
                    });
                    self.reply_port.recv().await?;
                }
                CLI_GAME_MGR_MSG => {
                    if self.host.is_none() {
                        return Err(NetError::Protocol(
                            "game mgr message before joining an age".to_string(),
                        ));
                    }
                    let size = read.read_u32().await? as usize;
                    if size > 0x100000 {
                        return Err(NetError::Malformed("oversized game mgr message"));
                    }
                    let buffer = read.read_buffer(size).await?;
                    tracing::debug!(peer = %self.peer, bytes = buffer.len(),
                                    payload = ?buffer, "Game manager message ignored");
                }
                unknown => {
                    return Err(NetError::Protocol(format!(
                        "invalid game message id {unknown}"
                    )));
                }
            }
        }
    }

    async fn cb_join<R>(
        &mut self,
        read: &mut CryptRead<R>,
        client: &Arc<GameClient>,
    ) -> NetResult<()>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let trans_id = read.read_u32().await?;
        let mcp_id = read.read_u32().await?;
        let _client_id = read.read_uuid().await?;
        let player_id = read.read_u32().await?;

        if player_id == 0 {
            return self
                .send_join_reply(client, trans_id, NetResultCode::NetInvalidParameter)
                .await;
        }

        // Player display name comes from the vault node.
        self.server.auth_channel.post(AuthMessage::VaultFetchNode {
            node_id: player_id,
            reply: self.reply_port.guard(DaemonReply::internal_error()),
        });
        let player_name = match self.reply_port.recv().await? {
            DaemonReply::NodeFetched {
                code: NetResultCode::NetSuccess,
                node,
            } => node.istring64_1().to_string(),
            other => {
                return self.send_join_reply(client, trans_id, other.code()).await;
            }
        };

        let host = match host::find_or_start(&self.server.hosts, &self.server, mcp_id).await {
            Ok(host) => host,
            Err(err) => {
                tracing::warn!(mcp_id, error = %err, "No game host for join");
                return self
                    .send_join_reply(client, trans_id, NetResultCode::NetAgeNotFound)
                    .await;
            }
        };

        if let Ok(mut info) = client.info.lock() {
            info.set_player_id(player_id);
            info.set_player_name(&player_name);
            info.set_ccr_level(0);
        }

        host.channel.post(HostMessage::JoinAge {
            client: client.clone(),
            reply: self.reply_port.guard(DaemonReply::internal_error()),
        });
        let code = self.reply_port.recv().await?.code();

        self.send_join_reply(client, trans_id, code).await?;

        if code == NetResultCode::NetSuccess {
            host.clients.lock().await.insert(player_id, client.clone());
            self.host = Some(host);
        }
        Ok(())
    }

    async fn send_join_reply(
        &self,
        client: &Arc<GameClient>,
        trans_id: u32,
        code: NetResultCode,
    ) -> NetResult<()> {
        let mut reply = Vec::new();
        reply.write_u16::<LittleEndian>(SRV_JOIN_AGE_REPLY)?;
        reply.write_u32::<LittleEndian>(trans_id)?;
        reply.write_u32::<LittleEndian>(code.to_u32())?;
        client.send(&reply).await
    }
}
