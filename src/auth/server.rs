//! Auth service client pump.

use std::io::Write;
use std::sync::Arc;

use byteorder::{LittleEndian, WriteBytesExt};
use rand::Rng;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use uuid::Uuid;

use super::{AgeInitRequest, AuthMessage, DaemonReply, PlayerInfo};
use crate::errors::{NetError, NetResult, NetResultCode};
use crate::gate::write_wide_string;
use crate::net::channel::ReplyPort;
use crate::net::crypt::{self, CryptRead, CryptWrite};
use crate::net::wait_for_shutdown;
use crate::server::ShardServer;
use crate::types::sha::ShaDigest;
use crate::types::write_uuid;
use crate::vault::VaultNode;

// Client to auth message ids. The numbering is fixed by the legacy client.
const CLI_PING_REQUEST: u16 = 0;
const CLI_CLIENT_REGISTER_REQUEST: u16 = 1;
const CLI_ACCT_LOGIN_REQUEST: u16 = 3;
const CLI_ACCT_SET_PLAYER_REQUEST: u16 = 6;
const CLI_PLAYER_DELETE_REQUEST: u16 = 13;
const CLI_PLAYER_CREATE_REQUEST: u16 = 17;
const CLI_VAULT_NODE_CREATE: u16 = 25;
const CLI_VAULT_NODE_FETCH: u16 = 26;
const CLI_VAULT_NODE_SAVE: u16 = 27;
const CLI_VAULT_NODE_ADD: u16 = 29;
const CLI_VAULT_NODE_REMOVE: u16 = 30;
const CLI_VAULT_FETCH_NODE_REFS: u16 = 31;
const CLI_VAULT_INIT_AGE_REQUEST: u16 = 32;
const CLI_VAULT_NODE_FIND: u16 = 33;
const CLI_VAULT_SET_SEEN: u16 = 34;
const CLI_VAULT_SEND_NODE: u16 = 35;
const CLI_AGE_REQUEST: u16 = 36;
const CLI_GET_PUBLIC_AGE_LIST: u16 = 41;
const CLI_SET_AGE_PUBLIC: u16 = 42;
const CLI_LOG_PYTHON_TRACEBACK: u16 = 43;
const CLI_LOG_STACK_DUMP: u16 = 44;
const CLI_LOG_CLIENT_DEBUGGER_CONNECT: u16 = 45;

// Auth to client message ids.
const SRV_PING_REPLY: u16 = 0;
const SRV_CLIENT_REGISTER_REPLY: u16 = 3;
const SRV_ACCT_LOGIN_REPLY: u16 = 4;
const SRV_ACCT_PLAYER_INFO: u16 = 6;
const SRV_ACCT_SET_PLAYER_REPLY: u16 = 7;
const SRV_PLAYER_CREATE_REPLY: u16 = 16;
const SRV_PLAYER_DELETE_REPLY: u16 = 17;
const SRV_VAULT_NODE_CREATED: u16 = 23;
const SRV_VAULT_NODE_FETCHED: u16 = 24;
const SRV_VAULT_NODE_REFS_FETCHED: u16 = 29;
const SRV_VAULT_INIT_AGE_REPLY: u16 = 30;
const SRV_VAULT_NODE_FIND_REPLY: u16 = 31;
const SRV_VAULT_SAVE_NODE_REPLY: u16 = 32;
const SRV_VAULT_ADD_NODE_REPLY: u16 = 33;
const SRV_VAULT_REMOVE_NODE_REPLY: u16 = 34;
const SRV_AGE_REPLY: u16 = 35;
const SRV_PUBLIC_AGE_LIST: u16 = 40;

/// Per-connection session state.
struct AuthClient {
    read: CryptRead<OwnedReadHalf>,
    write: CryptWrite<OwnedWriteHalf>,
    reply_port: ReplyPort<DaemonReply>,
    server_challenge: u32,
    acct_uuid: Option<Uuid>,
    player: Option<PlayerInfo>,
    peer: String,
}

pub async fn run_client(stream: TcpStream, server: Arc<ShardServer>) {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());
    let _guard = server.auth_clients.register();
    let mut shutdown_rx = server.shutdown.subscribe();

    let result = tokio::select! {
        result = client_loop(stream, &server, peer.clone()) => result,
        () = wait_for_shutdown(&mut shutdown_rx) => Err(NetError::Shutdown),
    };

    match result {
        Ok(()) | Err(NetError::Hangup) | Err(NetError::Shutdown) => {}
        Err(err) => tracing::warn!(%peer, error = %err, "Auth client dropped"),
    }
}

async fn client_loop(stream: TcpStream, server: &Arc<ShardServer>, peer: String) -> NetResult<()> {
    let (mut read_half, write_half) = stream.into_split();

    // Auth header: size, (ignored) token uuid
    let mut header = [0u8; 20];
    tokio::io::AsyncReadExt::read_exact(&mut read_half, &mut header).await?;
    let size = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if size != 20 {
        return Err(NetError::Protocol(format!("bad auth header size {size}")));
    }

    let keys = server
        .config
        .auth_keys
        .as_ref()
        .ok_or(NetError::Shutdown)?;
    let (read, write) = crypt::establish(read_half, write_half, keys).await?;

    let mut client = AuthClient {
        read,
        write,
        reply_port: ReplyPort::new(),
        server_challenge: 0,
        acct_uuid: None,
        player: None,
        peer,
    };

    let result = pump_messages(&mut client, server).await;

    // Whatever ended the session, put the active player offline.
    if let Some(player) = &client.player {
        server.auth_channel.post(AuthMessage::Disconnect {
            player_id: player.player_id,
            reply: client.reply_port.guard(DaemonReply::internal_error()),
        });
        let _ = client.reply_port.recv().await;
    }
    result
}

async fn pump_messages(client: &mut AuthClient, server: &Arc<ShardServer>) -> NetResult<()> {
    loop {
        let msg_id = client.read.read_u16().await?;
        match msg_id {
            CLI_PING_REQUEST => cb_ping(client).await?,
            CLI_CLIENT_REGISTER_REQUEST => cb_register(client, server).await?,
            CLI_ACCT_LOGIN_REQUEST => cb_login(client, server).await?,
            CLI_ACCT_SET_PLAYER_REQUEST => cb_set_player(client, server).await?,
            CLI_PLAYER_CREATE_REQUEST => cb_create_player(client, server).await?,
            CLI_PLAYER_DELETE_REQUEST => cb_delete_player(client, server).await?,
            CLI_VAULT_NODE_CREATE => cb_node_create(client, server).await?,
            CLI_VAULT_NODE_FETCH => cb_node_fetch(client, server).await?,
            CLI_VAULT_NODE_SAVE => cb_node_save(client, server).await?,
            CLI_VAULT_NODE_ADD => cb_node_add(client, server).await?,
            CLI_VAULT_NODE_REMOVE => cb_node_remove(client, server).await?,
            CLI_VAULT_FETCH_NODE_REFS => cb_node_refs(client, server).await?,
            CLI_VAULT_INIT_AGE_REQUEST => cb_init_age(client, server).await?,
            CLI_VAULT_NODE_FIND => cb_node_find(client, server).await?,
            CLI_VAULT_SET_SEEN => {
                let parent = client.read.read_u32().await?;
                let child = client.read.read_u32().await?;
                let seen = client.read.read_u8().await? != 0;
                server.auth_channel.post(AuthMessage::VaultSetSeen {
                    parent,
                    child,
                    seen,
                });
            }
            CLI_VAULT_SEND_NODE => {
                // Inbox delivery is acknowledged but not routed.
                client.read.read_u32().await?; // node id
                client.read.read_u32().await?; // target player
            }
            CLI_AGE_REQUEST => cb_age_request(client, server).await?,
            CLI_GET_PUBLIC_AGE_LIST => cb_public_ages(client, server).await?,
            CLI_SET_AGE_PUBLIC => {
                let age_info_node = client.read.read_u32().await?;
                let public = client.read.read_u8().await? != 0;
                server.auth_channel.post(AuthMessage::SetAgePublic {
                    age_info_node,
                    public,
                });
            }
            CLI_LOG_PYTHON_TRACEBACK => {
                let traceback = client.read.read_wide_string().await?;
                tracing::warn!(peer = %client.peer, "Client python traceback:\n{traceback}");
            }
            CLI_LOG_STACK_DUMP => {
                let dump = client.read.read_wide_string().await?;
                tracing::warn!(peer = %client.peer, "Client stack dump:\n{dump}");
            }
            CLI_LOG_CLIENT_DEBUGGER_CONNECT => {
                client.read.read_u32().await?; // nothing useful
            }
            unknown => {
                return Err(NetError::Protocol(format!(
                    "invalid auth message id {unknown}"
                )));
            }
        }
    }
}

async fn cb_ping(client: &mut AuthClient) -> NetResult<()> {
    let ping_time = client.read.read_u32().await?;
    let trans_id = client.read.read_u32().await?;
    let payload_size = client.read.read_u32().await? as usize;
    if payload_size > 0x10000 {
        return Err(NetError::Malformed("oversized ping payload"));
    }
    let payload = client.read.read_buffer(payload_size).await?;

    let mut reply = Vec::new();
    reply.write_u16::<LittleEndian>(SRV_PING_REPLY)?;
    reply.write_u32::<LittleEndian>(ping_time)?;
    reply.write_u32::<LittleEndian>(trans_id)?;
    reply.write_u32::<LittleEndian>(payload_size as u32)?;
    reply.write_all(&payload)?;
    client.write.send(&reply).await
}

async fn cb_register(client: &mut AuthClient, server: &Arc<ShardServer>) -> NetResult<()> {
    let build_id = client.read.read_u32().await?;
    if build_id != 0 && server.config.build_id != 0 && build_id != server.config.build_id {
        tracing::warn!(peer = %client.peer, build_id, "Wrong build id at register");
        return Err(NetError::Protocol("wrong build id".to_string()));
    }

    client.server_challenge = rand::thread_rng().gen();

    let mut reply = Vec::new();
    reply.write_u16::<LittleEndian>(SRV_CLIENT_REGISTER_REPLY)?;
    reply.write_u32::<LittleEndian>(client.server_challenge)?;
    client.write.send(&reply).await
}

async fn cb_login(client: &mut AuthClient, server: &Arc<ShardServer>) -> NetResult<()> {
    let trans_id = client.read.read_u32().await?;
    let client_challenge = client.read.read_u32().await?;
    let acct_name = client.read.read_wide_string().await?;
    let hash_bytes = client.read.read_buffer(20).await?;
    let mut hash_array = [0u8; 20];
    hash_array.copy_from_slice(&hash_bytes);
    let pass_hash = ShaDigest::from_bytes(hash_array);
    let _auth_token = client.read.read_wide_string().await?;
    let _os = client.read.read_wide_string().await?;

    server.auth_channel.post(AuthMessage::ClientLogin {
        acct_name,
        pass_hash,
        server_challenge: client.server_challenge,
        client_challenge,
        reply: client.reply_port.guard(DaemonReply::internal_error()),
    });
    let reply = client.reply_port.recv().await?;

    let (acct_uuid, acct_flags, billing_type, players) = match reply {
        DaemonReply::Login {
            code: NetResultCode::NetSuccess,
            acct_uuid,
            acct_flags,
            billing_type,
            players,
        } => (acct_uuid, acct_flags, billing_type, players),
        other => {
            let mut buffer = Vec::new();
            buffer.write_u16::<LittleEndian>(SRV_ACCT_LOGIN_REPLY)?;
            buffer.write_u32::<LittleEndian>(trans_id)?;
            buffer.write_u32::<LittleEndian>(other.code().to_u32())?;
            write_uuid(&mut buffer, &Uuid::nil())?;
            buffer.write_u32::<LittleEndian>(0)?;
            buffer.write_u32::<LittleEndian>(0)?;
            buffer.write_all(&[0u8; 16])?;
            return client.write.send(&buffer).await;
        }
    };

    client.acct_uuid = Some(acct_uuid);

    // One player record per avatar, then the final login reply.
    for player in &players {
        let mut buffer = Vec::new();
        buffer.write_u16::<LittleEndian>(SRV_ACCT_PLAYER_INFO)?;
        buffer.write_u32::<LittleEndian>(trans_id)?;
        buffer.write_u32::<LittleEndian>(player.player_id)?;
        write_wide_string(&mut buffer, &player.player_name);
        write_wide_string(&mut buffer, &player.avatar_shape);
        buffer.write_u32::<LittleEndian>(player.explorer)?;
        client.write.send(&buffer).await?;
    }

    let mut buffer = Vec::new();
    buffer.write_u16::<LittleEndian>(SRV_ACCT_LOGIN_REPLY)?;
    buffer.write_u32::<LittleEndian>(trans_id)?;
    buffer.write_u32::<LittleEndian>(NetResultCode::NetSuccess.to_u32())?;
    write_uuid(&mut buffer, &acct_uuid)?;
    buffer.write_u32::<LittleEndian>(acct_flags)?;
    buffer.write_u32::<LittleEndian>(billing_type)?;
    buffer.write_all(&server.config.wdys_key)?;
    client.write.send(&buffer).await
}

async fn cb_set_player(client: &mut AuthClient, server: &Arc<ShardServer>) -> NetResult<()> {
    let trans_id = client.read.read_u32().await?;
    let player_id = client.read.read_u32().await?;

    let code = if player_id == 0 {
        // Deselecting the active player is always fine.
        client.player = None;
        NetResultCode::NetSuccess
    } else if let Some(acct_uuid) = client.acct_uuid {
        server.auth_channel.post(AuthMessage::SetPlayer {
            acct_uuid,
            player_id,
            reply: client.reply_port.guard(DaemonReply::internal_error()),
        });
        match client.reply_port.recv().await? {
            DaemonReply::Player {
                code: NetResultCode::NetSuccess,
                player,
            } => {
                client.player = Some(player);
                NetResultCode::NetSuccess
            }
            other => {
                client.player = None;
                other.code()
            }
        }
    } else {
        NetResultCode::NetAuthenticationFailed
    };

    let mut reply = Vec::new();
    reply.write_u16::<LittleEndian>(SRV_ACCT_SET_PLAYER_REPLY)?;
    reply.write_u32::<LittleEndian>(trans_id)?;
    reply.write_u32::<LittleEndian>(code.to_u32())?;
    client.write.send(&reply).await
}

async fn cb_create_player(client: &mut AuthClient, server: &Arc<ShardServer>) -> NetResult<()> {
    let trans_id = client.read.read_u32().await?;
    let player_name = client.read.read_wide_string().await?;
    let avatar_shape = client.read.read_wide_string().await?;
    let _friend_invite = client.read.read_wide_string().await?;

    let reply = if let Some(acct_uuid) = client.acct_uuid {
        server.auth_channel.post(AuthMessage::CreatePlayer {
            acct_uuid,
            player_name,
            avatar_shape,
            reply: client.reply_port.guard(DaemonReply::internal_error()),
        });
        client.reply_port.recv().await?
    } else {
        DaemonReply::Result(NetResultCode::NetAuthenticationFailed)
    };

    let mut buffer = Vec::new();
    buffer.write_u16::<LittleEndian>(SRV_PLAYER_CREATE_REPLY)?;
    buffer.write_u32::<LittleEndian>(trans_id)?;
    match reply {
        DaemonReply::Player {
            code: NetResultCode::NetSuccess,
            player,
        } => {
            buffer.write_u32::<LittleEndian>(NetResultCode::NetSuccess.to_u32())?;
            buffer.write_u32::<LittleEndian>(player.player_id)?;
            buffer.write_u32::<LittleEndian>(player.explorer)?;
            write_wide_string(&mut buffer, &player.player_name);
            write_wide_string(&mut buffer, &player.avatar_shape);
        }
        other => {
            buffer.write_u32::<LittleEndian>(other.code().to_u32())?;
            buffer.write_u32::<LittleEndian>(0)?;
            buffer.write_u32::<LittleEndian>(0)?;
            write_wide_string(&mut buffer, "");
            write_wide_string(&mut buffer, "");
        }
    }
    client.write.send(&buffer).await
}

async fn cb_delete_player(client: &mut AuthClient, server: &Arc<ShardServer>) -> NetResult<()> {
    let trans_id = client.read.read_u32().await?;
    let player_id = client.read.read_u32().await?;

    let code = if let Some(acct_uuid) = client.acct_uuid {
        server.auth_channel.post(AuthMessage::DeletePlayer {
            acct_uuid,
            player_id,
            reply: client.reply_port.guard(DaemonReply::internal_error()),
        });
        client.reply_port.recv().await?.code()
    } else {
        NetResultCode::NetAuthenticationFailed
    };

    let mut reply = Vec::new();
    reply.write_u16::<LittleEndian>(SRV_PLAYER_DELETE_REPLY)?;
    reply.write_u32::<LittleEndian>(trans_id)?;
    reply.write_u32::<LittleEndian>(code.to_u32())?;
    client.write.send(&reply).await
}

async fn read_node_buffer(client: &mut AuthClient) -> NetResult<VaultNode> {
    let size = client.read.read_u32().await? as usize;
    if size > 0x100000 {
        return Err(NetError::Malformed("oversized vault node buffer"));
    }
    let buffer = client.read.read_buffer(size).await?;
    VaultNode::from_blob(&buffer)
}

async fn cb_node_create(client: &mut AuthClient, server: &Arc<ShardServer>) -> NetResult<()> {
    let trans_id = client.read.read_u32().await?;
    let node = read_node_buffer(client).await?;

    server.auth_channel.post(AuthMessage::VaultCreateNode {
        node: Box::new(node),
        reply: client.reply_port.guard(DaemonReply::internal_error()),
    });
    let reply = client.reply_port.recv().await?;

    let mut buffer = Vec::new();
    buffer.write_u16::<LittleEndian>(SRV_VAULT_NODE_CREATED)?;
    buffer.write_u32::<LittleEndian>(trans_id)?;
    match reply {
        DaemonReply::NodeCreated {
            code: NetResultCode::NetSuccess,
            node_id,
        } => {
            buffer.write_u32::<LittleEndian>(NetResultCode::NetSuccess.to_u32())?;
            buffer.write_u32::<LittleEndian>(node_id)?;
        }
        other => {
            buffer.write_u32::<LittleEndian>(other.code().to_u32())?;
            buffer.write_u32::<LittleEndian>(0)?;
        }
    }
    client.write.send(&buffer).await
}

async fn cb_node_fetch(client: &mut AuthClient, server: &Arc<ShardServer>) -> NetResult<()> {
    let trans_id = client.read.read_u32().await?;
    let node_id = client.read.read_u32().await?;

    server.auth_channel.post(AuthMessage::VaultFetchNode {
        node_id,
        reply: client.reply_port.guard(DaemonReply::internal_error()),
    });
    let reply = client.reply_port.recv().await?;

    let mut buffer = Vec::new();
    buffer.write_u16::<LittleEndian>(SRV_VAULT_NODE_FETCHED)?;
    buffer.write_u32::<LittleEndian>(trans_id)?;
    match reply {
        DaemonReply::NodeFetched {
            code: NetResultCode::NetSuccess,
            node,
        } => {
            let blob = node.to_blob()?;
            buffer.write_u32::<LittleEndian>(NetResultCode::NetSuccess.to_u32())?;
            buffer.write_u32::<LittleEndian>(blob.len() as u32)?;
            buffer.write_all(&blob)?;
        }
        other => {
            buffer.write_u32::<LittleEndian>(other.code().to_u32())?;
            buffer.write_u32::<LittleEndian>(0)?;
        }
    }
    client.write.send(&buffer).await
}

async fn cb_node_save(client: &mut AuthClient, server: &Arc<ShardServer>) -> NetResult<()> {
    let trans_id = client.read.read_u32().await?;
    let node_id = client.read.read_u32().await?;
    let revision_bytes = client.read.read_buffer(16).await?;
    let revision = {
        let mut cursor = std::io::Cursor::new(revision_bytes);
        crate::types::read_uuid(&mut cursor)?
    };
    let mut node = read_node_buffer(client).await?;
    node.set_node_id(node_id);

    server.auth_channel.post(AuthMessage::VaultUpdateNode {
        node: Box::new(node),
        revision,
        reply: client.reply_port.guard(DaemonReply::internal_error()),
    });
    let code = client.reply_port.recv().await?.code();

    let mut reply = Vec::new();
    reply.write_u16::<LittleEndian>(SRV_VAULT_SAVE_NODE_REPLY)?;
    reply.write_u32::<LittleEndian>(trans_id)?;
    reply.write_u32::<LittleEndian>(code.to_u32())?;
    client.write.send(&reply).await
}

async fn cb_node_add(client: &mut AuthClient, server: &Arc<ShardServer>) -> NetResult<()> {
    let trans_id = client.read.read_u32().await?;
    let parent = client.read.read_u32().await?;
    let child = client.read.read_u32().await?;
    let owner = client.read.read_u32().await?;

    server.auth_channel.post(AuthMessage::VaultRefNode {
        parent,
        child,
        owner,
        reply: client.reply_port.guard(DaemonReply::internal_error()),
    });
    let code = client.reply_port.recv().await?.code();

    let mut reply = Vec::new();
    reply.write_u16::<LittleEndian>(SRV_VAULT_ADD_NODE_REPLY)?;
    reply.write_u32::<LittleEndian>(trans_id)?;
    reply.write_u32::<LittleEndian>(code.to_u32())?;
    client.write.send(&reply).await
}

async fn cb_node_remove(client: &mut AuthClient, server: &Arc<ShardServer>) -> NetResult<()> {
    let trans_id = client.read.read_u32().await?;
    let parent = client.read.read_u32().await?;
    let child = client.read.read_u32().await?;

    server.auth_channel.post(AuthMessage::VaultUnrefNode {
        parent,
        child,
        reply: client.reply_port.guard(DaemonReply::internal_error()),
    });
    let code = client.reply_port.recv().await?.code();

    let mut reply = Vec::new();
    reply.write_u16::<LittleEndian>(SRV_VAULT_REMOVE_NODE_REPLY)?;
    reply.write_u32::<LittleEndian>(trans_id)?;
    reply.write_u32::<LittleEndian>(code.to_u32())?;
    client.write.send(&reply).await
}

async fn cb_node_refs(client: &mut AuthClient, server: &Arc<ShardServer>) -> NetResult<()> {
    let trans_id = client.read.read_u32().await?;
    let root = client.read.read_u32().await?;

    server.auth_channel.post(AuthMessage::VaultFetchNodeTree {
        root,
        reply: client.reply_port.guard(DaemonReply::internal_error()),
    });
    let reply = client.reply_port.recv().await?;

    let mut buffer = Vec::new();
    buffer.write_u16::<LittleEndian>(SRV_VAULT_NODE_REFS_FETCHED)?;
    buffer.write_u32::<LittleEndian>(trans_id)?;
    match reply {
        DaemonReply::NodeTree {
            code: NetResultCode::NetSuccess,
            refs,
        } => {
            buffer.write_u32::<LittleEndian>(NetResultCode::NetSuccess.to_u32())?;
            buffer.write_u32::<LittleEndian>(refs.len() as u32)?;
            for node_ref in refs {
                buffer.write_u32::<LittleEndian>(node_ref.parent)?;
                buffer.write_u32::<LittleEndian>(node_ref.child)?;
                buffer.write_u32::<LittleEndian>(node_ref.owner)?;
                buffer.write_u8(u8::from(node_ref.seen))?;
            }
        }
        other => {
            buffer.write_u32::<LittleEndian>(other.code().to_u32())?;
            buffer.write_u32::<LittleEndian>(0)?;
        }
    }
    client.write.send(&buffer).await
}

async fn cb_init_age(client: &mut AuthClient, server: &Arc<ShardServer>) -> NetResult<()> {
    let trans_id = client.read.read_u32().await?;
    let instance_uuid = client.read.read_uuid().await?;
    let parent_uuid = client.read.read_uuid().await?;
    let filename = client.read.read_wide_string().await?;
    let instance_name = client.read.read_wide_string().await?;
    let user_name = client.read.read_wide_string().await?;
    let description = client.read.read_wide_string().await?;
    let sequence_number = client.read.read_u32().await? as i32;
    let language = client.read.read_u32().await? as i32;

    server.auth_channel.post(AuthMessage::VaultInitAge {
        request: AgeInitRequest {
            instance_uuid,
            parent_uuid,
            filename,
            instance_name,
            user_name,
            description,
            sequence_number,
            language,
        },
        reply: client.reply_port.guard(DaemonReply::internal_error()),
    });
    let reply = client.reply_port.recv().await?;

    let mut buffer = Vec::new();
    buffer.write_u16::<LittleEndian>(SRV_VAULT_INIT_AGE_REPLY)?;
    buffer.write_u32::<LittleEndian>(trans_id)?;
    match reply {
        DaemonReply::AgeInit {
            code: NetResultCode::NetSuccess,
            age_node,
            age_info_node,
        } => {
            buffer.write_u32::<LittleEndian>(NetResultCode::NetSuccess.to_u32())?;
            buffer.write_u32::<LittleEndian>(age_node)?;
            buffer.write_u32::<LittleEndian>(age_info_node)?;
        }
        other => {
            buffer.write_u32::<LittleEndian>(other.code().to_u32())?;
            buffer.write_u32::<LittleEndian>(0)?;
            buffer.write_u32::<LittleEndian>(0)?;
        }
    }
    client.write.send(&buffer).await
}

async fn cb_node_find(client: &mut AuthClient, server: &Arc<ShardServer>) -> NetResult<()> {
    let trans_id = client.read.read_u32().await?;
    let template = read_node_buffer(client).await?;

    server.auth_channel.post(AuthMessage::VaultFindNode {
        template: Box::new(template),
        reply: client.reply_port.guard(DaemonReply::internal_error()),
    });
    let reply = client.reply_port.recv().await?;

    let mut buffer = Vec::new();
    buffer.write_u16::<LittleEndian>(SRV_VAULT_NODE_FIND_REPLY)?;
    buffer.write_u32::<LittleEndian>(trans_id)?;
    match reply {
        DaemonReply::NodesFound {
            code: NetResultCode::NetSuccess,
            ids,
        } => {
            buffer.write_u32::<LittleEndian>(NetResultCode::NetSuccess.to_u32())?;
            buffer.write_u32::<LittleEndian>(ids.len() as u32)?;
            for id in ids {
                buffer.write_u32::<LittleEndian>(id)?;
            }
        }
        other => {
            buffer.write_u32::<LittleEndian>(other.code().to_u32())?;
            buffer.write_u32::<LittleEndian>(0)?;
        }
    }
    client.write.send(&buffer).await
}

async fn cb_age_request(client: &mut AuthClient, server: &Arc<ShardServer>) -> NetResult<()> {
    let trans_id = client.read.read_u32().await?;
    let filename = client.read.read_wide_string().await?;
    let instance_uuid = client.read.read_uuid().await?;

    server.auth_channel.post(AuthMessage::FindGameServer {
        instance_uuid,
        filename,
        reply: client.reply_port.guard(DaemonReply::internal_error()),
    });
    let reply = client.reply_port.recv().await?;

    let mut buffer = Vec::new();
    buffer.write_u16::<LittleEndian>(SRV_AGE_REPLY)?;
    buffer.write_u32::<LittleEndian>(trans_id)?;
    match reply {
        DaemonReply::GameServer {
            code: NetResultCode::NetSuccess,
            mcp_id,
            instance_uuid,
            age_node,
        } => {
            buffer.write_u32::<LittleEndian>(NetResultCode::NetSuccess.to_u32())?;
            buffer.write_u32::<LittleEndian>(mcp_id)?;
            write_uuid(&mut buffer, &instance_uuid)?;
            buffer.write_u32::<LittleEndian>(age_node)?;
            buffer.write_u32::<LittleEndian>(game_server_addr(server))?;
        }
        other => {
            buffer.write_u32::<LittleEndian>(other.code().to_u32())?;
            buffer.write_u32::<LittleEndian>(0)?;
            write_uuid(&mut buffer, &Uuid::nil())?;
            buffer.write_u32::<LittleEndian>(0)?;
            buffer.write_u32::<LittleEndian>(0)?;
        }
    }
    client.write.send(&buffer).await
}

/// The advertised game server address as the packed IPv4 the client expects.
fn game_server_addr(server: &Arc<ShardServer>) -> u32 {
    server
        .config
        .game_server_addr
        .parse::<std::net::Ipv4Addr>()
        .map(u32::from)
        .unwrap_or(0)
}

async fn cb_public_ages(client: &mut AuthClient, server: &Arc<ShardServer>) -> NetResult<()> {
    let trans_id = client.read.read_u32().await?;
    let filename = client.read.read_wide_string().await?;

    server.auth_channel.post(AuthMessage::GetPublicAges {
        filename,
        reply: client.reply_port.guard(DaemonReply::internal_error()),
    });
    let reply = client.reply_port.recv().await?;

    let mut buffer = Vec::new();
    buffer.write_u16::<LittleEndian>(SRV_PUBLIC_AGE_LIST)?;
    buffer.write_u32::<LittleEndian>(trans_id)?;
    match reply {
        DaemonReply::PublicAges {
            code: NetResultCode::NetSuccess,
            ages,
        } => {
            buffer.write_u32::<LittleEndian>(NetResultCode::NetSuccess.to_u32())?;
            buffer.write_u32::<LittleEndian>(ages.len() as u32)?;
            for age in ages {
                write_uuid(&mut buffer, &age.uuid_1())?;
                write_wide_string(&mut buffer, age.string64_2());
                write_wide_string(&mut buffer, age.string64_3());
                write_wide_string(&mut buffer, age.string64_4());
                write_wide_string(&mut buffer, age.text_1());
                buffer.write_u32::<LittleEndian>(age.int32_1() as u32)?;
                buffer.write_u32::<LittleEndian>(age.int32_3() as u32)?;
                // Population counts are not tracked.
                buffer.write_u32::<LittleEndian>(0)?;
                buffer.write_u32::<LittleEndian>(0)?;
            }
        }
        other => {
            buffer.write_u32::<LittleEndian>(other.code().to_u32())?;
            buffer.write_u32::<LittleEndian>(0)?;
        }
    }
    client.write.send(&buffer).await
}
