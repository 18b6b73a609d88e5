//! Per-age-instance host: owns the client table for one running age, fans
//! out game messages, and reconciles SDL state with the vault.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use byteorder::{LittleEndian, WriteBytesExt};
use sqlx::{Connection, PgConnection, Row};
use uuid::Uuid;

use super::{GameClient, HostHandle, HostMessage, HostRegistry};
use crate::auth::{AuthMessage, DaemonReply};
use crate::errors::{NetError, NetResult, NetResultCode};
use crate::net::channel::{msg_channel, MsgPump, ReplyPort};
use crate::plasma::factory::{read_creatable, write_creatable, Creatable};
use crate::plasma::key::{Location, Uoid};
use crate::plasma::messages::{server_reply, Message, ServerReplyMsg};
use crate::plasma::net_messages::game_message::NetMsgGameMessage;
use crate::plasma::net_messages::members::{MemberInfo, NetMsgMembersList};
use crate::plasma::net_messages::sdl_state::NetMsgSdlState;
use crate::plasma::net_messages::{
    content_flags, NetMessage, NetMsgGroupOwner, NetMsgInitialAgeStateSent,
};
use crate::plasma::streams::{StreamRead, StreamWrite};
use crate::server::ShardServer;
use crate::vault::VaultNode;

const SRV_PROPAGATE_BUFFER: u16 = 2;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

pub struct GameHost {
    mcp_id: u32,
    instance_uuid: Uuid,
    age_filename: String,
    sdl_node: u32,
    age_sdl: Vec<u8>,
    conn: PgConnection,
    server: Arc<ShardServer>,
    clients: Arc<tokio::sync::Mutex<HashMap<u32, Arc<GameClient>>>>,
    reply_port: ReplyPort<DaemonReply>,
}

/// Fetch the host for an age instance, starting one if needed. The registry
/// lock is held across startup, so exactly one host exists per mcp id.
pub async fn find_or_start(
    registry: &HostRegistry,
    server: &Arc<ShardServer>,
    mcp_id: u32,
) -> NetResult<HostHandle> {
    let mut hosts = registry.lock().await;
    if let Some(handle) = hosts.get(&mcp_id) {
        return Ok(handle.clone());
    }

    let host = GameHost::start(server.clone(), mcp_id).await?;
    let (channel, pump) = msg_channel();
    let handle = HostHandle {
        mcp_id,
        channel,
        clients: host.clients.clone(),
    };
    hosts.insert(mcp_id, handle.clone());
    drop(hosts);

    let registry = registry.clone();
    tokio::spawn(async move {
        host.run(pump).await;
        registry.lock().await.remove(&mcp_id);
    });
    Ok(handle)
}

impl GameHost {
    async fn start(server: Arc<ShardServer>, mcp_id: u32) -> NetResult<Self> {
        let mut conn = PgConnection::connect(&server.config.db.url())
            .await
            .map_err(|err| {
                tracing::error!(error = %err, "Game host database connection failed");
                NetError::Shutdown
            })?;

        let row = sqlx::query(
            "SELECT \"AgeUuid\", \"AgeFilename\", \"AgeIdx\", \"SdlIdx\" \
             FROM game.\"Servers\" WHERE idx = $1",
        )
        .bind(mcp_id as i32)
        .fetch_optional(&mut conn)
        .await
        .map_err(|err| {
            tracing::error!(mcp_id, error = %err, "Game server row lookup failed");
            NetError::Shutdown
        })?;
        let Some(row) = row else {
            tracing::warn!(mcp_id, "Age MCP not found");
            return Err(NetError::Protocol(format!("age mcp {mcp_id} not found")));
        };

        let instance_uuid: Uuid = row.get(0);
        let age_filename: String = row.get(1);
        let sdl_node = row.get::<i32, _>(3) as u32;

        // The age SDL blob lives in the vault; fetch it through the daemon.
        let mut reply_port = ReplyPort::new();
        server.auth_channel.post(AuthMessage::VaultFetchNode {
            node_id: sdl_node,
            reply: reply_port.guard(DaemonReply::internal_error()),
        });
        let age_sdl = match reply_port.recv().await? {
            DaemonReply::NodeFetched {
                code: NetResultCode::NetSuccess,
                node,
            } => node.blob_1().to_vec(),
            other => {
                tracing::error!(mcp_id, code = ?other.code(), "Error fetching age SDL");
                return Err(NetError::Protocol("age SDL unavailable".to_string()));
            }
        };

        tracing::info!(mcp_id, age = %age_filename, instance = %instance_uuid,
                       "Game host starting");
        Ok(Self {
            mcp_id,
            instance_uuid,
            age_filename,
            sdl_node,
            age_sdl,
            conn,
            server,
            clients: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
            reply_port,
        })
    }

    async fn run(mut self, mut pump: MsgPump<HostMessage>) {
        let mut cleanup = tokio::time::interval(CLEANUP_INTERVAL);
        cleanup.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        cleanup.tick().await; // First tick completes immediately

        loop {
            let message = tokio::select! {
                message = pump.next() => message,
                _ = cleanup.tick() => Some(HostMessage::Cleanup),
            };
            let Some(message) = message else { break };

            match message {
                HostMessage::Shutdown => break,
                HostMessage::Cleanup => self.write_back_sdl().await,
                HostMessage::JoinAge { client, reply } => {
                    match self.join(&client).await {
                        Ok(()) => reply.send(DaemonReply::Result(NetResultCode::NetSuccess)),
                        Err(err) => {
                            tracing::warn!(error = %err, "Join failed");
                            reply.send(DaemonReply::internal_error());
                        }
                    }
                }
                HostMessage::Propagate {
                    client,
                    msg_type,
                    buffer,
                    reply,
                } => {
                    match self.dispatch(&client, msg_type, &buffer).await {
                        Ok(()) => reply.send(DaemonReply::Result(NetResultCode::NetSuccess)),
                        Err(err) => {
                            tracing::warn!(msg_type, error = %err, "Ignoring game message");
                            reply.send(DaemonReply::internal_error());
                        }
                    }
                }
                HostMessage::Disconnect { player_id, reply } => {
                    self.clients.lock().await.remove(&player_id);
                    reply.send(DaemonReply::Result(NetResultCode::NetSuccess));
                }
            }
        }

        self.write_back_sdl().await;
        tracing::info!(mcp_id = self.mcp_id, instance = %self.instance_uuid,
                       "Game host stopped");
    }

    /// Serialize a net message once, in the propagate-buffer frame.
    fn frame_message(&self, msg: &Creatable) -> NetResult<Vec<u8>> {
        let mut buffer = Vec::new();
        buffer.write_u16::<LittleEndian>(SRV_PROPAGATE_BUFFER)?;
        buffer.write_u32::<LittleEndian>(u32::from(msg.class_id()))?;
        buffer.write_u32::<LittleEndian>(0)?;
        write_creatable(&mut buffer, Some(msg))?;
        let size = (buffer.len() - 10) as u32;
        buffer[6..10].copy_from_slice(&size.to_le_bytes());
        Ok(buffer)
    }

    /// Send to every client except `sender`. Send failures on one recipient
    /// do not affect the rest.
    async fn propagate(&self, msg: &Creatable, sender: u32) -> NetResult<()> {
        let buffer = self.frame_message(msg)?;
        let clients = self.clients.lock().await;
        for (player_id, client) in clients.iter() {
            if *player_id == sender {
                continue;
            }
            if let Err(err) = client.send(&buffer).await {
                tracing::debug!(player_id, error = %err, "Propagate send failed");
            }
        }
        Ok(())
    }

    /// Send to an explicit receiver list, skipping anyone not attached here.
    async fn propagate_to(&self, msg: &Creatable, receivers: &[u32]) -> NetResult<()> {
        let buffer = self.frame_message(msg)?;
        let clients = self.clients.lock().await;
        for receiver in receivers {
            if let Some(client) = clients.get(receiver) {
                if let Err(err) = client.send(&buffer).await {
                    tracing::debug!(player_id = receiver, error = %err, "Directed send failed");
                }
            }
        }
        Ok(())
    }

    async fn send_to_client(&self, client: &GameClient, msg: &Creatable) -> NetResult<()> {
        let buffer = self.frame_message(msg)?;
        client.send(&buffer).await
    }

    /// Joining clients get told they own their net group.
    async fn join(&mut self, client: &Arc<GameClient>) -> NetResult<()> {
        let group = NetMsgGroupOwner {
            base: NetMessage::with_flags(
                content_flags::HAS_TIME_SENT
                    | content_flags::IS_SYSTEM_MESSAGE
                    | content_flags::NEEDS_RELIABLE_SEND,
            ),
            groups: vec![(Default::default(), true)],
        };
        self.send_to_client(client, &Creatable::NetMsgGroupOwner(Box::new(group)))
            .await
    }

    async fn dispatch(
        &mut self,
        client: &Arc<GameClient>,
        msg_type: u32,
        buffer: &[u8],
    ) -> NetResult<()> {
        let mut cursor = Cursor::new(buffer);
        let Some(netmsg) = read_creatable(&mut cursor)? else {
            return Err(NetError::Malformed("null propagate buffer"));
        };
        if u32::from(netmsg.class_id()) != msg_type {
            tracing::debug!(
                msg_type,
                class_id = netmsg.class_id(),
                "Propagate type tag does not match payload"
            );
        }
        let sender = client.player_id();

        match *netmsg {
            Creatable::NetMsgPagingRoom(msg) => {
                self.propagate(&Creatable::NetMsgPagingRoom(msg), sender).await
            }
            Creatable::NetMsgGameStateRequest(_) => self.send_game_state(client).await,
            Creatable::NetMsgGameMessage(mut msg) => {
                if msg.make_safe_for_net() {
                    self.propagate(&Creatable::NetMsgGameMessage(msg), sender).await
                } else {
                    tracing::warn!(sender, "Dropping unsafe game message");
                    Ok(())
                }
            }
            Creatable::NetMsgGameMessageDirected(mut msg) => {
                if msg.game_message.make_safe_for_net() {
                    let mut receivers = msg.receivers.clone();
                    receivers.retain(|receiver| *receiver != sender);
                    self.propagate_to(&Creatable::NetMsgGameMessageDirected(msg), &receivers)
                        .await
                } else {
                    tracing::warn!(sender, "Dropping unsafe directed game message");
                    Ok(())
                }
            }
            Creatable::NetMsgTestAndSet(msg) => self.test_and_set(client, &msg.object).await,
            Creatable::NetMsgMembersListReq(_) => self.send_members(client).await,
            Creatable::NetMsgSdlState(msg) => self.read_sdl(client, *msg, false).await,
            Creatable::NetMsgSdlStateBCast(msg) => self.read_sdl(client, *msg, true).await,
            Creatable::NetMsgRelevanceRegions(msg) => {
                // Stored but not used for filtering.
                if let Ok(mut regions) = client.relevance_regions.lock() {
                    *regions = (msg.regions_i_care_about, msg.regions_i_am_in);
                }
                Ok(())
            }
            Creatable::NetMsgLoadClone(msg) => {
                if let Ok(mut key) = client.client_key.lock() {
                    *key = msg.object.clone();
                }
                self.propagate(&Creatable::NetMsgLoadClone(msg), sender).await
            }
            Creatable::NetMsgPlayerPage(_) => {
                // Acknowledged only.
                Ok(())
            }
            other => {
                tracing::warn!(class_id = other.class_id(), "Unhandled game message");
                Ok(())
            }
        }
    }

    /// Initial age state: the age SDL, every persisted object state, then
    /// the count.
    async fn send_game_state(&mut self, client: &Arc<GameClient>) -> NetResult<()> {
        let mut states = 0u32;

        if !self.age_sdl.is_empty() {
            let seq_prefix = self
                .server
                .ages
                .get(&self.age_filename)
                .map_or(0, |age| age.seq_prefix);
            let state = NetMsgSdlState {
                base: NetMessage::with_flags(
                    content_flags::HAS_TIME_SENT | content_flags::NEEDS_RELIABLE_SEND,
                ),
                object: Uoid {
                    location: Location::make(seq_prefix, -2, crate::plasma::key::location_flags::BUILT_IN),
                    name: "AgeSDLHook".to_string(),
                    object_type: 1, // SceneObject
                    id: 1,
                    ..Default::default()
                },
                sdl_blob: self.age_sdl.clone(),
                is_initial: true,
                persist_on_server: true,
                is_avatar: false,
                ..Default::default()
            };
            self.send_to_client(client, &Creatable::NetMsgSdlState(Box::new(state)))
                .await?;
            states += 1;
        }

        let rows = sqlx::query(
            "SELECT \"ObjectKey\", \"SdlBlob\" FROM game.\"AgeStates\" WHERE \"ServerIdx\" = $1",
        )
        .bind(self.mcp_id as i32)
        .fetch_all(&mut self.conn)
        .await;
        match rows {
            Ok(rows) => {
                for row in rows {
                    let object_key: String = row.get(0);
                    let sdl_blob: String = row.get(1);
                    let (Ok(key_bytes), Ok(blob)) =
                        (BASE64.decode(&object_key), BASE64.decode(&sdl_blob))
                    else {
                        tracing::error!(mcp_id = self.mcp_id, "Corrupt persisted age state");
                        continue;
                    };
                    let object = Uoid::stream_read(&mut Cursor::new(key_bytes))?;
                    let state = NetMsgSdlState {
                        base: NetMessage::with_flags(
                            content_flags::HAS_TIME_SENT | content_flags::NEEDS_RELIABLE_SEND,
                        ),
                        object,
                        sdl_blob: blob,
                        is_initial: true,
                        persist_on_server: true,
                        is_avatar: false,
                        ..Default::default()
                    };
                    self.send_to_client(client, &Creatable::NetMsgSdlState(Box::new(state)))
                        .await?;
                    states += 1;
                }
            }
            Err(err) => {
                tracing::error!(mcp_id = self.mcp_id, error = %err, "Age state query failed");
            }
        }

        let done = NetMsgInitialAgeStateSent {
            base: NetMessage::with_flags(
                content_flags::HAS_TIME_SENT
                    | content_flags::IS_SYSTEM_MESSAGE
                    | content_flags::NEEDS_RELIABLE_SEND,
            ),
            num_states: states,
        };
        self.send_to_client(client, &Creatable::NetMsgInitialAgeStateSent(Box::new(done)))
            .await
    }

    /// Incoming SDL delta. The AgeSDLHook object is the in-memory age SDL;
    /// anything else persists per object key.
    async fn read_sdl(
        &mut self,
        client: &Arc<GameClient>,
        state: NetMsgSdlState,
        broadcast: bool,
    ) -> NetResult<()> {
        if state.object.name == "AgeSDLHook" {
            self.age_sdl = state.sdl_blob.clone();
        } else if state.persist_on_server {
            let mut key_buffer = Vec::new();
            state.object.stream_write(&mut key_buffer)?;
            let object_key = BASE64.encode(&key_buffer);
            let blob = BASE64.encode(&state.sdl_blob);

            let existing = sqlx::query(
                "SELECT idx FROM game.\"AgeStates\" \
                 WHERE \"ServerIdx\" = $1 AND \"ObjectKey\" = $2",
            )
            .bind(self.mcp_id as i32)
            .bind(&object_key)
            .fetch_optional(&mut self.conn)
            .await;
            match existing {
                Ok(Some(row)) => {
                    let idx: i32 = row.get(0);
                    if let Err(err) =
                        sqlx::query("UPDATE game.\"AgeStates\" SET \"SdlBlob\" = $2 WHERE idx = $1")
                            .bind(idx)
                            .bind(&blob)
                            .execute(&mut self.conn)
                            .await
                    {
                        tracing::error!(error = %err, "Age state update failed");
                        return Ok(());
                    }
                }
                Ok(None) => {
                    if let Err(err) = sqlx::query(
                        "INSERT INTO game.\"AgeStates\" (\"ServerIdx\", \"ObjectKey\", \"SdlBlob\") \
                         VALUES ($1, $2, $3)",
                    )
                    .bind(self.mcp_id as i32)
                    .bind(&object_key)
                    .bind(&blob)
                    .execute(&mut self.conn)
                    .await
                    {
                        tracing::error!(error = %err, "Age state insert failed");
                        return Ok(());
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "Age state lookup failed");
                    return Ok(());
                }
            }
        }

        if broadcast {
            let rebroadcast = NetMsgSdlState {
                base: NetMessage::with_flags(
                    content_flags::HAS_TIME_SENT | content_flags::NEEDS_RELIABLE_SEND,
                ),
                object: state.object,
                compression: 0,
                sdl_blob: state.sdl_blob,
                is_initial: false,
                persist_on_server: state.persist_on_server,
                is_avatar: state.is_avatar,
            };
            self.propagate(
                &Creatable::NetMsgSdlState(Box::new(rebroadcast)),
                client.player_id(),
            )
            .await?;
        }
        Ok(())
    }

    /// No real lock management: everyone always wins the lock.
    async fn test_and_set(&mut self, client: &Arc<GameClient>, object: &Uoid) -> NetResult<()> {
        let reply = ServerReplyMsg {
            base: Message {
                receivers: vec![crate::plasma::key::Key::from_uoid(object.clone())],
                bcast_flags: crate::plasma::messages::bcast_flags::LOCAL_PROPAGATE,
                ..Default::default()
            },
            reply: server_reply::AFFIRM,
        };
        let wrapper = NetMsgGameMessage {
            base: NetMessage::with_flags(
                content_flags::HAS_TIME_SENT | content_flags::NEEDS_RELIABLE_SEND,
            ),
            message: Some(Box::new(Creatable::ServerReplyMsg(Box::new(reply)))),
            ..Default::default()
        };
        self.send_to_client(client, &Creatable::NetMsgGameMessage(Box::new(wrapper)))
            .await
    }

    /// Members list: every other client that has a clone key set.
    async fn send_members(&mut self, client: &Arc<GameClient>) -> NetResult<()> {
        let player_id = client.player_id();
        let mut members = Vec::new();
        {
            let clients = self.clients.lock().await;
            for (other_id, other) in clients.iter() {
                if *other_id == player_id {
                    continue;
                }
                let avatar_key = other
                    .client_key
                    .lock()
                    .map(|key| key.clone())
                    .unwrap_or_default();
                if avatar_key == Uoid::default() {
                    continue;
                }
                let info = other
                    .info
                    .lock()
                    .map(|info| info.clone())
                    .unwrap_or_default();
                members.push(MemberInfo {
                    flags: 0,
                    client: info,
                    avatar_key,
                });
            }
        }

        let mut base = NetMessage::with_flags(
            content_flags::HAS_TIME_SENT
                | content_flags::HAS_PLAYER_ID
                | content_flags::IS_SYSTEM_MESSAGE
                | content_flags::NEEDS_RELIABLE_SEND,
        );
        base.player_id = player_id;
        let list = NetMsgMembersList { base, members };
        self.send_to_client(client, &Creatable::NetMsgMembersList(Box::new(list)))
            .await
    }

    /// Write the in-memory age SDL back to its vault node.
    async fn write_back_sdl(&mut self) {
        if self.age_sdl.is_empty() {
            return;
        }
        let mut node = VaultNode::default();
        node.set_node_id(self.sdl_node);
        node.set_blob_1(&self.age_sdl);
        self.server.auth_channel.post(AuthMessage::VaultUpdateNode {
            node: Box::new(node),
            revision: Uuid::new_v4(),
            reply: self.reply_port.guard(DaemonReply::internal_error()),
        });
        match self.reply_port.recv().await {
            Ok(reply) if reply.code() == NetResultCode::NetSuccess => {}
            Ok(reply) => {
                tracing::error!(code = ?reply.code(), "Error writing age SDL back to vault");
            }
            Err(_) => tracing::error!("Auth daemon unavailable for SDL write-back"),
        }
    }
}
