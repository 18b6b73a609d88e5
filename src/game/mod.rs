//! Game service: per-age-instance hosts and the encrypted client sessions
//! attached to them.

pub mod age;
pub mod host;
pub mod server;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::net::channel::{MsgChannel, ReplyGuard};
use crate::plasma::key::Uoid;
use crate::plasma::net_messages::members::ClientGuid;
use crate::types::bit_vector::BitVector;

use crate::auth::DaemonReply;

/// Shared per-connection state the host needs to reach a client: its write
/// half and identity. The read half stays with the client task.
pub struct GameClient {
    pub client_uuid: Uuid,
    pub info: std::sync::Mutex<ClientGuid>,
    pub client_key: std::sync::Mutex<Uoid>,
    pub relevance_regions: std::sync::Mutex<(BitVector, BitVector)>,
    writer: Mutex<crate::net::crypt::CryptWrite<tokio::net::tcp::OwnedWriteHalf>>,
}

impl GameClient {
    pub fn new(
        client_uuid: Uuid,
        writer: crate::net::crypt::CryptWrite<tokio::net::tcp::OwnedWriteHalf>,
    ) -> Self {
        Self {
            client_uuid,
            info: std::sync::Mutex::new(ClientGuid::default()),
            client_key: std::sync::Mutex::new(Uoid::default()),
            relevance_regions: std::sync::Mutex::new((BitVector::new(), BitVector::new())),
            writer: Mutex::new(writer),
        }
    }

    pub fn player_id(&self) -> u32 {
        self.info.lock().map(|info| info.player_id).unwrap_or(0)
    }

    /// Send one framed buffer; failures are the caller's to log. A peer that
    /// hung up is cleaned up lazily by its own client task.
    pub async fn send(&self, buffer: &[u8]) -> crate::errors::NetResult<()> {
        self.writer.lock().await.send(buffer).await
    }
}

/// Requests serviced serially by one game host.
pub enum HostMessage {
    Shutdown,
    /// Periodic tick: write the age SDL back to the vault.
    Cleanup,
    JoinAge {
        client: Arc<GameClient>,
        reply: ReplyGuard<DaemonReply>,
    },
    Propagate {
        client: Arc<GameClient>,
        msg_type: u32,
        buffer: Vec<u8>,
        reply: ReplyGuard<DaemonReply>,
    },
    Disconnect {
        player_id: u32,
        reply: ReplyGuard<DaemonReply>,
    },
}

/// A running host as seen from outside: its channel and client table.
#[derive(Clone)]
pub struct HostHandle {
    pub mcp_id: u32,
    pub channel: MsgChannel<HostMessage>,
    pub clients: Arc<Mutex<HashMap<u32, Arc<GameClient>>>>,
}

/// `mcpId -> host` map. Find-or-start holds this lock across the host's
/// startup so concurrent joins cannot race a second host into existence.
pub type HostRegistry = Arc<Mutex<HashMap<u32, HostHandle>>>;
