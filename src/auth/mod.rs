//! Auth service: encrypted sessions, login, player management, and the vault
//! daemon that owns the database handle.

pub mod daemon;
pub mod server;
pub mod vault_db;

use uuid::Uuid;

use crate::errors::NetResultCode;
use crate::net::channel::ReplyGuard;
use crate::types::sha::ShaDigest;
use crate::vault::{NodeRef, VaultNode};

/// A player row as the login flow reports it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerInfo {
    pub player_id: u32,
    pub player_name: String,
    pub avatar_shape: String,
    pub explorer: u32,
}

/// Reply payloads flowing back over a worker's private reply port. Handlers
/// answer exactly once per request; a mismatched variant is treated as an
/// internal error by the waiting worker.
#[derive(Debug)]
pub enum DaemonReply {
    Result(NetResultCode),
    Login {
        code: NetResultCode,
        acct_uuid: Uuid,
        acct_flags: u32,
        billing_type: u32,
        players: Vec<PlayerInfo>,
    },
    Player {
        code: NetResultCode,
        player: PlayerInfo,
    },
    NodeCreated {
        code: NetResultCode,
        node_id: u32,
    },
    NodeFetched {
        code: NetResultCode,
        node: Box<VaultNode>,
    },
    NodeTree {
        code: NetResultCode,
        refs: Vec<NodeRef>,
    },
    NodesFound {
        code: NetResultCode,
        ids: Vec<u32>,
    },
    AgeInit {
        code: NetResultCode,
        age_node: u32,
        age_info_node: u32,
    },
    GameServer {
        code: NetResultCode,
        mcp_id: u32,
        instance_uuid: Uuid,
        age_node: u32,
    },
    PublicAges {
        code: NetResultCode,
        ages: Vec<VaultNode>,
    },
}

impl DaemonReply {
    /// The result code regardless of payload shape.
    pub fn code(&self) -> NetResultCode {
        match self {
            Self::Result(code) => *code,
            Self::Login { code, .. }
            | Self::Player { code, .. }
            | Self::NodeCreated { code, .. }
            | Self::NodeFetched { code, .. }
            | Self::NodeTree { code, .. }
            | Self::NodesFound { code, .. }
            | Self::AgeInit { code, .. }
            | Self::GameServer { code, .. }
            | Self::PublicAges { code, .. } => *code,
        }
    }

    pub fn internal_error() -> Self {
        Self::Result(NetResultCode::NetInternalError)
    }
}

/// Parameters of a vault age initialization.
#[derive(Debug, Clone, Default)]
pub struct AgeInitRequest {
    pub instance_uuid: Uuid,
    pub parent_uuid: Uuid,
    pub filename: String,
    pub instance_name: String,
    pub user_name: String,
    pub description: String,
    pub sequence_number: i32,
    pub language: i32,
}

/// Requests serviced by the auth daemon, in FIFO order.
pub enum AuthMessage {
    Shutdown,
    ClientLogin {
        acct_name: String,
        pass_hash: ShaDigest,
        server_challenge: u32,
        client_challenge: u32,
        reply: ReplyGuard<DaemonReply>,
    },
    SetPlayer {
        acct_uuid: Uuid,
        player_id: u32,
        reply: ReplyGuard<DaemonReply>,
    },
    CreatePlayer {
        acct_uuid: Uuid,
        player_name: String,
        avatar_shape: String,
        reply: ReplyGuard<DaemonReply>,
    },
    DeletePlayer {
        acct_uuid: Uuid,
        player_id: u32,
        reply: ReplyGuard<DaemonReply>,
    },
    AddAccount {
        login: String,
        pass_hash: ShaDigest,
        reply: ReplyGuard<DaemonReply>,
    },
    VaultCreateNode {
        node: Box<VaultNode>,
        reply: ReplyGuard<DaemonReply>,
    },
    VaultFetchNode {
        node_id: u32,
        reply: ReplyGuard<DaemonReply>,
    },
    VaultUpdateNode {
        node: Box<VaultNode>,
        revision: Uuid,
        reply: ReplyGuard<DaemonReply>,
    },
    VaultRefNode {
        parent: u32,
        child: u32,
        owner: u32,
        reply: ReplyGuard<DaemonReply>,
    },
    VaultUnrefNode {
        parent: u32,
        child: u32,
        reply: ReplyGuard<DaemonReply>,
    },
    VaultFetchNodeTree {
        root: u32,
        reply: ReplyGuard<DaemonReply>,
    },
    VaultFindNode {
        template: Box<VaultNode>,
        reply: ReplyGuard<DaemonReply>,
    },
    VaultInitAge {
        request: AgeInitRequest,
        reply: ReplyGuard<DaemonReply>,
    },
    VaultSetSeen {
        parent: u32,
        child: u32,
        seen: bool,
    },
    /// A session with an active player went away; mark it offline.
    Disconnect {
        player_id: u32,
        reply: ReplyGuard<DaemonReply>,
    },
    FindGameServer {
        instance_uuid: Uuid,
        filename: String,
        reply: ReplyGuard<DaemonReply>,
    },
    GetPublicAges {
        filename: String,
        reply: ReplyGuard<DaemonReply>,
    },
    SetAgePublic {
        age_info_node: u32,
        public: bool,
    },
}
