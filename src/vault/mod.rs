//! The server-authoritative persistent graph: typed, field-masked nodes
//! joined by directed refs.

pub mod node;

pub use node::VaultNode;

/// Node type discriminants, as persisted in `vault.Nodes.NodeType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum NodeType {
    Invalid = 0,
    Player = 2,
    Age = 3,
    GameServer = 4,
    Admin = 5,
    VaultServer = 6,
    Ccr = 7,
    Folder = 22,
    PlayerInfo = 23,
    System = 24,
    Image = 25,
    TextNote = 26,
    Sdl = 27,
    AgeLink = 28,
    Chronicle = 29,
    PlayerInfoList = 30,
    Marker = 32,
    AgeInfo = 33,
    AgeInfoList = 34,
    MarkerList = 35,
}

/// Well-known folder/node roles stored in `Int32_1` of folder-like nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum StandardNode {
    UserDefined = 0,
    InboxFolder = 1,
    BuddyListFolder = 2,
    IgnoreListFolder = 3,
    PeopleIKnowAboutFolder = 4,
    VaultMgrGlobalDataFolder = 5,
    ChronicleFolder = 6,
    AvatarOutfitFolder = 7,
    AgeTypeJournalFolder = 8,
    SubAgesFolder = 9,
    DeviceInboxFolder = 10,
    HoodMembersFolder = 11,
    AllPlayersFolder = 12,
    AgeMembersFolder = 13,
    AgeJournalsFolder = 14,
    AgeDevicesFolder = 15,
    AgeInstanceSdlNode = 16,
    AgeGlobalSdlNode = 17,
    CanVisitFolder = 18,
    AgeOwnersFolder = 19,
    AllAgeGlobalSdlNodesFolder = 20,
    PlayerInfoNode = 21,
    PublicAgesFolder = 22,
    AgesIOwnFolder = 23,
    AgesICanVisitFolder = 24,
    AvatarClosetFolder = 25,
    AgeInfoNode = 26,
    SystemNode = 27,
    PlayerInviteFolder = 28,
    CcrPlayersFolder = 29,
    GlobalInboxFolder = 30,
    ChildAgesFolder = 31,
    GameScoresFolder = 32,
}

/// Directed edge between two vault nodes. Refs are stored independently of
/// the nodes; the graph may contain cycles and disconnected nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeRef {
    pub parent: u32,
    pub child: u32,
    pub owner: u32,
    pub seen: bool,
}
