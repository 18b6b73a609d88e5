//! The closed creatable registry.
//!
//! Every streamable polymorphic object is identified by a 16-bit class id;
//! `0x8000` is the reserved null sentinel. Reading an id outside the table is
//! a hard stream error. The registry also centralizes `make_safe_for_net`,
//! the relay filter that keeps clients from smuggling privileged messages
//! through the game server.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::errors::{NetError, NetResult};
use crate::plasma::messages::avatar::{
    AnimStage, ArmatureBrain, AvAnimTask, AvBrainCoop, AvBrainGeneric, AvBrainGenericMsg,
    AvBrainHuman, AvCoopMsg, AvOneShotLinkTask, AvOneShotMsg, AvPushBrainMsg, AvSeekMsg,
    AvTaskMsg, AvTaskSeekDoneMsg, CoopCoordinator,
};
use crate::plasma::messages::callbacks::{AnimCmdMsg, MessageWithCallbacks};
use crate::plasma::messages::clone::{LoadAvatarMsg, LoadCloneMsg};
use crate::plasma::messages::ki::KiMessage;
use crate::plasma::messages::link::{GenericValue, LinkToAgeMsg, LinkingMgrMsg};
use crate::plasma::messages::notify::NotifyMsg;
use crate::plasma::messages::{
    AvatarInputStateMsg, BackdoorMsg, BulletMsg, ClimbMsg, ClothingMsg, ControlEventMsg,
    EnableMsg, InputEventMsg, InputIfaceMgrMsg, LinkEffectsTriggerMsg, MultistageModMsg,
    ParticleKillMsg, ParticleTransferMsg, PseudoLinkEffectMsg, ServerReplyMsg, SetNetGroupIdMsg,
    SubWorldMsg, WarpMsg,
};
use crate::plasma::net_messages::game_message::{
    NetMsgGameMessage, NetMsgGameMessageDirected, NetMsgLoadClone,
};
use crate::plasma::net_messages::members::{
    NetMsgMemberUpdate, NetMsgMembersList, NetMsgMembersListReq,
};
use crate::plasma::net_messages::sdl_state::NetMsgSdlState;
use crate::plasma::net_messages::{
    NetMsgGroupOwner, NetMsgInitialAgeStateSent, NetMsgPagingRoom, NetMsgPlayerPage,
    NetMsgRelevanceRegions, NetMsgRoomsList, NetMsgSharedState, NetMsgVoice,
};
use crate::plasma::streams::{StreamRead, StreamWrite};

/// Wire class ids. These values are fixed by the legacy client and must not
/// be renumbered.
pub mod class_id {
    pub const NULL: u16 = 0x8000;

    pub const ANIM_CMD_MSG: u16 = 0x0206;
    pub const WARP_MSG: u16 = 0x0209;
    pub const MESSAGE_WITH_CALLBACKS: u16 = 0x0203;
    pub const INPUT_EVENT_MSG: u16 = 0x0249;
    pub const CONTROL_EVENT_MSG: u16 = 0x024B;
    pub const LOAD_CLONE_MSG: u16 = 0x0253;
    pub const ENABLE_MSG: u16 = 0x0254;
    pub const CLOTHING_MSG: u16 = 0x0257;
    pub const SERVER_REPLY_MSG: u16 = 0x026F;
    pub const CREATABLE_GENERIC_VALUE: u16 = 0x028D;
    pub const AV_TASK_MSG: u16 = 0x0298;
    pub const AV_SEEK_MSG: u16 = 0x0299;
    pub const AV_ONE_SHOT_MSG: u16 = 0x029A;
    pub const AV_PUSH_BRAIN_MSG: u16 = 0x029C;
    pub const AV_POP_BRAIN_MSG: u16 = 0x029D;
    pub const NOTIFY_MSG: u16 = 0x02ED;
    pub const LINK_EFFECTS_TRIGGER_MSG: u16 = 0x0300;
    pub const MULTISTAGE_MOD_MSG: u16 = 0x0302;
    pub const PARTICLE_TRANSFER_MSG: u16 = 0x0333;
    pub const PARTICLE_KILL_MSG: u16 = 0x0334;
    pub const AVATAR_INPUT_STATE_MSG: u16 = 0x0347;
    pub const ARMATURE_BRAIN: u16 = 0x035C;
    pub const AV_BRAIN_HUMAN: u16 = 0x035D;
    pub const AV_BRAIN_GENERIC: u16 = 0x0360;
    pub const INPUT_IFACE_MGR_MSG: u16 = 0x0363;
    pub const KI_MESSAGE: u16 = 0x0364;
    pub const BULLET_MSG: u16 = 0x0368;
    pub const AV_ANIM_TASK: u16 = 0x036B;
    pub const AV_ONE_SHOT_TASK: u16 = 0x036C;
    pub const AV_SEEK_TASK: u16 = 0x036E;
    pub const AV_TASK_BRAIN: u16 = 0x0370;
    pub const ANIM_STAGE: u16 = 0x0371;
    pub const AV_TASK_SEEK: u16 = 0x0372;
    pub const AV_BRAIN_GENERIC_MSG: u16 = 0x038F;
    pub const LOAD_AVATAR_MSG: u16 = 0x03B1;
    pub const LINK_TO_AGE_MSG: u16 = 0x03E5;
    pub const CLIMB_MSG: u16 = 0x03E6;
    pub const SUB_WORLD_MSG: u16 = 0x046A;
    pub const LINKING_MGR_MSG: u16 = 0x042D;
    pub const BACKDOOR_MSG: u16 = 0x043F;
    pub const COOP_COORDINATOR: u16 = 0x045D;
    pub const AV_COOP_MSG: u16 = 0x045E;
    pub const AV_BRAIN_COOP: u16 = 0x045F;
    pub const AV_TASK_SEEK_DONE_MSG: u16 = 0x0465;
    pub const PSEUDO_LINK_EFFECT_MSG: u16 = 0x0480;
    pub const AV_ONE_SHOT_LINK_TASK: u16 = 0x0488;
    pub const SET_NET_GROUP_ID_MSG: u16 = 0x02B2;

    pub const NET_MSG_PAGING_ROOM: u16 = 0x0218;
    pub const NET_MSG_ROOMS_LIST: u16 = 0x0263;
    pub const NET_MSG_GROUP_OWNER: u16 = 0x0264;
    pub const NET_MSG_GAME_STATE_REQUEST: u16 = 0x0265;
    pub const NET_MSG_GAME_MESSAGE: u16 = 0x026B;
    pub const NET_MSG_VOICE: u16 = 0x0279;
    pub const NET_MSG_TEST_AND_SET: u16 = 0x027D;
    pub const NET_MSG_MEMBERS_LIST_REQ: u16 = 0x02AD;
    pub const NET_MSG_MEMBERS_LIST: u16 = 0x02AE;
    pub const NET_MSG_MEMBER_UPDATE: u16 = 0x02B1;
    pub const NET_MSG_INITIAL_AGE_STATE_SENT: u16 = 0x02B8;
    pub const NET_MSG_SDL_STATE: u16 = 0x02CD;
    pub const NET_MSG_SDL_STATE_BCAST: u16 = 0x0329;
    pub const NET_MSG_GAME_MESSAGE_DIRECTED: u16 = 0x032E;
    pub const NET_MSG_RELEVANCE_REGIONS: u16 = 0x03AC;
    pub const NET_MSG_LOAD_CLONE: u16 = 0x03B3;
    pub const NET_MSG_PLAYER_PAGE: u16 = 0x03B4;
}

/// Every streamable class the server understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Creatable {
    ServerReplyMsg(Box<ServerReplyMsg>),
    EnableMsg(Box<EnableMsg>),
    WarpMsg(Box<WarpMsg>),
    SetNetGroupIdMsg(Box<SetNetGroupIdMsg>),
    InputIfaceMgrMsg(Box<InputIfaceMgrMsg>),
    SubWorldMsg(Box<SubWorldMsg>),
    AvatarInputStateMsg(Box<AvatarInputStateMsg>),
    InputEventMsg(Box<InputEventMsg>),
    ControlEventMsg(Box<ControlEventMsg>),
    BackdoorMsg(Box<BackdoorMsg>),
    BulletMsg(Box<BulletMsg>),
    ClimbMsg(Box<ClimbMsg>),
    ClothingMsg(Box<ClothingMsg>),
    MultistageModMsg(Box<MultistageModMsg>),
    ParticleTransferMsg(Box<ParticleTransferMsg>),
    ParticleKillMsg(Box<ParticleKillMsg>),
    LinkEffectsTriggerMsg(Box<LinkEffectsTriggerMsg>),
    PseudoLinkEffectMsg(Box<PseudoLinkEffectMsg>),
    KiMessage(Box<KiMessage>),
    MessageWithCallbacks(Box<MessageWithCallbacks>),
    AnimCmdMsg(Box<AnimCmdMsg>),
    NotifyMsg(Box<NotifyMsg>),
    LoadCloneMsg(Box<LoadCloneMsg>),
    LoadAvatarMsg(Box<LoadAvatarMsg>),
    LinkToAgeMsg(Box<LinkToAgeMsg>),
    LinkingMgrMsg(Box<LinkingMgrMsg>),
    CreatableGenericValue(Box<GenericValue>),
    AvTaskMsg(Box<AvTaskMsg>),
    AvPushBrainMsg(Box<AvPushBrainMsg>),
    AvPopBrainMsg(Box<AvTaskMsg>),
    AvSeekMsg(Box<AvSeekMsg>),
    AvOneShotMsg(Box<AvOneShotMsg>),
    AvBrainGenericMsg(Box<AvBrainGenericMsg>),
    AvCoopMsg(Box<AvCoopMsg>),
    AvTaskSeekDoneMsg(Box<AvTaskSeekDoneMsg>),
    AnimStage(Box<AnimStage>),
    ArmatureBrain(Box<ArmatureBrain>),
    AvBrainHuman(Box<AvBrainHuman>),
    AvBrainGeneric(Box<AvBrainGeneric>),
    AvBrainCoop(Box<AvBrainCoop>),
    CoopCoordinator(Box<CoopCoordinator>),
    AvAnimTask(Box<AvAnimTask>),
    AvOneShotTask,
    AvOneShotLinkTask(Box<AvOneShotLinkTask>),
    AvSeekTask,
    AvTaskSeek,
    NetMsgPagingRoom(Box<NetMsgPagingRoom>),
    NetMsgRoomsList(Box<NetMsgRoomsList>),
    NetMsgGameStateRequest(Box<NetMsgRoomsList>),
    NetMsgGroupOwner(Box<NetMsgGroupOwner>),
    NetMsgInitialAgeStateSent(Box<NetMsgInitialAgeStateSent>),
    NetMsgGameMessage(Box<NetMsgGameMessage>),
    NetMsgGameMessageDirected(Box<NetMsgGameMessageDirected>),
    NetMsgSdlState(Box<NetMsgSdlState>),
    NetMsgSdlStateBCast(Box<NetMsgSdlState>),
    NetMsgMembersListReq(Box<NetMsgMembersListReq>),
    NetMsgMembersList(Box<NetMsgMembersList>),
    NetMsgMemberUpdate(Box<NetMsgMemberUpdate>),
    NetMsgTestAndSet(Box<NetMsgSharedState>),
    NetMsgVoice(Box<NetMsgVoice>),
    NetMsgLoadClone(Box<NetMsgLoadClone>),
    NetMsgPlayerPage(Box<NetMsgPlayerPage>),
    NetMsgRelevanceRegions(Box<NetMsgRelevanceRegions>),
}

impl Creatable {
    pub fn class_id(&self) -> u16 {
        use class_id::*;
        match self {
            Self::ServerReplyMsg(_) => SERVER_REPLY_MSG,
            Self::EnableMsg(_) => ENABLE_MSG,
            Self::WarpMsg(_) => WARP_MSG,
            Self::SetNetGroupIdMsg(_) => SET_NET_GROUP_ID_MSG,
            Self::InputIfaceMgrMsg(_) => INPUT_IFACE_MGR_MSG,
            Self::SubWorldMsg(_) => SUB_WORLD_MSG,
            Self::AvatarInputStateMsg(_) => AVATAR_INPUT_STATE_MSG,
            Self::InputEventMsg(_) => INPUT_EVENT_MSG,
            Self::ControlEventMsg(_) => CONTROL_EVENT_MSG,
            Self::BackdoorMsg(_) => BACKDOOR_MSG,
            Self::BulletMsg(_) => BULLET_MSG,
            Self::ClimbMsg(_) => CLIMB_MSG,
            Self::ClothingMsg(_) => CLOTHING_MSG,
            Self::MultistageModMsg(_) => MULTISTAGE_MOD_MSG,
            Self::ParticleTransferMsg(_) => PARTICLE_TRANSFER_MSG,
            Self::ParticleKillMsg(_) => PARTICLE_KILL_MSG,
            Self::LinkEffectsTriggerMsg(_) => LINK_EFFECTS_TRIGGER_MSG,
            Self::PseudoLinkEffectMsg(_) => PSEUDO_LINK_EFFECT_MSG,
            Self::KiMessage(_) => KI_MESSAGE,
            Self::MessageWithCallbacks(_) => MESSAGE_WITH_CALLBACKS,
            Self::AnimCmdMsg(_) => ANIM_CMD_MSG,
            Self::NotifyMsg(_) => NOTIFY_MSG,
            Self::LoadCloneMsg(_) => LOAD_CLONE_MSG,
            Self::LoadAvatarMsg(_) => LOAD_AVATAR_MSG,
            Self::LinkToAgeMsg(_) => LINK_TO_AGE_MSG,
            Self::LinkingMgrMsg(_) => LINKING_MGR_MSG,
            Self::CreatableGenericValue(_) => CREATABLE_GENERIC_VALUE,
            Self::AvTaskMsg(_) => AV_TASK_MSG,
            Self::AvPushBrainMsg(_) => AV_PUSH_BRAIN_MSG,
            Self::AvPopBrainMsg(_) => AV_POP_BRAIN_MSG,
            Self::AvSeekMsg(_) => AV_SEEK_MSG,
            Self::AvOneShotMsg(_) => AV_ONE_SHOT_MSG,
            Self::AvBrainGenericMsg(_) => AV_BRAIN_GENERIC_MSG,
            Self::AvCoopMsg(_) => AV_COOP_MSG,
            Self::AvTaskSeekDoneMsg(_) => AV_TASK_SEEK_DONE_MSG,
            Self::AnimStage(_) => ANIM_STAGE,
            Self::ArmatureBrain(_) => ARMATURE_BRAIN,
            Self::AvBrainHuman(_) => AV_BRAIN_HUMAN,
            Self::AvBrainGeneric(_) => AV_BRAIN_GENERIC,
            Self::AvBrainCoop(_) => AV_BRAIN_COOP,
            Self::CoopCoordinator(_) => COOP_COORDINATOR,
            Self::AvAnimTask(_) => AV_ANIM_TASK,
            Self::AvOneShotTask => AV_ONE_SHOT_TASK,
            Self::AvOneShotLinkTask(_) => AV_ONE_SHOT_LINK_TASK,
            Self::AvSeekTask => AV_SEEK_TASK,
            Self::AvTaskSeek => AV_TASK_SEEK,
            Self::NetMsgPagingRoom(_) => NET_MSG_PAGING_ROOM,
            Self::NetMsgRoomsList(_) => NET_MSG_ROOMS_LIST,
            Self::NetMsgGameStateRequest(_) => NET_MSG_GAME_STATE_REQUEST,
            Self::NetMsgGroupOwner(_) => NET_MSG_GROUP_OWNER,
            Self::NetMsgInitialAgeStateSent(_) => NET_MSG_INITIAL_AGE_STATE_SENT,
            Self::NetMsgGameMessage(_) => NET_MSG_GAME_MESSAGE,
            Self::NetMsgGameMessageDirected(_) => NET_MSG_GAME_MESSAGE_DIRECTED,
            Self::NetMsgSdlState(_) => NET_MSG_SDL_STATE,
            Self::NetMsgSdlStateBCast(_) => NET_MSG_SDL_STATE_BCAST,
            Self::NetMsgMembersListReq(_) => NET_MSG_MEMBERS_LIST_REQ,
            Self::NetMsgMembersList(_) => NET_MSG_MEMBERS_LIST,
            Self::NetMsgMemberUpdate(_) => NET_MSG_MEMBER_UPDATE,
            Self::NetMsgTestAndSet(_) => NET_MSG_TEST_AND_SET,
            Self::NetMsgVoice(_) => NET_MSG_VOICE,
            Self::NetMsgLoadClone(_) => NET_MSG_LOAD_CLONE,
            Self::NetMsgPlayerPage(_) => NET_MSG_PLAYER_PAGE,
            Self::NetMsgRelevanceRegions(_) => NET_MSG_RELEVANCE_REGIONS,
        }
    }

    /// Whether this message may be relayed to other clients on behalf of a
    /// client sender. Composite types recurse; privileged types refuse.
    pub fn make_safe_for_net(&mut self) -> bool {
        match self {
            // Privileged or spoofable: never relay from a client.
            Self::BackdoorMsg(_)
            | Self::AvTaskMsg(_)
            | Self::AvPushBrainMsg(_)
            | Self::AvPopBrainMsg(_)
            | Self::AvSeekMsg(_)
            | Self::AvOneShotMsg(_)
            | Self::InputEventMsg(_)
            | Self::ControlEventMsg(_)
            | Self::WarpMsg(_)
            | Self::LinkToAgeMsg(_)
            | Self::LinkingMgrMsg(_) => false,

            Self::KiMessage(msg) => msg.make_safe_for_net(),
            Self::MessageWithCallbacks(msg) => msg.make_safe_for_net(),
            Self::AnimCmdMsg(msg) => msg.callbacks.make_safe_for_net(),
            Self::LoadCloneMsg(msg) => msg.make_safe_for_net(),
            Self::LoadAvatarMsg(msg) => msg.make_safe_for_net(),
            Self::AvBrainGeneric(brain) => brain.make_safe_for_net(),
            Self::AvBrainCoop(brain) => brain.make_safe_for_net(),
            Self::AvCoopMsg(msg) => msg.make_safe_for_net(),
            Self::NetMsgGameMessage(msg) => msg.make_safe_for_net(),
            Self::NetMsgGameMessageDirected(msg) => msg.game_message.make_safe_for_net(),
            Self::NetMsgLoadClone(msg) => msg.make_safe_for_net(),

            _ => true,
        }
    }
}

/// Read one creatable body of a known class.
pub fn read_creatable_of<R: Read>(stream: &mut R, class: u16) -> NetResult<Creatable> {
    use class_id::*;
    let creatable = match class {
        SERVER_REPLY_MSG => Creatable::ServerReplyMsg(Box::new(ServerReplyMsg::read_from(stream)?)),
        ENABLE_MSG => Creatable::EnableMsg(Box::new(EnableMsg::read_from(stream)?)),
        WARP_MSG => Creatable::WarpMsg(Box::new(WarpMsg::read_from(stream)?)),
        SET_NET_GROUP_ID_MSG => {
            Creatable::SetNetGroupIdMsg(Box::new(SetNetGroupIdMsg::read_from(stream)?))
        }
        INPUT_IFACE_MGR_MSG => {
            Creatable::InputIfaceMgrMsg(Box::new(InputIfaceMgrMsg::read_from(stream)?))
        }
        SUB_WORLD_MSG => Creatable::SubWorldMsg(Box::new(SubWorldMsg::read_from(stream)?)),
        AVATAR_INPUT_STATE_MSG => {
            Creatable::AvatarInputStateMsg(Box::new(AvatarInputStateMsg::read_from(stream)?))
        }
        INPUT_EVENT_MSG => Creatable::InputEventMsg(Box::new(InputEventMsg::read_from(stream)?)),
        CONTROL_EVENT_MSG => {
            Creatable::ControlEventMsg(Box::new(ControlEventMsg::read_from(stream)?))
        }
        BACKDOOR_MSG => Creatable::BackdoorMsg(Box::new(BackdoorMsg::read_from(stream)?)),
        BULLET_MSG => Creatable::BulletMsg(Box::new(BulletMsg::read_from(stream)?)),
        CLIMB_MSG => Creatable::ClimbMsg(Box::new(ClimbMsg::read_from(stream)?)),
        CLOTHING_MSG => Creatable::ClothingMsg(Box::new(ClothingMsg::read_from(stream)?)),
        MULTISTAGE_MOD_MSG => {
            Creatable::MultistageModMsg(Box::new(MultistageModMsg::read_from(stream)?))
        }
        PARTICLE_TRANSFER_MSG => {
            Creatable::ParticleTransferMsg(Box::new(ParticleTransferMsg::read_from(stream)?))
        }
        PARTICLE_KILL_MSG => {
            Creatable::ParticleKillMsg(Box::new(ParticleKillMsg::read_from(stream)?))
        }
        LINK_EFFECTS_TRIGGER_MSG => {
            Creatable::LinkEffectsTriggerMsg(Box::new(LinkEffectsTriggerMsg::read_from(stream)?))
        }
        PSEUDO_LINK_EFFECT_MSG => {
            Creatable::PseudoLinkEffectMsg(Box::new(PseudoLinkEffectMsg::read_from(stream)?))
        }
        KI_MESSAGE => Creatable::KiMessage(Box::new(KiMessage::read_from(stream)?)),
        MESSAGE_WITH_CALLBACKS => {
            Creatable::MessageWithCallbacks(Box::new(MessageWithCallbacks::read_from(stream)?))
        }
        ANIM_CMD_MSG => Creatable::AnimCmdMsg(Box::new(AnimCmdMsg::read_from(stream)?)),
        NOTIFY_MSG => Creatable::NotifyMsg(Box::new(NotifyMsg::read_from(stream)?)),
        LOAD_CLONE_MSG => Creatable::LoadCloneMsg(Box::new(LoadCloneMsg::read_from(stream)?)),
        LOAD_AVATAR_MSG => Creatable::LoadAvatarMsg(Box::new(LoadAvatarMsg::read_from(stream)?)),
        LINK_TO_AGE_MSG => Creatable::LinkToAgeMsg(Box::new(LinkToAgeMsg::read_from(stream)?)),
        LINKING_MGR_MSG => Creatable::LinkingMgrMsg(Box::new(LinkingMgrMsg::read_from(stream)?)),
        CREATABLE_GENERIC_VALUE => {
            Creatable::CreatableGenericValue(Box::new(GenericValue::stream_read(stream)?))
        }
        AV_TASK_MSG => Creatable::AvTaskMsg(Box::new(AvTaskMsg::read_from(stream)?)),
        AV_PUSH_BRAIN_MSG => {
            Creatable::AvPushBrainMsg(Box::new(AvPushBrainMsg::read_from(stream)?))
        }
        AV_POP_BRAIN_MSG => Creatable::AvPopBrainMsg(Box::new(AvTaskMsg::read_from(stream)?)),
        AV_SEEK_MSG => Creatable::AvSeekMsg(Box::new(AvSeekMsg::read_from(stream)?)),
        AV_ONE_SHOT_MSG => Creatable::AvOneShotMsg(Box::new(AvOneShotMsg::read_from(stream)?)),
        AV_BRAIN_GENERIC_MSG => {
            Creatable::AvBrainGenericMsg(Box::new(AvBrainGenericMsg::read_from(stream)?))
        }
        AV_COOP_MSG => Creatable::AvCoopMsg(Box::new(AvCoopMsg::read_from(stream)?)),
        AV_TASK_SEEK_DONE_MSG => {
            Creatable::AvTaskSeekDoneMsg(Box::new(AvTaskSeekDoneMsg::read_from(stream)?))
        }
        ANIM_STAGE => Creatable::AnimStage(Box::new(AnimStage::read_from(stream)?)),
        ARMATURE_BRAIN => Creatable::ArmatureBrain(Box::new(ArmatureBrain::read_from(stream)?)),
        AV_BRAIN_HUMAN => Creatable::AvBrainHuman(Box::new(AvBrainHuman::read_from(stream)?)),
        AV_BRAIN_GENERIC => {
            Creatable::AvBrainGeneric(Box::new(AvBrainGeneric::read_from(stream)?))
        }
        AV_BRAIN_COOP => Creatable::AvBrainCoop(Box::new(AvBrainCoop::read_from(stream)?)),
        COOP_COORDINATOR => {
            Creatable::CoopCoordinator(Box::new(CoopCoordinator::read_from(stream)?))
        }
        AV_ANIM_TASK => Creatable::AvAnimTask(Box::new(AvAnimTask::read_from(stream)?)),
        AV_ONE_SHOT_TASK => Creatable::AvOneShotTask,
        AV_ONE_SHOT_LINK_TASK => {
            Creatable::AvOneShotLinkTask(Box::new(AvOneShotLinkTask::read_from(stream)?))
        }
        AV_SEEK_TASK => Creatable::AvSeekTask,
        AV_TASK_SEEK => Creatable::AvTaskSeek,
        AV_TASK_BRAIN => return Err(NetError::Malformed("AvTaskBrain is not streamable")),
        NET_MSG_PAGING_ROOM => {
            Creatable::NetMsgPagingRoom(Box::new(NetMsgPagingRoom::read_from(stream)?))
        }
        NET_MSG_ROOMS_LIST => {
            Creatable::NetMsgRoomsList(Box::new(NetMsgRoomsList::read_from(stream)?))
        }
        NET_MSG_GAME_STATE_REQUEST => {
            Creatable::NetMsgGameStateRequest(Box::new(NetMsgRoomsList::read_from(stream)?))
        }
        NET_MSG_GROUP_OWNER => {
            Creatable::NetMsgGroupOwner(Box::new(NetMsgGroupOwner::read_from(stream)?))
        }
        NET_MSG_INITIAL_AGE_STATE_SENT => Creatable::NetMsgInitialAgeStateSent(Box::new(
            NetMsgInitialAgeStateSent::read_from(stream)?,
        )),
        NET_MSG_GAME_MESSAGE => {
            Creatable::NetMsgGameMessage(Box::new(NetMsgGameMessage::read_from(stream)?))
        }
        NET_MSG_GAME_MESSAGE_DIRECTED => Creatable::NetMsgGameMessageDirected(Box::new(
            NetMsgGameMessageDirected::read_from(stream)?,
        )),
        NET_MSG_SDL_STATE => Creatable::NetMsgSdlState(Box::new(NetMsgSdlState::read_from(stream)?)),
        NET_MSG_SDL_STATE_BCAST => {
            Creatable::NetMsgSdlStateBCast(Box::new(NetMsgSdlState::read_from(stream)?))
        }
        NET_MSG_MEMBERS_LIST_REQ => {
            Creatable::NetMsgMembersListReq(Box::new(NetMsgMembersListReq::read_from(stream)?))
        }
        NET_MSG_MEMBERS_LIST => {
            Creatable::NetMsgMembersList(Box::new(NetMsgMembersList::read_from(stream)?))
        }
        NET_MSG_MEMBER_UPDATE => {
            Creatable::NetMsgMemberUpdate(Box::new(NetMsgMemberUpdate::read_from(stream)?))
        }
        NET_MSG_TEST_AND_SET => {
            Creatable::NetMsgTestAndSet(Box::new(NetMsgSharedState::read_from(stream)?))
        }
        NET_MSG_VOICE => Creatable::NetMsgVoice(Box::new(NetMsgVoice::read_from(stream)?)),
        NET_MSG_LOAD_CLONE => {
            Creatable::NetMsgLoadClone(Box::new(NetMsgLoadClone::read_from(stream)?))
        }
        NET_MSG_PLAYER_PAGE => {
            Creatable::NetMsgPlayerPage(Box::new(NetMsgPlayerPage::read_from(stream)?))
        }
        NET_MSG_RELEVANCE_REGIONS => {
            Creatable::NetMsgRelevanceRegions(Box::new(NetMsgRelevanceRegions::read_from(stream)?))
        }
        unknown => return Err(NetError::UnknownCreatable(unknown)),
    };
    Ok(creatable)
}

/// Write one creatable body (no class id prefix).
pub fn write_creatable_body<W: Write>(stream: &mut W, creatable: &Creatable) -> NetResult<()> {
    match creatable {
        Creatable::ServerReplyMsg(msg) => msg.write_to(stream),
        Creatable::EnableMsg(msg) => msg.write_to(stream),
        Creatable::WarpMsg(msg) => msg.write_to(stream),
        Creatable::SetNetGroupIdMsg(msg) => msg.write_to(stream),
        Creatable::InputIfaceMgrMsg(msg) => msg.write_to(stream),
        Creatable::SubWorldMsg(msg) => msg.write_to(stream),
        Creatable::AvatarInputStateMsg(msg) => msg.write_to(stream),
        Creatable::InputEventMsg(msg) => msg.write_to(stream),
        Creatable::ControlEventMsg(msg) => msg.write_to(stream),
        Creatable::BackdoorMsg(msg) => msg.write_to(stream),
        Creatable::BulletMsg(msg) => msg.write_to(stream),
        Creatable::ClimbMsg(msg) => msg.write_to(stream),
        Creatable::ClothingMsg(msg) => msg.write_to(stream),
        Creatable::MultistageModMsg(msg) => msg.write_to(stream),
        Creatable::ParticleTransferMsg(msg) => msg.write_to(stream),
        Creatable::ParticleKillMsg(msg) => msg.write_to(stream),
        Creatable::LinkEffectsTriggerMsg(msg) => msg.write_to(stream),
        Creatable::PseudoLinkEffectMsg(msg) => msg.write_to(stream),
        Creatable::KiMessage(msg) => msg.write_to(stream),
        Creatable::MessageWithCallbacks(msg) => msg.write_to(stream),
        Creatable::AnimCmdMsg(msg) => msg.write_to(stream),
        Creatable::NotifyMsg(msg) => msg.write_to(stream),
        Creatable::LoadCloneMsg(msg) => msg.write_to(stream),
        Creatable::LoadAvatarMsg(msg) => msg.write_to(stream),
        Creatable::LinkToAgeMsg(msg) => msg.write_to(stream),
        Creatable::LinkingMgrMsg(msg) => msg.write_to(stream),
        Creatable::CreatableGenericValue(value) => value.stream_write(stream),
        Creatable::AvTaskMsg(msg) => msg.write_to(stream),
        Creatable::AvPushBrainMsg(msg) => msg.write_to(stream),
        Creatable::AvPopBrainMsg(msg) => msg.write_to(stream),
        Creatable::AvSeekMsg(msg) => msg.write_to(stream),
        Creatable::AvOneShotMsg(msg) => msg.write_to(stream),
        Creatable::AvBrainGenericMsg(msg) => msg.write_to(stream),
        Creatable::AvCoopMsg(msg) => msg.write_to(stream),
        Creatable::AvTaskSeekDoneMsg(msg) => msg.write_to(stream),
        Creatable::AnimStage(stage) => stage.write_to(stream),
        Creatable::ArmatureBrain(brain) => brain.write_to(stream),
        Creatable::AvBrainHuman(brain) => brain.write_to(stream),
        Creatable::AvBrainGeneric(brain) => brain.write_to(stream),
        Creatable::AvBrainCoop(brain) => brain.write_to(stream),
        Creatable::CoopCoordinator(coordinator) => coordinator.write_to(stream),
        Creatable::AvAnimTask(task) => task.write_to(stream),
        Creatable::AvOneShotTask | Creatable::AvSeekTask | Creatable::AvTaskSeek => Ok(()),
        Creatable::AvOneShotLinkTask(task) => task.write_to(stream),
        Creatable::NetMsgPagingRoom(msg) => msg.write_to(stream),
        Creatable::NetMsgRoomsList(msg) | Creatable::NetMsgGameStateRequest(msg) => {
            msg.write_to(stream)
        }
        Creatable::NetMsgGroupOwner(msg) => msg.write_to(stream),
        Creatable::NetMsgInitialAgeStateSent(msg) => msg.write_to(stream),
        Creatable::NetMsgGameMessage(msg) => msg.write_to(stream),
        Creatable::NetMsgGameMessageDirected(msg) => msg.write_to(stream),
        Creatable::NetMsgSdlState(msg) | Creatable::NetMsgSdlStateBCast(msg) => {
            msg.write_to(stream)
        }
        Creatable::NetMsgMembersListReq(msg) => msg.write_to(stream),
        Creatable::NetMsgMembersList(msg) => msg.write_to(stream),
        Creatable::NetMsgMemberUpdate(msg) => msg.write_to(stream),
        Creatable::NetMsgTestAndSet(_) => {
            Err(NetError::Malformed("shared state is not writable"))
        }
        Creatable::NetMsgVoice(msg) => msg.write_to(stream),
        Creatable::NetMsgLoadClone(msg) => msg.write_to(stream),
        Creatable::NetMsgPlayerPage(msg) => msg.write_to(stream),
        Creatable::NetMsgRelevanceRegions(msg) => msg.write_to(stream),
    }
}

/// Read a `u16` class id followed by the body. `0x8000` yields `None`.
pub fn read_creatable<R: Read>(stream: &mut R) -> NetResult<Option<Box<Creatable>>> {
    let class = stream.read_u16::<LittleEndian>()?;
    if class == class_id::NULL {
        return Ok(None);
    }
    Ok(Some(Box::new(read_creatable_of(stream, class)?)))
}

/// Write a class id and body; `None` writes the null sentinel.
pub fn write_creatable<W: Write>(stream: &mut W, creatable: Option<&Creatable>) -> NetResult<()> {
    match creatable {
        Some(creatable) => {
            stream.write_u16::<LittleEndian>(creatable.class_id())?;
            write_creatable_body(stream, creatable)
        }
        None => {
            stream.write_u16::<LittleEndian>(class_id::NULL)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plasma::messages::ki;
    use std::io::Cursor;

    #[test]
    fn null_sentinel_roundtrip() {
        let mut buffer = Vec::new();
        write_creatable(&mut buffer, None).unwrap();
        assert_eq!(buffer, vec![0x00, 0x80]);
        let back = read_creatable(&mut Cursor::new(buffer)).unwrap();
        assert!(back.is_none());
    }

    #[test]
    fn unknown_class_id_is_rejected() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&0x7EEFu16.to_le_bytes());
        let result = read_creatable(&mut Cursor::new(buffer));
        assert!(matches!(result, Err(NetError::UnknownCreatable(0x7EEF))));
    }

    #[test]
    fn concrete_type_roundtrip_is_byte_stable() {
        let msg = Creatable::KiMessage(Box::new(KiMessage {
            command: ki::command::CHAT_MESSAGE,
            user: "Yeesha".to_string(),
            string: "hello".to_string(),
            ..Default::default()
        }));
        let mut first = Vec::new();
        write_creatable(&mut first, Some(&msg)).unwrap();

        let back = read_creatable(&mut Cursor::new(first.clone()))
            .unwrap()
            .expect("non-null");
        assert_eq!(back.class_id(), class_id::KI_MESSAGE);

        let mut second = Vec::new();
        write_creatable(&mut second, Some(&back)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn nested_game_message_roundtrip() {
        use crate::plasma::net_messages::game_message::NetMsgGameMessage;

        let inner = Creatable::ServerReplyMsg(Box::new(crate::plasma::messages::ServerReplyMsg {
            reply: crate::plasma::messages::server_reply::AFFIRM,
            ..Default::default()
        }));
        let outer = Creatable::NetMsgGameMessage(Box::new(NetMsgGameMessage {
            message: Some(Box::new(inner)),
            ..Default::default()
        }));

        let mut buffer = Vec::new();
        write_creatable(&mut buffer, Some(&outer)).unwrap();
        let back = read_creatable(&mut Cursor::new(buffer)).unwrap().unwrap();
        match *back {
            Creatable::NetMsgGameMessage(msg) => match msg.message.as_deref() {
                Some(Creatable::ServerReplyMsg(reply)) => {
                    assert_eq!(reply.reply, crate::plasma::messages::server_reply::AFFIRM);
                }
                other => panic!("unexpected inner message: {other:?}"),
            },
            other => panic!("unexpected outer message: {other:?}"),
        }
    }

    #[test]
    fn admin_ki_message_is_relayable_only_after_scrub() {
        let mut chat = Creatable::KiMessage(Box::new(KiMessage {
            command: ki::command::CHAT_MESSAGE,
            flags: ki::flags::ADMIN_MSG,
            ..Default::default()
        }));
        assert!(chat.make_safe_for_net());
        match &chat {
            Creatable::KiMessage(msg) => assert_eq!(msg.flags & ki::flags::ADMIN_MSG, 0),
            _ => unreachable!(),
        }

        let mut command = Creatable::KiMessage(Box::new(KiMessage {
            command: 11, // DowngradeKILevel
            ..Default::default()
        }));
        assert!(!command.make_safe_for_net());
    }

    #[test]
    fn brain_with_start_message_is_unsafe() {
        use crate::plasma::messages::avatar::AvBrainGeneric;

        let mut clean = Creatable::AvBrainGeneric(Box::new(AvBrainGeneric::default()));
        assert!(clean.make_safe_for_net());

        let mut armed = Creatable::AvBrainGeneric(Box::new(AvBrainGeneric {
            start_message: Some(Box::new(Creatable::BackdoorMsg(Box::new(
                Default::default(),
            )))),
            ..Default::default()
        }));
        assert!(!armed.make_safe_for_net());
    }
}
