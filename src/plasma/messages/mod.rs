//! Game message bodies carried inside `NetMsgGameMessage` streams.
//!
//! Every message embeds the common header (sender, receivers, timestamp,
//! broadcast flags). Types a client must never be allowed to relay override
//! the safety check in the factory dispatch.

pub mod avatar;
pub mod callbacks;
pub mod clone;
pub mod ki;
pub mod link;
pub mod notify;

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::errors::NetResult;
use crate::plasma::key::{Key, NetGroupId};
use crate::plasma::streams::{
    read_pstring_16, read_safe_string, write_pstring_16, write_safe_string, StreamRead,
    StreamWrite, StringFormat,
};
use crate::types::bit_vector::BitVector;
use crate::types::math::{ColorRgba, Matrix44, Vector3};

pub mod bcast_flags {
    pub const NET_PROPAGATE: u32 = 1 << 6;
    pub const NET_SENT: u32 = 1 << 7;
    pub const NET_FORCE: u32 = 1 << 9;
    pub const LOCAL_PROPAGATE: u32 = 1 << 11;
    pub const NET_ALLOW_INTER_AGE: u32 = 1 << 14;
    pub const CCR_SEND_TO_ALL_PLAYERS: u32 = 1 << 16;
}

/// Common header shared by every game message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    pub sender: Key,
    pub receivers: Vec<Key>,
    pub timestamp: f64,
    pub bcast_flags: u32,
}

impl StreamRead for Message {
    fn stream_read<R: Read>(stream: &mut R) -> NetResult<Self> {
        let sender = Key::stream_read(stream)?;
        let count = stream.read_u32::<LittleEndian>()? as usize;
        let mut receivers = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            receivers.push(Key::stream_read(stream)?);
        }
        Ok(Self {
            sender,
            receivers,
            timestamp: stream.read_f64::<LittleEndian>()?,
            bcast_flags: stream.read_u32::<LittleEndian>()?,
        })
    }
}

impl StreamWrite for Message {
    fn stream_write<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.sender.stream_write(stream)?;
        stream.write_u32::<LittleEndian>(self.receivers.len() as u32)?;
        for receiver in &self.receivers {
            receiver.stream_write(stream)?;
        }
        stream.write_f64::<LittleEndian>(self.timestamp)?;
        stream.write_u32::<LittleEndian>(self.bcast_flags)?;
        Ok(())
    }
}

/// Server lock/ownership verdict sent back through a `NetMsgGameMessage`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerReplyMsg {
    pub base: Message,
    pub reply: i32,
}

pub mod server_reply {
    pub const DENY: i32 = 0;
    pub const AFFIRM: i32 = 1;
}

impl ServerReplyMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            base: Message::stream_read(stream)?,
            reply: stream.read_i32::<LittleEndian>()?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        stream.write_i32::<LittleEndian>(self.reply)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnableMsg {
    pub base: Message,
    pub cmd: BitVector,
    pub types: BitVector,
}

impl EnableMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            base: Message::stream_read(stream)?,
            cmd: BitVector::stream_read(stream)?,
            types: BitVector::stream_read(stream)?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        self.cmd.stream_write(stream)?;
        self.types.stream_write(stream)?;
        Ok(())
    }
}

/// Teleports an avatar. Never accepted from remote clients.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WarpMsg {
    pub base: Message,
    pub transform: Matrix44,
    pub warp_flags: u32,
}

impl WarpMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            base: Message::stream_read(stream)?,
            transform: Matrix44::stream_read(stream)?,
            warp_flags: stream.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        self.transform.stream_write(stream)?;
        stream.write_u32::<LittleEndian>(self.warp_flags)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetNetGroupIdMsg {
    pub base: Message,
    pub group: NetGroupId,
}

impl SetNetGroupIdMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        let base = Message::stream_read(stream)?;
        let location = crate::plasma::key::Location::stream_read(stream)?;
        let flags = stream.read_u8()?;
        Ok(Self {
            base,
            group: NetGroupId { location, flags },
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        self.group.location.stream_write(stream)?;
        stream.write_u8(self.group.flags)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputIfaceMgrMsg {
    pub base: Message,
    pub command: u8,
    pub page_id: u32,
    pub age_name: String,
    pub age_filename: String,
    pub spawn_point: String,
    pub avatar: Key,
}

impl InputIfaceMgrMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            base: Message::stream_read(stream)?,
            command: stream.read_u8()?,
            page_id: stream.read_u32::<LittleEndian>()?,
            age_name: read_safe_string(stream, StringFormat::Raw)?,
            age_filename: read_safe_string(stream, StringFormat::Raw)?,
            spawn_point: read_safe_string(stream, StringFormat::Raw)?,
            avatar: Key::stream_read(stream)?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        stream.write_u8(self.command)?;
        stream.write_u32::<LittleEndian>(self.page_id)?;
        write_safe_string(stream, &self.age_name, StringFormat::Raw)?;
        write_safe_string(stream, &self.age_filename, StringFormat::Raw)?;
        write_safe_string(stream, &self.spawn_point, StringFormat::Raw)?;
        self.avatar.stream_write(stream)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubWorldMsg {
    pub base: Message,
    pub world: Key,
}

impl SubWorldMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            base: Message::stream_read(stream)?,
            world: Key::stream_read(stream)?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        self.world.stream_write(stream)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AvatarInputStateMsg {
    pub base: Message,
    pub state: u16,
}

impl AvatarInputStateMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            base: Message::stream_read(stream)?,
            state: stream.read_u16::<LittleEndian>()?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        stream.write_u16::<LittleEndian>(self.state)?;
        Ok(())
    }
}

/// Raw input event. Never forwardable; a remote client could fake another
/// player's controls with it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputEventMsg {
    pub base: Message,
    pub event: i32,
}

impl InputEventMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            base: Message::stream_read(stream)?,
            event: stream.read_i32::<LittleEndian>()?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        stream.write_i32::<LittleEndian>(self.event)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlEventMsg {
    pub input: InputEventMsg,
    pub control_code: i32,
    pub activated: bool,
    pub control_percent: f32,
    pub turn_to_point: Vector3,
    pub cmd: String,
}

impl ControlEventMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            input: InputEventMsg::read_from(stream)?,
            control_code: stream.read_i32::<LittleEndian>()?,
            activated: stream.read_u32::<LittleEndian>()? != 0,
            control_percent: stream.read_f32::<LittleEndian>()?,
            turn_to_point: Vector3::stream_read(stream)?,
            cmd: read_pstring_16(stream, StringFormat::Raw)?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.input.write_to(stream)?;
        stream.write_i32::<LittleEndian>(self.control_code)?;
        stream.write_u32::<LittleEndian>(u32::from(self.activated))?;
        stream.write_f32::<LittleEndian>(self.control_percent)?;
        self.turn_to_point.stream_write(stream)?;
        write_pstring_16(stream, &self.cmd, StringFormat::Raw)?;
        Ok(())
    }
}

/// Console backdoor. Never forwardable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackdoorMsg {
    pub base: Message,
    pub target: String,
    pub string: String,
}

impl BackdoorMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            base: Message::stream_read(stream)?,
            target: read_safe_string(stream, StringFormat::Raw)?,
            string: read_safe_string(stream, StringFormat::Raw)?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        write_safe_string(stream, &self.target, StringFormat::Raw)?;
        write_safe_string(stream, &self.string, StringFormat::Raw)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulletMsg {
    pub base: Message,
    pub cmd: u8,
    pub from: Vector3,
    pub direction: Vector3,
    pub range: f32,
    pub radius: f32,
    pub party_time: f32,
}

impl BulletMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            base: Message::stream_read(stream)?,
            cmd: stream.read_u8()?,
            from: Vector3::stream_read(stream)?,
            direction: Vector3::stream_read(stream)?,
            range: stream.read_f32::<LittleEndian>()?,
            radius: stream.read_f32::<LittleEndian>()?,
            party_time: stream.read_f32::<LittleEndian>()?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        stream.write_u8(self.cmd)?;
        self.from.stream_write(stream)?;
        self.direction.stream_write(stream)?;
        stream.write_f32::<LittleEndian>(self.range)?;
        stream.write_f32::<LittleEndian>(self.radius)?;
        stream.write_f32::<LittleEndian>(self.party_time)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClimbMsg {
    pub base: Message,
    pub cmd: u32,
    pub direction: u32,
    pub status: bool,
    pub target: Key,
}

impl ClimbMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            base: Message::stream_read(stream)?,
            cmd: stream.read_u32::<LittleEndian>()?,
            direction: stream.read_u32::<LittleEndian>()?,
            status: stream.read_u8()? != 0,
            target: Key::stream_read(stream)?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        stream.write_u32::<LittleEndian>(self.cmd)?;
        stream.write_u32::<LittleEndian>(self.direction)?;
        stream.write_u8(u8::from(self.status))?;
        self.target.stream_write(stream)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClothingMsg {
    pub base: Message,
    pub commands: u32,
    pub item: Option<Key>,
    pub color: ColorRgba,
    pub layer: u8,
    pub delta: u8,
    pub weight: f32,
}

impl ClothingMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        let base = Message::stream_read(stream)?;
        let commands = stream.read_u32::<LittleEndian>()?;
        let item = if stream.read_u8()? != 0 {
            Some(Key::stream_read(stream)?)
        } else {
            None
        };
        Ok(Self {
            base,
            commands,
            item,
            color: ColorRgba::stream_read(stream)?,
            layer: stream.read_u8()?,
            delta: stream.read_u8()?,
            weight: stream.read_f32::<LittleEndian>()?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        stream.write_u32::<LittleEndian>(self.commands)?;
        match &self.item {
            Some(item) => {
                stream.write_u8(1)?;
                item.stream_write(stream)?;
            }
            None => stream.write_u8(0)?,
        }
        self.color.stream_write(stream)?;
        stream.write_u8(self.layer)?;
        stream.write_u8(self.delta)?;
        stream.write_f32::<LittleEndian>(self.weight)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultistageModMsg {
    pub base: Message,
    pub cmds: BitVector,
    pub stage: u8,
    pub num_loops: u8,
}

impl MultistageModMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            base: Message::stream_read(stream)?,
            cmds: BitVector::stream_read(stream)?,
            stage: stream.read_u8()?,
            num_loops: stream.read_u8()?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        self.cmds.stream_write(stream)?;
        stream.write_u8(self.stage)?;
        stream.write_u8(self.num_loops)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticleTransferMsg {
    pub base: Message,
    pub sys_key: Key,
    pub transfer_count: u16,
}

impl ParticleTransferMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            base: Message::stream_read(stream)?,
            sys_key: Key::stream_read(stream)?,
            transfer_count: stream.read_u16::<LittleEndian>()?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        self.sys_key.stream_write(stream)?;
        stream.write_u16::<LittleEndian>(self.transfer_count)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticleKillMsg {
    pub base: Message,
    pub num_to_kill: f32,
    pub time_left: f32,
    pub flags: u8,
}

impl ParticleKillMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            base: Message::stream_read(stream)?,
            num_to_kill: stream.read_f32::<LittleEndian>()?,
            time_left: stream.read_f32::<LittleEndian>()?,
            flags: stream.read_u8()?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        stream.write_f32::<LittleEndian>(self.num_to_kill)?;
        stream.write_f32::<LittleEndian>(self.time_left)?;
        stream.write_u8(self.flags)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkEffectsTriggerMsg {
    pub base: Message,
    pub invis_level: u32,
    pub leaving: bool,
    pub link_key: Key,
    pub effects: u32,
    pub anim_key: Key,
}

impl LinkEffectsTriggerMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            base: Message::stream_read(stream)?,
            invis_level: stream.read_u32::<LittleEndian>()?,
            leaving: stream.read_u8()? != 0,
            link_key: Key::stream_read(stream)?,
            effects: stream.read_u32::<LittleEndian>()?,
            anim_key: Key::stream_read(stream)?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        stream.write_u32::<LittleEndian>(self.invis_level)?;
        stream.write_u8(u8::from(self.leaving))?;
        self.link_key.stream_write(stream)?;
        stream.write_u32::<LittleEndian>(self.effects)?;
        self.anim_key.stream_write(stream)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PseudoLinkEffectMsg {
    pub base: Message,
    pub link_obj: Key,
    pub avatar: Key,
}

impl PseudoLinkEffectMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            base: Message::stream_read(stream)?,
            link_obj: Key::stream_read(stream)?,
            avatar: Key::stream_read(stream)?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        self.link_obj.stream_write(stream)?;
        self.avatar.stream_write(stream)?;
        Ok(())
    }
}
