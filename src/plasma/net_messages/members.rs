//! Age membership bookkeeping messages.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use uuid::Uuid;

use super::NetMessage;
use crate::errors::{NetError, NetResult};
use crate::plasma::key::Uoid;
use crate::plasma::streams::{StreamRead, StreamWrite};
use crate::types::{read_uuid, write_uuid};

pub mod guid_flags {
    pub const HAS_ACCT_UUID: u16 = 1 << 0;
    pub const HAS_PLAYER_ID: u16 = 1 << 1;
    pub const HAS_TEMP_PLAYER_ID: u16 = 1 << 2;
    pub const HAS_CCR_LEVEL: u16 = 1 << 3;
    pub const HAS_PROTECTED_LOGIN: u16 = 1 << 4;
    pub const HAS_BUILD_TYPE: u16 = 1 << 5;
    pub const HAS_PLAYER_NAME: u16 = 1 << 6;
    pub const HAS_SRC_ADDR: u16 = 1 << 7;
    pub const HAS_SRC_PORT: u16 = 1 << 8;
    pub const HAS_RESERVED: u16 = 1 << 9;
    pub const HAS_CLIENT_KEY: u16 = 1 << 10;
}

/// Sparse client identity record; only flagged fields hit the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientGuid {
    pub flags: u16,
    pub acct_uuid: Uuid,
    pub player_id: u32,
    pub player_name: String,
    pub ccr_level: u8,
    pub protected_login: bool,
    pub build_type: u8,
    pub src_addr: u32,
    pub src_port: u16,
    pub reserved: u16,
    pub client_key: String,
}

impl ClientGuid {
    pub fn set_player_id(&mut self, player_id: u32) {
        self.player_id = player_id;
        self.flags |= guid_flags::HAS_PLAYER_ID;
    }

    pub fn set_player_name(&mut self, name: &str) {
        self.player_name = name.to_string();
        self.flags |= guid_flags::HAS_PLAYER_NAME;
    }

    pub fn set_ccr_level(&mut self, level: u8) {
        self.ccr_level = level;
        self.flags |= guid_flags::HAS_CCR_LEVEL;
    }
}

impl StreamRead for ClientGuid {
    fn stream_read<R: Read>(stream: &mut R) -> NetResult<Self> {
        let flags = stream.read_u16::<LittleEndian>()?;
        let mut guid = Self {
            flags,
            ..Default::default()
        };
        if flags & guid_flags::HAS_ACCT_UUID != 0 {
            guid.acct_uuid = read_uuid(stream)?;
        }
        if flags & (guid_flags::HAS_PLAYER_ID | guid_flags::HAS_TEMP_PLAYER_ID) != 0 {
            guid.player_id = stream.read_u32::<LittleEndian>()?;
        }
        if flags & guid_flags::HAS_PLAYER_NAME != 0 {
            let len = stream.read_u16::<LittleEndian>()? as usize;
            let bytes = crate::plasma::streams::read_exact(stream, len)?;
            guid.player_name = bytes.iter().map(|&b| b as char).collect();
        }
        if flags & guid_flags::HAS_CCR_LEVEL != 0 {
            guid.ccr_level = stream.read_u8()?;
        }
        if flags & guid_flags::HAS_PROTECTED_LOGIN != 0 {
            guid.protected_login = stream.read_u8()? != 0;
        }
        if flags & guid_flags::HAS_BUILD_TYPE != 0 {
            guid.build_type = stream.read_u8()?;
        }
        if flags & guid_flags::HAS_SRC_ADDR != 0 {
            guid.src_addr = stream.read_u32::<LittleEndian>()?;
        }
        if flags & guid_flags::HAS_SRC_PORT != 0 {
            guid.src_port = stream.read_u16::<LittleEndian>()?;
        }
        if flags & guid_flags::HAS_RESERVED != 0 {
            guid.reserved = stream.read_u16::<LittleEndian>()?;
        }
        if flags & guid_flags::HAS_CLIENT_KEY != 0 {
            let len = stream.read_u16::<LittleEndian>()? as usize;
            let bytes = crate::plasma::streams::read_exact(stream, len)?;
            guid.client_key = bytes.iter().map(|&b| b as char).collect();
        }
        Ok(guid)
    }
}

impl StreamWrite for ClientGuid {
    fn stream_write<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        stream.write_u16::<LittleEndian>(self.flags)?;
        if self.flags & guid_flags::HAS_ACCT_UUID != 0 {
            write_uuid(stream, &self.acct_uuid)?;
        }
        if self.flags & (guid_flags::HAS_PLAYER_ID | guid_flags::HAS_TEMP_PLAYER_ID) != 0 {
            stream.write_u32::<LittleEndian>(self.player_id)?;
        }
        if self.flags & guid_flags::HAS_PLAYER_NAME != 0 {
            let bytes: Vec<u8> = self.player_name.chars().map(|c| c as u32 as u8).collect();
            stream.write_u16::<LittleEndian>(bytes.len() as u16)?;
            stream.write_all(&bytes)?;
        }
        if self.flags & guid_flags::HAS_CCR_LEVEL != 0 {
            stream.write_u8(self.ccr_level)?;
        }
        if self.flags & guid_flags::HAS_PROTECTED_LOGIN != 0 {
            stream.write_u8(u8::from(self.protected_login))?;
        }
        if self.flags & guid_flags::HAS_BUILD_TYPE != 0 {
            stream.write_u8(self.build_type)?;
        }
        if self.flags & guid_flags::HAS_SRC_ADDR != 0 {
            stream.write_u32::<LittleEndian>(self.src_addr)?;
        }
        if self.flags & guid_flags::HAS_SRC_PORT != 0 {
            stream.write_u16::<LittleEndian>(self.src_port)?;
        }
        if self.flags & guid_flags::HAS_RESERVED != 0 {
            stream.write_u16::<LittleEndian>(self.reserved)?;
        }
        if self.flags & guid_flags::HAS_CLIENT_KEY != 0 {
            let bytes: Vec<u8> = self.client_key.chars().map(|c| c as u32 as u8).collect();
            stream.write_u16::<LittleEndian>(bytes.len() as u16)?;
            stream.write_all(&bytes)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemberInfo {
    pub flags: u32,
    pub client: ClientGuid,
    pub avatar_key: Uoid,
}

impl StreamRead for MemberInfo {
    fn stream_read<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            flags: stream.read_u32::<LittleEndian>()?,
            client: ClientGuid::stream_read(stream)?,
            avatar_key: Uoid::stream_read(stream)?,
        })
    }
}

impl StreamWrite for MemberInfo {
    fn stream_write<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        stream.write_u32::<LittleEndian>(self.flags)?;
        self.client.stream_write(stream)?;
        self.avatar_key.stream_write(stream)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetMsgMembersListReq {
    pub base: NetMessage,
}

impl NetMsgMembersListReq {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            base: NetMessage::stream_read(stream)?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetMsgMembersList {
    pub base: NetMessage,
    pub members: Vec<MemberInfo>,
}

impl NetMsgMembersList {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        let base = NetMessage::stream_read(stream)?;
        let count = stream.read_u16::<LittleEndian>()? as usize;
        if count > 0x1000 {
            return Err(NetError::Malformed("oversized members list"));
        }
        let mut members = Vec::with_capacity(count);
        for _ in 0..count {
            members.push(MemberInfo::stream_read(stream)?);
        }
        Ok(Self { base, members })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        stream.write_u16::<LittleEndian>(self.members.len() as u16)?;
        for member in &self.members {
            member.stream_write(stream)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetMsgMemberUpdate {
    pub base: NetMessage,
    pub member: MemberInfo,
    pub add_member: bool,
}

impl NetMsgMemberUpdate {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            base: NetMessage::stream_read(stream)?,
            member: MemberInfo::stream_read(stream)?,
            add_member: stream.read_u8()? != 0,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        self.member.stream_write(stream)?;
        stream.write_u8(u8::from(self.add_member))?;
        Ok(())
    }
}
