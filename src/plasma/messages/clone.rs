use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::Message;
use crate::errors::NetResult;
use crate::plasma::factory::{read_creatable, write_creatable, Creatable};
use crate::plasma::key::Key;
use crate::plasma::streams::{
    read_safe_string, write_safe_string, StreamRead, StreamWrite, StringFormat,
};

/// Spawns or unloads a clone object on every client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadCloneMsg {
    pub base: Message,
    pub clone_key: Key,
    pub requestor_key: Key,
    pub origin_player_id: u32,
    pub user_data: u32,
    pub valid_msg: bool,
    pub is_loading: bool,
    pub trigger_msg: Option<Box<Creatable>>,
}

impl LoadCloneMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            base: Message::stream_read(stream)?,
            clone_key: Key::stream_read(stream)?,
            requestor_key: Key::stream_read(stream)?,
            origin_player_id: stream.read_u32::<LittleEndian>()?,
            user_data: stream.read_u32::<LittleEndian>()?,
            valid_msg: stream.read_u8()? != 0,
            is_loading: stream.read_u8()? != 0,
            trigger_msg: read_creatable(stream)?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        self.clone_key.stream_write(stream)?;
        self.requestor_key.stream_write(stream)?;
        stream.write_u32::<LittleEndian>(self.origin_player_id)?;
        stream.write_u32::<LittleEndian>(self.user_data)?;
        stream.write_u8(u8::from(self.valid_msg))?;
        stream.write_u8(u8::from(self.is_loading))?;
        write_creatable(stream, self.trigger_msg.as_deref())?;
        Ok(())
    }

    pub fn make_safe_for_net(&mut self) -> bool {
        match &mut self.trigger_msg {
            Some(trigger) => trigger.make_safe_for_net(),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadAvatarMsg {
    pub clone: LoadCloneMsg,
    pub is_player: bool,
    pub spawn_point: Key,
    pub init_task: Option<Box<Creatable>>,
    pub user_string: String,
}

impl LoadAvatarMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        let clone = LoadCloneMsg::read_from(stream)?;
        let is_player = stream.read_u8()? != 0;
        let spawn_point = Key::stream_read(stream)?;
        let init_task = if stream.read_u8()? != 0 {
            read_creatable(stream)?
        } else {
            None
        };
        let user_string = read_safe_string(stream, StringFormat::Raw)?;
        Ok(Self {
            clone,
            is_player,
            spawn_point,
            init_task,
            user_string,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.clone.write_to(stream)?;
        stream.write_u8(u8::from(self.is_player))?;
        self.spawn_point.stream_write(stream)?;
        match &self.init_task {
            Some(task) => {
                stream.write_u8(1)?;
                write_creatable(stream, Some(task))?;
            }
            None => stream.write_u8(0)?,
        }
        write_safe_string(stream, &self.user_string, StringFormat::Raw)?;
        Ok(())
    }

    pub fn make_safe_for_net(&mut self) -> bool {
        self.clone.make_safe_for_net()
    }
}
