use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::Message;
use crate::errors::NetResult;
use crate::plasma::streams::{
    read_safe_string, write_safe_string, StreamRead, StreamWrite, StringFormat,
};

pub mod command {
    pub const CHAT_MESSAGE: u8 = 0;
}

pub mod flags {
    pub const PRIVATE_MSG: u32 = 1 << 0;
    pub const ADMIN_MSG: u32 = 1 << 1;
    pub const DEAD: u32 = 1 << 2;
    pub const STATUS_MSG: u32 = 1 << 4;
    pub const NEIGHBOR_MSG: u32 = 1 << 5;
    pub const CHANNEL_MASK: u32 = 0xFF00;
}

/// KI chat and command traffic. Only plain chat survives the relay; anything
/// else is a client trying to drive another player's KI.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KiMessage {
    pub base: Message,
    pub command: u8,
    pub user: String,
    pub player_id: u32,
    pub string: String,
    pub flags: u32,
    pub delay: f32,
    pub value: i32,
}

impl KiMessage {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            base: Message::stream_read(stream)?,
            command: stream.read_u8()?,
            user: read_safe_string(stream, StringFormat::Raw)?,
            player_id: stream.read_u32::<LittleEndian>()?,
            string: read_safe_string(stream, StringFormat::Utf16)?,
            flags: stream.read_u32::<LittleEndian>()?,
            delay: stream.read_f32::<LittleEndian>()?,
            value: stream.read_i32::<LittleEndian>()?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        stream.write_u8(self.command)?;
        write_safe_string(stream, &self.user, StringFormat::Raw)?;
        stream.write_u32::<LittleEndian>(self.player_id)?;
        write_safe_string(stream, &self.string, StringFormat::Utf16)?;
        stream.write_u32::<LittleEndian>(self.flags)?;
        stream.write_f32::<LittleEndian>(self.delay)?;
        stream.write_i32::<LittleEndian>(self.value)?;
        Ok(())
    }

    /// Chat messages pass with the admin bit stripped; every other command is
    /// dropped.
    pub fn make_safe_for_net(&mut self) -> bool {
        if self.command != command::CHAT_MESSAGE {
            return false;
        }
        self.flags &= !flags::ADMIN_MSG;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn chat_roundtrip() {
        let msg = KiMessage {
            command: command::CHAT_MESSAGE,
            user: "Atrus".to_string(),
            player_id: 30015,
            string: "The Art is a dangerous thing".to_string(),
            flags: flags::PRIVATE_MSG,
            delay: 0.0,
            value: 0,
            ..Default::default()
        };
        let mut buffer = Vec::new();
        msg.write_to(&mut buffer).unwrap();
        let back = KiMessage::read_from(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn admin_flag_is_stripped_from_chat() {
        let mut msg = KiMessage {
            command: command::CHAT_MESSAGE,
            flags: flags::ADMIN_MSG | flags::PRIVATE_MSG,
            ..Default::default()
        };
        assert!(msg.make_safe_for_net());
        assert_eq!(msg.flags, flags::PRIVATE_MSG);
    }

    #[test]
    fn non_chat_commands_are_rejected() {
        let mut msg = KiMessage {
            command: 9, // UpgradeKILevel
            ..Default::default()
        };
        assert!(!msg.make_safe_for_net());
    }
}
