use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{NetMessage, NetMsgStream, COMPRESS_NONE, COMPRESS_ZLIB};
use crate::errors::{NetError, NetResult};
use crate::plasma::factory::{read_creatable, write_creatable, Creatable};
use crate::plasma::key::Uoid;
use crate::plasma::streams::{StreamRead, StreamWrite};
use crate::types::unified_time::UnifiedTime;

/// A game message wrapped for network delivery. The inner message rides in a
/// compound stream that is zlib-compressed when large.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetMsgGameMessage {
    pub base: NetMessage,
    pub compression: u8,
    pub message: Option<Box<Creatable>>,
    pub delivery_time: Option<UnifiedTime>,
}

const COMPRESSION_THRESHOLD: usize = 256;

impl NetMsgGameMessage {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        let base = NetMessage::stream_read(stream)?;
        let body = NetMsgStream::stream_read(stream)?;
        let mut cursor = Cursor::new(body.data);
        let message = read_creatable(&mut cursor)?;
        let delivery_time = if stream.read_u8()? != 0 {
            Some(UnifiedTime::stream_read(stream)?)
        } else {
            None
        };
        Ok(Self {
            base,
            compression: body.compression,
            message,
            delivery_time,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;

        let mut body = Vec::new();
        write_creatable(&mut body, self.message.as_deref())?;
        let compression = if self.compression == COMPRESS_NONE && body.len() > COMPRESSION_THRESHOLD
        {
            COMPRESS_ZLIB
        } else {
            self.compression
        };
        NetMsgStream {
            compression,
            data: body,
        }
        .stream_write(stream)?;

        match &self.delivery_time {
            Some(time) => {
                stream.write_u8(1)?;
                time.stream_write(stream)?;
            }
            None => stream.write_u8(0)?,
        }
        Ok(())
    }

    pub fn make_safe_for_net(&mut self) -> bool {
        match &mut self.message {
            Some(message) => message.make_safe_for_net(),
            None => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetMsgGameMessageDirected {
    pub game_message: NetMsgGameMessage,
    pub receivers: Vec<u32>,
}

impl NetMsgGameMessageDirected {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        let game_message = NetMsgGameMessage::read_from(stream)?;
        let count = stream.read_u8()? as usize;
        let mut receivers = Vec::with_capacity(count);
        for _ in 0..count {
            receivers.push(stream.read_u32::<LittleEndian>()?);
        }
        Ok(Self {
            game_message,
            receivers,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.game_message.write_to(stream)?;
        if self.receivers.len() > u8::MAX as usize {
            return Err(NetError::Malformed("too many directed receivers"));
        }
        stream.write_u8(self.receivers.len() as u8)?;
        for receiver in &self.receivers {
            stream.write_u32::<LittleEndian>(*receiver)?;
        }
        Ok(())
    }
}

/// Clone load/unload broadcast; also records the sender's avatar key on the
/// host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetMsgLoadClone {
    pub game_message: NetMsgGameMessage,
    pub object: Uoid,
    pub is_player: bool,
    pub is_loading: bool,
    pub is_initial_state: bool,
}

impl NetMsgLoadClone {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            game_message: NetMsgGameMessage::read_from(stream)?,
            object: Uoid::stream_read(stream)?,
            is_player: stream.read_u8()? != 0,
            is_loading: stream.read_u8()? != 0,
            is_initial_state: stream.read_u8()? != 0,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.game_message.write_to(stream)?;
        self.object.stream_write(stream)?;
        stream.write_u8(u8::from(self.is_player))?;
        stream.write_u8(u8::from(self.is_loading))?;
        stream.write_u8(u8::from(self.is_initial_state))?;
        Ok(())
    }

    pub fn make_safe_for_net(&mut self) -> bool {
        match &mut self.game_message.message {
            Some(message) => message.make_safe_for_net(),
            None => true,
        }
    }
}
