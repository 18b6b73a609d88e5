//! `NetMsg*` envelope types exchanged between the game server and clients.

pub mod game_message;
pub mod members;
pub mod sdl_state;

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use uuid::Uuid;

use crate::errors::{NetError, NetResult};
use crate::plasma::key::{Location, NetGroupId, Uoid};
use crate::plasma::streams::{
    read_exact, read_pstring_16, write_pstring_16, StreamRead, StreamWrite, StringFormat,
};
use crate::types::bit_vector::BitVector;
use crate::types::unified_time::UnifiedTime;
use crate::types::{read_uuid, write_uuid};

pub const PROTOCOL_MAJOR: u8 = 12;
pub const PROTOCOL_MINOR: u8 = 6;

pub mod content_flags {
    pub const HAS_TIME_SENT: u32 = 1 << 0;
    pub const ECHO_BACK_TO_SENDER: u32 = 1 << 2;
    pub const HAS_CONTEXT: u32 = 1 << 7;
    pub const HAS_TRANSACTION_ID: u32 = 1 << 9;
    pub const NEW_SDL_STATE: u32 = 1 << 10;
    pub const INITIAL_AGE_STATE_REQUEST: u32 = 1 << 11;
    pub const HAS_PLAYER_ID: u32 = 1 << 12;
    pub const USE_RELEVANCE_REGIONS: u32 = 1 << 13;
    pub const HAS_ACCT_UUID: u32 = 1 << 14;
    pub const INTER_AGE_ROUTING: u32 = 1 << 15;
    pub const HAS_VERSION: u32 = 1 << 16;
    pub const IS_SYSTEM_MESSAGE: u32 = 1 << 17;
    pub const NEEDS_RELIABLE_SEND: u32 = 1 << 18;
    pub const ROUTE_TO_ALL_PLAYERS: u32 = 1 << 19;
}

/// Header fields shared by every net message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetMessage {
    pub content_flags: u32,
    pub timestamp: UnifiedTime,
    pub context: u32,
    pub trans_id: u32,
    pub player_id: u32,
    pub acct_id: Uuid,
}

impl NetMessage {
    /// Standard header for a server-initiated message.
    pub fn with_flags(content_flags: u32) -> Self {
        Self {
            content_flags,
            timestamp: UnifiedTime::now(),
            ..Default::default()
        }
    }
}

impl StreamRead for NetMessage {
    fn stream_read<R: Read>(stream: &mut R) -> NetResult<Self> {
        let content_flags = stream.read_u32::<LittleEndian>()?;
        if content_flags & content_flags::HAS_VERSION != 0 {
            let major = stream.read_u8()?;
            let minor = stream.read_u8()?;
            if major != PROTOCOL_MAJOR || minor != PROTOCOL_MINOR {
                return Err(NetError::Protocol(format!(
                    "unsupported net protocol {major}.{minor}"
                )));
            }
        }
        let mut msg = Self {
            content_flags,
            ..Default::default()
        };
        if content_flags & content_flags::HAS_TIME_SENT != 0 {
            msg.timestamp = UnifiedTime::stream_read(stream)?;
        }
        if content_flags & content_flags::HAS_CONTEXT != 0 {
            msg.context = stream.read_u32::<LittleEndian>()?;
        }
        if content_flags & content_flags::HAS_TRANSACTION_ID != 0 {
            msg.trans_id = stream.read_u32::<LittleEndian>()?;
        }
        if content_flags & content_flags::HAS_PLAYER_ID != 0 {
            msg.player_id = stream.read_u32::<LittleEndian>()?;
        }
        if content_flags & content_flags::HAS_ACCT_UUID != 0 {
            msg.acct_id = read_uuid(stream)?;
        }
        Ok(msg)
    }
}

impl StreamWrite for NetMessage {
    fn stream_write<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        stream.write_u32::<LittleEndian>(self.content_flags)?;
        if self.content_flags & content_flags::HAS_VERSION != 0 {
            stream.write_u8(PROTOCOL_MAJOR)?;
            stream.write_u8(PROTOCOL_MINOR)?;
        }
        if self.content_flags & content_flags::HAS_TIME_SENT != 0 {
            self.timestamp.stream_write(stream)?;
        }
        if self.content_flags & content_flags::HAS_CONTEXT != 0 {
            stream.write_u32::<LittleEndian>(self.context)?;
        }
        if self.content_flags & content_flags::HAS_TRANSACTION_ID != 0 {
            stream.write_u32::<LittleEndian>(self.trans_id)?;
        }
        if self.content_flags & content_flags::HAS_PLAYER_ID != 0 {
            stream.write_u32::<LittleEndian>(self.player_id)?;
        }
        if self.content_flags & content_flags::HAS_ACCT_UUID != 0 {
            write_uuid(stream, &self.acct_id)?;
        }
        Ok(())
    }
}

pub const COMPRESS_NONE: u8 = 0;
pub const COMPRESS_FAIL: u8 = 1;
pub const COMPRESS_ZLIB: u8 = 2;
pub const COMPRESS_NEVER: u8 = 3;

/// Length-prefixed compound body with optional zlib compression. The first
/// two bytes of the payload ride uncompressed ahead of the deflate stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetMsgStream {
    pub compression: u8,
    pub data: Vec<u8>,
}

impl StreamRead for NetMsgStream {
    fn stream_read<R: Read>(stream: &mut R) -> NetResult<Self> {
        let uncompressed_size = stream.read_u32::<LittleEndian>()? as usize;
        let compression = stream.read_u8()?;
        let size = stream.read_u32::<LittleEndian>()? as usize;
        let raw = read_exact(stream, size)?;

        if compression == COMPRESS_ZLIB {
            if size < 2 || uncompressed_size < 2 {
                return Err(NetError::Malformed("truncated compressed stream"));
            }
            let mut data = Vec::with_capacity(uncompressed_size);
            data.extend_from_slice(&raw[..2]);
            let mut decoder = ZlibDecoder::new(&raw[2..]);
            decoder
                .read_to_end(&mut data)
                .map_err(|_| NetError::Malformed("corrupt compressed stream"))?;
            if data.len() != uncompressed_size {
                return Err(NetError::Malformed("compressed stream size mismatch"));
            }
            Ok(Self {
                compression,
                data,
            })
        } else {
            Ok(Self {
                compression,
                data: raw,
            })
        }
    }
}

impl StreamWrite for NetMsgStream {
    fn stream_write<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        stream.write_u32::<LittleEndian>(self.data.len() as u32)?;
        stream.write_u8(self.compression)?;
        if self.compression == COMPRESS_ZLIB {
            if self.data.len() < 2 {
                return Err(NetError::Malformed("compound body too short to compress"));
            }
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&self.data[2..])?;
            let deflated = encoder
                .finish()
                .map_err(|_| NetError::Malformed("compound body compression failed"))?;
            stream.write_u32::<LittleEndian>((deflated.len() + 2) as u32)?;
            stream.write_all(&self.data[..2])?;
            stream.write_all(&deflated)?;
        } else {
            stream.write_u32::<LittleEndian>(self.data.len() as u32)?;
            stream.write_all(&self.data)?;
        }
        Ok(())
    }
}

/// Rooms list shared by paging and game-state requests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetMsgRoomsList {
    pub base: NetMessage,
    pub rooms: Vec<(Location, String)>,
}

impl NetMsgRoomsList {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        let base = NetMessage::stream_read(stream)?;
        let count = stream.read_u32::<LittleEndian>()? as usize;
        if count > 0x1000 {
            return Err(NetError::Malformed("oversized rooms list"));
        }
        let mut rooms = Vec::with_capacity(count);
        for _ in 0..count {
            let location = Location::stream_read(stream)?;
            let name = read_pstring_16(stream, StringFormat::Raw)?;
            rooms.push((location, name));
        }
        Ok(Self { base, rooms })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        stream.write_u32::<LittleEndian>(self.rooms.len() as u32)?;
        for (location, name) in &self.rooms {
            location.stream_write(stream)?;
            write_pstring_16(stream, name, StringFormat::Raw)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetMsgPagingRoom {
    pub rooms: NetMsgRoomsList,
    pub paging_flags: u8,
}

impl NetMsgPagingRoom {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            rooms: NetMsgRoomsList::read_from(stream)?,
            paging_flags: stream.read_u8()?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.rooms.write_to(stream)?;
        stream.write_u8(self.paging_flags)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetMsgGroupOwner {
    pub base: NetMessage,
    pub groups: Vec<(NetGroupId, bool)>,
}

impl NetMsgGroupOwner {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        let base = NetMessage::stream_read(stream)?;
        let count = stream.read_u32::<LittleEndian>()? as usize;
        if count > 0x1000 {
            return Err(NetError::Malformed("oversized group list"));
        }
        let mut groups = Vec::with_capacity(count);
        for _ in 0..count {
            let location = Location::stream_read(stream)?;
            let flags = stream.read_u8()?;
            let own = stream.read_u8()? != 0;
            groups.push((NetGroupId { location, flags }, own));
        }
        Ok(Self { base, groups })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        stream.write_u32::<LittleEndian>(self.groups.len() as u32)?;
        for (group, own) in &self.groups {
            group.location.stream_write(stream)?;
            stream.write_u8(group.flags)?;
            stream.write_u8(u8::from(*own))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetMsgInitialAgeStateSent {
    pub base: NetMessage,
    pub num_states: u32,
}

impl NetMsgInitialAgeStateSent {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            base: NetMessage::stream_read(stream)?,
            num_states: stream.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        stream.write_u32::<LittleEndian>(self.num_states)?;
        Ok(())
    }
}

/// Lock/shared-state request. The embedded compound body is consumed and
/// discarded; only the lock byte matters server-side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetMsgSharedState {
    pub base: NetMessage,
    pub object: Uoid,
    pub compression: u8,
    pub lock_request: u8,
}

impl NetMsgSharedState {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        let base = NetMessage::stream_read(stream)?;
        let object = Uoid::stream_read(stream)?;
        let body = NetMsgStream::stream_read(stream)?;
        Ok(Self {
            base,
            object,
            compression: body.compression,
            lock_request: stream.read_u8()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetMsgVoice {
    pub base: NetMessage,
    pub flags: u8,
    pub frames: u8,
    pub data: Vec<u8>,
    pub receivers: Vec<u32>,
}

impl NetMsgVoice {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        let base = NetMessage::stream_read(stream)?;
        let flags = stream.read_u8()?;
        let frames = stream.read_u8()?;
        let length = stream.read_u16::<LittleEndian>()? as usize;
        let data = read_exact(stream, length)?;
        let count = stream.read_u8()? as usize;
        let mut receivers = Vec::with_capacity(count);
        for _ in 0..count {
            receivers.push(stream.read_u32::<LittleEndian>()?);
        }
        Ok(Self {
            base,
            flags,
            frames,
            data,
            receivers,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        stream.write_u8(self.flags)?;
        stream.write_u8(self.frames)?;
        stream.write_u16::<LittleEndian>(self.data.len() as u16)?;
        stream.write_all(&self.data)?;
        stream.write_u8(self.receivers.len() as u8)?;
        for receiver in &self.receivers {
            stream.write_u32::<LittleEndian>(*receiver)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetMsgPlayerPage {
    pub base: NetMessage,
    pub unload: u8,
    pub uoid: Uoid,
}

impl NetMsgPlayerPage {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            base: NetMessage::stream_read(stream)?,
            unload: stream.read_u8()?,
            uoid: Uoid::stream_read(stream)?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        stream.write_u8(self.unload)?;
        self.uoid.stream_write(stream)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetMsgRelevanceRegions {
    pub base: NetMessage,
    pub regions_i_care_about: BitVector,
    pub regions_i_am_in: BitVector,
}

impl NetMsgRelevanceRegions {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            base: NetMessage::stream_read(stream)?,
            regions_i_care_about: BitVector::stream_read(stream)?,
            regions_i_am_in: BitVector::stream_read(stream)?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        self.regions_i_care_about.stream_write(stream)?;
        self.regions_i_am_in.stream_write(stream)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn net_message_optional_fields() {
        let msg = NetMessage {
            content_flags: content_flags::HAS_TIME_SENT
                | content_flags::HAS_PLAYER_ID
                | content_flags::HAS_TRANSACTION_ID,
            timestamp: UnifiedTime {
                secs: 100,
                micros: 5,
            },
            trans_id: 9,
            player_id: 30015,
            ..Default::default()
        };
        let mut buffer = Vec::new();
        msg.stream_write(&mut buffer).unwrap();
        let back = NetMessage::stream_read(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn compound_stream_zlib_roundtrip() {
        let body: Vec<u8> = (0..600).map(|i| (i % 7) as u8).collect();
        let stream = NetMsgStream {
            compression: COMPRESS_ZLIB,
            data: body.clone(),
        };
        let mut buffer = Vec::new();
        stream.stream_write(&mut buffer).unwrap();
        // Repetitive data must actually shrink.
        assert!(buffer.len() < body.len());
        let back = NetMsgStream::stream_read(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(back.data, body);
    }

    #[test]
    fn compound_stream_plain_roundtrip() {
        let stream = NetMsgStream {
            compression: COMPRESS_NONE,
            data: vec![1, 2, 3],
        };
        let mut buffer = Vec::new();
        stream.stream_write(&mut buffer).unwrap();
        let back = NetMsgStream::stream_read(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(back, stream);
    }
}
