use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};

use super::{NetMessage, NetMsgStream, COMPRESS_NONE, COMPRESS_ZLIB};
use crate::errors::NetResult;
use crate::plasma::key::Uoid;
use crate::plasma::streams::{StreamRead, StreamWrite};

const COMPRESSION_THRESHOLD: usize = 256;

/// Object SDL delta or snapshot. The blob is opaque at this layer; the game
/// host stores or forwards it without decoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetMsgSdlState {
    pub base: NetMessage,
    pub object: Uoid,
    pub compression: u8,
    pub sdl_blob: Vec<u8>,
    pub is_initial: bool,
    pub persist_on_server: bool,
    pub is_avatar: bool,
}

impl NetMsgSdlState {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        let base = NetMessage::stream_read(stream)?;
        let object = Uoid::stream_read(stream)?;
        let body = NetMsgStream::stream_read(stream)?;
        Ok(Self {
            base,
            object,
            compression: body.compression,
            sdl_blob: body.data,
            is_initial: stream.read_u8()? != 0,
            persist_on_server: stream.read_u8()? != 0,
            is_avatar: stream.read_u8()? != 0,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        self.object.stream_write(stream)?;
        let compression =
            if self.compression == COMPRESS_NONE && self.sdl_blob.len() > COMPRESSION_THRESHOLD {
                COMPRESS_ZLIB
            } else {
                self.compression
            };
        NetMsgStream {
            compression,
            data: self.sdl_blob.clone(),
        }
        .stream_write(stream)?;
        stream.write_u8(u8::from(self.is_initial))?;
        stream.write_u8(u8::from(self.persist_on_server))?;
        stream.write_u8(u8::from(self.is_avatar))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn sdl_state_roundtrip() {
        let msg = NetMsgSdlState {
            object: Uoid {
                name: "AgeSDLHook".to_string(),
                object_type: 1,
                id: 1,
                ..Default::default()
            },
            sdl_blob: vec![0x10, 0x20, 0x30],
            is_initial: true,
            persist_on_server: true,
            is_avatar: false,
            ..Default::default()
        };
        let mut buffer = Vec::new();
        msg.write_to(&mut buffer).unwrap();
        let back = NetMsgSdlState::read_from(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(back, msg);
    }
}
