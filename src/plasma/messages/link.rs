//! Age linking structures and the messages that carry them.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use uuid::Uuid;

use super::Message;
use crate::errors::{NetError, NetResult};
use crate::plasma::factory::{read_creatable_of, write_creatable_body, Creatable};
use crate::plasma::streams::{
    read_pstring_16, read_safe_string, write_pstring_16, write_safe_string, StreamRead,
    StreamWrite, StringFormat,
};
use crate::types::bit_vector::BitVector;
use crate::types::{read_uuid, write_uuid};

mod age_info_flags {
    pub const HAS_AGE_FILENAME: u8 = 1 << 0;
    pub const HAS_AGE_INSTANCE_NAME: u8 = 1 << 1;
    pub const HAS_AGE_INSTANCE_UUID: u8 = 1 << 2;
    pub const HAS_AGE_USER_DEFINED_NAME: u8 = 1 << 3;
    pub const HAS_AGE_SEQUENCE_NUMBER: u8 = 1 << 4;
    pub const HAS_AGE_DESCRIPTION: u8 = 1 << 5;
    pub const HAS_AGE_LANGUAGE: u8 = 1 << 6;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgeInfoStruct {
    pub flags: u8,
    pub age_filename: String,
    pub age_instance_name: String,
    pub age_instance_uuid: Uuid,
    pub age_user_defined_name: String,
    pub age_sequence_number: i32,
    pub age_description: String,
    pub age_language: i32,
}

impl StreamRead for AgeInfoStruct {
    fn stream_read<R: Read>(stream: &mut R) -> NetResult<Self> {
        let mut info = Self {
            flags: stream.read_u8()?,
            ..Default::default()
        };
        if info.flags & age_info_flags::HAS_AGE_FILENAME != 0 {
            info.age_filename = read_pstring_16(stream, StringFormat::Raw)?;
        }
        if info.flags & age_info_flags::HAS_AGE_INSTANCE_NAME != 0 {
            info.age_instance_name = read_pstring_16(stream, StringFormat::Raw)?;
        }
        if info.flags & age_info_flags::HAS_AGE_INSTANCE_UUID != 0 {
            info.age_instance_uuid = read_uuid(stream)?;
        }
        if info.flags & age_info_flags::HAS_AGE_USER_DEFINED_NAME != 0 {
            info.age_user_defined_name = read_pstring_16(stream, StringFormat::Raw)?;
        }
        if info.flags & age_info_flags::HAS_AGE_SEQUENCE_NUMBER != 0 {
            info.age_sequence_number = stream.read_i32::<LittleEndian>()?;
        }
        if info.flags & age_info_flags::HAS_AGE_DESCRIPTION != 0 {
            info.age_description = read_pstring_16(stream, StringFormat::Raw)?;
        }
        if info.flags & age_info_flags::HAS_AGE_LANGUAGE != 0 {
            info.age_language = stream.read_i32::<LittleEndian>()?;
        }
        Ok(info)
    }
}

impl StreamWrite for AgeInfoStruct {
    fn stream_write<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        stream.write_u8(self.flags)?;
        if self.flags & age_info_flags::HAS_AGE_FILENAME != 0 {
            write_pstring_16(stream, &self.age_filename, StringFormat::Raw)?;
        }
        if self.flags & age_info_flags::HAS_AGE_INSTANCE_NAME != 0 {
            write_pstring_16(stream, &self.age_instance_name, StringFormat::Raw)?;
        }
        if self.flags & age_info_flags::HAS_AGE_INSTANCE_UUID != 0 {
            write_uuid(stream, &self.age_instance_uuid)?;
        }
        if self.flags & age_info_flags::HAS_AGE_USER_DEFINED_NAME != 0 {
            write_pstring_16(stream, &self.age_user_defined_name, StringFormat::Raw)?;
        }
        if self.flags & age_info_flags::HAS_AGE_SEQUENCE_NUMBER != 0 {
            stream.write_i32::<LittleEndian>(self.age_sequence_number)?;
        }
        if self.flags & age_info_flags::HAS_AGE_DESCRIPTION != 0 {
            write_pstring_16(stream, &self.age_description, StringFormat::Raw)?;
        }
        if self.flags & age_info_flags::HAS_AGE_LANGUAGE != 0 {
            stream.write_i32::<LittleEndian>(self.age_language)?;
        }
        Ok(())
    }
}

mod spawn_flags {
    pub const HAS_TITLE: usize = 0;
    pub const HAS_NAME: usize = 1;
    pub const HAS_CAMERA_STACK: usize = 2;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpawnPointInfo {
    pub flags: BitVector,
    pub title: String,
    pub spawn_pt: String,
    pub camera_stack: String,
}

impl StreamRead for SpawnPointInfo {
    fn stream_read<R: Read>(stream: &mut R) -> NetResult<Self> {
        let mut info = Self {
            flags: BitVector::stream_read(stream)?,
            ..Default::default()
        };
        if info.flags.get(spawn_flags::HAS_TITLE) {
            info.title = read_pstring_16(stream, StringFormat::Raw)?;
        }
        if info.flags.get(spawn_flags::HAS_NAME) {
            info.spawn_pt = read_pstring_16(stream, StringFormat::Raw)?;
        }
        if info.flags.get(spawn_flags::HAS_CAMERA_STACK) {
            info.camera_stack = read_pstring_16(stream, StringFormat::Raw)?;
        }
        Ok(info)
    }
}

impl StreamWrite for SpawnPointInfo {
    fn stream_write<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.flags.stream_write(stream)?;
        if self.flags.get(spawn_flags::HAS_TITLE) {
            write_pstring_16(stream, &self.title, StringFormat::Raw)?;
        }
        if self.flags.get(spawn_flags::HAS_NAME) {
            write_pstring_16(stream, &self.spawn_pt, StringFormat::Raw)?;
        }
        if self.flags.get(spawn_flags::HAS_CAMERA_STACK) {
            write_pstring_16(stream, &self.camera_stack, StringFormat::Raw)?;
        }
        Ok(())
    }
}

mod link_flags {
    pub const HAS_AGE_INFO: u16 = 1 << 0;
    pub const HAS_LINKING_RULES: u16 = 1 << 1;
    pub const HAS_SPAWN_PT_INLINE: u16 = 1 << 2;
    pub const HAS_SPAWN_PT_LEGACY: u16 = 1 << 3;
    pub const HAS_AM_CCR: u16 = 1 << 4;
    pub const HAS_SPAWN_PT: u16 = 1 << 5;
    pub const HAS_PARENT_AGE_FILENAME: u16 = 1 << 6;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgeLinkStruct {
    pub flags: u16,
    pub age_info: AgeInfoStruct,
    pub linking_rules: u8,
    pub spawn_point: SpawnPointInfo,
    pub am_ccr: bool,
    pub parent_age_filename: String,
}

impl StreamRead for AgeLinkStruct {
    fn stream_read<R: Read>(stream: &mut R) -> NetResult<Self> {
        let flags = stream.read_u16::<LittleEndian>()?;
        // Inline/legacy spawn point formats predate the supported client.
        if flags & (link_flags::HAS_SPAWN_PT_INLINE | link_flags::HAS_SPAWN_PT_LEGACY) != 0 {
            return Err(NetError::Malformed("legacy spawn point format"));
        }
        let mut link = Self {
            flags,
            ..Default::default()
        };
        if flags & link_flags::HAS_AGE_INFO != 0 {
            link.age_info = AgeInfoStruct::stream_read(stream)?;
        }
        if flags & link_flags::HAS_LINKING_RULES != 0 {
            link.linking_rules = stream.read_u8()?;
        }
        if flags & link_flags::HAS_SPAWN_PT != 0 {
            link.spawn_point = SpawnPointInfo::stream_read(stream)?;
        }
        if flags & link_flags::HAS_AM_CCR != 0 {
            link.am_ccr = stream.read_u8()? != 0;
        }
        if flags & link_flags::HAS_PARENT_AGE_FILENAME != 0 {
            link.parent_age_filename = read_pstring_16(stream, StringFormat::Raw)?;
        }
        Ok(link)
    }
}

impl StreamWrite for AgeLinkStruct {
    fn stream_write<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        if self.flags & (link_flags::HAS_SPAWN_PT_INLINE | link_flags::HAS_SPAWN_PT_LEGACY) != 0 {
            return Err(NetError::Malformed("legacy spawn point format"));
        }
        stream.write_u16::<LittleEndian>(self.flags)?;
        if self.flags & link_flags::HAS_AGE_INFO != 0 {
            self.age_info.stream_write(stream)?;
        }
        if self.flags & link_flags::HAS_LINKING_RULES != 0 {
            stream.write_u8(self.linking_rules)?;
        }
        if self.flags & link_flags::HAS_SPAWN_PT != 0 {
            self.spawn_point.stream_write(stream)?;
        }
        if self.flags & link_flags::HAS_AM_CCR != 0 {
            stream.write_u8(u8::from(self.am_ccr))?;
        }
        if self.flags & link_flags::HAS_PARENT_AGE_FILENAME != 0 {
            write_pstring_16(stream, &self.parent_age_filename, StringFormat::Raw)?;
        }
        Ok(())
    }
}

/// Client request to link to another age. Never forwardable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkToAgeMsg {
    pub base: Message,
    pub age_link: AgeLinkStruct,
    pub link_in_anim: String,
}

const LINK_TO_AGE_VERSION: u8 = 0;

impl LinkToAgeMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        let base = Message::stream_read(stream)?;
        if stream.read_u8()? != LINK_TO_AGE_VERSION {
            return Err(NetError::Malformed("unknown LinkToAgeMsg version"));
        }
        Ok(Self {
            base,
            age_link: AgeLinkStruct::stream_read(stream)?,
            link_in_anim: read_safe_string(stream, StringFormat::Raw)?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        stream.write_u8(LINK_TO_AGE_VERSION)?;
        self.age_link.stream_write(stream)?;
        write_safe_string(stream, &self.link_in_anim, StringFormat::Raw)?;
        Ok(())
    }
}

const LIST_WANT_COMPRESSION: u8 = 1 << 0;
const LIST_COMPRESSED: u8 = 1 << 1;
const LIST_COMPRESSION_THRESHOLD: usize = 255;

/// An id-keyed bag of creatables, optionally deflate-compressed on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatableList {
    pub flags: u8,
    pub items: BTreeMap<u16, Box<Creatable>>,
}

impl Default for CreatableList {
    fn default() -> Self {
        Self {
            flags: LIST_WANT_COMPRESSION,
            items: BTreeMap::new(),
        }
    }
}

impl StreamRead for CreatableList {
    fn stream_read<R: Read>(stream: &mut R) -> NetResult<Self> {
        let mut flags = stream.read_u8()?;
        let uncompressed_size = stream.read_u32::<LittleEndian>()? as usize;
        let contents = if flags & LIST_COMPRESSED != 0 {
            let compressed_size = stream.read_u32::<LittleEndian>()? as usize;
            let compressed = crate::plasma::streams::read_exact(stream, compressed_size)?;
            let mut decoder = ZlibDecoder::new(&compressed[..]);
            let mut buffer = Vec::with_capacity(uncompressed_size);
            decoder
                .read_to_end(&mut buffer)
                .map_err(|_| NetError::Malformed("corrupt compressed creatable list"))?;
            if buffer.len() != uncompressed_size {
                return Err(NetError::Malformed("creatable list size mismatch"));
            }
            flags &= !LIST_COMPRESSED;
            buffer
        } else {
            crate::plasma::streams::read_exact(stream, uncompressed_size)?
        };

        let mut cursor = Cursor::new(contents);
        let count = cursor.read_u16::<LittleEndian>()?;
        let mut items = BTreeMap::new();
        for _ in 0..count {
            let id = cursor.read_u16::<LittleEndian>()?;
            let class_id = cursor.read_u16::<LittleEndian>()?;
            let item = read_creatable_of(&mut cursor, class_id)?;
            items.insert(id, Box::new(item));
        }
        Ok(Self { flags, items })
    }
}

impl StreamWrite for CreatableList {
    fn stream_write<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        let mut contents = Vec::new();
        contents.write_u16::<LittleEndian>(self.items.len() as u16)?;
        for (id, item) in &self.items {
            contents.write_u16::<LittleEndian>(*id)?;
            contents.write_u16::<LittleEndian>(item.class_id())?;
            write_creatable_body(&mut contents, item)?;
        }

        let mut flags = self.flags & !LIST_COMPRESSED;
        let mut compressed = None;
        if flags & LIST_WANT_COMPRESSION != 0 && contents.len() > LIST_COMPRESSION_THRESHOLD {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&contents)?;
            if let Ok(deflated) = encoder.finish() {
                flags |= LIST_COMPRESSED;
                compressed = Some(deflated);
            }
            // On failure, fall back to the uncompressed form.
        }

        stream.write_u8(flags)?;
        stream.write_u32::<LittleEndian>(contents.len() as u32)?;
        match compressed {
            Some(deflated) => {
                stream.write_u32::<LittleEndian>(deflated.len() as u32)?;
                stream.write_all(&deflated)?;
            }
            None => stream.write_all(&contents)?,
        }
        Ok(())
    }
}

impl CreatableList {
    pub fn make_safe_for_net(&mut self) -> bool {
        self.items
            .values_mut()
            .all(|item| item.make_safe_for_net())
    }
}

/// Linking manager control traffic. Never forwardable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkingMgrMsg {
    pub base: Message,
    pub content_flags: BitVector,
    pub cmd: u8,
    pub args: CreatableList,
}

const CONTENT_COMMAND: usize = 0;
const CONTENT_ARGS: usize = 1;

impl LinkingMgrMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        let base = Message::stream_read(stream)?;
        let content_flags = BitVector::stream_read(stream)?;
        let cmd = if content_flags.get(CONTENT_COMMAND) {
            stream.read_u8()?
        } else {
            0
        };
        let args = if content_flags.get(CONTENT_ARGS) {
            CreatableList::stream_read(stream)?
        } else {
            CreatableList::default()
        };
        Ok(Self {
            base,
            content_flags,
            cmd,
            args,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        self.content_flags.stream_write(stream)?;
        if self.content_flags.get(CONTENT_COMMAND) {
            stream.write_u8(self.cmd)?;
        }
        if self.content_flags.get(CONTENT_ARGS) {
            self.args.stream_write(stream)?;
        }
        Ok(())
    }
}

const GV_STRING: u8 = 0;
const GV_BOOL: u8 = 1;
const GV_BYTE: u8 = 2;
const GV_INT: u8 = 3;
const GV_UINT: u8 = 4;
const GV_FLOAT: u8 = 5;
const GV_DOUBLE: u8 = 6;
const GV_NONE: u8 = 7;
const GV_ANY: u8 = 8;

/// Loosely typed value used inside creatable lists.
#[derive(Debug, Clone, PartialEq)]
pub enum GenericValue {
    String(String),
    Bool(bool),
    Byte(u8),
    Int(i32),
    UInt(u32),
    Float(f32),
    Double(f64),
    None,
    Any(String),
}

impl Default for GenericValue {
    fn default() -> Self {
        Self::None
    }
}

impl StreamRead for GenericValue {
    fn stream_read<R: Read>(stream: &mut R) -> NetResult<Self> {
        match stream.read_u8()? {
            GV_STRING => Ok(Self::String(read_safe_string(stream, StringFormat::Raw)?)),
            GV_ANY => Ok(Self::Any(read_safe_string(stream, StringFormat::Raw)?)),
            GV_BOOL => Ok(Self::Bool(stream.read_u8()? != 0)),
            GV_BYTE => Ok(Self::Byte(stream.read_u8()?)),
            GV_INT => Ok(Self::Int(stream.read_i32::<LittleEndian>()?)),
            GV_UINT => Ok(Self::UInt(stream.read_u32::<LittleEndian>()?)),
            GV_FLOAT => Ok(Self::Float(stream.read_f32::<LittleEndian>()?)),
            GV_DOUBLE => Ok(Self::Double(stream.read_f64::<LittleEndian>()?)),
            GV_NONE => Ok(Self::None),
            _ => Err(NetError::Malformed("unknown generic value type")),
        }
    }
}

impl StreamWrite for GenericValue {
    fn stream_write<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        match self {
            Self::String(value) => {
                stream.write_u8(GV_STRING)?;
                write_safe_string(stream, value, StringFormat::Raw)?;
            }
            Self::Any(value) => {
                stream.write_u8(GV_ANY)?;
                write_safe_string(stream, value, StringFormat::Raw)?;
            }
            Self::Bool(value) => {
                stream.write_u8(GV_BOOL)?;
                stream.write_u8(u8::from(*value))?;
            }
            Self::Byte(value) => {
                stream.write_u8(GV_BYTE)?;
                stream.write_u8(*value)?;
            }
            Self::Int(value) => {
                stream.write_u8(GV_INT)?;
                stream.write_i32::<LittleEndian>(*value)?;
            }
            Self::UInt(value) => {
                stream.write_u8(GV_UINT)?;
                stream.write_u32::<LittleEndian>(*value)?;
            }
            Self::Float(value) => {
                stream.write_u8(GV_FLOAT)?;
                stream.write_f32::<LittleEndian>(*value)?;
            }
            Self::Double(value) => {
                stream.write_u8(GV_DOUBLE)?;
                stream.write_f64::<LittleEndian>(*value)?;
            }
            Self::None => stream.write_u8(GV_NONE)?,
        }
        Ok(())
    }
}
