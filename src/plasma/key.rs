//! Object identity: locations, Uoids, and nullable keys.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::errors::NetResult;
use crate::plasma::streams::{
    read_safe_string, write_safe_string, StreamRead, StreamWrite, StringFormat,
};

/// Page location within an age's sequence space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub sequence: u32,
    pub flags: u16,
}

pub mod location_flags {
    pub const LOCAL_ONLY: u16 = 1 << 0;
    pub const VOLATILE: u16 = 1 << 1;
    pub const RESERVED: u16 = 1 << 2;
    pub const BUILT_IN: u16 = 1 << 3;
    pub const ITINERANT: u16 = 1 << 4;
}

impl Default for Location {
    fn default() -> Self {
        Self::INVALID
    }
}

impl Location {
    pub const INVALID: Location = Location {
        sequence: 0xFFFF_FFFF,
        flags: 0,
    };
    pub const VIRTUAL: Location = Location {
        sequence: 0,
        flags: 0,
    };

    /// Build a location from an age sequence prefix and page number, the way
    /// the .age tooling numbers pages. Negative prefixes land in the global
    /// range.
    pub fn make(prefix: i32, page: i32, flags: u16) -> Self {
        let sequence = if prefix < 0 {
            ((page & 0xFFFF) as u32)
                .wrapping_sub((prefix << 16) as u32)
                .wrapping_add(0xFF00_0001)
        } else {
            ((page & 0xFFFF) as u32)
                .wrapping_add((prefix << 16) as u32)
                .wrapping_add(33)
        };
        Self { sequence, flags }
    }
}

impl StreamRead for Location {
    fn stream_read<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            sequence: stream.read_u32::<LittleEndian>()?,
            flags: stream.read_u16::<LittleEndian>()?,
        })
    }
}

impl StreamWrite for Location {
    fn stream_write<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        stream.write_u32::<LittleEndian>(self.sequence)?;
        stream.write_u16::<LittleEndian>(self.flags)?;
        Ok(())
    }
}

const HAS_CLONE_IDS: u8 = 1 << 0;
const HAS_LOAD_MASK: u8 = 1 << 1;

/// Full object identity. `object_type` 0x8000 marks the default (unset) Uoid.
#[derive(Debug, Clone, PartialEq)]
pub struct Uoid {
    pub location: Location,
    pub load_mask: u8,
    pub object_type: u16,
    pub name: String,
    pub id: u32,
    pub clone_id: u32,
    pub clone_player_id: u32,
}

impl Default for Uoid {
    fn default() -> Self {
        Self {
            location: Location::INVALID,
            load_mask: 0xFF,
            object_type: 0x8000,
            name: String::new(),
            id: 0,
            clone_id: 0,
            clone_player_id: 0,
        }
    }
}

impl StreamRead for Uoid {
    fn stream_read<R: Read>(stream: &mut R) -> NetResult<Self> {
        let contents = stream.read_u8()?;
        let location = Location::stream_read(stream)?;
        let load_mask = if contents & HAS_LOAD_MASK != 0 {
            stream.read_u8()?
        } else {
            0xFF
        };
        let object_type = stream.read_u16::<LittleEndian>()?;
        let id = stream.read_u32::<LittleEndian>()?;
        let name = read_safe_string(stream, StringFormat::Raw)?;
        let (clone_id, clone_player_id) = if contents & HAS_CLONE_IDS != 0 {
            (
                stream.read_u32::<LittleEndian>()?,
                stream.read_u32::<LittleEndian>()?,
            )
        } else {
            (0, 0)
        };
        Ok(Self {
            location,
            load_mask,
            object_type,
            name,
            id,
            clone_id,
            clone_player_id,
        })
    }
}

impl StreamWrite for Uoid {
    fn stream_write<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        let mut contents = 0u8;
        if self.load_mask != 0xFF {
            contents |= HAS_LOAD_MASK;
        }
        if self.clone_id != 0 || self.clone_player_id != 0 {
            contents |= HAS_CLONE_IDS;
        }
        stream.write_u8(contents)?;
        self.location.stream_write(stream)?;
        if contents & HAS_LOAD_MASK != 0 {
            stream.write_u8(self.load_mask)?;
        }
        stream.write_u16::<LittleEndian>(self.object_type)?;
        stream.write_u32::<LittleEndian>(self.id)?;
        write_safe_string(stream, &self.name, StringFormat::Raw)?;
        if contents & HAS_CLONE_IDS != 0 {
            stream.write_u32::<LittleEndian>(self.clone_id)?;
            stream.write_u32::<LittleEndian>(self.clone_player_id)?;
        }
        Ok(())
    }
}

/// Nullable reference to an object; a leading bool selects presence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Key {
    pub uoid: Option<Uoid>,
}

impl Key {
    pub fn is_null(&self) -> bool {
        self.uoid.is_none()
    }

    pub fn from_uoid(uoid: Uoid) -> Self {
        Self { uoid: Some(uoid) }
    }
}

impl StreamRead for Key {
    fn stream_read<R: Read>(stream: &mut R) -> NetResult<Self> {
        if stream.read_u8()? != 0 {
            Ok(Self {
                uoid: Some(Uoid::stream_read(stream)?),
            })
        } else {
            Ok(Self { uoid: None })
        }
    }
}

impl StreamWrite for Key {
    fn stream_write<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        match &self.uoid {
            Some(uoid) => {
                stream.write_u8(1)?;
                uoid.stream_write(stream)
            }
            None => {
                stream.write_u8(0)?;
                Ok(())
            }
        }
    }
}

/// Network distribution group: a location plus constant/local flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetGroupId {
    pub location: Location,
    pub flags: u8,
}

impl Default for NetGroupId {
    fn default() -> Self {
        Self {
            location: Location {
                sequence: 0xFF00_0001,
                flags: location_flags::RESERVED,
            },
            flags: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn uoid_roundtrip_with_clone_ids() {
        let uoid = Uoid {
            location: Location::make(10025, -2, location_flags::BUILT_IN),
            load_mask: 0xFF,
            object_type: 1,
            name: "AgeSDLHook".to_string(),
            id: 1,
            clone_id: 7,
            clone_player_id: 30015,
        };
        let mut buffer = Vec::new();
        uoid.stream_write(&mut buffer).unwrap();
        let back = Uoid::stream_read(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(back, uoid);
    }

    #[test]
    fn null_key_is_single_byte() {
        let mut buffer = Vec::new();
        Key::default().stream_write(&mut buffer).unwrap();
        assert_eq!(buffer, vec![0]);
        let back = Key::stream_read(&mut Cursor::new(buffer)).unwrap();
        assert!(back.is_null());
    }

    #[test]
    fn location_make_matches_page_math() {
        assert_eq!(Location::make(0, 0, 0).sequence, 33);
        assert_eq!(Location::make(1, 2, 0).sequence, 0x10000 + 2 + 33);
        // Negative prefixes map above 0xFF000000.
        assert!(Location::make(-2, 1, 0).sequence >= 0xFF00_0000);
    }
}
