//! Shared value types with legacy wire encodings.

pub mod bit_vector;
pub mod math;
pub mod sha;
pub mod unified_time;

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use uuid::Uuid;

use crate::errors::NetResult;

/// Read a UUID in the legacy field layout: `u32 data1, u16 data2, u16 data3,
/// 8 bytes`, all little-endian.
pub fn read_uuid<R: Read>(stream: &mut R) -> NetResult<Uuid> {
    let data1 = stream.read_u32::<LittleEndian>()?;
    let data2 = stream.read_u16::<LittleEndian>()?;
    let data3 = stream.read_u16::<LittleEndian>()?;
    let mut data4 = [0u8; 8];
    stream.read_exact(&mut data4)?;
    Ok(Uuid::from_fields(data1, data2, data3, &data4))
}

pub fn write_uuid<W: Write>(stream: &mut W, uuid: &Uuid) -> NetResult<()> {
    let (data1, data2, data3, data4) = uuid.as_fields();
    stream.write_u32::<LittleEndian>(data1)?;
    stream.write_u16::<LittleEndian>(data2)?;
    stream.write_u16::<LittleEndian>(data3)?;
    stream.write_all(data4)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn uuid_field_layout_roundtrip() {
        let uuid = Uuid::parse_str("5cf4f457-d546-47dc-80eb-a07cdfefc95d").unwrap();
        let mut buffer = Vec::new();
        write_uuid(&mut buffer, &uuid).unwrap();
        assert_eq!(buffer.len(), 16);
        // data1 is little-endian on the wire
        assert_eq!(&buffer[0..4], &[0x57, 0xF4, 0xF4, 0x5C]);
        let mut cursor = Cursor::new(buffer);
        assert_eq!(read_uuid(&mut cursor).unwrap(), uuid);
    }
}
