use std::io::{Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::errors::NetResult;
use crate::plasma::streams::{StreamRead, StreamWrite};

/// Wall-clock timestamp as the client serializes it: whole seconds and
/// microseconds since the Unix epoch, both `u32`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnifiedTime {
    pub secs: u32,
    pub micros: u32,
}

impl UnifiedTime {
    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            secs: elapsed.as_secs() as u32,
            micros: elapsed.subsec_micros(),
        }
    }

    pub fn is_null(&self) -> bool {
        self.secs == 0 && self.micros == 0
    }
}

impl StreamRead for UnifiedTime {
    fn stream_read<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            secs: stream.read_u32::<LittleEndian>()?,
            micros: stream.read_u32::<LittleEndian>()?,
        })
    }
}

impl StreamWrite for UnifiedTime {
    fn stream_write<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        stream.write_u32::<LittleEndian>(self.secs)?;
        stream.write_u32::<LittleEndian>(self.micros)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn roundtrip() {
        let time = UnifiedTime {
            secs: 0x5B1F_00AA,
            micros: 314_159,
        };
        let mut buffer = Vec::new();
        time.stream_write(&mut buffer).unwrap();
        assert_eq!(buffer.len(), 8);
        let back = UnifiedTime::stream_read(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(back, time);
        assert!(!back.is_null());
        assert!(UnifiedTime::default().is_null());
    }
}
