use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::errors::{NetError, NetResult};
use crate::plasma::streams::{StreamRead, StreamWrite};

/// Growable bit set serialized as a `u32` word count followed by the words.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitVector {
    words: Vec<u32>,
}

impl BitVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, idx: usize) -> bool {
        self.words
            .get(idx / 32)
            .is_some_and(|word| word & (1 << (idx % 32)) != 0)
    }

    pub fn set(&mut self, idx: usize, bit: bool) {
        let word = idx / 32;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        if bit {
            self.words[word] |= 1 << (idx % 32);
        } else {
            self.words[word] &= !(1 << (idx % 32));
        }
    }
}

impl StreamRead for BitVector {
    fn stream_read<R: Read>(stream: &mut R) -> NetResult<Self> {
        let count = stream.read_u32::<LittleEndian>()? as usize;
        if count > 0x10000 {
            return Err(NetError::Malformed("oversized bit vector"));
        }
        let mut words = vec![0u32; count];
        for word in &mut words {
            *word = stream.read_u32::<LittleEndian>()?;
        }
        Ok(Self { words })
    }
}

impl StreamWrite for BitVector {
    fn stream_write<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        stream.write_u32::<LittleEndian>(self.words.len() as u32)?;
        for word in &self.words {
            stream.write_u32::<LittleEndian>(*word)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn set_get_and_roundtrip() {
        let mut bits = BitVector::new();
        bits.set(0, true);
        bits.set(33, true);
        bits.set(33, false);
        bits.set(40, true);
        assert!(bits.get(0));
        assert!(!bits.get(33));
        assert!(bits.get(40));
        assert!(!bits.get(500));

        let mut buffer = Vec::new();
        bits.stream_write(&mut buffer).unwrap();
        let back = BitVector::stream_read(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(back, bits);
    }
}
