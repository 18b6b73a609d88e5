//! SHA digests in the client's five-word layout.
//!
//! The client stores SHA hashes as five little-endian `u32` words rather than
//! 20 bytes, and the login path mixes SHA-0 (for email-style accounts) with a
//! big-endian word swap of SHA-1 (everything else). Both quirks are load
//! bearing; see `auth::daemon`.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use sha1::{Digest, Sha1};

use crate::errors::NetResult;
use crate::plasma::streams::{StreamRead, StreamWrite};

/// A 160-bit digest as five words, matching the client's in-memory layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShaDigest {
    words: [u32; 5],
}

impl ShaDigest {
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        let mut words = [0u32; 5];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Self { words }
    }

    pub fn to_bytes(self) -> [u8; 20] {
        let mut bytes = [0u8; 20];
        for (chunk, word) in bytes.chunks_exact_mut(4).zip(self.words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    /// Parse a 40-hex-digit string as stored in the accounts table. Each
    /// 8-digit group is one big-endian word that must be swapped into the
    /// client layout.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 40 {
            return None;
        }
        let mut words = [0u32; 5];
        for (word, group) in words.iter_mut().zip(hex.as_bytes().chunks_exact(8)) {
            let group = std::str::from_utf8(group).ok()?;
            *word = u32::from_str_radix(group, 16).ok()?.swap_bytes();
        }
        Some(Self { words })
    }

    pub fn to_hex(self) -> String {
        self.to_bytes().iter().map(|b| format!("{b:02x}")).collect()
    }

    /// The big-endian word shuffle required by the non-email login path.
    pub fn swap_words(mut self) -> Self {
        for word in &mut self.words {
            *word = word.swap_bytes();
        }
        self
    }

    pub fn sha1(data: &[u8]) -> Self {
        let digest: [u8; 20] = Sha1::digest(data).into();
        Self::from_bytes(digest)
    }

    pub fn sha0(data: &[u8]) -> Self {
        Self::from_bytes(sha0_digest(data))
    }
}

impl StreamRead for ShaDigest {
    fn stream_read<R: Read>(stream: &mut R) -> NetResult<Self> {
        let mut words = [0u32; 5];
        for word in &mut words {
            *word = stream.read_u32::<LittleEndian>()?;
        }
        Ok(Self { words })
    }
}

impl StreamWrite for ShaDigest {
    fn stream_write<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        for word in self.words {
            stream.write_u32::<LittleEndian>(word)?;
        }
        Ok(())
    }
}

/// The challenge hash for email-style accounts:
/// `SHA-0(server_challenge || client_challenge || stored_hash)`.
pub fn challenge_hash(
    stored: &ShaDigest,
    server_challenge: u32,
    client_challenge: u32,
) -> ShaDigest {
    let mut buffer = Vec::with_capacity(28);
    buffer.extend_from_slice(&server_challenge.to_le_bytes());
    buffer.extend_from_slice(&client_challenge.to_le_bytes());
    buffer.extend_from_slice(&stored.to_bytes());
    ShaDigest::sha0(&buffer)
}

/// SHA-0: the withdrawn FIPS-180 digest. Identical to SHA-1 except the
/// message schedule omits the one-bit rotation. The legacy client still
/// hashes email-style passwords with it.
fn sha0_digest(data: &[u8]) -> [u8; 20] {
    let mut state: [u32; 5] = [0x6745_2301, 0xEFCD_AB89, 0x98BA_DCFE, 0x1032_5476, 0xC3D2_E1F0];

    let bit_len = (data.len() as u64).wrapping_mul(8);
    let mut message = data.to_vec();
    message.push(0x80);
    while message.len() % 64 != 56 {
        message.push(0);
    }
    message.extend_from_slice(&bit_len.to_be_bytes());

    for block in message.chunks_exact(64) {
        let mut schedule = [0u32; 80];
        for (i, chunk) in block.chunks_exact(4).enumerate() {
            schedule[i] = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        for i in 16..80 {
            // SHA-1 would rotate this left by one bit.
            schedule[i] =
                schedule[i - 3] ^ schedule[i - 8] ^ schedule[i - 14] ^ schedule[i - 16];
        }

        let [mut a, mut b, mut c, mut d, mut e] = state;
        for (i, word) in schedule.iter().enumerate() {
            let (f, k) = match i {
                0..=19 => ((b & c) | (!b & d), 0x5A82_7999),
                20..=39 => (b ^ c ^ d, 0x6ED9_EBA1),
                40..=59 => ((b & c) | (b & d) | (c & d), 0x8F1B_BCDC),
                _ => (b ^ c ^ d, 0xCA62_C1D6),
            };
            let temp = a
                .rotate_left(5)
                .wrapping_add(f)
                .wrapping_add(e)
                .wrapping_add(k)
                .wrapping_add(*word);
            e = d;
            d = c;
            c = b;
            b = a.rotate_left(30);
            a = temp;
        }

        state[0] = state[0].wrapping_add(a);
        state[1] = state[1].wrapping_add(b);
        state[2] = state[2].wrapping_add(c);
        state[3] = state[3].wrapping_add(d);
        state[4] = state[4].wrapping_add(e);
    }

    let mut digest = [0u8; 20];
    for (chunk, word) in digest.chunks_exact_mut(4).zip(state) {
        chunk.copy_from_slice(&word.to_be_bytes());
    }
    digest
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn sha0_known_vectors() {
        // Published SHA-0 test vectors.
        assert_eq!(
            ShaDigest::sha0(b"abc").to_hex(),
            "0164b8a914cd2a5e74c4f7ff082c4d97f1edf880"
        );
        assert_eq!(
            ShaDigest::sha0(b"").to_hex(),
            "f96cea198ad1dd5617ac084a3d92c6107708c0ef"
        );
    }

    #[test]
    fn sha1_matches_known_vector() {
        assert_eq!(
            ShaDigest::sha1(b"abc").to_hex(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn word_swap_is_involutive() {
        let digest = ShaDigest::sha1(b"guildsman");
        assert_ne!(digest.swap_words(), digest);
        assert_eq!(digest.swap_words().swap_words(), digest);
    }

    #[test]
    fn wire_roundtrip_is_byte_stable() {
        let digest = ShaDigest::sha1(b"maintainer");
        let mut buffer = Vec::new();
        digest.stream_write(&mut buffer).unwrap();
        assert_eq!(buffer, digest.to_bytes());
        let back = ShaDigest::stream_read(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(back, digest);
    }

    #[test]
    fn hex_roundtrip() {
        let digest = ShaDigest::sha0(b"password");
        let parsed = ShaDigest::from_hex(&digest.to_hex()).unwrap();
        assert_eq!(parsed, digest);
        assert!(ShaDigest::from_hex("abc").is_none());
    }

    #[test]
    fn challenge_hash_mixes_both_challenges() {
        let stored = ShaDigest::sha0(b"secret");
        let one = challenge_hash(&stored, 0xCAFE_BABE, 0x1111_1111);
        let two = challenge_hash(&stored, 0xCAFE_BABE, 0x2222_2222);
        let three = challenge_hash(&stored, 0xDEAD_BEEF, 0x1111_1111);
        assert_ne!(one, two);
        assert_ne!(one, three);
    }
}
