//! `.mfs` manifest loading and its UTF-16 wire encoding.

use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::errors::{NetError, NetResult};

/// One downloadable file entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub client_path: String,
    pub download_path: String,
    /// 32 hex digits, stored as the code units the client expects.
    pub file_hash: String,
    pub download_hash: String,
    pub file_size: u32,
    pub download_size: u32,
    pub flags: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileManifest {
    pub files: Vec<FileInfo>,
}

impl FileManifest {
    /// Parse manifest text: one file per line, seven comma-separated fields,
    /// `#` comments. Invalid rows are logged and skipped.
    pub fn parse(contents: &str, source: &str) -> Self {
        let mut manifest = Self::default();
        for (lineno, raw) in contents.lines().enumerate() {
            let lineno = lineno + 1;
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let parts: Vec<&str> = line.split(',').collect();
            if parts.len() != 7 {
                tracing::warn!(line = lineno, file = source, "Ignoring invalid manifest entry");
                continue;
            }
            if parts[2].len() != 32 || parts[3].len() != 32 {
                tracing::warn!(line = lineno, file = source, "Bad file hash in manifest entry");
                continue;
            }
            let (Ok(file_size), Ok(download_size), Ok(flags)) = (
                parts[4].trim().parse::<u32>(),
                parts[5].trim().parse::<u32>(),
                parts[6].trim().parse::<u32>(),
            ) else {
                tracing::warn!(line = lineno, file = source, "Bad numeric field in manifest entry");
                continue;
            };

            manifest.files.push(FileInfo {
                client_path: parts[0].to_string(),
                download_path: parts[1].to_string(),
                file_hash: parts[2].to_string(),
                download_hash: parts[3].to_string(),
                file_size,
                download_size,
                flags,
            });
        }
        manifest
    }

    pub fn load(path: &Path) -> NetResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(NetError::Io)?;
        Ok(Self::parse(&contents, &path.display().to_string()))
    }

    pub fn file_count(&self) -> u32 {
        self.files.len() as u32
    }

    /// Encode for the wire. Returns the encoded size in UTF-16 code units,
    /// which is what the client is told as the "data size".
    pub fn encode(&self, buffer: &mut Vec<u8>) -> NetResult<u32> {
        let start = buffer.len();

        for info in &self.files {
            write_utf16_z(buffer, &info.client_path)?;
            write_utf16_z(buffer, &info.download_path)?;

            // Hashes go out as raw 32-unit char16 blocks plus a terminator.
            write_hash_block(buffer, &info.file_hash)?;
            buffer.write_u16::<LittleEndian>(0)?;
            write_hash_block(buffer, &info.download_hash)?;
            buffer.write_u16::<LittleEndian>(0)?;

            write_split_u32(buffer, info.file_size)?;
            write_split_u32(buffer, info.download_size)?;
            write_split_u32(buffer, info.flags)?;
        }
        buffer.write_u16::<LittleEndian>(0)?;

        let byte_len = buffer.len() - start;
        if byte_len % 2 != 0 {
            tracing::warn!("Encoded manifest not evenly divisible by the UTF-16 unit size");
        }
        Ok((byte_len / 2) as u32)
    }
}

fn write_utf16_z(buffer: &mut Vec<u8>, value: &str) -> NetResult<()> {
    for unit in value.encode_utf16() {
        buffer.write_u16::<LittleEndian>(unit)?;
    }
    buffer.write_u16::<LittleEndian>(0)?;
    Ok(())
}

fn write_hash_block(buffer: &mut Vec<u8>, hash: &str) -> NetResult<()> {
    let mut units: Vec<u16> = hash.encode_utf16().collect();
    units.resize(32, 0);
    for unit in units {
        buffer.write_u16::<LittleEndian>(unit)?;
    }
    Ok(())
}

/// `u32` split into `{hi u16, lo u16, u16 0}`, the client's legacy integer
/// encoding for manifest fields.
fn write_split_u32(buffer: &mut Vec<u8>, value: u32) -> NetResult<()> {
    buffer.write_u16::<LittleEndian>((value >> 16) as u16)?;
    buffer.write_u16::<LittleEndian>((value & 0xFFFF) as u16)?;
    buffer.write_u16::<LittleEndian>(0)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# patcher manifest
avi/intro.webm,avi/intro.webm.gz,0123456789abcdef0123456789abcdef,fedcba9876543210fedcba9876543210,70000,65536,0
bad line with,too few fields
python/system.pak,python/system.pak.gz,00112233445566778899aabbccddeeff,ffeeddccbbaa99887766554433221100,131072,70001,1
";

    #[test]
    fn parses_valid_rows_and_skips_bad_ones() {
        let manifest = FileManifest::parse(SAMPLE, "sample.mfs");
        assert_eq!(manifest.file_count(), 2);
        assert_eq!(manifest.files[0].client_path, "avi/intro.webm");
        assert_eq!(manifest.files[0].file_size, 70000);
        assert_eq!(manifest.files[1].flags, 1);
    }

    #[test]
    fn rejects_malformed_hashes() {
        let manifest = FileManifest::parse(
            "a,b,deadbeef,cafebabe,1,1,0\n",
            "short-hash.mfs",
        );
        assert!(manifest.files.is_empty());
    }

    #[test]
    fn wire_encoding_layout() {
        let manifest = FileManifest {
            files: vec![FileInfo {
                client_path: "a".to_string(),
                download_path: "b".to_string(),
                file_hash: "00112233445566778899aabbccddeeff".to_string(),
                download_hash: "ffeeddccbbaa99887766554433221100".to_string(),
                file_size: 0x0001_0002,
                download_size: 3,
                flags: 0,
            }],
        };
        let mut buffer = Vec::new();
        let units = manifest.encode(&mut buffer).unwrap();

        // "a\0" + "b\0" + 2 * (32 + 1 terminator) + 3 * 3 + final 0
        assert_eq!(units, 2 + 2 + 33 * 2 + 9 + 1);
        assert_eq!(buffer.len() as u32, units * 2);
        // First entry: 'a', NUL
        assert_eq!(&buffer[0..4], &[b'a', 0, 0, 0]);
        // file_size 0x00010002 encodes hi=1, lo=2, 0
        let size_offset = (2 + 2 + 33 * 2) * 2;
        assert_eq!(
            &buffer[size_offset..size_offset + 6],
            &[1, 0, 2, 0, 0, 0]
        );
        // Trailing terminator
        assert_eq!(&buffer[buffer.len() - 2..], &[0, 0]);
    }

    #[test]
    fn load_missing_file_is_an_error() {
        assert!(FileManifest::load(Path::new("/nonexistent/foo.mfs")).is_err());
    }
}
