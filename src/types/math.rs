use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::errors::NetResult;
use crate::plasma::streams::{StreamRead, StreamWrite};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

/// Floating-point RGBA color. Also used for the 3-component RGB wire type;
/// alpha stays at its default when the wire carries only three channels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ColorRgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColorRgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// 4x4 transform. Serialized as an identity flag byte followed by the 16
/// floats when not identity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix44 {
    pub data: [[f32; 4]; 4],
}

impl Default for Matrix44 {
    fn default() -> Self {
        let mut data = [[0.0f32; 4]; 4];
        for (i, row) in data.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        Self { data }
    }
}

impl Matrix44 {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }
}

impl StreamRead for Vector3 {
    fn stream_read<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            x: stream.read_f32::<LittleEndian>()?,
            y: stream.read_f32::<LittleEndian>()?,
            z: stream.read_f32::<LittleEndian>()?,
        })
    }
}

impl StreamWrite for Vector3 {
    fn stream_write<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        stream.write_f32::<LittleEndian>(self.x)?;
        stream.write_f32::<LittleEndian>(self.y)?;
        stream.write_f32::<LittleEndian>(self.z)?;
        Ok(())
    }
}

impl StreamRead for Quaternion {
    fn stream_read<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            x: stream.read_f32::<LittleEndian>()?,
            y: stream.read_f32::<LittleEndian>()?,
            z: stream.read_f32::<LittleEndian>()?,
            w: stream.read_f32::<LittleEndian>()?,
        })
    }
}

impl StreamWrite for Quaternion {
    fn stream_write<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        stream.write_f32::<LittleEndian>(self.x)?;
        stream.write_f32::<LittleEndian>(self.y)?;
        stream.write_f32::<LittleEndian>(self.z)?;
        stream.write_f32::<LittleEndian>(self.w)?;
        Ok(())
    }
}

impl ColorRgba {
    pub fn read_rgb<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            r: stream.read_f32::<LittleEndian>()?,
            g: stream.read_f32::<LittleEndian>()?,
            b: stream.read_f32::<LittleEndian>()?,
            a: 1.0,
        })
    }

    pub fn write_rgb<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        stream.write_f32::<LittleEndian>(self.r)?;
        stream.write_f32::<LittleEndian>(self.g)?;
        stream.write_f32::<LittleEndian>(self.b)?;
        Ok(())
    }
}

impl StreamRead for ColorRgba {
    fn stream_read<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            r: stream.read_f32::<LittleEndian>()?,
            g: stream.read_f32::<LittleEndian>()?,
            b: stream.read_f32::<LittleEndian>()?,
            a: stream.read_f32::<LittleEndian>()?,
        })
    }
}

impl StreamWrite for ColorRgba {
    fn stream_write<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        stream.write_f32::<LittleEndian>(self.r)?;
        stream.write_f32::<LittleEndian>(self.g)?;
        stream.write_f32::<LittleEndian>(self.b)?;
        stream.write_f32::<LittleEndian>(self.a)?;
        Ok(())
    }
}

impl ColorRgba8 {
    pub fn read_rgb<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            r: stream.read_u8()?,
            g: stream.read_u8()?,
            b: stream.read_u8()?,
            a: 255,
        })
    }

    pub fn write_rgb<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        stream.write_u8(self.r)?;
        stream.write_u8(self.g)?;
        stream.write_u8(self.b)?;
        Ok(())
    }
}

impl StreamRead for ColorRgba8 {
    fn stream_read<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            r: stream.read_u8()?,
            g: stream.read_u8()?,
            b: stream.read_u8()?,
            a: stream.read_u8()?,
        })
    }
}

impl StreamWrite for ColorRgba8 {
    fn stream_write<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        stream.write_u8(self.r)?;
        stream.write_u8(self.g)?;
        stream.write_u8(self.b)?;
        stream.write_u8(self.a)?;
        Ok(())
    }
}

impl StreamRead for Matrix44 {
    fn stream_read<R: Read>(stream: &mut R) -> NetResult<Self> {
        if stream.read_u8()? == 0 {
            return Ok(Self::default());
        }
        let mut result = Self::default();
        for row in &mut result.data {
            for cell in row.iter_mut() {
                *cell = stream.read_f32::<LittleEndian>()?;
            }
        }
        Ok(result)
    }
}

impl StreamWrite for Matrix44 {
    fn stream_write<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        if self.is_identity() {
            stream.write_u8(0)?;
            return Ok(());
        }
        stream.write_u8(1)?;
        for row in &self.data {
            for cell in row {
                stream.write_f32::<LittleEndian>(*cell)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn vector_and_quat_roundtrip() {
        let v = Vector3 {
            x: 1.5,
            y: -2.0,
            z: 0.25,
        };
        let q = Quaternion {
            x: 0.0,
            y: 0.5,
            z: 0.5,
            w: 0.707,
        };
        let mut buffer = Vec::new();
        v.stream_write(&mut buffer).unwrap();
        q.stream_write(&mut buffer).unwrap();
        let mut cursor = Cursor::new(buffer);
        assert_eq!(Vector3::stream_read(&mut cursor).unwrap(), v);
        assert_eq!(Quaternion::stream_read(&mut cursor).unwrap(), q);
    }

    #[test]
    fn identity_matrix_is_one_byte() {
        let mut buffer = Vec::new();
        Matrix44::default().stream_write(&mut buffer).unwrap();
        assert_eq!(buffer, vec![0]);

        let mut m = Matrix44::default();
        m.data[0][3] = 4.0;
        buffer.clear();
        m.stream_write(&mut buffer).unwrap();
        assert_eq!(buffer.len(), 1 + 16 * 4);
        assert_eq!(Matrix44::stream_read(&mut Cursor::new(buffer)).unwrap(), m);
    }
}
