use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::Message;
use crate::errors::NetResult;
use crate::plasma::factory::{read_creatable, write_creatable, Creatable};
use crate::plasma::streams::{
    read_safe_string, write_safe_string, StreamRead, StreamWrite, StringFormat,
};
use crate::types::bit_vector::BitVector;

/// A message carrying follow-up messages to fire on completion. Each callback
/// must itself be safe before the carrier may be relayed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageWithCallbacks {
    pub base: Message,
    pub callbacks: Vec<Option<Box<Creatable>>>,
}

impl MessageWithCallbacks {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        let base = Message::stream_read(stream)?;
        let count = stream.read_u32::<LittleEndian>()? as usize;
        let mut callbacks = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            callbacks.push(read_creatable(stream)?);
        }
        Ok(Self { base, callbacks })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        stream.write_u32::<LittleEndian>(self.callbacks.len() as u32)?;
        for callback in &self.callbacks {
            write_creatable(stream, callback.as_deref())?;
        }
        Ok(())
    }

    pub fn make_safe_for_net(&mut self) -> bool {
        self.callbacks.iter_mut().all(|callback| match callback {
            Some(inner) => inner.make_safe_for_net(),
            None => true,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimCmdMsg {
    pub callbacks: MessageWithCallbacks,
    pub cmd: BitVector,
    pub begin: f32,
    pub end: f32,
    pub loop_end: f32,
    pub loop_begin: f32,
    pub speed: f32,
    pub speed_change_rate: f32,
    pub time: f32,
    pub anim_name: String,
    pub loop_name: String,
}

impl AnimCmdMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            callbacks: MessageWithCallbacks::read_from(stream)?,
            cmd: BitVector::stream_read(stream)?,
            begin: stream.read_f32::<LittleEndian>()?,
            end: stream.read_f32::<LittleEndian>()?,
            loop_end: stream.read_f32::<LittleEndian>()?,
            loop_begin: stream.read_f32::<LittleEndian>()?,
            speed: stream.read_f32::<LittleEndian>()?,
            speed_change_rate: stream.read_f32::<LittleEndian>()?,
            time: stream.read_f32::<LittleEndian>()?,
            anim_name: read_safe_string(stream, StringFormat::Raw)?,
            loop_name: read_safe_string(stream, StringFormat::Raw)?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.callbacks.write_to(stream)?;
        self.cmd.stream_write(stream)?;
        stream.write_f32::<LittleEndian>(self.begin)?;
        stream.write_f32::<LittleEndian>(self.end)?;
        stream.write_f32::<LittleEndian>(self.loop_end)?;
        stream.write_f32::<LittleEndian>(self.loop_begin)?;
        stream.write_f32::<LittleEndian>(self.speed)?;
        stream.write_f32::<LittleEndian>(self.speed_change_rate)?;
        stream.write_f32::<LittleEndian>(self.time)?;
        write_safe_string(stream, &self.anim_name, StringFormat::Raw)?;
        write_safe_string(stream, &self.loop_name, StringFormat::Raw)?;
        Ok(())
    }
}
