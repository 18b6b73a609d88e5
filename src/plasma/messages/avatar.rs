//! Avatar brains, tasks, and the messages that drive them.
//!
//! Brains can smuggle arbitrary nested messages, so most of these types are
//! either refused outright by the relay filter or recurse into their payloads.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::Message;
use crate::errors::{NetError, NetResult};
use crate::plasma::factory::{read_creatable, write_creatable, Creatable};
use crate::plasma::key::Key;
use crate::plasma::streams::{
    read_safe_string, write_safe_string, StreamRead, StreamWrite, StringFormat,
};
use crate::types::math::Vector3;

/// One stage of a generic brain's animation script.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimStage {
    pub anim_name: String,
    pub notify: u8,
    pub forward_type: u32,
    pub back_type: u32,
    pub advance_type: u32,
    pub regress_type: u32,
    pub loops: u32,
    pub do_advance: bool,
    pub advance_to: u32,
    pub do_regress: bool,
    pub regress_to: u32,
    // Aux block, serialized separately right after the stage itself.
    pub local_time: f32,
    pub length: f32,
    pub cur_loop: i32,
    pub attached: bool,
}

impl AnimStage {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            anim_name: read_safe_string(stream, StringFormat::Raw)?,
            notify: stream.read_u8()?,
            forward_type: stream.read_u32::<LittleEndian>()?,
            back_type: stream.read_u32::<LittleEndian>()?,
            advance_type: stream.read_u32::<LittleEndian>()?,
            regress_type: stream.read_u32::<LittleEndian>()?,
            loops: stream.read_u32::<LittleEndian>()?,
            do_advance: stream.read_u8()? != 0,
            advance_to: stream.read_u32::<LittleEndian>()?,
            do_regress: stream.read_u8()? != 0,
            regress_to: stream.read_u32::<LittleEndian>()?,
            ..Default::default()
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        write_safe_string(stream, &self.anim_name, StringFormat::Raw)?;
        stream.write_u8(self.notify)?;
        stream.write_u32::<LittleEndian>(self.forward_type)?;
        stream.write_u32::<LittleEndian>(self.back_type)?;
        stream.write_u32::<LittleEndian>(self.advance_type)?;
        stream.write_u32::<LittleEndian>(self.regress_type)?;
        stream.write_u32::<LittleEndian>(self.loops)?;
        stream.write_u8(u8::from(self.do_advance))?;
        stream.write_u32::<LittleEndian>(self.advance_to)?;
        stream.write_u8(u8::from(self.do_regress))?;
        stream.write_u32::<LittleEndian>(self.regress_to)?;
        Ok(())
    }

    pub fn read_aux<R: Read>(&mut self, stream: &mut R) -> NetResult<()> {
        self.local_time = stream.read_f32::<LittleEndian>()?;
        self.length = stream.read_f32::<LittleEndian>()?;
        self.cur_loop = stream.read_i32::<LittleEndian>()?;
        self.attached = stream.read_u8()? != 0;
        Ok(())
    }

    pub fn write_aux<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        stream.write_f32::<LittleEndian>(self.local_time)?;
        stream.write_f32::<LittleEndian>(self.length)?;
        stream.write_i32::<LittleEndian>(self.cur_loop)?;
        stream.write_u8(u8::from(self.attached))?;
        Ok(())
    }
}

/// Base armature brain. The wire fields are dead weight kept for layout
/// compatibility.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArmatureBrain;

impl ArmatureBrain {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        stream.read_u32::<LittleEndian>()?;
        if stream.read_u8()? != 0 {
            Key::stream_read(stream)?;
        }
        stream.read_u32::<LittleEndian>()?;
        stream.read_f32::<LittleEndian>()?;
        stream.read_f64::<LittleEndian>()?;
        Ok(Self)
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        stream.write_u32::<LittleEndian>(0)?;
        stream.write_u8(0)?;
        stream.write_u32::<LittleEndian>(0)?;
        stream.write_f32::<LittleEndian>(0.0)?;
        stream.write_f64::<LittleEndian>(0.0)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AvBrainHuman {
    pub is_custom_avatar: bool,
}

impl AvBrainHuman {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        ArmatureBrain::read_from(stream)?;
        Ok(Self {
            is_custom_avatar: stream.read_u8()? != 0,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        ArmatureBrain.write_to(stream)?;
        stream.write_u8(u8::from(self.is_custom_avatar))?;
        Ok(())
    }
}

/// Scripted brain. Unsafe to relay whenever a start or end message is
/// attached; the client never sends those legitimately.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AvBrainGeneric {
    pub stages: Vec<AnimStage>,
    pub cur_stage: i32,
    pub brain_type: u32,
    pub exit_flags: u32,
    pub mode: u8,
    pub forward: bool,
    pub start_message: Option<Box<Creatable>>,
    pub end_message: Option<Box<Creatable>>,
    pub fade_in: f32,
    pub fade_out: f32,
    pub move_mode: u8,
    pub body_usage: u8,
    pub recipient: Key,
}

impl AvBrainGeneric {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        ArmatureBrain::read_from(stream)?;
        let count = stream.read_u32::<LittleEndian>()? as usize;
        if count > 0x1000 {
            return Err(NetError::Malformed("oversized brain stage list"));
        }
        let mut stages = Vec::with_capacity(count);
        for _ in 0..count {
            let mut stage = match read_creatable(stream)? {
                Some(boxed) => match *boxed {
                    Creatable::AnimStage(stage) => *stage,
                    _ => return Err(NetError::Malformed("expected AnimStage")),
                },
                None => return Err(NetError::Malformed("expected AnimStage")),
            };
            stage.read_aux(stream)?;
            stages.push(stage);
        }
        let cur_stage = stream.read_i32::<LittleEndian>()?;
        let brain_type = stream.read_u32::<LittleEndian>()?;
        let exit_flags = stream.read_u32::<LittleEndian>()?;
        let mode = stream.read_u8()?;
        let forward = stream.read_u8()? != 0;
        let start_message = if stream.read_u8()? != 0 {
            read_creatable(stream)?
        } else {
            None
        };
        let end_message = if stream.read_u8()? != 0 {
            read_creatable(stream)?
        } else {
            None
        };
        Ok(Self {
            stages,
            cur_stage,
            brain_type,
            exit_flags,
            mode,
            forward,
            start_message,
            end_message,
            fade_in: stream.read_f32::<LittleEndian>()?,
            fade_out: stream.read_f32::<LittleEndian>()?,
            move_mode: stream.read_u8()?,
            body_usage: stream.read_u8()?,
            recipient: Key::stream_read(stream)?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        ArmatureBrain.write_to(stream)?;
        stream.write_u32::<LittleEndian>(self.stages.len() as u32)?;
        for stage in &self.stages {
            stream.write_u16::<LittleEndian>(crate::plasma::factory::class_id::ANIM_STAGE)?;
            stage.write_to(stream)?;
            stage.write_aux(stream)?;
        }
        stream.write_i32::<LittleEndian>(self.cur_stage)?;
        stream.write_u32::<LittleEndian>(self.brain_type)?;
        stream.write_u32::<LittleEndian>(self.exit_flags)?;
        stream.write_u8(self.mode)?;
        stream.write_u8(u8::from(self.forward))?;
        match &self.start_message {
            Some(msg) => {
                stream.write_u8(1)?;
                write_creatable(stream, Some(msg))?;
            }
            None => stream.write_u8(0)?,
        }
        match &self.end_message {
            Some(msg) => {
                stream.write_u8(1)?;
                write_creatable(stream, Some(msg))?;
            }
            None => stream.write_u8(0)?,
        }
        stream.write_f32::<LittleEndian>(self.fade_in)?;
        stream.write_f32::<LittleEndian>(self.fade_out)?;
        stream.write_u8(self.move_mode)?;
        stream.write_u8(self.body_usage)?;
        self.recipient.stream_write(stream)?;
        Ok(())
    }

    pub fn make_safe_for_net(&mut self) -> bool {
        self.start_message.is_none() && self.end_message.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AvBrainCoop {
    pub generic: AvBrainGeneric,
    pub initiator_id: u32,
    pub initiator_serial: u16,
    pub host: Option<Key>,
    pub guest: Option<Key>,
    pub waiting_for_click: bool,
    pub recipients: Vec<Key>,
}

impl AvBrainCoop {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        let generic = AvBrainGeneric::read_from(stream)?;
        let initiator_id = stream.read_u32::<LittleEndian>()?;
        let initiator_serial = stream.read_u16::<LittleEndian>()?;
        let host = if stream.read_u8()? != 0 {
            Some(Key::stream_read(stream)?)
        } else {
            None
        };
        let guest = if stream.read_u8()? != 0 {
            Some(Key::stream_read(stream)?)
        } else {
            None
        };
        let waiting_for_click = stream.read_u8()? != 0;
        let count = stream.read_u16::<LittleEndian>()? as usize;
        let mut recipients = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            recipients.push(Key::stream_read(stream)?);
        }
        Ok(Self {
            generic,
            initiator_id,
            initiator_serial,
            host,
            guest,
            waiting_for_click,
            recipients,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.generic.write_to(stream)?;
        stream.write_u32::<LittleEndian>(self.initiator_id)?;
        stream.write_u16::<LittleEndian>(self.initiator_serial)?;
        match &self.host {
            Some(host) => {
                stream.write_u8(1)?;
                host.stream_write(stream)?;
            }
            None => stream.write_u8(0)?,
        }
        match &self.guest {
            Some(guest) => {
                stream.write_u8(1)?;
                guest.stream_write(stream)?;
            }
            None => stream.write_u8(0)?,
        }
        stream.write_u8(u8::from(self.waiting_for_click))?;
        stream.write_u16::<LittleEndian>(self.recipients.len() as u16)?;
        for recipient in &self.recipients {
            recipient.stream_write(stream)?;
        }
        Ok(())
    }

    pub fn make_safe_for_net(&mut self) -> bool {
        self.generic.make_safe_for_net()
    }
}

/// Two-avatar interaction coordinator; referenced by `AvCoopMsg`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoopCoordinator {
    pub host_key: Key,
    pub guest_key: Key,
    pub host_brain: Option<Box<Creatable>>,
    pub guest_brain: Option<Box<Creatable>>,
    pub host_offer_stage: u8,
    pub guest_accept_stage: bool,
    pub accept_msg: Option<Box<Creatable>>,
    pub synch_bone: String,
    pub auto_start_guest: bool,
}

impl CoopCoordinator {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        let host_key = Key::stream_read(stream)?;
        let guest_key = Key::stream_read(stream)?;
        let host_brain = read_creatable(stream)?;
        let guest_brain = read_creatable(stream)?;
        let host_offer_stage = stream.read_u8()?;
        let guest_accept_stage = stream.read_u8()? != 0;
        let accept_msg = if stream.read_u8()? != 0 {
            read_creatable(stream)?
        } else {
            None
        };
        Ok(Self {
            host_key,
            guest_key,
            host_brain,
            guest_brain,
            host_offer_stage,
            guest_accept_stage,
            accept_msg,
            synch_bone: read_safe_string(stream, StringFormat::Raw)?,
            auto_start_guest: stream.read_u8()? != 0,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.host_key.stream_write(stream)?;
        self.guest_key.stream_write(stream)?;
        write_creatable(stream, self.host_brain.as_deref())?;
        write_creatable(stream, self.guest_brain.as_deref())?;
        stream.write_u8(self.host_offer_stage)?;
        stream.write_u8(u8::from(self.guest_accept_stage))?;
        match &self.accept_msg {
            Some(msg) => {
                stream.write_u8(1)?;
                write_creatable(stream, Some(msg))?;
            }
            None => stream.write_u8(0)?,
        }
        write_safe_string(stream, &self.synch_bone, StringFormat::Raw)?;
        stream.write_u8(u8::from(self.auto_start_guest))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AvAnimTask {
    pub anim_name: String,
    pub initial_blend: f32,
    pub target_blend: f32,
    pub fade_speed: f32,
    pub set_time: f32,
    pub start: bool,
    pub looping: bool,
    pub attach: bool,
}

impl AvAnimTask {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            anim_name: read_safe_string(stream, StringFormat::Raw)?,
            initial_blend: stream.read_f32::<LittleEndian>()?,
            target_blend: stream.read_f32::<LittleEndian>()?,
            fade_speed: stream.read_f32::<LittleEndian>()?,
            set_time: stream.read_f32::<LittleEndian>()?,
            start: stream.read_u8()? != 0,
            looping: stream.read_u8()? != 0,
            attach: stream.read_u8()? != 0,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        write_safe_string(stream, &self.anim_name, StringFormat::Raw)?;
        stream.write_f32::<LittleEndian>(self.initial_blend)?;
        stream.write_f32::<LittleEndian>(self.target_blend)?;
        stream.write_f32::<LittleEndian>(self.fade_speed)?;
        stream.write_f32::<LittleEndian>(self.set_time)?;
        stream.write_u8(u8::from(self.start))?;
        stream.write_u8(u8::from(self.looping))?;
        stream.write_u8(u8::from(self.attach))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AvOneShotLinkTask {
    pub anim_name: String,
    pub marker_name: String,
}

impl AvOneShotLinkTask {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            anim_name: read_safe_string(stream, StringFormat::Raw)?,
            marker_name: read_safe_string(stream, StringFormat::Raw)?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        write_safe_string(stream, &self.anim_name, StringFormat::Raw)?;
        write_safe_string(stream, &self.marker_name, StringFormat::Raw)?;
        Ok(())
    }
}

/// Carries an avatar task. Tasks drive arbitrary avatar behavior, so none of
/// this family may be relayed from a client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AvTaskMsg {
    pub base: Message,
    pub task: Option<Box<Creatable>>,
}

impl AvTaskMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        let base = Message::stream_read(stream)?;
        let task = if stream.read_u8()? != 0 {
            read_creatable(stream)?
        } else {
            None
        };
        Ok(Self { base, task })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        match &self.task {
            Some(task) => {
                stream.write_u8(1)?;
                write_creatable(stream, Some(task))?;
            }
            None => stream.write_u8(0)?,
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AvPushBrainMsg {
    pub task: AvTaskMsg,
    pub brain: Option<Box<Creatable>>,
}

impl AvPushBrainMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            task: AvTaskMsg::read_from(stream)?,
            brain: read_creatable(stream)?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.task.write_to(stream)?;
        write_creatable(stream, self.brain.as_deref())?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AvSeekMsg {
    pub task: AvTaskMsg,
    pub seek_point: Key,
    pub target_pos: Vector3,
    pub target_look: Vector3,
    pub duration: f32,
    pub smart_seek: bool,
    pub anim_name: String,
    pub align_type: u16,
    pub no_seek: bool,
    pub flags: u8,
    pub finish_key: Key,
}

impl AvSeekMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        let task = AvTaskMsg::read_from(stream)?;
        let seek_point = Key::stream_read(stream)?;
        // Target vectors accompany a concrete seek point only.
        let (target_pos, target_look) = if seek_point.is_null() {
            (Vector3::default(), Vector3::default())
        } else {
            (
                Vector3::stream_read(stream)?,
                Vector3::stream_read(stream)?,
            )
        };
        Ok(Self {
            task,
            seek_point,
            target_pos,
            target_look,
            duration: stream.read_f32::<LittleEndian>()?,
            smart_seek: stream.read_u8()? != 0,
            anim_name: read_safe_string(stream, StringFormat::Raw)?,
            align_type: stream.read_u16::<LittleEndian>()?,
            no_seek: stream.read_u8()? != 0,
            flags: stream.read_u8()?,
            finish_key: Key::stream_read(stream)?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.task.write_to(stream)?;
        self.seek_point.stream_write(stream)?;
        if !self.seek_point.is_null() {
            self.target_pos.stream_write(stream)?;
            self.target_look.stream_write(stream)?;
        }
        stream.write_f32::<LittleEndian>(self.duration)?;
        stream.write_u8(u8::from(self.smart_seek))?;
        write_safe_string(stream, &self.anim_name, StringFormat::Raw)?;
        stream.write_u16::<LittleEndian>(self.align_type)?;
        stream.write_u8(u8::from(self.no_seek))?;
        stream.write_u8(self.flags)?;
        self.finish_key.stream_write(stream)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AvOneShotMsg {
    pub seek: AvSeekMsg,
    pub one_shot_anim_name: String,
    pub drivable: bool,
    pub reversible: bool,
}

impl AvOneShotMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            seek: AvSeekMsg::read_from(stream)?,
            one_shot_anim_name: read_safe_string(stream, StringFormat::Raw)?,
            drivable: stream.read_u8()? != 0,
            reversible: stream.read_u8()? != 0,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.seek.write_to(stream)?;
        write_safe_string(stream, &self.one_shot_anim_name, StringFormat::Raw)?;
        stream.write_u8(u8::from(self.drivable))?;
        stream.write_u8(u8::from(self.reversible))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AvBrainGenericMsg {
    pub base: Message,
    pub msg_type: u32,
    pub stage: i32,
    pub set_time: bool,
    pub new_time: f32,
    pub set_direction: bool,
    pub new_direction: bool,
    pub transition_time: f32,
}

impl AvBrainGenericMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            base: Message::stream_read(stream)?,
            msg_type: stream.read_u32::<LittleEndian>()?,
            stage: stream.read_i32::<LittleEndian>()?,
            set_time: stream.read_u8()? != 0,
            new_time: stream.read_f32::<LittleEndian>()?,
            set_direction: stream.read_u8()? != 0,
            new_direction: stream.read_u8()? != 0,
            transition_time: stream.read_f32::<LittleEndian>()?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        stream.write_u32::<LittleEndian>(self.msg_type)?;
        stream.write_i32::<LittleEndian>(self.stage)?;
        stream.write_u8(u8::from(self.set_time))?;
        stream.write_f32::<LittleEndian>(self.new_time)?;
        stream.write_u8(u8::from(self.set_direction))?;
        stream.write_u8(u8::from(self.new_direction))?;
        stream.write_f32::<LittleEndian>(self.transition_time)?;
        Ok(())
    }
}

/// Cooperative interaction request; safety defers to the coordinator's
/// accept message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AvCoopMsg {
    pub base: Message,
    pub coordinator: Option<Box<Creatable>>,
    pub initiator_id: u32,
    pub initiator_serial: u16,
    pub command: u16,
}

impl AvCoopMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        let base = Message::stream_read(stream)?;
        let coordinator = if stream.read_u8()? != 0 {
            read_creatable(stream)?
        } else {
            None
        };
        Ok(Self {
            base,
            coordinator,
            initiator_id: stream.read_u32::<LittleEndian>()?,
            initiator_serial: stream.read_u16::<LittleEndian>()?,
            command: stream.read_u16::<LittleEndian>()?,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        match &self.coordinator {
            Some(coordinator) => {
                stream.write_u8(1)?;
                write_creatable(stream, Some(coordinator))?;
            }
            None => stream.write_u8(0)?,
        }
        stream.write_u32::<LittleEndian>(self.initiator_id)?;
        stream.write_u16::<LittleEndian>(self.initiator_serial)?;
        stream.write_u16::<LittleEndian>(self.command)?;
        Ok(())
    }

    pub fn make_safe_for_net(&mut self) -> bool {
        if let Some(boxed) = &mut self.coordinator {
            if let Creatable::CoopCoordinator(coordinator) = boxed.as_mut() {
                if let Some(accept) = &mut coordinator.accept_msg {
                    return accept.make_safe_for_net();
                }
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AvTaskSeekDoneMsg {
    pub base: Message,
    pub aborted: bool,
}

impl AvTaskSeekDoneMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        Ok(Self {
            base: Message::stream_read(stream)?,
            aborted: stream.read_u8()? != 0,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        stream.write_u8(u8::from(self.aborted))?;
        Ok(())
    }
}
