use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::Message;
use crate::errors::{NetError, NetResult};
use crate::plasma::key::Key;
use crate::plasma::streams::{
    read_safe_string, write_safe_string, StreamRead, StreamWrite, StringFormat,
};
use crate::types::math::Vector3;

const EVT_COLLISION: u32 = 1;
const EVT_PICKED: u32 = 2;
const EVT_CONTROL_KEY: u32 = 3;
const EVT_VARIABLE: u32 = 4;
const EVT_FACING: u32 = 5;
const EVT_CONTAINED: u32 = 6;
const EVT_ACTIVATE: u32 = 7;
const EVT_CALLBACK: u32 = 8;
const EVT_RESPONDER_STATE: u32 = 9;
const EVT_MULTI_STAGE: u32 = 10;
const EVT_SPAWNED: u32 = 11;
const EVT_CLICK_DRAG: u32 = 12;
const EVT_COOP: u32 = 13;
const EVT_OFFER_LINK_BOOK: u32 = 14;
const EVT_BOOK: u32 = 15;
const EVT_CLIMBING_BLOCKER_HIT: u32 = 16;

const DATA_FLOAT: u32 = 1;
const DATA_INT: u32 = 3;

/// Typed payload attached to a `NotifyMsg`. Unknown event kinds fail the
/// stream rather than desynchronize it.
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    Collision {
        enter: bool,
        hitter: Key,
        hittee: Key,
    },
    Picked {
        picker: Key,
        picked: Key,
        enabled: bool,
        hit_point: Vector3,
    },
    ControlKey {
        control_key: i32,
        down: bool,
    },
    Variable {
        name: String,
        data_type: u32,
        number: u32,
        key: Key,
    },
    Facing {
        facer: Key,
        facee: Key,
        dot: f32,
        enabled: bool,
    },
    Contained {
        contained: Key,
        container: Key,
        entering: bool,
    },
    Activate {
        active: bool,
        activate: bool,
    },
    Callback {
        callback_type: i32,
    },
    ResponderState {
        state: i32,
    },
    MultiStage {
        stage: i32,
        event: i32,
        avatar: Key,
    },
    Spawned {
        spawner: Key,
        spawnee: Key,
    },
    ClickDrag {
        picker: Key,
        picked: Key,
        anim_pos: f32,
    },
    Coop {
        id: u32,
        serial: u16,
    },
    OfferLinkBook {
        offerer: Key,
        target_age: u32,
        offeree: u32,
    },
    Book {
        event: u32,
        link_id: u32,
    },
    ClimbingBlockerHit {
        blocker: Key,
    },
}

impl EventData {
    fn type_id(&self) -> u32 {
        match self {
            Self::Collision { .. } => EVT_COLLISION,
            Self::Picked { .. } => EVT_PICKED,
            Self::ControlKey { .. } => EVT_CONTROL_KEY,
            Self::Variable { .. } => EVT_VARIABLE,
            Self::Facing { .. } => EVT_FACING,
            Self::Contained { .. } => EVT_CONTAINED,
            Self::Activate { .. } => EVT_ACTIVATE,
            Self::Callback { .. } => EVT_CALLBACK,
            Self::ResponderState { .. } => EVT_RESPONDER_STATE,
            Self::MultiStage { .. } => EVT_MULTI_STAGE,
            Self::Spawned { .. } => EVT_SPAWNED,
            Self::ClickDrag { .. } => EVT_CLICK_DRAG,
            Self::Coop { .. } => EVT_COOP,
            Self::OfferLinkBook { .. } => EVT_OFFER_LINK_BOOK,
            Self::Book { .. } => EVT_BOOK,
            Self::ClimbingBlockerHit { .. } => EVT_CLIMBING_BLOCKER_HIT,
        }
    }

    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        let event_type = stream.read_u32::<LittleEndian>()?;
        match event_type {
            EVT_COLLISION => Ok(Self::Collision {
                enter: stream.read_u8()? != 0,
                hitter: Key::stream_read(stream)?,
                hittee: Key::stream_read(stream)?,
            }),
            EVT_PICKED => Ok(Self::Picked {
                picker: Key::stream_read(stream)?,
                picked: Key::stream_read(stream)?,
                enabled: stream.read_u8()? != 0,
                hit_point: Vector3::stream_read(stream)?,
            }),
            EVT_CONTROL_KEY => Ok(Self::ControlKey {
                control_key: stream.read_i32::<LittleEndian>()?,
                down: stream.read_u8()? != 0,
            }),
            EVT_VARIABLE => {
                let name = read_safe_string(stream, StringFormat::Raw)?;
                let data_type = stream.read_u32::<LittleEndian>()?;
                let number = stream.read_u32::<LittleEndian>()?;
                let key = Key::stream_read(stream)?;
                Ok(Self::Variable {
                    name,
                    data_type,
                    number,
                    key,
                })
            }
            EVT_FACING => Ok(Self::Facing {
                facer: Key::stream_read(stream)?,
                facee: Key::stream_read(stream)?,
                dot: stream.read_f32::<LittleEndian>()?,
                enabled: stream.read_u8()? != 0,
            }),
            EVT_CONTAINED => Ok(Self::Contained {
                contained: Key::stream_read(stream)?,
                container: Key::stream_read(stream)?,
                entering: stream.read_u8()? != 0,
            }),
            EVT_ACTIVATE => Ok(Self::Activate {
                active: stream.read_u8()? != 0,
                activate: stream.read_u8()? != 0,
            }),
            EVT_CLICK_DRAG => Ok(Self::ClickDrag {
                picker: Key::stream_read(stream)?,
                picked: Key::stream_read(stream)?,
                anim_pos: stream.read_f32::<LittleEndian>()?,
            }),
            EVT_CALLBACK => Ok(Self::Callback {
                callback_type: stream.read_i32::<LittleEndian>()?,
            }),
            EVT_RESPONDER_STATE => Ok(Self::ResponderState {
                state: stream.read_i32::<LittleEndian>()?,
            }),
            EVT_MULTI_STAGE => Ok(Self::MultiStage {
                stage: stream.read_i32::<LittleEndian>()?,
                event: stream.read_i32::<LittleEndian>()?,
                avatar: Key::stream_read(stream)?,
            }),
            EVT_SPAWNED => Ok(Self::Spawned {
                spawner: Key::stream_read(stream)?,
                spawnee: Key::stream_read(stream)?,
            }),
            EVT_COOP => Ok(Self::Coop {
                id: stream.read_u32::<LittleEndian>()?,
                serial: stream.read_u16::<LittleEndian>()?,
            }),
            EVT_OFFER_LINK_BOOK => Ok(Self::OfferLinkBook {
                offerer: Key::stream_read(stream)?,
                target_age: stream.read_u32::<LittleEndian>()?,
                offeree: stream.read_u32::<LittleEndian>()?,
            }),
            EVT_BOOK => Ok(Self::Book {
                event: stream.read_u32::<LittleEndian>()?,
                link_id: stream.read_u32::<LittleEndian>()?,
            }),
            EVT_CLIMBING_BLOCKER_HIT => Ok(Self::ClimbingBlockerHit {
                blocker: Key::stream_read(stream)?,
            }),
            _ => Err(NetError::Malformed("unsupported event data type")),
        }
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        stream.write_u32::<LittleEndian>(self.type_id())?;
        match self {
            Self::Collision {
                enter,
                hitter,
                hittee,
            } => {
                stream.write_u8(u8::from(*enter))?;
                hitter.stream_write(stream)?;
                hittee.stream_write(stream)?;
            }
            Self::Picked {
                picker,
                picked,
                enabled,
                hit_point,
            } => {
                picker.stream_write(stream)?;
                picked.stream_write(stream)?;
                stream.write_u8(u8::from(*enabled))?;
                hit_point.stream_write(stream)?;
            }
            Self::ControlKey { control_key, down } => {
                stream.write_i32::<LittleEndian>(*control_key)?;
                stream.write_u8(u8::from(*down))?;
            }
            Self::Variable {
                name,
                data_type,
                number,
                key,
            } => {
                write_safe_string(stream, name, StringFormat::Raw)?;
                stream.write_u32::<LittleEndian>(*data_type)?;
                match *data_type {
                    DATA_FLOAT | DATA_INT => stream.write_u32::<LittleEndian>(*number)?,
                    _ => stream.write_u32::<LittleEndian>(0)?,
                }
                key.stream_write(stream)?;
            }
            Self::Facing {
                facer,
                facee,
                dot,
                enabled,
            } => {
                facer.stream_write(stream)?;
                facee.stream_write(stream)?;
                stream.write_f32::<LittleEndian>(*dot)?;
                stream.write_u8(u8::from(*enabled))?;
            }
            Self::Contained {
                contained,
                container,
                entering,
            } => {
                contained.stream_write(stream)?;
                container.stream_write(stream)?;
                stream.write_u8(u8::from(*entering))?;
            }
            Self::Activate { active, activate } => {
                stream.write_u8(u8::from(*active))?;
                stream.write_u8(u8::from(*activate))?;
            }
            Self::Callback { callback_type } => {
                stream.write_i32::<LittleEndian>(*callback_type)?;
            }
            Self::ResponderState { state } => {
                stream.write_i32::<LittleEndian>(*state)?;
            }
            Self::MultiStage {
                stage,
                event,
                avatar,
            } => {
                stream.write_i32::<LittleEndian>(*stage)?;
                stream.write_i32::<LittleEndian>(*event)?;
                avatar.stream_write(stream)?;
            }
            Self::Spawned { spawner, spawnee } => {
                spawner.stream_write(stream)?;
                spawnee.stream_write(stream)?;
            }
            Self::ClickDrag {
                picker,
                picked,
                anim_pos,
            } => {
                picker.stream_write(stream)?;
                picked.stream_write(stream)?;
                stream.write_f32::<LittleEndian>(*anim_pos)?;
            }
            Self::Coop { id, serial } => {
                stream.write_u32::<LittleEndian>(*id)?;
                stream.write_u16::<LittleEndian>(*serial)?;
            }
            Self::OfferLinkBook {
                offerer,
                target_age,
                offeree,
            } => {
                offerer.stream_write(stream)?;
                stream.write_u32::<LittleEndian>(*target_age)?;
                stream.write_u32::<LittleEndian>(*offeree)?;
            }
            Self::Book { event, link_id } => {
                stream.write_u32::<LittleEndian>(*event)?;
                stream.write_u32::<LittleEndian>(*link_id)?;
            }
            Self::ClimbingBlockerHit { blocker } => {
                blocker.stream_write(stream)?;
            }
        }
        Ok(())
    }
}

/// Script notification with a list of typed events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotifyMsg {
    pub base: Message,
    pub notify_type: u32,
    pub state: f32,
    pub id: i32,
    pub events: Vec<EventData>,
}

impl NotifyMsg {
    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        let base = Message::stream_read(stream)?;
        let notify_type = stream.read_u32::<LittleEndian>()?;
        let state = stream.read_f32::<LittleEndian>()?;
        let id = stream.read_i32::<LittleEndian>()?;
        let count = stream.read_u32::<LittleEndian>()? as usize;
        if count > 0x1000 {
            return Err(NetError::Malformed("oversized notify event list"));
        }
        let mut events = Vec::with_capacity(count);
        for _ in 0..count {
            events.push(EventData::read_from(stream)?);
        }
        Ok(Self {
            base,
            notify_type,
            state,
            id,
            events,
        })
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        self.base.stream_write(stream)?;
        stream.write_u32::<LittleEndian>(self.notify_type)?;
        stream.write_f32::<LittleEndian>(self.state)?;
        stream.write_i32::<LittleEndian>(self.id)?;
        stream.write_u32::<LittleEndian>(self.events.len() as u32)?;
        for event in &self.events {
            event.write_to(stream)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn notify_roundtrip_with_events() {
        let msg = NotifyMsg {
            notify_type: 0,
            state: 1.0,
            id: 42,
            events: vec![
                EventData::Activate {
                    active: true,
                    activate: false,
                },
                EventData::Variable {
                    name: "age".to_string(),
                    data_type: DATA_INT,
                    number: 7,
                    key: Key::default(),
                },
            ],
            ..Default::default()
        };
        let mut buffer = Vec::new();
        msg.write_to(&mut buffer).unwrap();
        let back = NotifyMsg::read_from(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn unknown_event_type_fails() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&999u32.to_le_bytes());
        assert!(EventData::read_from(&mut Cursor::new(buffer)).is_err());
    }
}
