//! SDL state instances: typed values bound to a descriptor, blob round-trip,
//! and version upgrade.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::errors::{NetError, NetResult};
use crate::plasma::factory::{read_creatable, write_creatable, Creatable};
use crate::plasma::key::Uoid;
use crate::plasma::streams::{read_exact, StreamRead, StreamWrite};
use crate::sdl::descriptor::{DescriptorDb, StateDescriptor, VarDescriptor, VarType};
use crate::types::math::{ColorRgba, ColorRgba8, Quaternion, Vector3};
use crate::types::unified_time::UnifiedTime;

const IO_VERSION: u8 = 6;

mod state_flags {
    pub const HAS_UOID: u16 = 1 << 0;
    pub const VAR_LENGTH_IO: u16 = 1 << 1;
}

mod var_flags {
    pub const HAS_VALUE: u8 = 1 << 0;
    pub const IS_DIRTY: u8 = 1 << 1;
    pub const WANT_TIMESTAMP: u8 = 1 << 2;
    pub const HAS_TIMESTAMP: u8 = 1 << 3;
    pub const SAME_AS_DEFAULT: u8 = 1 << 4;
    pub const HAS_NOTIFICATION_INFO: u8 = 1 << 5;
}

/// The array payload of one variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    Int(Vec<i32>),
    Float(Vec<f32>),
    Bool(Vec<bool>),
    String32(Vec<String>),
    Key(Vec<Uoid>),
    Creatable(Vec<Option<Box<Creatable>>>),
    Double(Vec<f64>),
    Time(Vec<UnifiedTime>),
    Byte(Vec<i8>),
    Short(Vec<i16>),
    AgeTimeOfDay,
    Vector3(Vec<Vector3>),
    Quat(Vec<Quaternion>),
    Rgb(Vec<ColorRgba>),
    Rgba(Vec<ColorRgba>),
    Rgb8(Vec<ColorRgba8>),
    Rgba8(Vec<ColorRgba8>),
    StateDesc(Vec<State>),
}

impl Values {
    fn type_of(&self) -> VarType {
        match self {
            Self::Int(_) => VarType::Int,
            Self::Float(_) => VarType::Float,
            Self::Bool(_) => VarType::Bool,
            Self::String32(_) => VarType::String32,
            Self::Key(_) => VarType::Key,
            Self::Creatable(_) => VarType::Creatable,
            Self::Double(_) => VarType::Double,
            Self::Time(_) => VarType::Time,
            Self::Byte(_) => VarType::Byte,
            Self::Short(_) => VarType::Short,
            Self::AgeTimeOfDay => VarType::AgeTimeOfDay,
            Self::Vector3(_) => VarType::Vector3,
            Self::Quat(_) => VarType::Quat,
            Self::Rgb(_) => VarType::Rgb,
            Self::Rgba(_) => VarType::Rgba,
            Self::Rgb8(_) => VarType::Rgb8,
            Self::Rgba8(_) => VarType::Rgba8,
            Self::StateDesc(_) => VarType::StateDesc,
        }
    }
}

/// One variable slot: flags plus an array of values parallel to the
/// descriptor's declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub flags: u8,
    pub timestamp: UnifiedTime,
    pub values: Values,
}

/// A state instance bound to a descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub descriptor_name: String,
    pub descriptor_version: u16,
    pub object: Option<Uoid>,
    pub vars: Vec<Variable>,
}

fn parse_default<T: std::str::FromStr + Default>(text: Option<&str>) -> T {
    text.and_then(|value| value.parse().ok()).unwrap_or_default()
}

fn parse_default_bool(text: Option<&str>) -> bool {
    match text {
        Some(value) => value.eq_ignore_ascii_case("true") || value == "1",
        None => false,
    }
}

fn parse_tuple(text: Option<&str>, n: usize) -> Vec<f32> {
    let mut parts: Vec<f32> = text
        .map(|value| {
            value
                .split(',')
                .filter_map(|part| part.trim().parse().ok())
                .collect()
        })
        .unwrap_or_default();
    parts.resize(n, 0.0);
    parts
}

fn default_values(db: &DescriptorDb, var: &VarDescriptor) -> NetResult<Values> {
    let n = var.size;
    let default = var.default.as_deref();
    Ok(match var.var_type {
        VarType::Int => Values::Int(vec![parse_default(default); n]),
        VarType::Float => Values::Float(vec![parse_default(default); n]),
        VarType::Bool => Values::Bool(vec![parse_default_bool(default); n]),
        VarType::String32 => {
            Values::String32(vec![default.unwrap_or_default().to_string(); n])
        }
        VarType::Key => Values::Key(vec![Uoid::default(); n]),
        VarType::Creatable => Values::Creatable((0..n).map(|_| None).collect()),
        VarType::Double => Values::Double(vec![parse_default(default); n]),
        VarType::Time => Values::Time(vec![UnifiedTime::default(); n]),
        VarType::Byte => Values::Byte(vec![parse_default::<i8>(default); n]),
        VarType::Short => Values::Short(vec![parse_default::<i16>(default); n]),
        VarType::AgeTimeOfDay => Values::AgeTimeOfDay,
        VarType::Vector3 | VarType::Point3 => {
            let parts = parse_tuple(default, 3);
            Values::Vector3(vec![
                Vector3 {
                    x: parts[0],
                    y: parts[1],
                    z: parts[2],
                };
                n
            ])
        }
        VarType::Quat => {
            let parts = parse_tuple(default, 4);
            Values::Quat(vec![
                Quaternion {
                    x: parts[0],
                    y: parts[1],
                    z: parts[2],
                    w: parts[3],
                };
                n
            ])
        }
        VarType::Rgb | VarType::Rgba => {
            let parts = parse_tuple(default, 4);
            let color = ColorRgba {
                r: parts[0],
                g: parts[1],
                b: parts[2],
                a: parts[3],
            };
            if var.var_type == VarType::Rgb {
                Values::Rgb(vec![color; n])
            } else {
                Values::Rgba(vec![color; n])
            }
        }
        VarType::Rgb8 | VarType::Rgba8 => {
            let parts = parse_tuple(default, 4);
            let color = ColorRgba8 {
                r: parts[0] as u8,
                g: parts[1] as u8,
                b: parts[2] as u8,
                a: parts[3] as u8,
            };
            if var.var_type == VarType::Rgb8 {
                Values::Rgb8(vec![color; n])
            } else {
                Values::Rgba8(vec![color; n])
            }
        }
        VarType::StateDesc => {
            let mut children = Vec::with_capacity(n);
            for _ in 0..n {
                children.push(State::from_defaults_named(db, &var.type_name, None)?);
            }
            Values::StateDesc(children)
        }
    })
}

impl State {
    /// Build a state at the descriptor's declared defaults.
    pub fn from_defaults(db: &DescriptorDb, descriptor: &StateDescriptor) -> NetResult<Self> {
        let mut vars = Vec::with_capacity(descriptor.vars.len());
        for var in &descriptor.vars {
            vars.push(Variable {
                flags: var_flags::HAS_VALUE,
                timestamp: UnifiedTime::default(),
                values: default_values(db, var)?,
            });
        }
        Ok(Self {
            descriptor_name: descriptor.name.clone(),
            descriptor_version: descriptor.version,
            object: None,
            vars,
        })
    }

    fn from_defaults_named(
        db: &DescriptorDb,
        name: &str,
        version: Option<u16>,
    ) -> NetResult<Self> {
        let descriptor = match version {
            Some(version) => db.find(name, version),
            None => db.find_latest(name),
        }
        .ok_or(NetError::Malformed("unknown state descriptor"))?
        .clone();
        Self::from_defaults(db, &descriptor)
    }

    pub fn var(&self, descriptor: &StateDescriptor, name: &str) -> Option<&Variable> {
        descriptor.var_index(name).and_then(|idx| self.vars.get(idx))
    }

    /// Decode a state blob. If the persisted descriptor version is older than
    /// the newest known one, the result is upgraded in place.
    pub fn from_blob(db: &DescriptorDb, blob: &[u8]) -> NetResult<Self> {
        let mut cursor = Cursor::new(blob);
        let state = Self::read_from(db, &mut cursor)?;
        let latest = db
            .find_latest(&state.descriptor_name)
            .ok_or(NetError::Malformed("unknown state descriptor"))?
            .clone();
        if latest.version > state.descriptor_version {
            state.upgrade(db, &latest)
        } else {
            Ok(state)
        }
    }

    pub fn to_blob(&self, db: &DescriptorDb) -> NetResult<Vec<u8>> {
        let mut buffer = Vec::new();
        self.write_to(db, &mut buffer)?;
        Ok(buffer)
    }

    pub fn read_from<R: Read>(db: &DescriptorDb, stream: &mut R) -> NetResult<Self> {
        let flags = stream.read_u16::<LittleEndian>()?;
        let object = if flags & state_flags::HAS_UOID != 0 {
            Some(Uoid::stream_read(stream)?)
        } else {
            None
        };

        let name_len = stream.read_u16::<LittleEndian>()? as usize;
        let name_bytes = read_exact(stream, name_len)?;
        let descriptor_name: String = name_bytes.iter().map(|&b| b as char).collect();
        let descriptor_version = stream.read_u16::<LittleEndian>()?;

        if stream.read_u8()? != IO_VERSION {
            return Err(NetError::Malformed("unsupported SDL io version"));
        }

        let descriptor = db
            .find(&descriptor_name, descriptor_version)
            .ok_or(NetError::Malformed("unknown state descriptor version"))?
            .clone();

        let var_count = if flags & state_flags::VAR_LENGTH_IO != 0 {
            let high = stream.read_u8()? as usize;
            let low = stream.read_u8()? as usize;
            (high << 8) | low
        } else {
            stream.read_u8()? as usize
        };
        if var_count != descriptor.vars.len() {
            return Err(NetError::Malformed("variable count does not match schema"));
        }

        let mut vars = Vec::with_capacity(var_count);
        for var_desc in &descriptor.vars {
            let name_len = stream.read_u8()? as usize;
            let name_bytes = read_exact(stream, name_len)?;
            let var_name: String = name_bytes.iter().map(|&b| b as char).collect();
            if !var_name.eq_ignore_ascii_case(&var_desc.name) {
                return Err(NetError::Malformed("variable order does not match schema"));
            }

            let flag_bits = stream.read_u8()?;
            let timestamp = if flag_bits & var_flags::HAS_TIMESTAMP != 0 {
                UnifiedTime::stream_read(stream)?
            } else {
                UnifiedTime::default()
            };

            let values = if flag_bits & var_flags::HAS_VALUE != 0
                && flag_bits & var_flags::SAME_AS_DEFAULT == 0
            {
                read_values(db, stream, var_desc)?
            } else {
                default_values(db, var_desc)?
            };

            vars.push(Variable {
                flags: flag_bits,
                timestamp,
                values,
            });
        }

        Ok(Self {
            descriptor_name,
            descriptor_version,
            object,
            vars,
        })
    }

    pub fn write_to<W: Write>(&self, db: &DescriptorDb, stream: &mut W) -> NetResult<()> {
        let descriptor = db
            .find(&self.descriptor_name, self.descriptor_version)
            .ok_or(NetError::Malformed("unknown state descriptor version"))?;
        if descriptor.vars.len() != self.vars.len() {
            return Err(NetError::Malformed("state does not match its schema"));
        }

        let mut flags = 0u16;
        if self.object.is_some() {
            flags |= state_flags::HAS_UOID;
        }
        if self.vars.len() > u8::MAX as usize {
            flags |= state_flags::VAR_LENGTH_IO;
        }
        stream.write_u16::<LittleEndian>(flags)?;
        if let Some(object) = &self.object {
            object.stream_write(stream)?;
        }

        stream.write_u16::<LittleEndian>(self.descriptor_name.len() as u16)?;
        let name_bytes: Vec<u8> = self.descriptor_name.chars().map(|c| c as u32 as u8).collect();
        stream.write_all(&name_bytes)?;
        stream.write_u16::<LittleEndian>(self.descriptor_version)?;
        stream.write_u8(IO_VERSION)?;

        if flags & state_flags::VAR_LENGTH_IO != 0 {
            stream.write_u8((self.vars.len() >> 8) as u8)?;
            stream.write_u8((self.vars.len() & 0xFF) as u8)?;
        } else {
            stream.write_u8(self.vars.len() as u8)?;
        }

        for (var, var_desc) in self.vars.iter().zip(&descriptor.vars) {
            let name_bytes: Vec<u8> = var_desc.name.chars().map(|c| c as u32 as u8).collect();
            stream.write_u8(name_bytes.len() as u8)?;
            stream.write_all(&name_bytes)?;
            stream.write_u8(var.flags)?;
            if var.flags & var_flags::HAS_TIMESTAMP != 0 {
                var.timestamp.stream_write(stream)?;
            }
            if var.flags & var_flags::HAS_VALUE != 0
                && var.flags & var_flags::SAME_AS_DEFAULT == 0
            {
                write_values(db, stream, var_desc, &var.values)?;
            }
        }
        Ok(())
    }

    /// Rebind this state to a newer descriptor of the same name. Variables
    /// matching by name and type carry their values over; everything else
    /// starts at the new defaults. Nested state-desc values recurse with the
    /// same policy.
    pub fn upgrade(self, db: &DescriptorDb, target: &StateDescriptor) -> NetResult<Self> {
        let source_desc = db
            .find(&self.descriptor_name, self.descriptor_version)
            .ok_or(NetError::Malformed("unknown state descriptor version"))?
            .clone();

        let mut upgraded = Self::from_defaults(db, target)?;
        for (old_var, old_desc) in self.vars.into_iter().zip(&source_desc.vars) {
            let Some(new_idx) = target.var_index(&old_desc.name) else {
                continue;
            };
            let new_desc = &target.vars[new_idx];
            if new_desc.var_type != old_desc.var_type {
                continue;
            }
            if new_desc.var_type == VarType::StateDesc {
                let Values::StateDesc(children) = old_var.values else {
                    continue;
                };
                let Some(child_target) = db.find_latest(&new_desc.type_name) else {
                    continue;
                };
                let child_target = child_target.clone();
                let mut upgraded_children = Vec::with_capacity(children.len());
                for child in children {
                    upgraded_children.push(child.upgrade(db, &child_target)?);
                }
                upgraded.vars[new_idx] = Variable {
                    flags: old_var.flags,
                    timestamp: old_var.timestamp,
                    values: Values::StateDesc(upgraded_children),
                };
            } else {
                upgraded.vars[new_idx] = old_var;
            }
        }
        Ok(upgraded)
    }
}

fn read_array_len<R: Read>(stream: &mut R, descriptor_size: usize) -> NetResult<usize> {
    if descriptor_size == 0 {
        Ok(stream.read_u32::<LittleEndian>()? as usize)
    } else {
        Ok(descriptor_size)
    }
}

fn write_array_len<W: Write>(stream: &mut W, descriptor_size: usize, len: usize) -> NetResult<()> {
    if descriptor_size == 0 {
        stream.write_u32::<LittleEndian>(len as u32)?;
    } else if descriptor_size != len {
        return Err(NetError::Malformed("array length does not match schema"));
    }
    Ok(())
}

fn read_values<R: Read>(
    db: &DescriptorDb,
    stream: &mut R,
    var_desc: &VarDescriptor,
) -> NetResult<Values> {
    let n = read_array_len(stream, var_desc.size)?;
    if n > 0x10000 {
        return Err(NetError::Malformed("oversized SDL array"));
    }
    Ok(match var_desc.var_type {
        VarType::Int => {
            let mut values = Vec::with_capacity(n);
            for _ in 0..n {
                values.push(stream.read_i32::<LittleEndian>()?);
            }
            Values::Int(values)
        }
        VarType::Float => {
            let mut values = Vec::with_capacity(n);
            for _ in 0..n {
                values.push(stream.read_f32::<LittleEndian>()?);
            }
            Values::Float(values)
        }
        VarType::Bool => {
            let mut values = Vec::with_capacity(n);
            for _ in 0..n {
                values.push(stream.read_u8()? != 0);
            }
            Values::Bool(values)
        }
        VarType::String32 => {
            let mut values = Vec::with_capacity(n);
            for _ in 0..n {
                let raw = read_exact(stream, 32)?;
                let end = raw.iter().position(|&b| b == 0).unwrap_or(32);
                values.push(raw[..end].iter().map(|&b| b as char).collect());
            }
            Values::String32(values)
        }
        VarType::Key => {
            let mut values = Vec::with_capacity(n);
            for _ in 0..n {
                values.push(Uoid::stream_read(stream)?);
            }
            Values::Key(values)
        }
        VarType::Creatable => {
            let mut values = Vec::with_capacity(n);
            for _ in 0..n {
                values.push(read_creatable(stream)?);
            }
            Values::Creatable(values)
        }
        VarType::Double => {
            let mut values = Vec::with_capacity(n);
            for _ in 0..n {
                values.push(stream.read_f64::<LittleEndian>()?);
            }
            Values::Double(values)
        }
        VarType::Time => {
            let mut values = Vec::with_capacity(n);
            for _ in 0..n {
                values.push(UnifiedTime::stream_read(stream)?);
            }
            Values::Time(values)
        }
        VarType::Byte => {
            let mut values = Vec::with_capacity(n);
            for _ in 0..n {
                values.push(stream.read_i8()?);
            }
            Values::Byte(values)
        }
        VarType::Short => {
            let mut values = Vec::with_capacity(n);
            for _ in 0..n {
                values.push(stream.read_i16::<LittleEndian>()?);
            }
            Values::Short(values)
        }
        VarType::AgeTimeOfDay => Values::AgeTimeOfDay,
        VarType::Vector3 | VarType::Point3 => {
            let mut values = Vec::with_capacity(n);
            for _ in 0..n {
                values.push(Vector3::stream_read(stream)?);
            }
            Values::Vector3(values)
        }
        VarType::Quat => {
            let mut values = Vec::with_capacity(n);
            for _ in 0..n {
                values.push(Quaternion::stream_read(stream)?);
            }
            Values::Quat(values)
        }
        VarType::Rgb => {
            let mut values = Vec::with_capacity(n);
            for _ in 0..n {
                values.push(ColorRgba::read_rgb(stream)?);
            }
            Values::Rgb(values)
        }
        VarType::Rgba => {
            let mut values = Vec::with_capacity(n);
            for _ in 0..n {
                values.push(ColorRgba::stream_read(stream)?);
            }
            Values::Rgba(values)
        }
        VarType::Rgb8 => {
            let mut values = Vec::with_capacity(n);
            for _ in 0..n {
                values.push(ColorRgba8::read_rgb(stream)?);
            }
            Values::Rgb8(values)
        }
        VarType::Rgba8 => {
            let mut values = Vec::with_capacity(n);
            for _ in 0..n {
                values.push(ColorRgba8::stream_read(stream)?);
            }
            Values::Rgba8(values)
        }
        VarType::StateDesc => {
            let mut values = Vec::with_capacity(n);
            for _ in 0..n {
                values.push(State::read_from(db, stream)?);
            }
            Values::StateDesc(values)
        }
    })
}

fn write_values<W: Write>(
    db: &DescriptorDb,
    stream: &mut W,
    var_desc: &VarDescriptor,
    values: &Values,
) -> NetResult<()> {
    if values.type_of() != var_desc.var_type
        && !(values.type_of() == VarType::Vector3 && var_desc.var_type == VarType::Point3)
    {
        return Err(NetError::Malformed("value type does not match schema"));
    }
    match values {
        Values::Int(items) => {
            write_array_len(stream, var_desc.size, items.len())?;
            for item in items {
                stream.write_i32::<LittleEndian>(*item)?;
            }
        }
        Values::Float(items) => {
            write_array_len(stream, var_desc.size, items.len())?;
            for item in items {
                stream.write_f32::<LittleEndian>(*item)?;
            }
        }
        Values::Bool(items) => {
            write_array_len(stream, var_desc.size, items.len())?;
            for item in items {
                stream.write_u8(u8::from(*item))?;
            }
        }
        Values::String32(items) => {
            write_array_len(stream, var_desc.size, items.len())?;
            for item in items {
                let mut raw = [0u8; 32];
                for (slot, ch) in raw.iter_mut().zip(item.chars()) {
                    *slot = ch as u32 as u8;
                }
                stream.write_all(&raw)?;
            }
        }
        Values::Key(items) => {
            write_array_len(stream, var_desc.size, items.len())?;
            for item in items {
                item.stream_write(stream)?;
            }
        }
        Values::Creatable(items) => {
            write_array_len(stream, var_desc.size, items.len())?;
            for item in items {
                write_creatable(stream, item.as_deref())?;
            }
        }
        Values::Double(items) => {
            write_array_len(stream, var_desc.size, items.len())?;
            for item in items {
                stream.write_f64::<LittleEndian>(*item)?;
            }
        }
        Values::Time(items) => {
            write_array_len(stream, var_desc.size, items.len())?;
            for item in items {
                item.stream_write(stream)?;
            }
        }
        Values::Byte(items) => {
            write_array_len(stream, var_desc.size, items.len())?;
            for item in items {
                stream.write_i8(*item)?;
            }
        }
        Values::Short(items) => {
            write_array_len(stream, var_desc.size, items.len())?;
            for item in items {
                stream.write_i16::<LittleEndian>(*item)?;
            }
        }
        Values::AgeTimeOfDay => {
            // Computed from the age clock; nothing on the wire.
        }
        Values::Vector3(items) => {
            write_array_len(stream, var_desc.size, items.len())?;
            for item in items {
                item.stream_write(stream)?;
            }
        }
        Values::Quat(items) => {
            write_array_len(stream, var_desc.size, items.len())?;
            for item in items {
                item.stream_write(stream)?;
            }
        }
        Values::Rgb(items) => {
            write_array_len(stream, var_desc.size, items.len())?;
            for item in items {
                item.write_rgb(stream)?;
            }
        }
        Values::Rgba(items) => {
            write_array_len(stream, var_desc.size, items.len())?;
            for item in items {
                item.stream_write(stream)?;
            }
        }
        Values::Rgb8(items) => {
            write_array_len(stream, var_desc.size, items.len())?;
            for item in items {
                item.write_rgb(stream)?;
            }
        }
        Values::Rgba8(items) => {
            write_array_len(stream, var_desc.size, items.len())?;
            for item in items {
                item.stream_write(stream)?;
            }
        }
        Values::StateDesc(items) => {
            write_array_len(stream, var_desc.size, items.len())?;
            for item in items {
                item.write_to(db, stream)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdl::parser::parse_source;

    fn test_db() -> DescriptorDb {
        let mut db = DescriptorDb::new();
        let source = r#"
STATEDESC lever {
    VERSION 1
    VAR BOOL    pulled[1]   DEFAULT=false
    VAR INT     count[1]    DEFAULT=3
}

STATEDESC lever {
    VERSION 2
    VAR BOOL    pulled[1]   DEFAULT=false
    VAR INT     count[1]    DEFAULT=3
    VAR FLOAT   tension[1]  DEFAULT=0.25
}

STATEDESC machine {
    VERSION 1
    VAR $lever  levers[2]
    VAR SHORT   gear[1]     DEFAULT=8
}
"#;
        for descriptor in parse_source(source).unwrap() {
            db.insert(descriptor);
        }
        db
    }

    #[test]
    fn default_state_uses_descriptor_defaults() {
        let db = test_db();
        let descriptor = db.find("lever", 2).unwrap().clone();
        let state = State::from_defaults(&db, &descriptor).unwrap();
        assert_eq!(state.vars.len(), 3);
        assert_eq!(state.vars[1].values, Values::Int(vec![3]));
        assert_eq!(state.vars[2].values, Values::Float(vec![0.25]));
    }

    #[test]
    fn blob_roundtrip() {
        let db = test_db();
        let descriptor = db.find("lever", 2).unwrap().clone();
        let mut state = State::from_defaults(&db, &descriptor).unwrap();
        state.vars[0].values = Values::Bool(vec![true]);
        state.vars[1].values = Values::Int(vec![42]);

        let blob = state.to_blob(&db).unwrap();
        let back = State::from_blob(&db, &blob).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn blob_roundtrip_with_uoid_and_nesting() {
        let db = test_db();
        let descriptor = db.find("machine", 1).unwrap().clone();
        let mut state = State::from_defaults(&db, &descriptor).unwrap();
        state.object = Some(Uoid {
            name: "Machine01".to_string(),
            object_type: 1,
            id: 77,
            ..Default::default()
        });
        if let Values::StateDesc(children) = &mut state.vars[0].values {
            children[1].vars[1].values = Values::Int(vec![-9]);
        }

        let blob = state.to_blob(&db).unwrap();
        let back = State::from_blob(&db, &blob).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn upgrade_preserves_matching_values_and_defaults_new_ones() {
        let db = test_db();
        let old_desc = db.find("lever", 1).unwrap().clone();
        let mut state = State::from_defaults(&db, &old_desc).unwrap();
        state.vars[0].values = Values::Bool(vec![true]);
        state.vars[1].values = Values::Int(vec![99]);

        let blob = state.to_blob(&db).unwrap();
        // from_blob upgrades to the newest version automatically.
        let upgraded = State::from_blob(&db, &blob).unwrap();
        assert_eq!(upgraded.descriptor_version, 2);
        assert_eq!(upgraded.vars[0].values, Values::Bool(vec![true]));
        assert_eq!(upgraded.vars[1].values, Values::Int(vec![99]));
        // The new field comes in at its default.
        assert_eq!(upgraded.vars[2].values, Values::Float(vec![0.25]));
    }

    #[test]
    fn same_as_default_variables_take_no_payload() {
        let db = test_db();
        let descriptor = db.find("lever", 2).unwrap().clone();
        let mut state = State::from_defaults(&db, &descriptor).unwrap();
        for var in &mut state.vars {
            var.flags |= var_flags::SAME_AS_DEFAULT;
        }
        let blob = state.to_blob(&db).unwrap();
        let back = State::from_blob(&db, &blob).unwrap();
        assert_eq!(back.vars[1].values, Values::Int(vec![3]));
    }

    #[test]
    fn corrupt_blob_is_rejected() {
        let db = test_db();
        assert!(State::from_blob(&db, &[0x00]).is_err());
        // Unknown descriptor name
        let mut blob = Vec::new();
        blob.extend_from_slice(&0u16.to_le_bytes());
        blob.extend_from_slice(&4u16.to_le_bytes());
        blob.extend_from_slice(b"nope");
        blob.extend_from_slice(&1u16.to_le_bytes());
        blob.push(6);
        blob.push(0);
        assert!(State::from_blob(&db, &blob).is_err());
    }
}
