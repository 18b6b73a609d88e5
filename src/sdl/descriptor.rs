//! State descriptor schemas and the version database.

use std::collections::HashMap;

/// Variable value kinds understood by the state system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Int,
    Float,
    Bool,
    String32,
    Key,
    Creatable,
    Double,
    Time,
    Byte,
    Short,
    AgeTimeOfDay,
    Vector3,
    Point3,
    Quat,
    Rgb,
    Rgba,
    Rgb8,
    Rgba8,
    StateDesc,
}

impl VarType {
    /// Parse a type token from a descriptor file. `None` for unknown tokens.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "INT" => Some(Self::Int),
            "FLOAT" => Some(Self::Float),
            "BOOL" => Some(Self::Bool),
            "STRING32" => Some(Self::String32),
            "PLKEY" => Some(Self::Key),
            "CREATABLE" | "MESSAGE" => Some(Self::Creatable),
            "DOUBLE" => Some(Self::Double),
            "TIME" => Some(Self::Time),
            "BYTE" => Some(Self::Byte),
            "SHORT" => Some(Self::Short),
            "AGETIMEOFDAY" => Some(Self::AgeTimeOfDay),
            "VECTOR3" => Some(Self::Vector3),
            "POINT3" => Some(Self::Point3),
            "QUATERNION" | "QUAT" => Some(Self::Quat),
            "RGB" => Some(Self::Rgb),
            "RGBA" => Some(Self::Rgba),
            "RGB8" => Some(Self::Rgb8),
            "RGBA8" => Some(Self::Rgba8),
            _ => None,
        }
    }
}

/// One variable slot in a state descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDescriptor {
    pub var_type: VarType,
    /// Descriptor name for `StateDesc` variables.
    pub type_name: String,
    pub name: String,
    /// Fixed element count; 0 means variable length.
    pub size: usize,
    pub default: Option<String>,
    pub default_option: String,
    pub display_option: String,
}

/// A named, versioned schema.
#[derive(Debug, Clone, PartialEq)]
pub struct StateDescriptor {
    pub name: String,
    pub version: u16,
    pub vars: Vec<VarDescriptor>,
}

impl StateDescriptor {
    pub fn var_index(&self, name: &str) -> Option<usize> {
        self.vars
            .iter()
            .position(|var| var.name.eq_ignore_ascii_case(name))
    }
}

/// All descriptors known to the shard, keyed by name and version. Loaded once
/// at startup; every version of a schema may coexist.
#[derive(Debug, Default)]
pub struct DescriptorDb {
    descriptors: HashMap<String, HashMap<u16, StateDescriptor>>,
}

impl DescriptorDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, descriptor: StateDescriptor) {
        self.descriptors
            .entry(descriptor.name.to_ascii_lowercase())
            .or_default()
            .insert(descriptor.version, descriptor);
    }

    pub fn find(&self, name: &str, version: u16) -> Option<&StateDescriptor> {
        self.descriptors
            .get(&name.to_ascii_lowercase())
            .and_then(|versions| versions.get(&version))
    }

    pub fn find_latest(&self, name: &str) -> Option<&StateDescriptor> {
        self.descriptors
            .get(&name.to_ascii_lowercase())
            .and_then(|versions| versions.values().max_by_key(|desc| desc.version))
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn descriptor_count(&self) -> usize {
        self.descriptors.values().map(HashMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, version: u16) -> StateDescriptor {
        StateDescriptor {
            name: name.to_string(),
            version,
            vars: Vec::new(),
        }
    }

    #[test]
    fn find_is_exact_and_latest_is_highest() {
        let mut db = DescriptorDb::new();
        db.insert(descriptor("clock", 1));
        db.insert(descriptor("clock", 3));
        db.insert(descriptor("clock", 2));

        assert_eq!(db.find("clock", 2).unwrap().version, 2);
        assert!(db.find("clock", 4).is_none());
        assert_eq!(db.find_latest("Clock").unwrap().version, 3);
        assert!(db.find_latest("lever").is_none());
        assert_eq!(db.descriptor_count(), 3);
    }
}
