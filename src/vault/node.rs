//! The sparse, bit-masked vault node record.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use uuid::Uuid;

use crate::errors::{NetError, NetResult};
use crate::plasma::streams::{read_exact, read_vault_string, write_vault_string};
use crate::types::{read_uuid, write_uuid};
use crate::vault::{NodeType, StandardNode};

pub const FIELD_NODE_ID: u64 = 1 << 0;
pub const FIELD_CREATE_TIME: u64 = 1 << 1;
pub const FIELD_MODIFY_TIME: u64 = 1 << 2;
pub const FIELD_CREATE_AGE_NAME: u64 = 1 << 3;
pub const FIELD_CREATE_AGE_UUID: u64 = 1 << 4;
pub const FIELD_CREATOR_UUID: u64 = 1 << 5;
pub const FIELD_CREATOR_ID: u64 = 1 << 6;
pub const FIELD_NODE_TYPE: u64 = 1 << 7;
pub const FIELD_INT32_1: u64 = 1 << 8;
pub const FIELD_INT32_2: u64 = 1 << 9;
pub const FIELD_INT32_3: u64 = 1 << 10;
pub const FIELD_INT32_4: u64 = 1 << 11;
pub const FIELD_UINT32_1: u64 = 1 << 12;
pub const FIELD_UINT32_2: u64 = 1 << 13;
pub const FIELD_UINT32_3: u64 = 1 << 14;
pub const FIELD_UINT32_4: u64 = 1 << 15;
pub const FIELD_UUID_1: u64 = 1 << 16;
pub const FIELD_UUID_2: u64 = 1 << 17;
pub const FIELD_UUID_3: u64 = 1 << 18;
pub const FIELD_UUID_4: u64 = 1 << 19;
pub const FIELD_STRING64_1: u64 = 1 << 20;
pub const FIELD_STRING64_2: u64 = 1 << 21;
pub const FIELD_STRING64_3: u64 = 1 << 22;
pub const FIELD_STRING64_4: u64 = 1 << 23;
pub const FIELD_STRING64_5: u64 = 1 << 24;
pub const FIELD_STRING64_6: u64 = 1 << 25;
pub const FIELD_ISTRING64_1: u64 = 1 << 26;
pub const FIELD_ISTRING64_2: u64 = 1 << 27;
pub const FIELD_TEXT_1: u64 = 1 << 28;
pub const FIELD_TEXT_2: u64 = 1 << 29;
pub const FIELD_BLOB_1: u64 = 1 << 30;
pub const FIELD_BLOB_2: u64 = 1 << 31;

/// A vault record. A field is present iff its bit is set in the mask; blob
/// encoding emits exactly the present fields in mask-bit order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VaultNode {
    fields: u64,

    node_id: u32,
    create_time: u32,
    modify_time: u32,
    create_age_name: String,
    create_age_uuid: Uuid,
    creator_uuid: Uuid,
    creator_id: u32,
    node_type: i32,
    int32_1: i32,
    int32_2: i32,
    int32_3: i32,
    int32_4: i32,
    uint32_1: u32,
    uint32_2: u32,
    uint32_3: u32,
    uint32_4: u32,
    uuid_1: Uuid,
    uuid_2: Uuid,
    uuid_3: Uuid,
    uuid_4: Uuid,
    string64_1: String,
    string64_2: String,
    string64_3: String,
    string64_4: String,
    string64_5: String,
    string64_6: String,
    istring64_1: String,
    istring64_2: String,
    text_1: String,
    text_2: String,
    blob_1: Vec<u8>,
    blob_2: Vec<u8>,
}

macro_rules! node_field {
    ($get:ident, $has:ident, $set:ident, $mask:ident, copy $value_type:ty) => {
        pub fn $get(&self) -> $value_type {
            self.$get
        }
        pub fn $has(&self) -> bool {
            (self.fields & $mask) != 0
        }
        pub fn $set(&mut self, value: $value_type) {
            self.fields |= $mask;
            self.$get = value;
        }
    };
    ($get:ident, $has:ident, $set:ident, $mask:ident, str) => {
        pub fn $get(&self) -> &str {
            &self.$get
        }
        pub fn $has(&self) -> bool {
            (self.fields & $mask) != 0
        }
        pub fn $set(&mut self, value: &str) {
            self.fields |= $mask;
            self.$get = value.to_string();
        }
    };
    ($get:ident, $has:ident, $set:ident, $mask:ident, bytes) => {
        pub fn $get(&self) -> &[u8] {
            &self.$get
        }
        pub fn $has(&self) -> bool {
            (self.fields & $mask) != 0
        }
        pub fn $set(&mut self, value: &[u8]) {
            self.fields |= $mask;
            self.$get = value.to_vec();
        }
    };
}

impl VaultNode {
    node_field!(node_id, has_node_id, set_node_id, FIELD_NODE_ID, copy u32);
    node_field!(create_time, has_create_time, set_create_time, FIELD_CREATE_TIME, copy u32);
    node_field!(modify_time, has_modify_time, set_modify_time, FIELD_MODIFY_TIME, copy u32);
    node_field!(create_age_name, has_create_age_name, set_create_age_name, FIELD_CREATE_AGE_NAME, str);
    node_field!(create_age_uuid, has_create_age_uuid, set_create_age_uuid, FIELD_CREATE_AGE_UUID, copy Uuid);
    node_field!(creator_uuid, has_creator_uuid, set_creator_uuid, FIELD_CREATOR_UUID, copy Uuid);
    node_field!(creator_id, has_creator_id, set_creator_id, FIELD_CREATOR_ID, copy u32);
    node_field!(node_type, has_node_type, set_node_type, FIELD_NODE_TYPE, copy i32);
    node_field!(int32_1, has_int32_1, set_int32_1, FIELD_INT32_1, copy i32);
    node_field!(int32_2, has_int32_2, set_int32_2, FIELD_INT32_2, copy i32);
    node_field!(int32_3, has_int32_3, set_int32_3, FIELD_INT32_3, copy i32);
    node_field!(int32_4, has_int32_4, set_int32_4, FIELD_INT32_4, copy i32);
    node_field!(uint32_1, has_uint32_1, set_uint32_1, FIELD_UINT32_1, copy u32);
    node_field!(uint32_2, has_uint32_2, set_uint32_2, FIELD_UINT32_2, copy u32);
    node_field!(uint32_3, has_uint32_3, set_uint32_3, FIELD_UINT32_3, copy u32);
    node_field!(uint32_4, has_uint32_4, set_uint32_4, FIELD_UINT32_4, copy u32);
    node_field!(uuid_1, has_uuid_1, set_uuid_1, FIELD_UUID_1, copy Uuid);
    node_field!(uuid_2, has_uuid_2, set_uuid_2, FIELD_UUID_2, copy Uuid);
    node_field!(uuid_3, has_uuid_3, set_uuid_3, FIELD_UUID_3, copy Uuid);
    node_field!(uuid_4, has_uuid_4, set_uuid_4, FIELD_UUID_4, copy Uuid);
    node_field!(string64_1, has_string64_1, set_string64_1, FIELD_STRING64_1, str);
    node_field!(string64_2, has_string64_2, set_string64_2, FIELD_STRING64_2, str);
    node_field!(string64_3, has_string64_3, set_string64_3, FIELD_STRING64_3, str);
    node_field!(string64_4, has_string64_4, set_string64_4, FIELD_STRING64_4, str);
    node_field!(string64_5, has_string64_5, set_string64_5, FIELD_STRING64_5, str);
    node_field!(string64_6, has_string64_6, set_string64_6, FIELD_STRING64_6, str);
    node_field!(istring64_1, has_istring64_1, set_istring64_1, FIELD_ISTRING64_1, str);
    node_field!(istring64_2, has_istring64_2, set_istring64_2, FIELD_ISTRING64_2, str);
    node_field!(text_1, has_text_1, set_text_1, FIELD_TEXT_1, str);
    node_field!(text_2, has_text_2, set_text_2, FIELD_TEXT_2, str);
    node_field!(blob_1, has_blob_1, set_blob_1, FIELD_BLOB_1, bytes);
    node_field!(blob_2, has_blob_2, set_blob_2, FIELD_BLOB_2, bytes);

    pub fn is_empty(&self) -> bool {
        self.fields == 0
    }

    pub fn field_mask(&self) -> u64 {
        self.fields
    }

    pub fn from_blob(blob: &[u8]) -> NetResult<Self> {
        let mut cursor = Cursor::new(blob);
        Self::read_from(&mut cursor)
    }

    pub fn to_blob(&self) -> NetResult<Vec<u8>> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(buffer)
    }

    pub fn read_from<R: Read>(stream: &mut R) -> NetResult<Self> {
        let fields = stream.read_u64::<LittleEndian>()?;
        if fields & !(FIELD_BLOB_2 | (FIELD_BLOB_2 - 1)) != 0 {
            return Err(NetError::Malformed("unknown vault node field bits"));
        }
        let mut node = Self {
            fields,
            ..Default::default()
        };
        if fields & FIELD_NODE_ID != 0 {
            node.node_id = stream.read_u32::<LittleEndian>()?;
        }
        if fields & FIELD_CREATE_TIME != 0 {
            node.create_time = stream.read_u32::<LittleEndian>()?;
        }
        if fields & FIELD_MODIFY_TIME != 0 {
            node.modify_time = stream.read_u32::<LittleEndian>()?;
        }
        if fields & FIELD_CREATE_AGE_NAME != 0 {
            node.create_age_name = read_vault_string(stream)?;
        }
        if fields & FIELD_CREATE_AGE_UUID != 0 {
            node.create_age_uuid = read_uuid(stream)?;
        }
        if fields & FIELD_CREATOR_UUID != 0 {
            node.creator_uuid = read_uuid(stream)?;
        }
        if fields & FIELD_CREATOR_ID != 0 {
            node.creator_id = stream.read_u32::<LittleEndian>()?;
        }
        if fields & FIELD_NODE_TYPE != 0 {
            node.node_type = stream.read_i32::<LittleEndian>()?;
        }
        if fields & FIELD_INT32_1 != 0 {
            node.int32_1 = stream.read_i32::<LittleEndian>()?;
        }
        if fields & FIELD_INT32_2 != 0 {
            node.int32_2 = stream.read_i32::<LittleEndian>()?;
        }
        if fields & FIELD_INT32_3 != 0 {
            node.int32_3 = stream.read_i32::<LittleEndian>()?;
        }
        if fields & FIELD_INT32_4 != 0 {
            node.int32_4 = stream.read_i32::<LittleEndian>()?;
        }
        if fields & FIELD_UINT32_1 != 0 {
            node.uint32_1 = stream.read_u32::<LittleEndian>()?;
        }
        if fields & FIELD_UINT32_2 != 0 {
            node.uint32_2 = stream.read_u32::<LittleEndian>()?;
        }
        if fields & FIELD_UINT32_3 != 0 {
            node.uint32_3 = stream.read_u32::<LittleEndian>()?;
        }
        if fields & FIELD_UINT32_4 != 0 {
            node.uint32_4 = stream.read_u32::<LittleEndian>()?;
        }
        if fields & FIELD_UUID_1 != 0 {
            node.uuid_1 = read_uuid(stream)?;
        }
        if fields & FIELD_UUID_2 != 0 {
            node.uuid_2 = read_uuid(stream)?;
        }
        if fields & FIELD_UUID_3 != 0 {
            node.uuid_3 = read_uuid(stream)?;
        }
        if fields & FIELD_UUID_4 != 0 {
            node.uuid_4 = read_uuid(stream)?;
        }
        if fields & FIELD_STRING64_1 != 0 {
            node.string64_1 = read_vault_string(stream)?;
        }
        if fields & FIELD_STRING64_2 != 0 {
            node.string64_2 = read_vault_string(stream)?;
        }
        if fields & FIELD_STRING64_3 != 0 {
            node.string64_3 = read_vault_string(stream)?;
        }
        if fields & FIELD_STRING64_4 != 0 {
            node.string64_4 = read_vault_string(stream)?;
        }
        if fields & FIELD_STRING64_5 != 0 {
            node.string64_5 = read_vault_string(stream)?;
        }
        if fields & FIELD_STRING64_6 != 0 {
            node.string64_6 = read_vault_string(stream)?;
        }
        if fields & FIELD_ISTRING64_1 != 0 {
            node.istring64_1 = read_vault_string(stream)?;
        }
        if fields & FIELD_ISTRING64_2 != 0 {
            node.istring64_2 = read_vault_string(stream)?;
        }
        if fields & FIELD_TEXT_1 != 0 {
            node.text_1 = read_vault_string(stream)?;
        }
        if fields & FIELD_TEXT_2 != 0 {
            node.text_2 = read_vault_string(stream)?;
        }
        if fields & FIELD_BLOB_1 != 0 {
            let size = stream.read_u32::<LittleEndian>()? as usize;
            node.blob_1 = read_exact(stream, size)?;
        }
        if fields & FIELD_BLOB_2 != 0 {
            let size = stream.read_u32::<LittleEndian>()? as usize;
            node.blob_2 = read_exact(stream, size)?;
        }
        Ok(node)
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> NetResult<()> {
        stream.write_u64::<LittleEndian>(self.fields)?;
        if self.fields & FIELD_NODE_ID != 0 {
            stream.write_u32::<LittleEndian>(self.node_id)?;
        }
        if self.fields & FIELD_CREATE_TIME != 0 {
            stream.write_u32::<LittleEndian>(self.create_time)?;
        }
        if self.fields & FIELD_MODIFY_TIME != 0 {
            stream.write_u32::<LittleEndian>(self.modify_time)?;
        }
        if self.fields & FIELD_CREATE_AGE_NAME != 0 {
            write_vault_string(stream, &self.create_age_name)?;
        }
        if self.fields & FIELD_CREATE_AGE_UUID != 0 {
            write_uuid(stream, &self.create_age_uuid)?;
        }
        if self.fields & FIELD_CREATOR_UUID != 0 {
            write_uuid(stream, &self.creator_uuid)?;
        }
        if self.fields & FIELD_CREATOR_ID != 0 {
            stream.write_u32::<LittleEndian>(self.creator_id)?;
        }
        if self.fields & FIELD_NODE_TYPE != 0 {
            stream.write_i32::<LittleEndian>(self.node_type)?;
        }
        if self.fields & FIELD_INT32_1 != 0 {
            stream.write_i32::<LittleEndian>(self.int32_1)?;
        }
        if self.fields & FIELD_INT32_2 != 0 {
            stream.write_i32::<LittleEndian>(self.int32_2)?;
        }
        if self.fields & FIELD_INT32_3 != 0 {
            stream.write_i32::<LittleEndian>(self.int32_3)?;
        }
        if self.fields & FIELD_INT32_4 != 0 {
            stream.write_i32::<LittleEndian>(self.int32_4)?;
        }
        if self.fields & FIELD_UINT32_1 != 0 {
            stream.write_u32::<LittleEndian>(self.uint32_1)?;
        }
        if self.fields & FIELD_UINT32_2 != 0 {
            stream.write_u32::<LittleEndian>(self.uint32_2)?;
        }
        if self.fields & FIELD_UINT32_3 != 0 {
            stream.write_u32::<LittleEndian>(self.uint32_3)?;
        }
        if self.fields & FIELD_UINT32_4 != 0 {
            stream.write_u32::<LittleEndian>(self.uint32_4)?;
        }
        if self.fields & FIELD_UUID_1 != 0 {
            write_uuid(stream, &self.uuid_1)?;
        }
        if self.fields & FIELD_UUID_2 != 0 {
            write_uuid(stream, &self.uuid_2)?;
        }
        if self.fields & FIELD_UUID_3 != 0 {
            write_uuid(stream, &self.uuid_3)?;
        }
        if self.fields & FIELD_UUID_4 != 0 {
            write_uuid(stream, &self.uuid_4)?;
        }
        if self.fields & FIELD_STRING64_1 != 0 {
            write_vault_string(stream, &self.string64_1)?;
        }
        if self.fields & FIELD_STRING64_2 != 0 {
            write_vault_string(stream, &self.string64_2)?;
        }
        if self.fields & FIELD_STRING64_3 != 0 {
            write_vault_string(stream, &self.string64_3)?;
        }
        if self.fields & FIELD_STRING64_4 != 0 {
            write_vault_string(stream, &self.string64_4)?;
        }
        if self.fields & FIELD_STRING64_5 != 0 {
            write_vault_string(stream, &self.string64_5)?;
        }
        if self.fields & FIELD_STRING64_6 != 0 {
            write_vault_string(stream, &self.string64_6)?;
        }
        if self.fields & FIELD_ISTRING64_1 != 0 {
            write_vault_string(stream, &self.istring64_1)?;
        }
        if self.fields & FIELD_ISTRING64_2 != 0 {
            write_vault_string(stream, &self.istring64_2)?;
        }
        if self.fields & FIELD_TEXT_1 != 0 {
            write_vault_string(stream, &self.text_1)?;
        }
        if self.fields & FIELD_TEXT_2 != 0 {
            write_vault_string(stream, &self.text_2)?;
        }
        if self.fields & FIELD_BLOB_1 != 0 {
            stream.write_u32::<LittleEndian>(self.blob_1.len() as u32)?;
            stream.write_all(&self.blob_1)?;
        }
        if self.fields & FIELD_BLOB_2 != 0 {
            stream.write_u32::<LittleEndian>(self.blob_2.len() as u32)?;
            stream.write_all(&self.blob_2)?;
        }
        Ok(())
    }

    pub fn new_player(account_id: &Uuid, player_name: &str, avatar_shape: &str, explorer: i32) -> Self {
        let mut node = Self::default();
        node.set_node_type(NodeType::Player as i32);
        node.set_creator_uuid(*account_id);
        node.set_int32_2(explorer);
        node.set_uuid_1(*account_id);
        node.set_string64_1(avatar_shape);
        node.set_istring64_1(player_name);
        node
    }

    pub fn new_player_info(creator_uuid: &Uuid, player_id: u32, player_name: &str) -> Self {
        let mut node = Self::default();
        node.set_node_type(NodeType::PlayerInfo as i32);
        node.set_creator_uuid(*creator_uuid);
        node.set_creator_id(player_id);
        node.set_uint32_1(player_id);
        node.set_istring64_1(player_name);
        node
    }

    pub fn new_folder(creator_uuid: &Uuid, creator_id: u32, folder_type: StandardNode) -> Self {
        let mut node = Self::default();
        node.set_node_type(NodeType::Folder as i32);
        node.set_creator_uuid(*creator_uuid);
        node.set_creator_id(creator_id);
        node.set_int32_1(folder_type as i32);
        node
    }

    pub fn new_player_info_list(
        creator_uuid: &Uuid,
        creator_id: u32,
        folder_type: StandardNode,
    ) -> Self {
        let mut node = Self::default();
        node.set_node_type(NodeType::PlayerInfoList as i32);
        node.set_creator_uuid(*creator_uuid);
        node.set_creator_id(creator_id);
        node.set_int32_1(folder_type as i32);
        node
    }

    pub fn new_age_info_list(
        creator_uuid: &Uuid,
        creator_id: u32,
        folder_type: StandardNode,
    ) -> Self {
        let mut node = Self::default();
        node.set_node_type(NodeType::AgeInfoList as i32);
        node.set_creator_uuid(*creator_uuid);
        node.set_creator_id(creator_id);
        node.set_int32_1(folder_type as i32);
        node
    }

    pub fn new_age(instance_id: &Uuid, parent_uuid: &Uuid, age_filename: &str) -> Self {
        let mut node = Self::default();
        node.set_node_type(NodeType::Age as i32);
        node.set_creator_uuid(*instance_id);
        node.set_uuid_1(*instance_id);
        if !parent_uuid.is_nil() {
            node.set_uuid_2(*parent_uuid);
        }
        node.set_string64_1(age_filename);
        node
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new_age_info(
        instance_id: &Uuid,
        age_node_id: u32,
        seq_number: i32,
        public: bool,
        language: i32,
        parent_uuid: &Uuid,
        age_filename: &str,
        instance_name: &str,
        user_name: &str,
        description: &str,
    ) -> Self {
        let mut node = Self::default();
        node.set_node_type(NodeType::AgeInfo as i32);
        node.set_creator_uuid(*instance_id);
        node.set_creator_id(age_node_id);
        node.set_int32_1(seq_number);
        node.set_int32_2(i32::from(public));
        node.set_int32_3(language);
        node.set_uint32_1(age_node_id);
        node.set_uint32_2(0); // Czar ID
        node.set_uint32_3(0); // Flags
        node.set_uuid_1(*instance_id);
        if !parent_uuid.is_nil() {
            node.set_uuid_2(*parent_uuid);
        }
        node.set_string64_2(age_filename);
        if !instance_name.is_empty() {
            node.set_string64_3(instance_name);
        }
        if !user_name.is_empty() {
            node.set_string64_4(user_name);
        }
        if !description.is_empty() {
            node.set_text_1(description);
        }
        node
    }

    pub fn new_sdl(creator_uuid: &Uuid, creator_id: u32, sdl_name: &str, sdl_blob: &[u8]) -> Self {
        let mut node = Self::default();
        node.set_node_type(NodeType::Sdl as i32);
        node.set_creator_uuid(*creator_uuid);
        node.set_creator_id(creator_id);
        node.set_string64_1(sdl_name);
        node.set_blob_1(sdl_blob);
        node
    }

    pub fn new_system() -> Self {
        let mut node = Self::default();
        node.set_node_type(NodeType::System as i32);
        node
    }

    /// Lookup template matching any age instance with the given uuid.
    pub fn age_lookup(instance_id: &Uuid) -> Self {
        let mut node = Self::default();
        node.set_node_type(NodeType::Age as i32);
        node.set_uuid_1(*instance_id);
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_tracks_presence() {
        let mut node = VaultNode::default();
        assert!(node.is_empty());
        assert!(!node.has_int32_1());
        node.set_int32_1(-5);
        assert!(node.has_int32_1());
        assert_eq!(node.int32_1(), -5);
        assert_eq!(node.field_mask(), FIELD_INT32_1);
    }

    #[test]
    fn blob_roundtrip_preserves_present_fields_only() {
        let uuid = Uuid::parse_str("11111111-2222-3333-4444-555555555555").unwrap();
        let mut node = VaultNode::default();
        node.set_node_id(1001);
        node.set_node_type(NodeType::Player as i32);
        node.set_uuid_1(uuid);
        node.set_istring64_1("Atrus");
        node.set_blob_1(&[1, 2, 3, 4]);

        let blob = node.to_blob().unwrap();
        let back = VaultNode::from_blob(&blob).unwrap();
        assert_eq!(back, node);
        assert!(!back.has_string64_2());
        assert_eq!(back.istring64_1(), "Atrus");
        assert_eq!(back.blob_1(), &[1, 2, 3, 4]);
    }

    #[test]
    fn player_template_sets_expected_fields() {
        let uuid = Uuid::new_v4();
        let node = VaultNode::new_player(&uuid, "Catherine", "female", 1);
        assert_eq!(node.node_type(), NodeType::Player as i32);
        assert_eq!(node.creator_uuid(), uuid);
        assert_eq!(node.string64_1(), "female");
        assert_eq!(node.istring64_1(), "Catherine");
        assert!(!node.has_node_id());
    }

    #[test]
    fn unknown_field_bits_are_rejected() {
        let mut blob = Vec::new();
        blob.extend_from_slice(&(1u64 << 40).to_le_bytes());
        assert!(VaultNode::from_blob(&blob).is_err());
    }
}
