//! State Description Language: descriptor schemas, the `.sdl` parser, and
//! state blob (de)serialization with version upgrade.

pub mod descriptor;
pub mod parser;
pub mod state;

pub use descriptor::{DescriptorDb, StateDescriptor, VarDescriptor, VarType};
pub use parser::{load_descriptors, SdlError};
pub use state::{State, Values, Variable};
