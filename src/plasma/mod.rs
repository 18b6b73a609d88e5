//! The client object model: wire streams, object identity, and the closed
//! registry of streamable message types.

pub mod factory;
pub mod key;
pub mod messages;
pub mod net_messages;
pub mod streams;
