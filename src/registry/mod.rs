mod connection;
mod rooms;

pub use connection::{ConnectionHandle, ConnectionRegistry, Phase, RegistryStats};
pub use rooms::{InvalidRoomKey, RoomIndex, RoomKey};
