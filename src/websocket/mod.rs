mod handler;
mod message;

pub use handler::{handle_client_message, ws_handler};
pub use message::{ClientMessage, OutboundMessage, ServerMessage};
