pub mod commands;
pub mod events;
pub mod types;
pub mod wire;

pub use commands::ChatCommand;
pub use events::ChatEvent;
pub use types::{ChatMessage, MessageOrigin, Room, Session, WireMessage};
pub use wire::OutboundMessage;
