pub mod common;
pub mod config;
pub mod error;
pub mod network;
pub mod room;
pub mod ui;

pub use common::{ChatCommand, ChatEvent, ChatMessage, Room, Session};
pub use error::{ChannelError, ConfigError, FetchError};
pub use network::{ChannelState, ChatClient, HistoryFetcher, LiveChannel};
pub use room::{MessageReconciler, RoomView};
