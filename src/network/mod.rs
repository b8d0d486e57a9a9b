pub mod backoff;
pub mod channel;
pub mod client;
pub mod history;
pub mod supervisor;

pub use backoff::Backoff;
pub use channel::{ChannelState, LiveChannel};
pub use client::{ChatClient, ClientSettings};
pub use history::HistoryFetcher;
pub use supervisor::{ChannelSupervisor, Reconnected};
