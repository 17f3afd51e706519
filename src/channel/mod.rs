//! Automation-server channel: message set and websocket client.

mod client;
pub mod protocol;

pub use client::{ChannelStatus, ChannelUpdate, ServerChannel};
pub use protocol::{ClientMessage, ServerEvent};
