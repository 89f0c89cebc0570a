//! Transport adapters.

pub mod channel;

pub use channel::{channel_pair, ChannelPeer, ChannelTransport, SentFrame};
