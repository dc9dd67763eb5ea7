//! Configuration module.

pub mod schema;

pub use schema::{
    ChannelBounds, ChannelSettings, Configuration, DEFAULT_CHANNEL_NAME,
    DEFAULT_HANDSHAKE_TIMEOUT, HANDSHAKE_BOUNDS, MAX_HANDSHAKE_TIMEOUT, MAX_HOSTNAME_LEN,
    RELAY_BOUNDS,
};
