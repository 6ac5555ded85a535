pub mod channel_error;
pub mod client;
pub mod connection_state;
pub mod frame;
pub mod memory_broker;
pub mod transport;

pub use channel_error::ChannelError;
pub use client::{MessageHandler, RealtimeClient, ReconnectPolicy, Subscription};
pub use connection_state::ConnectionState;
pub use frame::{Command, Frame};
pub use memory_broker::MemoryBroker;
pub use transport::{Session, StompConfig, StompTransport, Transport};
