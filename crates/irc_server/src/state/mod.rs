pub mod channel;
pub mod client;
pub mod store;

pub use channel::{ChannelEvent, ChannelModes, ChannelRecord};
pub use client::{ClientId, ClientRecord, RegistrationPhase, SubscriptionControl, canonicalize_nick};
pub use store::{ServerState, WhowasEntry};
