//! WebSocket matchmaking and WebRTC signaling relay

mod actor;
mod messages;
mod pool;
mod registry;
mod rooms;
mod server;
mod types;

pub use actor::CoordinatorHandle;
pub use messages::{ClientMessage, ServerMessage};
pub use pool::{EnqueueOutcome, WaitingEntry, WaitingPool};
pub use server::{DEFAULT_PORT, SignalServer};
pub use types::{ConnId, Identity, OutboundMessage, RoomId, SignalingError};
