//! Matchmaking and WebRTC signaling relay for two-party video discussions

pub mod signaling;
