use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{ConnId, Identity, OutboundMessage, RoomId};

/// Messages sent from client to server.
///
/// Field names follow the original wire surface (camelCase), so existing
/// clients keep working. Unknown fields are ignored, which lets the login
/// flow pass richer identity objects through `join_queue` untouched.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Enter the waiting pool under the claimed identity
    #[serde(rename = "join_queue")]
    JoinQueue {
        username: String,
        email: Option<String>,
    },

    /// Join (or create) a signaling room
    #[serde(rename = "join_room")]
    JoinRoom {
        #[serde(rename = "roomId")]
        room_id: String,
    },

    /// Ask the relay to forward an offer to another connection
    #[serde(rename = "call_user")]
    CallUser {
        #[serde(rename = "userToCall")]
        user_to_call: String,
        #[serde(rename = "signalData")]
        signal_data: Value,
        /// Client-claimed sender id; the relay stamps the registered id
        /// instead
        from: Option<String>,
    },

    /// Ask the relay to forward an answer back to the caller
    #[serde(rename = "answer_call")]
    AnswerCall { to: String, signal: Value },
}

/// Messages sent from server to client
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Pairing result: the shared room and the opposing party's identity
    #[serde(rename = "match_found")]
    MatchFound {
        #[serde(rename = "roomId")]
        room_id: RoomId,
        opponent: Identity,
    },

    /// The second party arrived in the room
    #[serde(rename = "user_joined")]
    UserJoined {
        #[serde(rename = "connectionId")]
        connection_id: ConnId,
    },

    /// An offer forwarded from `from`
    #[serde(rename = "incoming_call")]
    IncomingCall { signal: Value, from: ConnId },

    /// The answer to a previously forwarded offer
    #[serde(rename = "call_accepted")]
    CallAccepted { signal: Value },

    /// The other room member disconnected mid-session
    #[serde(rename = "peer_left")]
    PeerLeft {
        #[serde(rename = "connectionId")]
        connection_id: ConnId,
    },

    /// Error response
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerMessage {
    /// Serialize for a connection's outbound channel.
    pub(crate) fn encode(&self) -> OutboundMessage {
        let json = serde_json::to_string(self)
            .expect("ServerMessage serialization should never fail");
        OutboundMessage::from(json)
    }
}
