use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::messages::ServerMessage;
use super::pool::{EnqueueOutcome, WaitingPool};
use super::registry::ConnectionRegistry;
use super::rooms::{Departure, ROOM_CAPACITY, RoomJoin, RoomRegistry};
use super::types::{ConnId, Identity, OutboundMessage, RoomId, SignalingError};

/// Commands sent to the coordinator actor
pub(crate) enum Command {
    Register {
        tx: mpsc::UnboundedSender<OutboundMessage>,
        reply: oneshot::Sender<ConnId>,
    },
    JoinQueue {
        conn: ConnId,
        identity: Identity,
    },
    JoinRoom {
        conn: ConnId,
        room_id: RoomId,
        reply: oneshot::Sender<Result<usize, SignalingError>>,
    },
    ForwardOffer {
        from: ConnId,
        to: ConnId,
        payload: Value,
    },
    ForwardAnswer {
        from: ConnId,
        to: ConnId,
        payload: Value,
    },
    IdentityOf {
        conn: ConnId,
        reply: oneshot::Sender<Option<Identity>>,
    },
    MembersOf {
        room_id: RoomId,
        reply: oneshot::Sender<Vec<ConnId>>,
    },
    Deregister {
        conn: ConnId,
    },
}

/// All matchmaking and room state, owned by the actor task.
///
/// Commands are handled synchronously, one at a time, so no two pairing or
/// membership mutations can interleave.
pub(crate) struct Coordinator {
    registry: ConnectionRegistry,
    pool: WaitingPool,
    rooms: RoomRegistry,
}

impl Coordinator {
    pub(crate) fn new() -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            pool: WaitingPool::new(),
            rooms: RoomRegistry::new(),
        }
    }

    pub(crate) fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Register { tx, reply } => {
                let conn = self.registry.register(tx);
                info!("Connection opened: {} ({} live)", conn, self.registry.len());
                let _ = reply.send(conn);
            }

            Command::JoinQueue { conn, identity } => self.join_queue(conn, identity),

            Command::JoinRoom {
                conn,
                room_id,
                reply,
            } => {
                let _ = reply.send(self.join_room(conn, room_id));
            }

            Command::ForwardOffer { from, to, payload } => {
                let message = ServerMessage::IncomingCall {
                    signal: payload,
                    from,
                };
                if let Err(err) = self.registry.send(&to, message.encode()) {
                    warn!("Dropping offer from {}: {}", from, err);
                }
            }

            Command::ForwardAnswer { from, to, payload } => {
                // the caller learns of a vanished peer only through silence
                let message = ServerMessage::CallAccepted { signal: payload };
                if let Err(err) = self.registry.send(&to, message.encode()) {
                    warn!("Dropping answer from {}: {}", from, err);
                }
            }

            Command::IdentityOf { conn, reply } => {
                let _ = reply.send(self.registry.identity_of(&conn).cloned());
            }

            Command::MembersOf { room_id, reply } => {
                let _ = reply.send(self.rooms.members_of(&room_id).to_vec());
            }

            Command::Deregister { conn } => self.deregister(conn),
        }
    }

    fn join_queue(&mut self, conn: ConnId, identity: Identity) {
        match self.pool.enqueue(conn, identity.clone()) {
            EnqueueOutcome::Accepted => {
                // an absorbed repeat keeps the claim the pool already
                // holds, so the registry is only updated on acceptance
                self.registry.record_identity(&conn, identity);
                info!("{} joined the queue (size: {})", conn, self.pool.len());
                self.pair_waiting();
            }
            EnqueueOutcome::AlreadyWaiting => {
                debug!("{} already holds a queue slot, ignoring", conn);
            }
        }
    }

    /// Pair the two oldest waiting entries until fewer than two remain.
    fn pair_waiting(&mut self) {
        while self.pool.len() >= 2 {
            let Some(first) = self.pool.dequeue_oldest() else {
                break;
            };
            let Some(second) = self.pool.dequeue_oldest() else {
                self.pool.requeue_front(first);
                break;
            };

            // A dropped connection whose deregister is still queued behind
            // this command must not be handed to a live partner.
            if !self.registry.is_live(&first.conn) {
                debug!("Discarding dead pool entry {}", first.conn);
                self.pool.requeue_front(second);
                continue;
            }
            if !self.registry.is_live(&second.conn) {
                debug!("Discarding dead pool entry {}", second.conn);
                self.pool.requeue_front(first);
                continue;
            }

            let room_id = RoomId::generate();
            self.rooms.create(room_id, first.conn, second.conn);

            let for_first = ServerMessage::MatchFound {
                room_id,
                opponent: second.identity.clone(),
            };
            if self.registry.send(&first.conn, for_first.encode()).is_err() {
                // closed in the instant since the liveness check
                self.rooms.discard(&room_id);
                self.pool.requeue_front(second);
                continue;
            }
            let for_second = ServerMessage::MatchFound {
                room_id,
                opponent: first.identity.clone(),
            };
            if self.registry.send(&second.conn, for_second.encode()).is_err() {
                self.rooms.discard(&room_id);
                self.pool.requeue_front(first);
                continue;
            }

            info!(
                "Match created: {} pairs {} with {}",
                room_id, first.conn, second.conn
            );
        }
    }

    fn join_room(&mut self, conn: ConnId, room_id: RoomId) -> Result<usize, SignalingError> {
        let join = match self.rooms.join(room_id, conn) {
            Ok(join) => join,
            Err(err) => {
                warn!("{} rejected from room {}: {}", conn, room_id, err);
                return Err(err);
            }
        };
        match join {
            RoomJoin::Entered { members, peer } => {
                info!(
                    "{} joined room {} ({}/{})",
                    conn, room_id, members, ROOM_CAPACITY
                );
                if let Some(peer) = peer {
                    let joined = ServerMessage::UserJoined {
                        connection_id: conn,
                    };
                    if let Err(err) = self.registry.send(&peer, joined.encode()) {
                        warn!("Could not announce {} to {}: {}", conn, peer, err);
                    }
                }
                Ok(members)
            }
            RoomJoin::AlreadyMember { members } => {
                debug!("{} re-joined room {}, ignoring", conn, room_id);
                Ok(members)
            }
        }
    }

    /// Teardown on connection loss: pool slot, room memberships, registry
    /// entry, in that order so the id resolves throughout.
    fn deregister(&mut self, conn: ConnId) {
        self.pool.remove(&conn);

        for (room_id, departure) in self.rooms.remove_conn(&conn) {
            info!("{} left room {}", conn, room_id);
            match departure {
                Departure::PeerRemains(peer) => {
                    let message = ServerMessage::PeerLeft {
                        connection_id: conn,
                    };
                    let _ = self.registry.send(&peer, message.encode());
                }
                Departure::Emptied => {
                    info!("Room {} removed (empty)", room_id);
                }
                Departure::NotAMember => {}
            }
        }

        if let Some(connection) = self.registry.unregister(&conn) {
            info!(
                "Connection closed: {} after {:?} ({} live)",
                conn,
                connection.opened_at.elapsed(),
                self.registry.len()
            );
        }
    }
}

pub(crate) async fn coordinator_actor(mut rx: mpsc::Receiver<Command>) {
    let mut coordinator = Coordinator::new();
    while let Some(cmd) = rx.recv().await {
        coordinator.handle(cmd);
    }
}

/// Handle to communicate with the coordinator actor
#[derive(Clone)]
pub struct CoordinatorHandle {
    pub(crate) tx: mpsc::Sender<Command>,
}

impl CoordinatorHandle {
    /// Admit a new connection and obtain its id
    pub async fn register(
        &self,
        tx: mpsc::UnboundedSender<OutboundMessage>,
    ) -> Result<ConnId, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .tx
            .send(Command::Register {
                tx,
                reply: reply_tx,
            })
            .await;
        reply_rx
            .await
            .map_err(|_| SignalingError::Internal("actor channel closed".to_string()))
    }

    /// Enter the waiting pool under the given identity
    pub async fn join_queue(&self, conn: ConnId, identity: Identity) {
        let _ = self.tx.send(Command::JoinQueue { conn, identity }).await;
    }

    /// Join (or create) a signaling room, returning its member count
    pub async fn join_room(&self, conn: ConnId, room_id: RoomId) -> Result<usize, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .tx
            .send(Command::JoinRoom {
                conn,
                room_id,
                reply: reply_tx,
            })
            .await;
        reply_rx
            .await
            .map_err(|_| SignalingError::Internal("actor channel closed".to_string()))?
    }

    /// Relay an offer payload to another connection
    pub async fn forward_offer(&self, from: ConnId, to: ConnId, payload: Value) {
        let _ = self
            .tx
            .send(Command::ForwardOffer { from, to, payload })
            .await;
    }

    /// Relay an answer payload back to the caller
    pub async fn forward_answer(&self, from: ConnId, to: ConnId, payload: Value) {
        let _ = self
            .tx
            .send(Command::ForwardAnswer { from, to, payload })
            .await;
    }

    /// Identity a connection claimed when joining the queue, if any
    pub async fn identity_of(&self, conn: ConnId) -> Result<Option<Identity>, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .tx
            .send(Command::IdentityOf {
                conn,
                reply: reply_tx,
            })
            .await;
        reply_rx
            .await
            .map_err(|_| SignalingError::Internal("actor channel closed".to_string()))
    }

    /// Current members of a room, oldest first
    pub async fn members_of(&self, room_id: RoomId) -> Result<Vec<ConnId>, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .tx
            .send(Command::MembersOf {
                room_id,
                reply: reply_tx,
            })
            .await;
        reply_rx
            .await
            .map_err(|_| SignalingError::Internal("actor channel closed".to_string()))
    }

    /// Tear down a connection that has closed
    pub async fn deregister(&self, conn: ConnId) {
        let _ = self.tx.send(Command::Deregister { conn }).await;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc::error::TryRecvError;

    use super::*;

    struct TestClient {
        conn: ConnId,
        rx: mpsc::UnboundedReceiver<OutboundMessage>,
    }

    impl TestClient {
        fn next_message(&mut self) -> ServerMessage {
            let outbound = self.rx.try_recv().expect("a message should be waiting");
            serde_json::from_str(outbound.into_inner().as_str())
                .expect("outbound frames should be valid server JSON")
        }

        fn assert_silent(&mut self) {
            assert!(matches!(self.rx.try_recv(), Err(TryRecvError::Empty)));
        }
    }

    fn connect(coordinator: &mut Coordinator) -> TestClient {
        let (tx, rx) = mpsc::unbounded_channel();
        let (reply_tx, mut reply_rx) = oneshot::channel();
        coordinator.handle(Command::Register { tx, reply: reply_tx });
        let conn = reply_rx.try_recv().expect("register replies synchronously");
        TestClient { conn, rx }
    }

    /// Drop the client's receiving end, simulating a connection that died
    /// before its deregister was processed.
    fn kill(client: TestClient) -> ConnId {
        client.conn
    }

    fn identity(name: &str, email: Option<&str>) -> Identity {
        Identity {
            username: name.to_string(),
            email: email.map(str::to_string),
        }
    }

    fn enqueue(coordinator: &mut Coordinator, conn: ConnId, name: &str, email: Option<&str>) {
        coordinator.handle(Command::JoinQueue {
            conn,
            identity: identity(name, email),
        });
    }

    fn join_room(
        coordinator: &mut Coordinator,
        conn: ConnId,
        room_id: RoomId,
    ) -> Result<usize, SignalingError> {
        let (reply_tx, mut reply_rx) = oneshot::channel();
        coordinator.handle(Command::JoinRoom {
            conn,
            room_id,
            reply: reply_tx,
        });
        reply_rx.try_recv().expect("join replies synchronously")
    }

    fn expect_match(client: &mut TestClient) -> (RoomId, Identity) {
        match client.next_message() {
            ServerMessage::MatchFound { room_id, opponent } => (room_id, opponent),
            other => panic!("expected match_found, got {other:?}"),
        }
    }

    #[test]
    fn register_mints_distinct_ids() {
        let mut coordinator = Coordinator::new();
        let a = connect(&mut coordinator);
        let b = connect(&mut coordinator);

        assert_ne!(a.conn, b.conn);
        assert!(a.conn.as_str().starts_with("conn_"));
    }

    #[test]
    fn two_queued_users_are_matched_into_one_room() {
        let mut coordinator = Coordinator::new();
        let mut a = connect(&mut coordinator);
        let mut b = connect(&mut coordinator);

        enqueue(&mut coordinator, a.conn, "ana", Some("a@x.com"));
        a.assert_silent();

        enqueue(&mut coordinator, b.conn, "bo", Some("b@x.com"));

        let (room_a, opponent_a) = expect_match(&mut a);
        let (room_b, opponent_b) = expect_match(&mut b);

        assert_eq!(room_a, room_b);
        assert_eq!(opponent_a.email.as_deref(), Some("b@x.com"));
        assert_eq!(opponent_b.email.as_deref(), Some("a@x.com"));
        a.assert_silent();
        b.assert_silent();

        assert_eq!(coordinator.pool.len(), 0);
        assert_eq!(coordinator.rooms.members_of(&room_a), &[a.conn, b.conn]);
    }

    #[test]
    fn matching_is_fifo() {
        let mut coordinator = Coordinator::new();
        let mut a = connect(&mut coordinator);
        let mut b = connect(&mut coordinator);
        let mut c = connect(&mut coordinator);
        let mut d = connect(&mut coordinator);

        enqueue(&mut coordinator, a.conn, "a", Some("a@x.com"));
        enqueue(&mut coordinator, b.conn, "b", Some("b@x.com"));
        enqueue(&mut coordinator, c.conn, "c", Some("c@x.com"));
        enqueue(&mut coordinator, d.conn, "d", Some("d@x.com"));

        let (room_a, opponent_a) = expect_match(&mut a);
        let (room_b, _) = expect_match(&mut b);
        let (room_c, opponent_c) = expect_match(&mut c);
        let (room_d, _) = expect_match(&mut d);

        assert_eq!(room_a, room_b);
        assert_eq!(room_c, room_d);
        assert_ne!(room_a, room_c);
        assert_eq!(opponent_a.username, "b");
        assert_eq!(opponent_c.username, "d");
    }

    #[test]
    fn repeat_join_queue_is_absorbed() {
        let mut coordinator = Coordinator::new();
        let mut a = connect(&mut coordinator);

        enqueue(&mut coordinator, a.conn, "ana", Some("a@x.com"));
        enqueue(&mut coordinator, a.conn, "ana", Some("a@x.com"));
        assert_eq!(coordinator.pool.len(), 1);

        let mut b = connect(&mut coordinator);
        enqueue(&mut coordinator, b.conn, "bo", Some("b@x.com"));

        expect_match(&mut a);
        a.assert_silent();
        expect_match(&mut b);
    }

    #[test]
    fn absorbed_repeat_claim_does_not_rewrite_identity() {
        let mut coordinator = Coordinator::new();
        let mut a = connect(&mut coordinator);

        enqueue(&mut coordinator, a.conn, "ana", Some("a@x.com"));
        // a second click after editing the profile form; the queued
        // claim stands
        enqueue(&mut coordinator, a.conn, "ana_prime", Some("a@x.com"));
        assert_eq!(coordinator.pool.len(), 1);

        let (reply_tx, mut reply_rx) = oneshot::channel();
        coordinator.handle(Command::IdentityOf {
            conn: a.conn,
            reply: reply_tx,
        });
        assert_eq!(
            reply_rx.try_recv().unwrap(),
            Some(identity("ana", Some("a@x.com")))
        );

        let mut b = connect(&mut coordinator);
        enqueue(&mut coordinator, b.conn, "bo", Some("b@x.com"));

        let (_, opponent_b) = expect_match(&mut b);
        assert_eq!(opponent_b.username, "ana");
        expect_match(&mut a);
    }

    #[test]
    fn one_identity_never_holds_two_slots() {
        let mut coordinator = Coordinator::new();
        let mut a = connect(&mut coordinator);
        let mut later = connect(&mut coordinator);

        enqueue(&mut coordinator, a.conn, "ana", Some("a@x.com"));
        // same user racing in over a second connection
        enqueue(&mut coordinator, later.conn, "ana", Some("a@x.com"));
        assert_eq!(coordinator.pool.len(), 1);
        later.assert_silent();

        let mut b = connect(&mut coordinator);
        enqueue(&mut coordinator, b.conn, "bo", Some("b@x.com"));

        expect_match(&mut a);
        let (_, opponent_b) = expect_match(&mut b);
        assert_eq!(opponent_b.email.as_deref(), Some("a@x.com"));
        later.assert_silent();
    }

    #[test]
    fn dead_partner_is_never_matched() {
        let mut coordinator = Coordinator::new();
        let a = connect(&mut coordinator);
        let mut b = connect(&mut coordinator);

        let a_conn = kill(a);
        enqueue(&mut coordinator, a_conn, "ana", Some("a@x.com"));
        enqueue(&mut coordinator, b.conn, "bo", Some("b@x.com"));

        // the dead entry is discarded, the survivor keeps waiting
        b.assert_silent();
        assert_eq!(coordinator.pool.len(), 1);
        assert_eq!(coordinator.rooms.room_count(), 0);

        let mut c = connect(&mut coordinator);
        enqueue(&mut coordinator, c.conn, "cy", Some("c@x.com"));

        let (_, opponent_b) = expect_match(&mut b);
        let (_, opponent_c) = expect_match(&mut c);
        assert_eq!(opponent_b.email.as_deref(), Some("c@x.com"));
        assert_eq!(opponent_c.email.as_deref(), Some("b@x.com"));
    }

    #[test]
    fn queued_disconnect_leaves_no_residue() {
        let mut coordinator = Coordinator::new();
        let a = connect(&mut coordinator);
        enqueue(&mut coordinator, a.conn, "ana", Some("a@x.com"));

        coordinator.handle(Command::Deregister { conn: a.conn });
        assert_eq!(coordinator.pool.len(), 0);

        let mut b = connect(&mut coordinator);
        let mut c = connect(&mut coordinator);
        enqueue(&mut coordinator, b.conn, "bo", Some("b@x.com"));
        enqueue(&mut coordinator, c.conn, "cy", Some("c@x.com"));

        let (_, opponent_b) = expect_match(&mut b);
        assert_eq!(opponent_b.email.as_deref(), Some("c@x.com"));
        let (_, opponent_c) = expect_match(&mut c);
        assert_eq!(opponent_c.email.as_deref(), Some("b@x.com"));
    }

    #[test]
    fn third_join_is_rejected_and_membership_unchanged() {
        let mut coordinator = Coordinator::new();
        let mut a = connect(&mut coordinator);
        let b = connect(&mut coordinator);
        let mut c = connect(&mut coordinator);
        let room_id = RoomId::from("R");

        assert_eq!(join_room(&mut coordinator, a.conn, room_id).unwrap(), 1);
        assert_eq!(join_room(&mut coordinator, b.conn, room_id).unwrap(), 2);

        let err = join_room(&mut coordinator, c.conn, room_id).unwrap_err();
        assert!(matches!(err, SignalingError::RoomFull(id) if id == room_id));
        assert_eq!(coordinator.rooms.members_of(&room_id), &[a.conn, b.conn]);

        // nobody is told about the failed join
        a.next_message(); // user_joined for b
        a.assert_silent();
        c.assert_silent();
    }

    #[test]
    fn rejoining_a_room_is_absorbed() {
        let mut coordinator = Coordinator::new();
        let mut a = connect(&mut coordinator);
        let room_id = RoomId::from("R");

        assert_eq!(join_room(&mut coordinator, a.conn, room_id).unwrap(), 1);
        assert_eq!(join_room(&mut coordinator, a.conn, room_id).unwrap(), 1);
        assert_eq!(coordinator.rooms.members_of(&room_id), &[a.conn]);
        a.assert_silent();
    }

    #[test]
    fn room_handshake_relays_offer_and_answer() {
        let mut coordinator = Coordinator::new();
        let mut s1 = connect(&mut coordinator);
        let mut s2 = connect(&mut coordinator);
        let room_id = RoomId::from("R");

        assert_eq!(join_room(&mut coordinator, s1.conn, room_id).unwrap(), 1);
        s1.assert_silent();
        assert_eq!(join_room(&mut coordinator, s2.conn, room_id).unwrap(), 2);

        match s1.next_message() {
            ServerMessage::UserJoined { connection_id } => assert_eq!(connection_id, s2.conn),
            other => panic!("expected user_joined, got {other:?}"),
        }
        s2.assert_silent();

        let offer = json!({"type": "offer", "sdp": "X"});
        coordinator.handle(Command::ForwardOffer {
            from: s1.conn,
            to: s2.conn,
            payload: offer.clone(),
        });
        match s2.next_message() {
            ServerMessage::IncomingCall { signal, from } => {
                assert_eq!(signal, offer);
                assert_eq!(from, s1.conn);
            }
            other => panic!("expected incoming_call, got {other:?}"),
        }

        let answer = json!({"type": "answer", "sdp": "Y"});
        coordinator.handle(Command::ForwardAnswer {
            from: s2.conn,
            to: s1.conn,
            payload: answer.clone(),
        });
        match s1.next_message() {
            ServerMessage::CallAccepted { signal } => assert_eq!(signal, answer),
            other => panic!("expected call_accepted, got {other:?}"),
        }
    }

    #[test]
    fn relay_preserves_per_sender_order() {
        let mut coordinator = Coordinator::new();
        let s1 = connect(&mut coordinator);
        let mut s2 = connect(&mut coordinator);

        for seq in 1..=3 {
            coordinator.handle(Command::ForwardOffer {
                from: s1.conn,
                to: s2.conn,
                payload: json!({ "seq": seq }),
            });
        }

        for seq in 1..=3 {
            match s2.next_message() {
                ServerMessage::IncomingCall { signal, .. } => {
                    assert_eq!(signal, json!({ "seq": seq }));
                }
                other => panic!("expected incoming_call, got {other:?}"),
            }
        }
    }

    #[test]
    fn offer_to_a_stranger_is_dropped() {
        let mut coordinator = Coordinator::new();
        let mut s1 = connect(&mut coordinator);

        coordinator.handle(Command::ForwardOffer {
            from: s1.conn,
            to: ConnId::from("conn_ffffffffffffffff"),
            payload: json!({"sdp": "X"}),
        });
        s1.assert_silent();
    }

    #[test]
    fn answer_to_a_vanished_peer_fails_silently() {
        let mut coordinator = Coordinator::new();
        let mut s1 = connect(&mut coordinator);
        let s2 = connect(&mut coordinator);
        let room_id = RoomId::from("R");
        join_room(&mut coordinator, s1.conn, room_id).unwrap();
        join_room(&mut coordinator, s2.conn, room_id).unwrap();
        s1.next_message(); // user_joined

        coordinator.handle(Command::Deregister { conn: s2.conn });
        s1.next_message(); // peer_left

        coordinator.handle(Command::ForwardAnswer {
            from: s1.conn,
            to: s2.conn,
            payload: json!({"sdp": "Y"}),
        });
        s1.assert_silent();
    }

    #[test]
    fn survivor_is_told_its_peer_left() {
        let mut coordinator = Coordinator::new();
        let mut s1 = connect(&mut coordinator);
        let s2 = connect(&mut coordinator);
        let room_id = RoomId::from("R");
        join_room(&mut coordinator, s1.conn, room_id).unwrap();
        join_room(&mut coordinator, s2.conn, room_id).unwrap();
        s1.next_message(); // user_joined

        coordinator.handle(Command::Deregister { conn: s2.conn });

        match s1.next_message() {
            ServerMessage::PeerLeft { connection_id } => assert_eq!(connection_id, s2.conn),
            other => panic!("expected peer_left, got {other:?}"),
        }
        assert_eq!(coordinator.rooms.members_of(&room_id), &[s1.conn]);

        coordinator.handle(Command::Deregister { conn: s1.conn });
        assert_eq!(coordinator.rooms.room_count(), 0);
    }

    #[test]
    fn disconnect_clears_every_trace() {
        let mut coordinator = Coordinator::new();
        let a = connect(&mut coordinator);
        let room_id = RoomId::from("R");

        enqueue(&mut coordinator, a.conn, "ana", Some("a@x.com"));
        join_room(&mut coordinator, a.conn, room_id).unwrap();

        coordinator.handle(Command::Deregister { conn: a.conn });

        assert_eq!(coordinator.pool.len(), 0);
        assert_eq!(coordinator.rooms.room_count(), 0);
        assert_eq!(coordinator.registry.len(), 0);
        assert!(!coordinator.registry.is_live(&a.conn));
    }

    #[test]
    fn identity_query_reflects_the_queue_claim() {
        let mut coordinator = Coordinator::new();
        let a = connect(&mut coordinator);

        let (reply_tx, mut reply_rx) = oneshot::channel();
        coordinator.handle(Command::IdentityOf {
            conn: a.conn,
            reply: reply_tx,
        });
        assert_eq!(reply_rx.try_recv().unwrap(), None);

        enqueue(&mut coordinator, a.conn, "ana", Some("a@x.com"));

        let (reply_tx, mut reply_rx) = oneshot::channel();
        coordinator.handle(Command::IdentityOf {
            conn: a.conn,
            reply: reply_tx,
        });
        assert_eq!(
            reply_rx.try_recv().unwrap(),
            Some(identity("ana", Some("a@x.com")))
        );
    }

    #[test]
    fn members_of_an_unknown_room_is_empty() {
        let mut coordinator = Coordinator::new();
        let (reply_tx, mut reply_rx) = oneshot::channel();
        coordinator.handle(Command::MembersOf {
            room_id: RoomId::from("nope"),
            reply: reply_tx,
        });
        assert!(reply_rx.try_recv().unwrap().is_empty());
    }

    #[tokio::test]
    async fn handle_round_trips_through_the_actor() {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(coordinator_actor(rx));
        let handle = CoordinatorHandle { tx };

        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        let conn = handle.register(out_tx).await.unwrap();
        let room_id = RoomId::from("R");

        assert_eq!(handle.join_room(conn, room_id).await.unwrap(), 1);
        assert_eq!(handle.members_of(room_id).await.unwrap(), vec![conn]);
        assert_eq!(handle.identity_of(conn).await.unwrap(), None);

        handle.deregister(conn).await;
        assert!(handle.members_of(room_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn handle_reports_a_dead_actor() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = CoordinatorHandle { tx };

        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        let err = handle.register(out_tx).await.unwrap_err();
        assert!(matches!(err, SignalingError::Internal(_)));
    }
}
