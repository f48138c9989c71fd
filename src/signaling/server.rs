use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tracing::{debug, error, info, warn};

use super::actor::{Command, CoordinatorHandle, coordinator_actor};
use super::messages::{ClientMessage, ServerMessage};
use super::types::{ConnId, Identity, OutboundMessage, RoomId, SignalingError};

pub const DEFAULT_PORT: u16 = 5000;
const PING_INTERVAL: Duration = Duration::from_secs(30);
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SignalServer {
    handle: CoordinatorHandle,
}

impl Default for SignalServer {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalServer {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel::<Command>(1024);
        tokio::spawn(coordinator_actor(rx));

        Self {
            handle: CoordinatorHandle { tx },
        }
    }

    pub async fn run(&self, addr: &str) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("Signaling server listening on {}", addr);

        loop {
            let (stream, addr) = listener.accept().await?;
            let handle = self.handle.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, handle).await {
                    error!("Connection error from {}: {}", addr, e);
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    handle: CoordinatorHandle,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel::<Message>();

    let conn = handle.register(tx.clone()).await?;
    info!("WebSocket connection from {} as {}", addr, conn);

    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    let mut waiting_for_pong = false;
    let mut pong_deadline: Option<tokio::time::Instant> = None;

    let send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(msg) = rx.recv() => {
                    let ws_msg = Message::Text(msg.into_inner());
                    if ws_tx.send(ws_msg).await.is_err() {
                        break;
                    }
                }
                Some(ctrl_msg) = ctrl_rx.recv() => {
                    if ws_tx.send(ctrl_msg).await.is_err() {
                        break;
                    }
                }
                else => break,
            }
        }
    });

    loop {
        let pong_timeout = async {
            match pong_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = ping_interval.tick() => {
                if waiting_for_pong {
                    warn!("No Pong received, disconnecting {}", addr);
                    break;
                }
                if ctrl_tx.send(Message::Ping(Bytes::new())).is_err() {
                    break;
                }
                waiting_for_pong = true;
                pong_deadline = Some(tokio::time::Instant::now() + PONG_TIMEOUT);
                debug!("Ping sent to {}", addr);
            }

            _ = pong_timeout => {
                warn!("Pong timeout, disconnecting {}", addr);
                break;
            }

            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => {
                        // a handler error means the coordinator is gone;
                        // drop the connection
                        if let Err(e) = handle_text_message(&text, conn, &tx, &handle).await {
                            warn!("Message handling error: {}", e);
                            break;
                        }
                    }
                    Message::Pong(_) => {
                        waiting_for_pong = false;
                        pong_deadline = None;
                        debug!("Pong received from {}", addr);
                    }
                    Message::Close(_) => {
                        info!("Close received from {}", addr);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    handle.deregister(conn).await;
    send_task.abort();
    info!("WebSocket disconnected: {}", addr);

    Ok(())
}

async fn handle_text_message(
    text: &str,
    conn: ConnId,
    tx: &mpsc::UnboundedSender<OutboundMessage>,
    handle: &CoordinatorHandle,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let client_msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            let err = ServerMessage::Error {
                message: format!("Invalid message: {}", e),
            };
            let _ = tx.send(err.encode());
            return Ok(());
        }
    };

    match client_msg {
        ClientMessage::JoinQueue { username, email } => {
            handle.join_queue(conn, Identity { username, email }).await;
        }

        ClientMessage::JoinRoom { room_id } => {
            let room_id = RoomId::from(room_id.as_str());
            match handle.join_room(conn, room_id).await {
                Ok(members) => {
                    debug!("{} entered room {} ({} inside)", conn, room_id, members);
                }
                Err(err @ SignalingError::RoomFull(_)) => {
                    let response = ServerMessage::Error {
                        message: err.to_string(),
                    };
                    let _ = tx.send(response.encode());
                }
                Err(err) => return Err(err.into()),
            }
        }

        ClientMessage::CallUser {
            user_to_call,
            signal_data,
            ..
        } => {
            // the claimed `from` field is ignored; the relay stamps the
            // registered sender id
            handle
                .forward_offer(conn, ConnId::from(user_to_call.as_str()), signal_data)
                .await;
        }

        ClientMessage::AnswerCall { to, signal } => {
            handle
                .forward_answer(conn, ConnId::from(to.as_str()), signal)
                .await;
        }
    }

    Ok(())
}
