use std::sync::Arc;
use std::time::Duration;

use banter_core::{Core, ServerEvent};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{tungstenite::Message, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::commands::ClientCommand;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

/// Drives one WebSocket connection: authenticate handshake, command loop,
/// hub registration and teardown.
pub async fn handle_connection(
    ws_stream: WebSocketStream<TcpStream>,
    core: Arc<Core>,
    auth_timeout: Duration,
) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // The connection is anonymous until the authenticate command arrives.
    let user_id = match wait_for_authenticate(&mut ws_sender, &mut ws_receiver, &core, auth_timeout)
        .await
    {
        Some(id) => id,
        None => {
            debug!("connection closed without authenticating");
            return;
        }
    };

    let conn_id = Uuid::new_v4().to_string();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    core.hub.register(conn_id.clone(), tx);
    core.hub.bind_user(&user_id, &conn_id);
    info!("user {} connected as {}", user_id, conn_id);

    send_event(
        &mut ws_sender,
        &ServerEvent::Authenticated {
            user_id: user_id.clone(),
        },
    )
    .await;

    // Forward hub traffic to the socket until either side goes away.
    let mut send_task = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if ws_sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            res = ws_receiver.next() => {
                match res {
                    Some(Ok(Message::Text(text))) => {
                        handle_command(&text, &conn_id, &user_id, &core).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!("user {} sent close frame", user_id);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("socket error for {}: {}", user_id, e);
                        break;
                    }
                    None => break,
                }
            }
            _ = &mut send_task => {
                debug!("send task for {} finished", user_id);
                break;
            }
        }
    }

    send_task.abort();
    core.hub.disconnect(&conn_id);
    info!("user {} disconnected", user_id);
}

/// Handshake: only `authenticate` is accepted; anything else yields an error
/// event. The identity must exist in the tenant's user collection and not be
/// deleted. The deadline drops connections that never authenticate.
async fn wait_for_authenticate(
    ws_sender: &mut WsSink,
    ws_receiver: &mut WsSource,
    core: &Core,
    auth_timeout: Duration,
) -> Option<String> {
    let handshake = async {
        while let Some(result) = ws_receiver.next().await {
            let text = match result {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => {
                    warn!("socket error during handshake: {}", e);
                    return None;
                }
            };
            match serde_json::from_str::<ClientCommand>(&text) {
                Ok(ClientCommand::Authenticate { user_id, tenant_id }) => {
                    match core.store.get_user(&user_id).await {
                        Ok(Some(user)) if !user.deleted && user.tenant_id == tenant_id => {
                            return Some(user_id);
                        }
                        Ok(_) => {
                            warn!("authentication rejected for {}", user_id);
                            send_error(ws_sender, "authentication failed").await;
                            return None;
                        }
                        Err(e) => {
                            warn!("user lookup failed for {}: {}", user_id, e);
                            send_error(ws_sender, "authentication failed").await;
                            return None;
                        }
                    }
                }
                Ok(_) => {
                    send_error(ws_sender, "not authenticated").await;
                }
                Err(e) => {
                    debug!("unparsable handshake frame: {}", e);
                    send_error(ws_sender, "malformed command").await;
                }
            }
        }
        None
    };

    match tokio::time::timeout(auth_timeout, handshake).await {
        Ok(user_id) => user_id,
        Err(_) => {
            warn!("authentication deadline passed, dropping connection");
            None
        }
    }
}

/// Dispatches one authenticated command. The user identity always comes from
/// the connection, never from the payload.
pub async fn handle_command(text: &str, conn_id: &str, user_id: &str, core: &Core) {
    let command: ClientCommand = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) => {
            debug!("unparsable command from {}: {}", user_id, e);
            core.hub.send_to_conn(
                conn_id,
                &ServerEvent::Error {
                    message: "malformed command".to_string(),
                },
            );
            return;
        }
    };

    match command {
        ClientCommand::Authenticate { .. } => {
            debug!("{} re-sent authenticate, ignoring", user_id);
        }
        ClientCommand::JoinChat { chat_id } => {
            match participant_check(core, &chat_id, user_id).await {
                Ok(()) => {
                    core.hub.join_room(&chat_id, conn_id);
                    debug!("{} joined room {}", user_id, chat_id);
                }
                Err(message) => core
                    .hub
                    .send_to_conn(conn_id, &ServerEvent::Error { message }),
            }
        }
        ClientCommand::LeaveChat { chat_id } => {
            core.hub.leave_room(&chat_id, conn_id);
            debug!("{} left room {}", user_id, chat_id);
        }
        ClientCommand::Typing { chat_id, is_typing } => {
            match participant_check(core, &chat_id, user_id).await {
                Ok(()) => core.hub.publish_to_room_except(
                    &chat_id,
                    conn_id,
                    &ServerEvent::Typing {
                        chat_id: chat_id.clone(),
                        user_id: user_id.to_string(),
                        is_typing,
                    },
                ),
                Err(message) => core
                    .hub
                    .send_to_conn(conn_id, &ServerEvent::Error { message }),
            }
        }
        ClientCommand::Ping => {
            core.hub.send_to_conn(
                conn_id,
                &ServerEvent::Pong {
                    timestamp: chrono::Utc::now().timestamp_millis(),
                },
            );
        }
    }
}

async fn participant_check(core: &Core, chat_id: &str, user_id: &str) -> Result<(), String> {
    match core.store.get_chat(chat_id).await {
        Ok(Some(chat)) if chat.is_participant(user_id) => Ok(()),
        Ok(Some(_)) => Err("not a participant of this chat".to_string()),
        Ok(None) => Err("chat not found".to_string()),
        Err(e) => {
            warn!("chat lookup failed for {}: {}", chat_id, e);
            Err("chat lookup failed".to_string())
        }
    }
}

async fn send_event(ws_sender: &mut WsSink, event: &ServerEvent) {
    match serde_json::to_string(event) {
        Ok(json) => {
            if let Err(e) = ws_sender.send(Message::Text(json.into())).await {
                warn!("direct send failed: {}", e);
            }
        }
        Err(e) => warn!("could not serialize event: {}", e),
    }
}

async fn send_error(ws_sender: &mut WsSink, message: &str) {
    send_event(
        ws_sender,
        &ServerEvent::Error {
            message: message.to_string(),
        },
    )
    .await;
}
