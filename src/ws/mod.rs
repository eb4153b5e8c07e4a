pub mod handlers;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::{ConnId, PartyId, PlayerId};

/// Per-connection session: the server-generated connection handle plus
/// the player/party binding established by create/join/reconnect.
pub struct ConnSession {
    pub conn_id: ConnId,
    pub player_id: Option<PlayerId>,
    pub party_id: Option<PartyId>,
}

impl ConnSession {
    pub fn new(conn_id: impl Into<ConnId>) -> Self {
        Self {
            conn_id: conn_id.into(),
            player_id: None,
            party_id: None,
        }
    }

    pub fn bind(&mut self, player_id: PlayerId, party_id: PartyId) {
        self.player_id = Some(player_id);
        self.party_id = Some(party_id);
    }

    pub fn unbind(&mut self) {
        self.player_id = None;
        self.party_id = None;
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut session = ConnSession::new(ulid::Ulid::new().to_string());

    tracing::info!(conn_id = %session.conn_id, "WebSocket connected");

    // Party broadcast subscription, re-created whenever the session's
    // party binding changes.
    let mut subscription: Option<tokio::sync::broadcast::Receiver<ServerMessage>> = None;
    let mut subscribed_party: Option<PartyId> = None;

    loop {
        tokio::select! {
            // Party-scoped broadcasts (only once bound to a party)
            broadcast_msg = async {
                match &mut subscription {
                    Some(rx) => rx.recv().await.ok(),
                    None => {
                        // Unbound: wait forever
                        std::future::pending::<Option<ServerMessage>>().await
                    }
                }
            } => {
                if let Some(msg) = broadcast_msg {
                    // A kick aimed at this session ends its party binding.
                    let kicked_self = matches!(
                        &msg,
                        ServerMessage::PlayerKicked { player_id }
                            if session.player_id.as_ref() == Some(player_id)
                    );

                    if let Ok(json) = serde_json::to_string(&msg) {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }

                    if kicked_self {
                        session.unbind();
                        subscription = None;
                        subscribed_party = None;
                    }
                }
            }

            // Client messages
            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!(conn_id = %session.conn_id, "received: {}", text);

                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                if let Some(response) =
                                    handlers::handle_message(client_msg, &mut session, &state).await
                                {
                                    if let Ok(json) = serde_json::to_string(&response) {
                                        if sender.send(Message::Text(json.into())).await.is_err() {
                                            break;
                                        }
                                    }
                                }

                                // Follow the session's party binding.
                                if session.party_id != subscribed_party {
                                    subscribed_party = session.party_id.clone();
                                    subscription = match &subscribed_party {
                                        Some(party_id) => {
                                            Some(state.broadcaster.subscribe(party_id).await)
                                        }
                                        None => None,
                                    };
                                }
                            }
                            Err(e) => {
                                tracing::error!("Failed to parse client message: {}", e);
                                let error = ServerMessage::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    msg: format!("Invalid message format: {}", e),
                                };
                                if let Ok(json) = serde_json::to_string(&error) {
                                    let _ = sender.send(Message::Text(json.into())).await;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!(conn_id = %session.conn_id, "WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    // Dropping the socket only marks the player inactive; their record
    // survives for a later reconnect.
    if session.player_id.is_some() {
        if let Some(code) = state.handle_disconnect(&session.conn_id).await {
            if let Ok(party) = state.party_snapshot(&code).await {
                let party_id = party.id.clone();
                state
                    .broadcaster
                    .publish(&party_id, ServerMessage::PartyState { party })
                    .await;
            }
        }
    }

    tracing::info!(conn_id = %session.conn_id, "WebSocket connection ended");
}
