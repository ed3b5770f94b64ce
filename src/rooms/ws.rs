//! Per-connection message pump.
//!
//! One task reads the socket and applies rate limiting, lifecycle effects and
//! translation; a second task drains the connection's outbound channels into
//! the socket, replayed history first and live frames after it. Messages from
//! one sender are handled strictly in arrival order.

use std::{ops::ControlFlow, sync::Arc, time::Duration};

use axum::{
    debug_handler,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    AppResult,
    appresult::AppError,
    hub::{HistoryEntry, Hub, HubError, Participant, Role},
    msg::{ChatMessage, ClientMessage, ServerMessage},
    ratelimit::RateLimiter,
    translate::TranslationService,
};

const WRITER_DRAIN: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
pub(crate) struct ConnectQuery {
    token: Option<String>,
    room_id: Option<String>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn connect(
    Query(ConnectQuery { token, room_id }): Query<ConnectQuery>,
    State(hub): State<Arc<Hub>>,
    State(translator): State<Arc<TranslationService>>,
    State(limiter): State<Arc<RateLimiter>>,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let token = token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("token required".into()))?;
    let room_id = room_id
        .filter(|r| !r.is_empty())
        .ok_or_else(|| AppError::BadRequest("room_id required".into()))?;

    let role = hub.authorize(&token, &room_id)?;
    let name = hub
        .get_participant(&token)
        .map(|p| p.name)
        .unwrap_or_default();

    let session = Session {
        hub,
        translator,
        limiter,
        token,
        name,
        room_id,
        role,
    };
    Ok(ws.on_upgrade(move |socket| session.run(socket)).into_response())
}

struct Session {
    hub: Arc<Hub>,
    translator: Arc<TranslationService>,
    limiter: Arc<RateLimiter>,
    token: String,
    name: String,
    room_id: String,
    role: Role,
}

impl Session {
    async fn run(self, socket: WebSocket) {
        let (mut sink, mut stream) = socket.split();
        let (tx, mut live) = mpsc::unbounded_channel::<ServerMessage>();
        let (history_tx, mut history) = mpsc::unbounded_channel::<ServerMessage>();

        let attachment = match self.hub.attach(&self.token, &self.room_id, tx.clone()) {
            Ok(attachment) => attachment,
            Err(e) => {
                warn!(client = %self.name, error = %e, "connection dropped before attach");
                return;
            }
        };
        let connection = attachment.connection;
        info!(client = %self.name, room = %self.room_id, role = ?self.role, "websocket connected");

        let name = self.name.clone();
        let mut writer = tokio::spawn(async move {
            // live frames queue until the backlog is written
            if write_frames(&mut sink, &mut history, &name).await {
                write_frames(&mut sink, &mut live, &name).await;
            }
            let _ = sink.close().await;
        });

        replay_history(
            &self.hub,
            &self.translator,
            &self.room_id,
            &self.token,
            &attachment.backlog,
            &history_tx,
        )
        .await;
        drop(history_tx);

        while let Some(frame) = stream.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    info!(client = %self.name, error = %e, "client disconnected");
                    break;
                }
            };
            let decoded = match frame {
                Message::Text(text) => serde_json::from_str::<ClientMessage>(text.as_str()),
                Message::Binary(data) => serde_json::from_slice::<ClientMessage>(&data),
                Message::Close(_) => {
                    info!(client = %self.name, "client disconnected");
                    break;
                }
                Message::Ping(_) | Message::Pong(_) => continue,
            };
            let inbound = match decoded {
                Ok(inbound) => inbound,
                Err(e) => {
                    warn!(client = %self.name, error = %e, "invalid json");
                    continue;
                }
            };
            if self.handle(&tx, inbound.content).await.is_break() {
                break;
            }
        }

        self.hub.detach(&self.token, connection);
        drop(tx);
        if tokio::time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
            writer.abort();
        }
        debug!(client = %self.name, room = %self.room_id, "websocket closed");
    }

    async fn handle(
        &self,
        tx: &mpsc::UnboundedSender<ServerMessage>,
        content: String,
    ) -> ControlFlow<()> {
        debug!(client = %self.name, room = %self.room_id, "message received");

        if !self.limiter.allow(&self.token) {
            warn!(client = %self.name, "rate limit exceeded");
            let _ = tx.send(ServerMessage::error("rate limit exceeded"));
            return ControlFlow::Continue(());
        }

        let dispatch = match self.hub.record_message(&self.room_id, &self.token, &content) {
            Ok(dispatch) => dispatch,
            Err(e) => {
                info!(client = %self.name, room = %self.room_id, error = %e, "message rejected");
                let message = match e {
                    HubError::NotAMember => e.to_string(),
                    _ => "room is closed".to_owned(),
                };
                let _ = tx.send(ServerMessage::error(message));
                return ControlFlow::Break(());
            }
        };

        let Some(recipient) = dispatch.recipient else {
            info!(room = %self.room_id, reason = "recipient not connected", "message recorded");
            return ControlFlow::Continue(());
        };

        let chat = prepare_message(
            &self.hub,
            &self.translator,
            &dispatch.room_id,
            &dispatch.sender,
            &recipient,
            &content,
        )
        .await;
        if !self.hub.deliver(&recipient.token, ServerMessage::Message(chat)) {
            warn!(recipient = %recipient.name, "failed to send message");
        }
        ControlFlow::Continue(())
    }
}

/// Drains `rx` into the socket. Returns false once the socket stops accepting frames.
async fn write_frames(
    sink: &mut SplitSink<WebSocket, Message>,
    rx: &mut mpsc::UnboundedReceiver<ServerMessage>,
    client: &str,
) -> bool {
    while let Some(msg) = rx.recv().await {
        let text = match serde_json::to_string(&msg) {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "failed to encode frame");
                continue;
            }
        };
        if let Err(e) = sink.send(Message::Text(text.into())).await {
            warn!(client = %client, error = %e, "failed to write frame");
            return false;
        }
    }
    true
}

/// Builds the frame `recipient` sees for `content` written by `sender`.
///
/// An unknown customer language is detected and stored first. When both
/// languages are known and differ, a customer recipient reads the translation
/// in place of the original while an agent recipient gets both. Backend
/// failures fall back to the original text.
pub(crate) async fn prepare_message(
    hub: &Hub,
    translator: &TranslationService,
    room_id: &str,
    sender: &Participant,
    recipient: &Participant,
    content: &str,
) -> ChatMessage {
    let mut msg = ChatMessage {
        room_id: room_id.to_owned(),
        from: sender.name.clone(),
        content: content.to_owned(),
        translated_content: None,
    };

    let mut source = sender.language.clone();
    if sender.role == Role::Customer && source.is_empty() {
        match translator.detect_language(content).await {
            Ok(code) => {
                hub.set_language(&sender.token, &code);
                info!(client = %sender.name, language = %code, "detected language");
                source = code;
            }
            Err(e) => {
                error!(error = %e, "failed to detect language");
                return msg;
            }
        }
    }

    let target = recipient.language.as_str();
    if source.is_empty() || target.is_empty() || source == target {
        return msg;
    }

    match translator.translate(content, &source, target).await {
        Ok(translated) => match recipient.role {
            Role::Customer => msg.content = translated,
            Role::Agent => msg.translated_content = Some(translated),
        },
        Err(e) => error!(error = %e, "translation failed"),
    }
    msg
}

/// Sends `backlog` to `viewer`, each entry translated from its own sender's
/// language into the viewer's.
pub(crate) async fn replay_history(
    hub: &Hub,
    translator: &TranslationService,
    room_id: &str,
    viewer: &str,
    backlog: &[HistoryEntry],
    tx: &mpsc::UnboundedSender<ServerMessage>,
) {
    for entry in backlog {
        // re-read per entry: detection during replay updates the sender's language
        let Some(recipient) = hub.get_participant(viewer) else {
            return;
        };
        let chat = if entry.sender == viewer {
            ChatMessage {
                room_id: room_id.to_owned(),
                from: entry.sender_name.clone(),
                content: entry.content.clone(),
                translated_content: None,
            }
        } else {
            let sender = hub
                .get_participant(&entry.sender)
                .unwrap_or_else(|| departed(entry));
            prepare_message(hub, translator, room_id, &sender, &recipient, &entry.content).await
        };

        if tx.send(ServerMessage::Message(chat)).is_err() {
            warn!(room = %room_id, "failed to deliver history");
            return;
        }
    }
}

/// Stand-in for a sender no longer registered; carries no language so nothing is translated.
fn departed(entry: &HistoryEntry) -> Participant {
    Participant {
        token: entry.sender.clone(),
        name: entry.sender_name.clone(),
        language: String::new(),
        role: entry.sender_role,
        connection: None,
    }
}
