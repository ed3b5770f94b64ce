use std::{net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use babeldesk::{
    AppState, Config,
    translate::{TranslateError, Translator},
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct FakeTranslator;

#[async_trait]
impl Translator for FakeTranslator {
    async fn detect_language(&self, _text: &str) -> Result<String, TranslateError> {
        Ok("pt".to_owned())
    }

    async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String, TranslateError> {
        Ok(format!("[{from}->{to}] {text}"))
    }
}

async fn spawn_server(config: Config) -> SocketAddr {
    let app = babeldesk::app(AppState::new(&config, Arc::new(FakeTranslator)));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn post(addr: SocketAddr, path: &str, token: Option<&str>, body: Value) -> reqwest::Response {
    let mut req = reqwest::Client::new()
        .post(format!("http://{addr}{path}"))
        .json(&body);
    if let Some(token) = token {
        req = req.bearer_auth(token);
    }
    req.send().await.unwrap()
}

async fn open_socket(addr: SocketAddr, token: &str, room_id: &str) -> Socket {
    let (socket, _) = connect_async(format!("ws://{addr}/ws?token={token}&room_id={room_id}"))
        .await
        .unwrap();
    socket
}

async fn next_json(socket: &mut Socket) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn assert_closed(socket: &mut Socket) {
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "socket stayed open");
}

async fn send(socket: &mut Socket, content: &str) {
    socket
        .send(Message::Text(json!({ "content": content }).to_string().into()))
        .await
        .unwrap();
}

struct Conversation {
    addr: SocketAddr,
    customer: String,
    agent: String,
    room_id: String,
}

async fn start_conversation(addr: SocketAddr) -> Conversation {
    let started: Value = post(addr, "/start-chat", None, json!({"name": "Ana", "content": "Olá"}))
        .await
        .json()
        .await
        .unwrap();
    let customer = started["token"].as_str().unwrap().to_owned();
    let room_id = started["room_id"].as_str().unwrap().to_owned();

    let profile: Value = post(addr, "/set-profile", None, json!({"name": "Bob", "language": "en"}))
        .await
        .json()
        .await
        .unwrap();
    let agent = profile["token"].as_str().unwrap().to_owned();

    Conversation {
        addr,
        customer,
        agent,
        room_id,
    }
}

#[tokio::test]
async fn customer_and_agent_talk_through_translation() {
    let addr = spawn_server(Config::default()).await;
    let chat = start_conversation(addr).await;

    let waiting: Value = reqwest::get(format!("http://{addr}/rooms"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(waiting[0]["room_id"], chat.room_id.as_str());
    assert_eq!(waiting[0]["customer_name"], "Ana");

    let joined = post(addr, "/join-room", Some(&chat.agent), json!({"room_id": chat.room_id})).await;
    assert_eq!(joined.status(), 200);
    let joined: Value = joined.json().await.unwrap();
    assert_eq!(joined["type"], "room_joined");

    // the opening message is waiting in history for the agent
    let mut agent = open_socket(chat.addr, &chat.agent, &chat.room_id).await;
    let replayed = next_json(&mut agent).await;
    assert_eq!(replayed["type"], "message");
    assert_eq!(replayed["from"], "Ana");
    assert_eq!(replayed["content"], "Olá");
    assert_eq!(replayed["translated_content"], "[pt->en] Olá");

    let mut customer = open_socket(chat.addr, &chat.customer, &chat.room_id).await;
    send(&mut customer, "Tudo bem?").await;
    let live = next_json(&mut agent).await;
    assert_eq!(live["content"], "Tudo bem?");
    assert_eq!(live["translated_content"], "[pt->en] Tudo bem?");

    send(&mut agent, "How can I help?").await;
    let reply = next_json(&mut customer).await;
    assert_eq!(reply["from"], "Bob");
    assert_eq!(reply["content"], "[en->pt] How can I help?");
    assert!(reply.get("translated_content").is_none());

    let ended: Value = post(addr, "/end-chat", Some(&chat.customer), json!({"room_id": chat.room_id}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(ended["reason"], "customer_left");
    let notice = next_json(&mut agent).await;
    assert_eq!(notice["type"], "chat_ended");
    assert_eq!(notice["reason"], "customer_left");
}

#[tokio::test]
async fn departed_agent_is_rejected() {
    let addr = spawn_server(Config::default()).await;
    let chat = start_conversation(addr).await;
    post(addr, "/join-room", Some(&chat.agent), json!({"room_id": chat.room_id})).await;

    let mut agent = open_socket(addr, &chat.agent, &chat.room_id).await;
    next_json(&mut agent).await;

    let ended: Value = post(addr, "/end-chat", Some(&chat.agent), json!({"room_id": chat.room_id}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(ended["reason"], "agent_left");

    send(&mut agent, "one more thing").await;
    let err = next_json(&mut agent).await;
    assert_eq!(err, json!({"type": "error", "message": "you are not in this room"}));
    assert_closed(&mut agent).await;
}

#[tokio::test]
async fn closed_room_rejects_further_messages() {
    let addr = spawn_server(Config::default()).await;
    let chat = start_conversation(addr).await;
    post(addr, "/join-room", Some(&chat.agent), json!({"room_id": chat.room_id})).await;

    let mut agent = open_socket(addr, &chat.agent, &chat.room_id).await;
    next_json(&mut agent).await;
    let mut customer = open_socket(addr, &chat.customer, &chat.room_id).await;
    send(&mut customer, "are you there?").await;
    assert_eq!(next_json(&mut agent).await["content"], "are you there?");

    let ended = post(addr, "/end-chat", Some(&chat.customer), json!({"room_id": chat.room_id})).await;
    assert_eq!(ended.status(), 200);

    send(&mut customer, "wait, one more thing").await;
    let err = next_json(&mut customer).await;
    assert_eq!(err, json!({"type": "error", "message": "room is closed"}));
    assert_closed(&mut customer).await;

    let health: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["rooms"], 0);
}

#[tokio::test]
async fn rate_limited_messages_are_dropped() {
    let config = Config {
        rate_limit: 1,
        ..Config::default()
    };
    let addr = spawn_server(config).await;
    let chat = start_conversation(addr).await;
    post(addr, "/join-room", Some(&chat.agent), json!({"room_id": chat.room_id})).await;
    let mut agent = open_socket(addr, &chat.agent, &chat.room_id).await;
    next_json(&mut agent).await;

    let mut customer = open_socket(addr, &chat.customer, &chat.room_id).await;
    send(&mut customer, "first").await;
    send(&mut customer, "second").await;

    assert_eq!(next_json(&mut agent).await["content"], "first");
    let rejected = next_json(&mut customer).await;
    assert_eq!(rejected, json!({"type": "error", "message": "rate limit exceeded"}));
}

#[tokio::test]
async fn setup_endpoints_validate_callers() {
    let addr = spawn_server(Config::default()).await;
    let chat = start_conversation(addr).await;

    let missing = post(addr, "/start-chat", None, json!({"name": "", "content": "hi"})).await;
    assert_eq!(missing.status(), 400);

    let anonymous = post(addr, "/join-room", None, json!({"room_id": chat.room_id})).await;
    assert_eq!(anonymous.status(), 401);

    let unknown = post(addr, "/join-room", Some(&chat.agent), json!({"room_id": "room_nope"})).await;
    assert_eq!(unknown.status(), 404);

    post(addr, "/join-room", Some(&chat.agent), json!({"room_id": chat.room_id})).await;
    let second = start_conversation(addr).await;
    let busy = post(addr, "/join-room", Some(&chat.agent), json!({"room_id": second.room_id})).await;
    assert_eq!(busy.status(), 409);

    let stranger = post(addr, "/end-chat", Some(&second.agent), json!({"room_id": chat.room_id})).await;
    assert_eq!(stranger.status(), 403);

    let outsider = connect_async(format!(
        "ws://{addr}/ws?token={}&room_id={}",
        second.agent, chat.room_id
    ))
    .await;
    assert!(outsider.is_err());

    let health: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["rooms"], 2);
}
