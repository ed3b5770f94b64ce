use tokio::sync::mpsc;

use crate::msg::ServerMessage;

pub type Token = String;
pub type ConnectionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Customer,
    Agent,
}

/// Handle to a live WebSocket; frames are drained by the connection's writer task.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl Connection {
    pub fn new(id: ConnectionId, tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self { id, tx }
    }

    /// Returns false once the writer side is gone.
    pub fn send(&self, msg: ServerMessage) -> bool {
        self.tx.send(msg).is_ok()
    }
}

#[derive(Debug, Clone)]
pub struct Participant {
    pub token: Token,
    pub name: String,
    /// Empty until known.
    pub language: String,
    pub role: Role,
    pub(crate) connection: Option<Connection>,
}

impl Participant {
    pub fn customer(name: impl Into<String>) -> Self {
        Self::new(name.into(), String::new(), Role::Customer)
    }

    pub fn agent(name: impl Into<String>, language: impl Into<String>) -> Self {
        Self::new(name.into(), language.into(), Role::Agent)
    }

    fn new(name: String, language: String, role: Role) -> Self {
        Self {
            token: generate_token(),
            name,
            language,
            role,
            connection: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }
}

/// 128 random bits, hex encoded.
pub fn generate_token() -> String {
    let bytes: [u8; 16] = rand::random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique_hex() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn customer_starts_without_language() {
        let customer = Participant::customer("Ana");
        assert!(customer.language.is_empty());
        assert_eq!(customer.role, Role::Customer);
        assert!(!customer.is_connected());

        let agent = Participant::agent("Bob", "en");
        assert_eq!(agent.language, "en");
        assert_ne!(customer.token, agent.token);
    }
}
