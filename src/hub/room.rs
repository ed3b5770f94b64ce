use tokio::{task::AbortHandle, time::Instant};

use super::participant::{Role, Token, generate_token};

pub type RoomId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    Waiting,
    Active,
    Closing,
    Closed,
}

/// One recorded message. The sender is stored as sent so replay never has to guess it.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub sender: Token,
    pub sender_name: String,
    pub sender_role: Role,
    pub content: String,
}

/// Pending closing -> closed transition.
#[derive(Debug, Clone)]
pub(crate) struct CloseDeadline {
    pub(crate) generation: u64,
    pub(crate) at: Instant,
    pub(crate) handle: AbortHandle,
}

impl CloseDeadline {
    pub(crate) fn cancel(self) {
        self.handle.abort();
    }
}

#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub customer: Option<Token>,
    pub agent: Option<Token>,
    pub status: RoomStatus,
    pub history: Vec<HistoryEntry>,
    pub(crate) close_deadline: Option<CloseDeadline>,
}

impl Room {
    pub(crate) fn new(customer: Token) -> Self {
        Self {
            id: format!("room_{}", generate_token()),
            customer: Some(customer),
            agent: None,
            status: RoomStatus::Waiting,
            history: Vec::new(),
            close_deadline: None,
        }
    }

    pub fn role_of(&self, token: &str) -> Option<Role> {
        if self.customer.as_deref() == Some(token) {
            Some(Role::Customer)
        } else if self.agent.as_deref() == Some(token) {
            Some(Role::Agent)
        } else {
            None
        }
    }

    /// The other slot, if filled.
    pub fn counterpart(&self, token: &str) -> Option<&Token> {
        match self.role_of(token)? {
            Role::Customer => self.agent.as_ref(),
            Role::Agent => self.customer.as_ref(),
        }
    }

    pub fn close_deadline(&self) -> Option<Instant> {
        self.close_deadline.as_ref().map(|d| d.at)
    }

    pub(crate) fn cancel_close(&mut self) -> bool {
        match self.close_deadline.take() {
            Some(deadline) => {
                deadline.cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) fn references(&self, token: &str) -> bool {
        self.role_of(token).is_some()
    }
}
