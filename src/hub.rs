//! Registry of participants and rooms.
//!
//! Every map and every field of every room sits behind one mutex, so a caller
//! never sees a room halfway through a transition. Sections are short and never
//! span an await point; translation happens outside the lock.

mod participant;
mod room;

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, info, warn};

use crate::msg::{EndReason, ServerMessage};

pub use participant::{Connection, ConnectionId, Participant, Role, Token, generate_token};
pub use room::{HistoryEntry, Room, RoomId, RoomStatus};

use room::CloseDeadline;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("room not found: {0}")]
    RoomNotFound(RoomId),
    #[error("participant not found")]
    ParticipantNotFound,
    #[error("room is not available: {0}")]
    InvalidState(RoomId),
    #[error("agent is already in room: {0}")]
    AlreadyOccupied(RoomId),
    #[error("customer is required: {0}")]
    MissingCustomer(RoomId),
    #[error("already in a room")]
    AgentBusy,
    #[error("you are not in this room")]
    NotAMember,
    #[error("room is closed")]
    RoomClosed(RoomId),
}

/// Row of the waiting-room listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitingRoom {
    pub room_id: RoomId,
    pub customer_name: String,
    pub language: String,
}

/// A connection freshly bound to a room member.
#[derive(Debug)]
pub struct Attachment {
    pub connection: ConnectionId,
    /// History to replay before any live frame. Always empty for customers.
    pub backlog: Vec<HistoryEntry>,
}

/// Outcome of recording an inbound message.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub room_id: RoomId,
    pub entry: HistoryEntry,
    pub sender: Participant,
    /// Present only when the counterpart has a live connection.
    pub recipient: Option<Participant>,
    pub reopened: bool,
}

#[derive(Default)]
struct HubInner {
    participants: HashMap<Token, Participant>,
    rooms: HashMap<RoomId, Room>,
    deadlines: u64,
}

pub struct Hub {
    inner: Mutex<HubInner>,
    close_grace: Duration,
    connections: AtomicU64,
}

fn notify(participants: &HashMap<Token, Participant>, token: &str, msg: ServerMessage) -> bool {
    match participants.get(token).and_then(|p| p.connection.as_ref()) {
        Some(conn) => conn.send(msg),
        None => false,
    }
}

/// Customers never outlive their last room; agents stay registered for reuse.
fn reap_customer(
    participants: &mut HashMap<Token, Participant>,
    rooms: &HashMap<RoomId, Room>,
    token: &str,
) {
    let is_customer = participants
        .get(token)
        .is_some_and(|p| p.role == Role::Customer);
    if is_customer && !rooms.values().any(|r| r.references(token)) {
        participants.remove(token);
        debug!(total = participants.len(), "customer reaped");
    }
}

impl Hub {
    pub fn new(close_grace: Duration) -> Self {
        Self {
            inner: Mutex::new(HubInner::default()),
            close_grace,
            connections: AtomicU64::new(1),
        }
    }

    pub fn add_participant(&self, participant: Participant) -> Token {
        let token = participant.token.clone();
        let mut inner = self.inner.lock();
        inner.participants.insert(token.clone(), participant);
        info!(total = inner.participants.len(), "client added");
        token
    }

    pub fn remove_participant(&self, token: &str) {
        let mut inner = self.inner.lock();
        if inner.participants.remove(token).is_some() {
            info!(total = inner.participants.len(), "client removed");
        }
    }

    pub fn get_participant(&self, token: &str) -> Option<Participant> {
        self.inner.lock().participants.get(token).cloned()
    }

    /// Registers an agent profile.
    pub fn create_participant(&self, name: &str, language: &str) -> Token {
        self.add_participant(Participant::agent(name, language))
    }

    pub fn create_room(&self, customer: &str) -> Result<Room, HubError> {
        let mut inner = self.inner.lock();
        if !inner.participants.contains_key(customer) {
            return Err(HubError::ParticipantNotFound);
        }
        let room = Room::new(customer.to_owned());
        inner.rooms.insert(room.id.clone(), room.clone());
        info!(room = %room.id, total = inner.rooms.len(), "room created");
        Ok(room)
    }

    /// Registers a customer, opens a waiting room for them and records their opening message.
    pub fn create_room_for_customer(&self, name: &str, first_message: &str) -> (Token, Room) {
        let customer = Participant::customer(name);
        let token = customer.token.clone();
        let mut room = Room::new(token.clone());
        room.history.push(HistoryEntry {
            sender: token.clone(),
            sender_name: customer.name.clone(),
            sender_role: Role::Customer,
            content: first_message.to_owned(),
        });

        let mut inner = self.inner.lock();
        inner.participants.insert(token.clone(), customer);
        inner.rooms.insert(room.id.clone(), room.clone());
        info!(room = %room.id, total = inner.rooms.len(), "room created");
        (token, room)
    }

    pub fn join_room(&self, room_id: &str, agent: &str) -> Result<Room, HubError> {
        let mut inner = self.inner.lock();
        let HubInner {
            participants,
            rooms,
            ..
        } = &mut *inner;

        if !participants.contains_key(agent) {
            return Err(HubError::ParticipantNotFound);
        }
        if rooms
            .values()
            .any(|r| r.status == RoomStatus::Active && r.agent.as_deref() == Some(agent))
        {
            return Err(HubError::AgentBusy);
        }

        let room = rooms
            .get_mut(room_id)
            .ok_or_else(|| HubError::RoomNotFound(room_id.to_owned()))?;
        if room.status != RoomStatus::Waiting {
            return Err(HubError::InvalidState(room.id.clone()));
        }
        if room.agent.is_some() {
            return Err(HubError::AlreadyOccupied(room.id.clone()));
        }
        let Some(customer) = room.customer.clone() else {
            return Err(HubError::MissingCustomer(room.id.clone()));
        };

        room.agent = Some(agent.to_owned());
        room.status = RoomStatus::Active;
        info!(room = %room.id, "agent joined room");

        notify(
            participants,
            &customer,
            ServerMessage::RoomJoined {
                room_id: room.id.clone(),
            },
        );
        Ok(room.clone())
    }

    pub fn list_waiting_rooms(&self) -> Vec<WaitingRoom> {
        let inner = self.inner.lock();
        inner
            .rooms
            .values()
            .filter(|r| r.status == RoomStatus::Waiting)
            .map(|r| {
                let customer = r
                    .customer
                    .as_deref()
                    .and_then(|t| inner.participants.get(t));
                WaitingRoom {
                    room_id: r.id.clone(),
                    customer_name: customer.map(|c| c.name.clone()).unwrap_or_default(),
                    language: customer.map(|c| c.language.clone()).unwrap_or_default(),
                }
            })
            .collect()
    }

    pub fn get_room(&self, room_id: &str) -> Option<Room> {
        self.inner.lock().rooms.get(room_id).cloned()
    }

    pub fn remove_room(&self, room_id: &str) {
        let mut inner = self.inner.lock();
        let HubInner {
            participants,
            rooms,
            ..
        } = &mut *inner;
        if let Some(mut room) = rooms.remove(room_id) {
            room.cancel_close();
            info!(room = %room_id, total = rooms.len(), "room removed");
            if let Some(customer) = &room.customer {
                reap_customer(participants, rooms, customer);
            }
        }
    }

    pub fn is_agent_actively_assigned(&self, token: &str) -> bool {
        self.inner
            .lock()
            .rooms
            .values()
            .any(|r| r.status == RoomStatus::Active && r.agent.as_deref() == Some(token))
    }

    pub fn participant_count(&self) -> usize {
        self.inner.lock().participants.len()
    }

    pub fn room_count(&self) -> usize {
        self.inner.lock().rooms.len()
    }

    /// Ends a conversation on behalf of one of its members.
    ///
    /// A customer closes the room outright. An agent leaves it `closing` and
    /// arms a deadline; the customer can still reopen it by writing before the
    /// deadline fires.
    pub fn end_room(self: &Arc<Self>, caller: &str, room_id: &str) -> Result<EndReason, HubError> {
        let mut inner = self.inner.lock();
        let HubInner {
            participants,
            rooms,
            deadlines,
        } = &mut *inner;

        let room = rooms
            .get_mut(room_id)
            .ok_or_else(|| HubError::RoomNotFound(room_id.to_owned()))?;

        match room.role_of(caller).ok_or(HubError::NotAMember)? {
            Role::Customer => {
                room.status = RoomStatus::Closed;
                room.cancel_close();
                let agent = room.agent.take();
                rooms.remove(room_id);
                info!(room = %room_id, total = rooms.len(), "room closed by customer");

                if let Some(agent) = agent {
                    notify(
                        participants,
                        &agent,
                        ServerMessage::ChatEnded {
                            room_id: room_id.to_owned(),
                            reason: EndReason::CustomerLeft,
                        },
                    );
                }
                reap_customer(participants, rooms, caller);
                Ok(EndReason::CustomerLeft)
            }
            Role::Agent => {
                if room.status != RoomStatus::Active {
                    return Err(HubError::InvalidState(room.id.clone()));
                }
                room.agent = None;
                room.status = RoomStatus::Closing;

                *deadlines += 1;
                let generation = *deadlines;
                let grace = self.close_grace;
                let hub = Arc::downgrade(self);
                let id = room.id.clone();
                let task = tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    if let Some(hub) = hub.upgrade() {
                        hub.expire_room(&id, generation);
                    }
                });
                room.close_deadline = Some(CloseDeadline {
                    generation,
                    at: Instant::now() + grace,
                    handle: task.abort_handle(),
                });
                info!(room = %room_id, grace_secs = grace.as_secs(), "room closing");

                if let Some(customer) = room.customer.clone() {
                    notify(
                        participants,
                        &customer,
                        ServerMessage::ChatEnded {
                            room_id: room_id.to_owned(),
                            reason: EndReason::AgentLeft,
                        },
                    );
                }
                Ok(EndReason::AgentLeft)
            }
        }
    }

    /// Fires a close deadline. A deadline that was cancelled or superseded is a no-op.
    pub(crate) fn expire_room(&self, room_id: &str, generation: u64) -> bool {
        let mut inner = self.inner.lock();
        let HubInner {
            participants,
            rooms,
            ..
        } = &mut *inner;

        let Some(room) = rooms.get_mut(room_id) else {
            return false;
        };
        let armed = room.close_deadline.as_ref().map(|d| d.generation);
        if room.status != RoomStatus::Closing || armed != Some(generation) {
            debug!(room = %room_id, "stale close deadline ignored");
            return false;
        }

        room.status = RoomStatus::Closed;
        room.close_deadline = None;
        let customer = room.customer.clone();
        rooms.remove(room_id);
        info!(room = %room_id, total = rooms.len(), "room closed after grace period");

        if let Some(customer) = customer {
            notify(
                participants,
                &customer,
                ServerMessage::ChatEnded {
                    room_id: room_id.to_owned(),
                    reason: EndReason::Closed,
                },
            );
            reap_customer(participants, rooms, &customer);
        }
        true
    }

    /// Checks that `token` names a participant seated in `room_id`.
    pub fn authorize(&self, token: &str, room_id: &str) -> Result<Role, HubError> {
        let inner = self.inner.lock();
        if !inner.participants.contains_key(token) {
            return Err(HubError::ParticipantNotFound);
        }
        let room = inner
            .rooms
            .get(room_id)
            .ok_or_else(|| HubError::RoomNotFound(room_id.to_owned()))?;
        room.role_of(token).ok_or(HubError::NotAMember)
    }

    /// Binds a live connection to a member of `room_id`. The last attach wins.
    ///
    /// An agent's backlog is snapshotted under the same lock that makes the
    /// connection visible to senders, so every message lands either in the
    /// backlog or on the live channel, never both.
    pub fn attach(
        &self,
        token: &str,
        room_id: &str,
        tx: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<Attachment, HubError> {
        let id = self.connections.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock();
        let HubInner {
            participants,
            rooms,
            ..
        } = &mut *inner;

        let participant = participants
            .get_mut(token)
            .ok_or(HubError::ParticipantNotFound)?;
        let room = rooms
            .get(room_id)
            .ok_or_else(|| HubError::RoomNotFound(room_id.to_owned()))?;
        let backlog = match room.role_of(token).ok_or(HubError::NotAMember)? {
            Role::Agent => room.history.clone(),
            Role::Customer => Vec::new(),
        };

        if participant.connection.is_some() {
            warn!(client = %participant.name, "replacing live connection");
        }
        participant.connection = Some(Connection::new(id, tx));
        Ok(Attachment {
            connection: id,
            backlog,
        })
    }

    /// Clears the connection handle only if it still belongs to `connection`.
    pub fn detach(&self, token: &str, connection: ConnectionId) {
        let mut inner = self.inner.lock();
        if let Some(participant) = inner.participants.get_mut(token) {
            if participant.connection.as_ref().map(|c| c.id) == Some(connection) {
                participant.connection = None;
            }
        }
    }

    pub fn set_language(&self, token: &str, language: &str) {
        if let Some(participant) = self.inner.lock().participants.get_mut(token) {
            participant.language = language.to_owned();
        }
    }

    /// Pushes a frame to whatever connection `token` currently has.
    pub fn deliver(&self, token: &str, msg: ServerMessage) -> bool {
        notify(&self.inner.lock().participants, token, msg)
    }

    /// Appends a message to the room's history and applies the side effects
    /// a message has on the room's lifecycle.
    pub fn record_message(
        &self,
        room_id: &str,
        sender: &str,
        content: &str,
    ) -> Result<Dispatch, HubError> {
        let mut inner = self.inner.lock();
        let HubInner {
            participants,
            rooms,
            ..
        } = &mut *inner;

        let room = rooms
            .get_mut(room_id)
            .ok_or_else(|| HubError::RoomClosed(room_id.to_owned()))?;
        if room.status == RoomStatus::Closed {
            return Err(HubError::RoomClosed(room.id.clone()));
        }
        let sender = participants
            .get(sender)
            .ok_or(HubError::ParticipantNotFound)?;
        let role = room.role_of(&sender.token).ok_or(HubError::NotAMember)?;

        let entry = HistoryEntry {
            sender: sender.token.clone(),
            sender_name: sender.name.clone(),
            sender_role: role,
            content: content.to_owned(),
        };
        room.history.push(entry.clone());

        let mut reopened = false;
        if room.status == RoomStatus::Closing && role == Role::Customer {
            room.cancel_close();
            room.status = RoomStatus::Waiting;
            reopened = true;
            info!(room = %room.id, "room reopened by customer");
        }

        let recipient = room
            .counterpart(&sender.token)
            .and_then(|t| participants.get(t))
            .filter(|p| p.is_connected())
            .cloned();

        Ok(Dispatch {
            room_id: room.id.clone(),
            entry,
            sender: sender.clone(),
            recipient,
            reopened,
        })
    }
}
