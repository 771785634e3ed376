//! Ephemeral chat rooms
//!
//! Every room is one tokio task (its actor) that owns all sessions attached
//! to it. Sessions, the gateway and the registry talk to the actor through a
//! bounded inbox; the actor handles one event at a time, so relay order and
//! the timing checks need no locks. Rooms live in memory only and are
//! disposed when their TTL elapses.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::{sleep_until, Duration, Instant};
use uuid::Uuid;
use warp::ws::Message as WsMessage;

use crate::config::RoomSettings;
use crate::constants::{ROOM_ID_MAX_LEN, ROOM_ID_MIN_LEN};
use crate::core::connection::Connection;
use crate::core::message_types::{ClientPacket, ServerPacket, SystemNotice, CLOSE_GOING_AWAY};
use crate::error::{GhostboxError, Result};
use crate::metrics::SharedMetrics;

/// Turn a client-chosen fragment into a room address.
///
/// Keeps ASCII alphanumerics, truncates to 10 characters and rejects anything
/// shorter than 5.
pub fn normalize_room_id(raw: &str) -> Option<String> {
    let id: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(ROOM_ID_MAX_LEN)
        .collect();
    if id.len() < ROOM_ID_MIN_LEN {
        None
    } else {
        Some(id)
    }
}

/// Lifecycle of a room actor. `Expired` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    Active,
    Expired,
}

/// Point-in-time view of a room
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub room_id: String,
    pub state: RoomState,
    pub connections: usize,
    pub age: Duration,
}

enum RoomEvent {
    Join {
        conn_id: String,
        sender: mpsc::UnboundedSender<WsMessage>,
        reply: oneshot::Sender<Result<()>>,
    },
    Message {
        conn_id: String,
        body: Option<String>,
    },
    Leave {
        conn_id: String,
    },
    Snapshot {
        reply: oneshot::Sender<RoomSnapshot>,
    },
}

/// Address of a running room actor
#[derive(Clone)]
pub struct RoomHandle {
    room_id: String,
    instance: Uuid,
    created_at: Instant,
    ttl: Duration,
    inbox: mpsc::Sender<RoomEvent>,
}

impl RoomHandle {
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// False once the actor has stopped
    pub fn is_alive(&self) -> bool {
        !self.inbox.is_closed()
    }

    /// Whether a new connection would be admitted right now
    pub fn is_accepting(&self) -> bool {
        self.is_alive() && Instant::now() < self.created_at + self.ttl
    }

    /// Attach a session. The room refuses it once its TTL has elapsed.
    pub async fn join(
        &self,
        conn_id: String,
        sender: mpsc::UnboundedSender<WsMessage>,
    ) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.inbox
            .send(RoomEvent::Join {
                conn_id,
                sender,
                reply,
            })
            .await
            .map_err(|_| GhostboxError::RoomClosed)?;
        response.await.map_err(|_| GhostboxError::RoomClosed)?
    }

    /// Deliver one inbound frame. `None` marks a frame that was not text.
    pub async fn send_message(&self, conn_id: &str, body: Option<String>) -> Result<()> {
        self.inbox
            .send(RoomEvent::Message {
                conn_id: conn_id.to_string(),
                body,
            })
            .await
            .map_err(|_| GhostboxError::RoomClosed)
    }

    pub async fn leave(&self, conn_id: &str) {
        let _ = self
            .inbox
            .send(RoomEvent::Leave {
                conn_id: conn_id.to_string(),
            })
            .await;
    }

    pub async fn snapshot(&self) -> Result<RoomSnapshot> {
        let (reply, response) = oneshot::channel();
        self.inbox
            .send(RoomEvent::Snapshot { reply })
            .await
            .map_err(|_| GhostboxError::RoomClosed)?;
        response.await.map_err(|_| GhostboxError::RoomClosed)
    }
}

enum Wake {
    Timer,
    Event(Option<RoomEvent>),
}

struct RoomActor {
    room_id: String,
    settings: RoomSettings,
    created_at: Instant,
    state: RoomState,
    connections: HashMap<String, Connection>,
    inbox: mpsc::Receiver<RoomEvent>,
    metrics: SharedMetrics,
}

impl RoomActor {
    fn expires_at(&self) -> Instant {
        self.created_at + self.settings.ttl
    }

    fn next_idle_deadline(&self) -> Option<Instant> {
        self.connections
            .values()
            .map(|c| c.idle_deadline(self.settings.idle_timeout))
            .min()
    }

    /// Process events until the room expires. Returns true on TTL expiry.
    async fn run(mut self) -> bool {
        loop {
            self.sweep(Instant::now());
            if self.state == RoomState::Expired {
                return true;
            }

            let expires_at = self.expires_at();
            let idle_at = self.next_idle_deadline();

            // Timers only wake the loop; the sweep above does the work
            let wake = tokio::select! {
                biased;
                _ = sleep_until(expires_at) => Wake::Timer,
                _ = sleep_until(idle_at.unwrap_or(expires_at)), if idle_at.is_some() => Wake::Timer,
                event = self.inbox.recv() => Wake::Event(event),
            };

            match wake {
                Wake::Timer => {}
                Wake::Event(Some(event)) => self.handle(event, Instant::now()),
                Wake::Event(None) => {
                    self.shutdown();
                    return false;
                }
            }
        }
    }

    /// Apply TTL and idle deadlines that have passed
    fn sweep(&mut self, now: Instant) {
        if self.state == RoomState::Active && now >= self.expires_at() {
            self.expire();
            return;
        }

        let idle_timeout = self.settings.idle_timeout;
        let idle: Vec<String> = self
            .connections
            .values()
            .filter(|c| c.is_idle(now, idle_timeout))
            .map(|c| c.id.clone())
            .collect();

        for conn_id in idle {
            log::debug!("Room {}: evicting idle connection {}", self.room_id, conn_id);
            self.metrics.idle_eviction();
            self.terminate(&conn_id, SystemNotice::IdleTermination);
        }
    }

    fn expire(&mut self) {
        self.state = RoomState::Expired;
        log::debug!(
            "Room {} expired with {} connection(s) attached",
            self.room_id,
            self.connections.len()
        );
        for (_, conn) in self.connections.drain() {
            conn.notify(SystemNotice::SessionExpired);
            self.metrics.connection_closed();
        }
    }

    /// Close every session without a notice; the room is going away
    fn shutdown(&mut self) {
        for (_, conn) in self.connections.drain() {
            let _ = conn
                .sender
                .send(WsMessage::close_with(CLOSE_GOING_AWAY, "Shutdown"));
            self.metrics.connection_closed();
        }
    }

    /// Remove one session after telling it why
    fn terminate(&mut self, conn_id: &str, notice: SystemNotice) {
        if let Some(conn) = self.connections.remove(conn_id) {
            conn.notify(notice);
            self.metrics.connection_closed();
        }
    }

    fn handle(&mut self, event: RoomEvent, now: Instant) {
        match event {
            RoomEvent::Join {
                conn_id,
                sender,
                reply,
            } => {
                let result = self.admit(conn_id, sender, now);
                let _ = reply.send(result);
            }
            RoomEvent::Message { conn_id, body } => self.on_message(&conn_id, body, now),
            RoomEvent::Leave { conn_id } => {
                if let Some(conn) = self.connections.remove(&conn_id) {
                    self.metrics.connection_closed();
                    log::debug!(
                        "Room {}: connection {} left after {:?}",
                        self.room_id,
                        conn_id,
                        now.saturating_duration_since(conn.connected_at)
                    );
                }
            }
            RoomEvent::Snapshot { reply } => {
                let _ = reply.send(RoomSnapshot {
                    room_id: self.room_id.clone(),
                    state: self.state,
                    connections: self.connections.len(),
                    age: now.saturating_duration_since(self.created_at),
                });
            }
        }
    }

    fn admit(
        &mut self,
        conn_id: String,
        sender: mpsc::UnboundedSender<WsMessage>,
        now: Instant,
    ) -> Result<()> {
        if self.state == RoomState::Expired || now >= self.expires_at() {
            Connection::new(conn_id, sender, now).notify(SystemNotice::SessionExpired);
            return Err(GhostboxError::RoomExpired);
        }

        log::debug!("Room {}: connection {} joined", self.room_id, conn_id);
        self.metrics.connection_opened();
        self.connections
            .insert(conn_id.clone(), Connection::new(conn_id, sender, now));
        Ok(())
    }

    fn on_message(&mut self, conn_id: &str, body: Option<String>, now: Instant) {
        if now >= self.expires_at() {
            self.expire();
            return;
        }

        let throttled = match self.connections.get(conn_id) {
            Some(conn) => conn.is_throttled(now, self.settings.throttle),
            None => return,
        };

        let packet = match ClientPacket::parse(body.as_deref(), self.settings.max_packet_chars) {
            Ok(packet) => packet,
            Err(e) => {
                let notice = match e {
                    GhostboxError::PolicyViolation(notice) => notice,
                    _ => SystemNotice::MalformedPacket,
                };
                log::debug!("Room {}: {} from {}", self.room_id, e, conn_id);
                self.metrics.policy_violation();
                self.terminate(conn_id, notice);
                return;
            }
        };

        if throttled {
            self.metrics.message_throttled();
            if let Some(conn) = self.connections.get(conn_id) {
                conn.notify(SystemNotice::Throttled);
            }
            return;
        }

        if let Some(conn) = self.connections.get_mut(conn_id) {
            conn.mark_accepted(now);
        }
        self.relay(conn_id, ServerPacket::Chat(packet.data));
    }

    /// Fan a packet out to every session except its sender
    fn relay(&mut self, sender_id: &str, packet: ServerPacket) {
        let mut dead = Vec::new();
        for (id, conn) in &self.connections {
            if id != sender_id && !conn.send_packet(&packet) {
                dead.push(id.clone());
            }
        }
        for id in dead {
            self.connections.remove(&id);
            self.metrics.connection_closed();
        }
        self.metrics.message_relayed();
    }
}

/// Live rooms plus recently expired ids
#[derive(Default)]
struct Directory {
    live: HashMap<String, RoomHandle>,
    /// Expired room ids and when they may be reused
    expired: HashMap<String, Instant>,
}

impl Directory {
    fn live_handle(&self, room_id: &str) -> Option<RoomHandle> {
        self.live.get(room_id).filter(|h| h.is_alive()).cloned()
    }

    fn is_expired(&self, room_id: &str, now: Instant) -> bool {
        self.expired
            .get(room_id)
            .map(|until| now < *until)
            .unwrap_or(false)
    }
}

/// Lazily creates room actors and routes connections to them.
///
/// An expired room id stays refused for `expired_grace` so a leaked link
/// cannot reopen it straight away.
pub struct RoomRegistry {
    rooms: Arc<RwLock<Directory>>,
    settings: RoomSettings,
    metrics: SharedMetrics,
}

impl RoomRegistry {
    pub fn new(settings: RoomSettings, metrics: SharedMetrics) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(Directory::default())),
            settings,
            metrics,
        }
    }

    /// Handle for `room_id`, starting its actor on first use.
    /// Fails with `RoomExpired` while the id is in its grace window.
    pub async fn get_or_create(&self, room_id: &str) -> Result<RoomHandle> {
        {
            let rooms = self.rooms.read().await;
            if let Some(handle) = rooms.live_handle(room_id) {
                return Ok(handle);
            }
            if rooms.is_expired(room_id, Instant::now()) {
                return Err(GhostboxError::RoomExpired);
            }
        }

        let mut rooms = self.rooms.write().await;
        // Another task may have created or retired it between the two locks
        if let Some(handle) = rooms.live_handle(room_id) {
            return Ok(handle);
        }
        let now = Instant::now();
        if rooms.is_expired(room_id, now) {
            return Err(GhostboxError::RoomExpired);
        }
        rooms.expired.retain(|_, until| now < *until);

        let handle = self.spawn(room_id);
        rooms.live.insert(room_id.to_string(), handle.clone());
        Ok(handle)
    }

    fn spawn(&self, room_id: &str) -> RoomHandle {
        let (tx, rx) = mpsc::channel(self.settings.inbox_capacity);
        let created_at = Instant::now();
        let handle = RoomHandle {
            room_id: room_id.to_string(),
            instance: Uuid::new_v4(),
            created_at,
            ttl: self.settings.ttl,
            inbox: tx,
        };

        let actor = RoomActor {
            room_id: room_id.to_string(),
            settings: self.settings.clone(),
            created_at,
            state: RoomState::Active,
            connections: HashMap::new(),
            inbox: rx,
            metrics: Arc::clone(&self.metrics),
        };

        self.metrics.room_opened();
        log::debug!("Room {} created", room_id);

        let rooms = Arc::clone(&self.rooms);
        let metrics = Arc::clone(&self.metrics);
        let room_id = room_id.to_string();
        let instance = handle.instance;
        let grace = self.settings.expired_grace;
        tokio::spawn(async move {
            let expired = actor.run().await;
            metrics.room_closed(expired);
            let refuse_until = expired.then(|| Instant::now() + grace);
            forget(&rooms, &room_id, instance, refuse_until).await;
        });

        handle
    }

    /// Attach a session to `room_id`, creating the room if needed.
    ///
    /// A room that stops between lookup and join is replaced once, unless it
    /// stopped because it expired.
    pub async fn join(
        &self,
        room_id: &str,
        conn_id: String,
        sender: mpsc::UnboundedSender<WsMessage>,
    ) -> Result<RoomHandle> {
        for _ in 0..2 {
            let handle = self.get_or_create(room_id).await?;
            match handle.join(conn_id.clone(), sender.clone()).await {
                Ok(()) => return Ok(handle),
                Err(GhostboxError::RoomClosed) => {
                    let refuse_until = (!handle.is_accepting())
                        .then(|| handle.created_at + handle.ttl + self.settings.expired_grace);
                    forget(&self.rooms, room_id, handle.instance, refuse_until).await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(GhostboxError::RoomClosed)
    }

    pub async fn get(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms.read().await.live.get(room_id).cloned()
    }

    pub async fn active_rooms(&self) -> usize {
        self.rooms.read().await.live.len()
    }

    /// Whether `room_id` is currently refused as expired
    pub async fn is_expired(&self, room_id: &str) -> bool {
        self.rooms.read().await.is_expired(room_id, Instant::now())
    }
}

/// Drop the registry entry, but only if it still points at `instance`.
/// `refuse_until` marks the id as expired until then.
async fn forget(
    rooms: &RwLock<Directory>,
    room_id: &str,
    instance: Uuid,
    refuse_until: Option<Instant>,
) {
    let mut rooms = rooms.write().await;
    let current = rooms
        .live
        .get(room_id)
        .map(|h| h.instance == instance)
        .unwrap_or(false);
    if !current {
        return;
    }
    rooms.live.remove(room_id);
    if let Some(until) = refuse_until {
        rooms.expired.insert(room_id.to_string(), until);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_room_id() {
        assert_eq!(normalize_room_id("k3j-9x_Q2pLm77zz"), Some("k3j9xQ2pLm".to_string()));
        assert_eq!(normalize_room_id("abcde"), Some("abcde".to_string()));
        assert_eq!(normalize_room_id("ab-cd"), None);
        assert_eq!(normalize_room_id("%%%%%%%%"), None);
    }
}
