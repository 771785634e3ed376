//! Per-connection state held by a room actor

use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use warp::ws::Message;

use crate::core::message_types::{ServerPacket, SystemNotice};

/// One live WebSocket session attached to a room
pub struct Connection {
    pub id: String,
    pub sender: mpsc::UnboundedSender<Message>,
    pub connected_at: Instant,
    /// Reset on every accepted inbound message; drives idle eviction
    pub last_activity: Instant,
    /// Time of the previous accepted message, for throttling
    pub last_accepted: Option<Instant>,
}

impl Connection {
    pub fn new(id: String, sender: mpsc::UnboundedSender<Message>, now: Instant) -> Self {
        Self {
            id,
            sender,
            connected_at: now,
            last_activity: now,
            last_accepted: None,
        }
    }

    /// Queue a packet for this client. False once the writer is gone.
    pub fn send_packet(&self, packet: &ServerPacket) -> bool {
        self.sender.send(packet.to_ws()).is_ok()
    }

    /// Send a system notice, then the close frame it calls for
    pub fn notify(&self, notice: SystemNotice) -> bool {
        let sent = self.send_packet(&ServerPacket::System(notice));
        if let Some((code, reason)) = notice.close_frame() {
            let _ = self.sender.send(Message::close_with(code, reason));
        }
        sent
    }

    /// Whether another message right now would be throttled
    pub fn is_throttled(&self, now: Instant, min_interval: Duration) -> bool {
        self.last_accepted
            .map(|prev| now.saturating_duration_since(prev) < min_interval)
            .unwrap_or(false)
    }

    /// Record an accepted message; restarts the idle clock
    pub fn mark_accepted(&mut self, now: Instant) {
        self.last_accepted = Some(now);
        self.last_activity = now;
    }

    pub fn idle_deadline(&self, idle_timeout: Duration) -> Instant {
        self.last_activity + idle_timeout
    }

    pub fn is_idle(&self, now: Instant, idle_timeout: Duration) -> bool {
        now >= self.idle_deadline(idle_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_throttle_window() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let now = Instant::now();
        let mut conn = Connection::new("c1".to_string(), tx, now);
        let window = Duration::from_millis(1500);

        assert!(!conn.is_throttled(now, window));
        conn.mark_accepted(now);
        assert!(conn.is_throttled(now + Duration::from_millis(1499), window));
        assert!(!conn.is_throttled(now + Duration::from_millis(1500), window));
    }

    #[tokio::test(start_paused = true)]
    async fn test_notify_sends_close_for_terminal_notices() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = Connection::new("c1".to_string(), tx, Instant::now());

        assert!(conn.notify(SystemNotice::Throttled));
        let first = rx.try_recv().unwrap();
        assert_eq!(first.to_str().unwrap(), r#"{"type":"system","data":"THROTTLED"}"#);
        assert!(rx.try_recv().is_err());

        conn.notify(SystemNotice::SessionExpired);
        let _notice = rx.try_recv().unwrap();
        let close = rx.try_recv().unwrap();
        assert!(close.is_close());
        assert_eq!(close.close_frame().unwrap().0, 1001);
    }
}
