//! Message types for room-based communication

use serde::{Deserialize, Serialize};
use warp::ws::Message as WsMessage;

use crate::error::{GhostboxError, Result};

/// Close code for "going away": the room is gone, do not reconnect
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Close code for policy violations, also terminal for the client
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Client-to-server packet. Only `data` is relayed; `type` and any other
/// field are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientPacket {
    pub data: String,
}

impl ClientPacket {
    /// Parse one inbound frame. `None` is a frame that was not text.
    pub fn parse(body: Option<&str>, max_chars: usize) -> Result<Self> {
        let packet: ClientPacket = body
            .and_then(|text| serde_json::from_str(text).ok())
            .ok_or(GhostboxError::PolicyViolation(SystemNotice::MalformedPacket))?;

        if packet.data.chars().count() > max_chars {
            return Err(GhostboxError::PolicyViolation(
                SystemNotice::PacketSizeViolation,
            ));
        }
        Ok(packet)
    }
}

/// Reasons carried by server-originated `system` packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemNotice {
    IdleTermination,
    SessionExpired,
    PacketSizeViolation,
    MalformedPacket,
    Throttled,
}

impl SystemNotice {
    /// Close frame that follows this notice, if the connection is terminated
    pub fn close_frame(self) -> Option<(u16, &'static str)> {
        match self {
            SystemNotice::IdleTermination => Some((CLOSE_POLICY_VIOLATION, "Inactivity purge")),
            SystemNotice::SessionExpired => Some((CLOSE_GOING_AWAY, "TTL reached")),
            SystemNotice::PacketSizeViolation | SystemNotice::MalformedPacket => {
                Some((CLOSE_POLICY_VIOLATION, "Policy violation"))
            }
            SystemNotice::Throttled => None,
        }
    }
}

/// Server-to-client packet: `{"type": "chat"|"system", "data": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ServerPacket {
    Chat(String),
    System(SystemNotice),
}

impl ServerPacket {
    pub fn to_ws(&self) -> WsMessage {
        // Both variants hold plain strings, serialisation cannot fail
        WsMessage::text(serde_json::to_string(self).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_packet_shape() {
        let chat = serde_json::to_value(ServerPacket::Chat("aGk=".to_string())).unwrap();
        assert_eq!(chat, serde_json::json!({ "type": "chat", "data": "aGk=" }));

        let system = serde_json::to_value(ServerPacket::System(SystemNotice::Throttled)).unwrap();
        assert_eq!(system, serde_json::json!({ "type": "system", "data": "THROTTLED" }));

        let idle = serde_json::to_value(ServerPacket::System(SystemNotice::IdleTermination)).unwrap();
        assert_eq!(idle["data"], "IDLE_TERMINATION");
    }

    fn violation(body: Option<&str>) -> Option<SystemNotice> {
        match ClientPacket::parse(body, 5) {
            Err(GhostboxError::PolicyViolation(notice)) => Some(notice),
            _ => None,
        }
    }

    #[test]
    fn test_client_packet_parse() {
        let packet = ClientPacket::parse(Some(r#"{"data":"abc"}"#), 5).unwrap();
        assert_eq!(packet.data, "abc");

        let packet = ClientPacket::parse(Some(r#"{"type":"chat","data":"ééééé"}"#), 5).unwrap();
        assert_eq!(packet.data, "ééééé");

        let malformed = Some(SystemNotice::MalformedPacket);
        assert_eq!(violation(Some(r#"{"type":"chat"}"#)), malformed);
        assert_eq!(violation(Some(r#"{"data":42}"#)), malformed);
        assert_eq!(violation(Some("not json")), malformed);
        assert_eq!(violation(None), malformed);

        assert_eq!(
            violation(Some(r#"{"data":"abcdef"}"#)),
            Some(SystemNotice::PacketSizeViolation)
        );
    }

    #[test]
    fn test_close_codes() {
        assert_eq!(SystemNotice::Throttled.close_frame(), None);
        assert_eq!(SystemNotice::SessionExpired.close_frame().unwrap().0, 1001);
        assert_eq!(SystemNotice::PacketSizeViolation.close_frame().unwrap().0, 1008);
        assert_eq!(SystemNotice::IdleTermination.close_frame().unwrap().0, 1008);
    }
}
