use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::state::game::TimerKind;

/// Envelope wrapping every non-timer event pushed to game watchers.
#[derive(Debug, Serialize)]
pub struct EventEnvelope<'a, T: ?Sized> {
    /// Event name, such as `player_joined`.
    #[serde(rename = "type")]
    pub event_type: &'a str,
    /// Event-specific body.
    pub payload: &'a T,
}

/// Payload of `player_disconnected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PlayerDisconnected {
    /// Player whose connection dropped.
    pub player_id: String,
    /// Always `"disconnected"`.
    pub status: String,
}

impl PlayerDisconnected {
    pub fn new(player_id: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            status: "disconnected".into(),
        }
    }
}

/// Stage of a countdown carried by [`TimerEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TimerEventType {
    TimerStarted,
    TimerUpdate,
    TimerEnded,
}

/// Countdown frame, sent flat rather than inside an [`EventEnvelope`].
///
/// `duration` holds the full length on `timer_started` and the seconds left afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TimerEvent {
    /// Countdown stage.
    #[serde(rename = "type")]
    pub event_type: TimerEventType,
    /// Phase the countdown belongs to.
    pub timer_type: TimerKind,
    /// When the countdown started.
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub start_time: OffsetDateTime,
    /// When the countdown runs out.
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub end_time: OffsetDateTime,
    /// Full length or seconds left, depending on the stage.
    pub duration: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_uses_type_and_payload_keys() {
        let payload = PlayerDisconnected::new("p1");
        let value = serde_json::to_value(EventEnvelope {
            event_type: "player_disconnected",
            payload: &payload,
        })
        .unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "type": "player_disconnected",
                "payload": {"player_id": "p1", "status": "disconnected"}
            })
        );
    }

    #[test]
    fn timer_event_is_flat() {
        let now = OffsetDateTime::now_utc();
        let value = serde_json::to_value(TimerEvent {
            event_type: TimerEventType::TimerUpdate,
            timer_type: TimerKind::AnswerWriting,
            start_time: now,
            end_time: now,
            duration: 4,
        })
        .unwrap();

        assert_eq!(value["type"], "timer_update");
        assert_eq!(value["timer_type"], "answer_writing");
        assert_eq!(value["duration"], 4);
        assert!(value.get("payload").is_none());
    }
}
