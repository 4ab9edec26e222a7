//! Messages: the raw envelope producers send, and the typed events decoded from it.
//!
//! The log stores [`Message`] exactly as received, including kinds this
//! service does not understand. Decoding into a [`RocketEvent`] happens only
//! when the fold reaches the message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::{ChannelId, ValidationMode};

/// Envelope metadata attached by the producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    pub channel: ChannelId,
    /// Per-channel sequence number, starting at 1.
    pub message_number: u64,
    /// Producer-assigned event time; unrelated to arrival order.
    pub message_time: DateTime<Utc>,
    /// Kind discriminator, kept as received.
    pub message_type: String,
}

/// A message as logged: metadata plus the kind-specific payload object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub metadata: MessageMetadata,
    #[serde(default)]
    pub message: Value,
}

impl Message {
    pub fn new(
        channel: ChannelId,
        message_number: u64,
        message_time: DateTime<Utc>,
        message_type: impl Into<String>,
        message: Value,
    ) -> Self {
        Self {
            metadata: MessageMetadata {
                channel,
                message_number,
                message_time,
                message_type: message_type.into(),
            },
            message,
        }
    }

    /// Build the wire form of a typed event.
    pub fn from_event(
        channel: ChannelId,
        message_number: u64,
        message_time: DateTime<Utc>,
        event: &RocketEvent,
    ) -> Self {
        Self::new(
            channel,
            message_number,
            message_time,
            event.kind().as_str(),
            event.to_payload(),
        )
    }

    pub fn channel(&self) -> ChannelId {
        self.metadata.channel
    }

    pub fn message_number(&self) -> u64 {
        self.metadata.message_number
    }

    pub fn message_time(&self) -> DateTime<Utc> {
        self.metadata.message_time
    }

    pub fn message_type(&self) -> &str {
        &self.metadata.message_type
    }

    /// Decode the payload into a typed event.
    pub fn decode(&self, mode: ValidationMode) -> Result<RocketEvent, TransitionError> {
        RocketEvent::decode(&self.metadata.message_type, &self.message, mode)
    }
}

/// The closed set of message kinds this service can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Launched,
    SpeedIncreased,
    SpeedDecreased,
    Exploded,
    MissionChanged,
}

impl MessageKind {
    pub const ALL: [MessageKind; 5] = [
        MessageKind::Launched,
        MessageKind::SpeedIncreased,
        MessageKind::SpeedDecreased,
        MessageKind::Exploded,
        MessageKind::MissionChanged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Launched => "Launched",
            MessageKind::SpeedIncreased => "SpeedIncreased",
            MessageKind::SpeedDecreased => "SpeedDecreased",
            MessageKind::Exploded => "Exploded",
            MessageKind::MissionChanged => "MissionChanged",
        }
    }

    /// `Rocket`-prefixed name sent by older producers.
    pub fn legacy_name(&self) -> &'static str {
        match self {
            MessageKind::Launched => "RocketLaunched",
            MessageKind::SpeedIncreased => "RocketSpeedIncreased",
            MessageKind::SpeedDecreased => "RocketSpeedDecreased",
            MessageKind::Exploded => "RocketExploded",
            MessageKind::MissionChanged => "RocketMissionChanged",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s || kind.legacy_name() == s)
            .ok_or_else(|| TransitionError::UnknownKind(s.to_string()))
    }
}

/// Why a message could not be applied to a projection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// A required payload field is missing or has the wrong JSON type
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: MessageKind, reason: String },

    /// The message type is not one of the known kinds
    #[error("unknown message kind: {0}")]
    UnknownKind(String),
}

/// A decoded message payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RocketEvent {
    Launched {
        rocket_type: String,
        launch_speed: i64,
        mission: String,
    },
    SpeedIncreased {
        by: i64,
    },
    SpeedDecreased {
        by: i64,
    },
    Exploded {
        reason: String,
    },
    MissionChanged {
        new_mission: String,
    },
}

impl RocketEvent {
    /// Decode a payload for the given kind string.
    pub fn decode(
        message_type: &str,
        payload: &Value,
        mode: ValidationMode,
    ) -> Result<Self, TransitionError> {
        let kind: MessageKind = message_type.parse()?;
        let fields = PayloadFields {
            kind,
            payload,
            strict: mode.is_strict(),
        };

        let event = match kind {
            MessageKind::Launched => RocketEvent::Launched {
                rocket_type: fields.lenient_string("type")?,
                launch_speed: fields.lenient_number("launchSpeed")?,
                mission: fields.lenient_string("mission")?,
            },
            MessageKind::SpeedIncreased => RocketEvent::SpeedIncreased {
                by: fields.number("by")?,
            },
            MessageKind::SpeedDecreased => RocketEvent::SpeedDecreased {
                by: fields.number("by")?,
            },
            MessageKind::Exploded => RocketEvent::Exploded {
                reason: fields.lenient_string("reason")?,
            },
            MessageKind::MissionChanged => RocketEvent::MissionChanged {
                new_mission: fields.string("newMission")?,
            },
        };

        Ok(event)
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            RocketEvent::Launched { .. } => MessageKind::Launched,
            RocketEvent::SpeedIncreased { .. } => MessageKind::SpeedIncreased,
            RocketEvent::SpeedDecreased { .. } => MessageKind::SpeedDecreased,
            RocketEvent::Exploded { .. } => MessageKind::Exploded,
            RocketEvent::MissionChanged { .. } => MessageKind::MissionChanged,
        }
    }

    /// Wire payload for this event.
    pub fn to_payload(&self) -> Value {
        match self {
            RocketEvent::Launched {
                rocket_type,
                launch_speed,
                mission,
            } => json!({
                "type": rocket_type,
                "launchSpeed": launch_speed,
                "mission": mission,
            }),
            RocketEvent::SpeedIncreased { by } | RocketEvent::SpeedDecreased { by } => {
                json!({ "by": by })
            }
            RocketEvent::Exploded { reason } => json!({ "reason": reason }),
            RocketEvent::MissionChanged { new_mission } => json!({ "newMission": new_mission }),
        }
    }
}

/// Typed field access over a JSON payload for one message kind.
struct PayloadFields<'a> {
    kind: MessageKind,
    payload: &'a Value,
    strict: bool,
}

impl PayloadFields<'_> {
    fn invalid(&self, reason: String) -> TransitionError {
        TransitionError::InvalidPayload {
            kind: self.kind,
            reason,
        }
    }

    fn number(&self, field: &str) -> Result<i64, TransitionError> {
        match self.payload.get(field) {
            None | Some(Value::Null) => Err(self.invalid(format!("missing field '{}'", field))),
            // Floats truncate toward zero, as producers may send 500.0.
            Some(value) => value
                .as_i64()
                .or_else(|| value.as_f64().map(|n| n.trunc() as i64))
                .ok_or_else(|| self.invalid(format!("field '{}' must be a number", field))),
        }
    }

    fn string(&self, field: &str) -> Result<String, TransitionError> {
        match self.payload.get(field) {
            None | Some(Value::Null) => Err(self.invalid(format!("missing field '{}'", field))),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(self.invalid(format!("field '{}' must be a string", field))),
        }
    }

    fn lenient_number(&self, field: &str) -> Result<i64, TransitionError> {
        match self.number(field) {
            Ok(n) => Ok(n),
            Err(_) if !self.strict => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn lenient_string(&self, field: &str) -> Result<String, TransitionError> {
        match self.string(field) {
            Ok(s) => Ok(s),
            Err(_) if !self.strict => Ok(String::new()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing_accepts_legacy_names() {
        assert_eq!(
            "Launched".parse::<MessageKind>().unwrap(),
            MessageKind::Launched
        );
        assert_eq!(
            "RocketSpeedDecreased".parse::<MessageKind>().unwrap(),
            MessageKind::SpeedDecreased
        );
        assert_eq!(
            "RocketWarped".parse::<MessageKind>(),
            Err(TransitionError::UnknownKind("RocketWarped".to_string()))
        );
    }

    #[test]
    fn test_message_wire_format() {
        let channel = ChannelId::new();
        let raw = json!({
            "metadata": {
                "channel": channel.to_string(),
                "messageNumber": 2,
                "messageTime": "2024-03-01T12:00:00Z",
                "messageType": "RocketSpeedIncreased"
            },
            "message": { "by": 3000 }
        });

        let message: Message = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(message.channel(), channel);
        assert_eq!(message.message_number(), 2);
        assert_eq!(message.message_type(), "RocketSpeedIncreased");
        assert_eq!(
            message.decode(ValidationMode::Lenient).unwrap(),
            RocketEvent::SpeedIncreased { by: 3000 }
        );

        let back = serde_json::to_value(&message).unwrap();
        assert_eq!(back["metadata"]["messageNumber"], 2);
        assert_eq!(back["metadata"]["messageType"], "RocketSpeedIncreased");
        assert_eq!(back["message"]["by"], 3000);
    }

    #[test]
    fn test_float_numbers_truncate() {
        let event = RocketEvent::decode(
            "SpeedDecreased",
            &json!({ "by": 499.9 }),
            ValidationMode::Lenient,
        )
        .unwrap();
        assert_eq!(event, RocketEvent::SpeedDecreased { by: 499 });
    }

    #[test]
    fn test_speed_change_requires_by() {
        let err = RocketEvent::decode(
            "SpeedIncreased",
            &json!({ "by": "fast" }),
            ValidationMode::Lenient,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::InvalidPayload {
                kind: MessageKind::SpeedIncreased,
                ..
            }
        ));

        let err =
            RocketEvent::decode("SpeedDecreased", &json!({}), ValidationMode::Lenient).unwrap_err();
        assert!(matches!(err, TransitionError::InvalidPayload { .. }));
    }

    #[test]
    fn test_mission_changed_requires_string() {
        let err = RocketEvent::decode(
            "MissionChanged",
            &json!({ "newMission": 7 }),
            ValidationMode::Lenient,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::InvalidPayload {
                kind: MessageKind::MissionChanged,
                ..
            }
        ));
    }

    #[test]
    fn test_lenient_launch_zero_fills() {
        let event = RocketEvent::decode(
            "Launched",
            &json!({ "launchSpeed": "very" }),
            ValidationMode::Lenient,
        )
        .unwrap();
        assert_eq!(
            event,
            RocketEvent::Launched {
                rocket_type: String::new(),
                launch_speed: 0,
                mission: String::new(),
            }
        );

        let event = RocketEvent::decode("Exploded", &Value::Null, ValidationMode::Lenient).unwrap();
        assert_eq!(
            event,
            RocketEvent::Exploded {
                reason: String::new()
            }
        );
    }

    #[test]
    fn test_strict_launch_rejects_missing_fields() {
        let err = RocketEvent::decode(
            "Launched",
            &json!({ "type": "Falcon-9", "mission": "ARTEMIS" }),
            ValidationMode::Strict,
        )
        .unwrap_err();
        assert_eq!(
            err,
            TransitionError::InvalidPayload {
                kind: MessageKind::Launched,
                reason: "missing field 'launchSpeed'".to_string(),
            }
        );

        let err = RocketEvent::decode("Exploded", &json!({}), ValidationMode::Strict).unwrap_err();
        assert!(matches!(
            err,
            TransitionError::InvalidPayload {
                kind: MessageKind::Exploded,
                ..
            }
        ));
    }

    #[test]
    fn test_payload_matches_decoder() {
        let events = [
            RocketEvent::Launched {
                rocket_type: "Falcon-9".to_string(),
                launch_speed: 500,
                mission: "ARTEMIS".to_string(),
            },
            RocketEvent::SpeedIncreased { by: 3000 },
            RocketEvent::SpeedDecreased { by: 500 },
            RocketEvent::Exploded {
                reason: "PRESSURE_VESSEL_FAILURE".to_string(),
            },
            RocketEvent::MissionChanged {
                new_mission: "SHACKLETON".to_string(),
            },
        ];

        for event in events {
            let decoded = RocketEvent::decode(
                event.kind().as_str(),
                &event.to_payload(),
                ValidationMode::Strict,
            )
            .unwrap();
            assert_eq!(decoded, event);
        }
    }
}
