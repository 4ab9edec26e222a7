//! State transition function for rocket projections
//!
//! Applying a message always moves the cursor (`lastMessageNumber` and
//! `lastMessageTime`) to the message first, then dispatches on the decoded
//! [`RocketEvent`]:
//!
//! - **Launched**: sets type, speed and mission, status becomes active
//! - **SpeedIncreased / SpeedDecreased**: adjusts speed by `by`
//! - **Exploded**: records the reason, status becomes exploded
//! - **MissionChanged**: replaces the mission
//!
//! # Contiguous-prefix fold
//!
//! [`fold_contiguous_prefix`] walks an ascending list of logged messages and
//! applies only the exact next sequence number, stopping at the first gap.
//! A projection therefore always reflects a gapless prefix of its history.

use thiserror::Error;

use super::{ChannelId, Message, Rocket, RocketEvent, RocketStatus, TransitionError, ValidationMode};

/// Apply one message to a projection.
pub fn apply_message(
    rocket: Rocket,
    message: &Message,
    mode: ValidationMode,
) -> Result<Rocket, TransitionError> {
    let mut next = rocket;
    next.last_message_number = Some(message.message_number());
    next.last_message_time = Some(message.message_time());

    match message.decode(mode)? {
        RocketEvent::Launched {
            rocket_type,
            launch_speed,
            mission,
        } => {
            next.rocket_type = rocket_type;
            next.speed = launch_speed;
            next.mission = mission;
            // A relaunch never revives an exploded rocket.
            if next.status != RocketStatus::Exploded {
                next.status = RocketStatus::Active;
            }
        }
        // Two's-complement wrap keeps an increase and a matching decrease
        // exact inverses at the i64 bounds.
        RocketEvent::SpeedIncreased { by } => {
            next.speed = next.speed.wrapping_add(by);
        }
        RocketEvent::SpeedDecreased { by } => {
            next.speed = next.speed.wrapping_sub(by);
        }
        RocketEvent::Exploded { reason } => {
            next.status = RocketStatus::Exploded;
            next.explosion_reason = Some(reason);
        }
        RocketEvent::MissionChanged { new_mission } => {
            next.mission = new_mission;
        }
    }

    Ok(next)
}

/// Build a projection from scratch by applying `messages` in the given order.
pub fn build_rocket_state(
    channel: ChannelId,
    messages: &[Message],
    mode: ValidationMode,
) -> Result<Rocket, TransitionError> {
    messages
        .iter()
        .try_fold(Rocket::new(channel), |rocket, message| {
            apply_message(rocket, message, mode)
        })
}

/// Outcome of a successful contiguous-prefix fold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub rocket: Rocket,
    /// Number of messages applied.
    pub applied: usize,
    /// First logged number beyond the gap the fold stopped at, if any.
    pub gap_at: Option<u64>,
}

/// A message in the prefix could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("message {message_number} could not be applied: {source}")]
pub struct FoldError {
    pub message_number: u64,
    #[source]
    pub source: TransitionError,
}

/// Fold the contiguous prefix of `messages` onto `rocket`.
///
/// `messages` must be ascending by sequence number. Entries at or below the
/// cursor are duplicates and are skipped; the fold stops at the first entry
/// beyond the next expected number.
pub fn fold_contiguous_prefix(
    rocket: Rocket,
    messages: &[Message],
    mode: ValidationMode,
) -> Result<Fold, FoldError> {
    let mut rocket = rocket;
    let mut applied = 0;
    let mut gap_at = None;

    for message in messages {
        let number = message.message_number();
        if number <= rocket.cursor() {
            continue;
        }
        if number != rocket.next_expected() {
            gap_at = Some(number);
            break;
        }

        rocket = apply_message(rocket, message, mode).map_err(|source| FoldError {
            message_number: number,
            source,
        })?;
        applied += 1;
    }

    Ok(Fold {
        rocket,
        applied,
        gap_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageKind;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn message(channel: ChannelId, number: u64, event: RocketEvent) -> Message {
        let time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
            + chrono::Duration::seconds(number as i64);
        Message::from_event(channel, number, time, &event)
    }

    fn launched(channel: ChannelId) -> Message {
        message(
            channel,
            1,
            RocketEvent::Launched {
                rocket_type: "Falcon-9".to_string(),
                launch_speed: 500,
                mission: "ARTEMIS".to_string(),
            },
        )
    }

    #[test]
    fn test_launched_sets_fields() {
        let channel = ChannelId::new();
        let msg = launched(channel);
        let rocket = apply_message(Rocket::new(channel), &msg, ValidationMode::Lenient).unwrap();

        assert_eq!(rocket.rocket_type, "Falcon-9");
        assert_eq!(rocket.speed, 500);
        assert_eq!(rocket.mission, "ARTEMIS");
        assert_eq!(rocket.status, RocketStatus::Active);
        assert_eq!(rocket.last_message_number, Some(1));
        assert_eq!(rocket.last_message_time, Some(msg.message_time()));
    }

    #[test]
    fn test_exploded_sets_reason() {
        let channel = ChannelId::new();
        let rocket = build_rocket_state(
            channel,
            &[
                launched(channel),
                message(
                    channel,
                    2,
                    RocketEvent::Exploded {
                        reason: "PRESSURE_VESSEL_FAILURE".to_string(),
                    },
                ),
            ],
            ValidationMode::Lenient,
        )
        .unwrap();

        assert_eq!(rocket.status, RocketStatus::Exploded);
        assert_eq!(
            rocket.explosion_reason.as_deref(),
            Some("PRESSURE_VESSEL_FAILURE")
        );
        assert_eq!(rocket.cursor(), 2);
    }

    #[test]
    fn test_relaunch_keeps_exploded_status() {
        let channel = ChannelId::new();
        let mut relaunch = launched(channel);
        relaunch.metadata.message_number = 3;

        let rocket = build_rocket_state(
            channel,
            &[
                launched(channel),
                message(
                    channel,
                    2,
                    RocketEvent::Exploded {
                        reason: "ENGINE_FIRE".to_string(),
                    },
                ),
                relaunch,
            ],
            ValidationMode::Lenient,
        )
        .unwrap();

        assert_eq!(rocket.status, RocketStatus::Exploded);
        assert_eq!(rocket.speed, 500);
        assert_eq!(rocket.cursor(), 3);
    }

    #[test]
    fn test_speed_changes_are_additive() {
        let channel = ChannelId::new();
        let rocket = build_rocket_state(
            channel,
            &[
                launched(channel),
                message(channel, 2, RocketEvent::SpeedIncreased { by: 3000 }),
                message(channel, 3, RocketEvent::SpeedDecreased { by: 3000 }),
            ],
            ValidationMode::Lenient,
        )
        .unwrap();
        assert_eq!(rocket.speed, 500);
    }

    #[test]
    fn test_speed_round_trip_near_upper_bound() {
        let channel = ChannelId::new();
        let launch_speed = i64::MAX - 10;
        let rocket = build_rocket_state(
            channel,
            &[
                message(
                    channel,
                    1,
                    RocketEvent::Launched {
                        rocket_type: "Falcon-9".to_string(),
                        launch_speed,
                        mission: "ARTEMIS".to_string(),
                    },
                ),
                message(channel, 2, RocketEvent::SpeedIncreased { by: 100 }),
                message(channel, 3, RocketEvent::SpeedDecreased { by: 100 }),
            ],
            ValidationMode::Strict,
        )
        .unwrap();
        assert_eq!(rocket.speed, launch_speed);
    }

    #[test]
    fn test_unknown_kind_fails() {
        let channel = ChannelId::new();
        let msg = Message::new(channel, 1, Utc::now(), "RocketWarped", json!({}));
        let err = apply_message(Rocket::new(channel), &msg, ValidationMode::Lenient).unwrap_err();
        assert_eq!(err, TransitionError::UnknownKind("RocketWarped".to_string()));
    }

    #[test]
    fn test_fold_stops_at_gap() {
        let channel = ChannelId::new();
        let start = build_rocket_state(channel, &[launched(channel)], ValidationMode::Lenient)
            .unwrap();
        let logged = vec![
            message(channel, 2, RocketEvent::SpeedIncreased { by: 100 }),
            message(channel, 4, RocketEvent::SpeedIncreased { by: 1000 }),
        ];

        let fold = fold_contiguous_prefix(start, &logged, ValidationMode::Lenient).unwrap();
        assert_eq!(fold.applied, 1);
        assert_eq!(fold.gap_at, Some(4));
        assert_eq!(fold.rocket.speed, 600);
        assert_eq!(fold.rocket.cursor(), 2);
    }

    #[test]
    fn test_fold_skips_duplicates() {
        let channel = ChannelId::new();
        let start = build_rocket_state(channel, &[launched(channel)], ValidationMode::Lenient)
            .unwrap();
        let logged = vec![
            launched(channel),
            message(channel, 2, RocketEvent::SpeedIncreased { by: 100 }),
            message(channel, 2, RocketEvent::SpeedIncreased { by: 9999 }),
            message(channel, 3, RocketEvent::SpeedDecreased { by: 50 }),
        ];

        let fold = fold_contiguous_prefix(start, &logged, ValidationMode::Lenient).unwrap();
        assert_eq!(fold.applied, 2);
        assert_eq!(fold.gap_at, None);
        assert_eq!(fold.rocket.speed, 550);
        assert_eq!(fold.rocket.cursor(), 3);
    }

    #[test]
    fn test_fold_reports_failing_message() {
        let channel = ChannelId::new();
        let start = build_rocket_state(channel, &[launched(channel)], ValidationMode::Lenient)
            .unwrap();
        let logged = vec![
            message(channel, 2, RocketEvent::SpeedIncreased { by: 100 }),
            Message::new(channel, 3, Utc::now(), "SpeedIncreased", json!({ "by": "lots" })),
        ];

        let err = fold_contiguous_prefix(start, &logged, ValidationMode::Lenient).unwrap_err();
        assert_eq!(err.message_number, 3);
        assert!(matches!(
            err.source,
            TransitionError::InvalidPayload {
                kind: MessageKind::SpeedIncreased,
                ..
            }
        ));
    }

    #[test]
    fn test_fold_from_empty_needs_first_message() {
        let channel = ChannelId::new();
        let logged = vec![message(channel, 2, RocketEvent::SpeedIncreased { by: 100 })];

        let fold =
            fold_contiguous_prefix(Rocket::new(channel), &logged, ValidationMode::Lenient).unwrap();
        assert_eq!(fold.applied, 0);
        assert_eq!(fold.gap_at, Some(2));
        assert_eq!(fold.rocket.last_message_number, None);
    }
}
