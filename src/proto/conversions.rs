//! Type conversions between Protocol Buffer types and domain types.
//!
//! Optional event fields carry explicit presence on the wire, so `Some("")`
//! survives a round trip. Decoding fails on timestamps chrono cannot represent.

use chrono::{DateTime, Utc};
use prost_types::Timestamp;

use crate::codec::CodecError;
use crate::models::{
    Configuration, Event, EventOutcome, EventRequest, FiniteStateMachine, OutcomeCode, Transition,
};
use crate::proto::v1 as proto;

// ============================================================================
// Timestamp Conversions (helper functions due to orphan rules)
// ============================================================================

/// Convert a `DateTime<Utc>` to a protobuf `Timestamp`.
pub fn datetime_to_timestamp(dt: DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: dt.timestamp(),
        nanos: dt.timestamp_subsec_nanos() as i32,
    }
}

/// Convert a protobuf `Timestamp` to a `DateTime<Utc>`.
///
/// Negative nanos and seconds outside chrono's range are rejected.
pub fn timestamp_to_datetime(ts: Timestamp) -> Result<DateTime<Utc>, CodecError> {
    u32::try_from(ts.nanos)
        .ok()
        .and_then(|nanos| DateTime::from_timestamp(ts.seconds, nanos))
        .ok_or(CodecError::InvalidTimestamp {
            seconds: ts.seconds,
            nanos: ts.nanos,
        })
}

// ============================================================================
// Transition / Event
// ============================================================================

impl From<Transition> for proto::Transition {
    fn from(t: Transition) -> Self {
        Self {
            from: t.from,
            to: t.to,
            event: t.event,
        }
    }
}

impl From<proto::Transition> for Transition {
    fn from(t: proto::Transition) -> Self {
        Self {
            from: t.from,
            to: t.to,
            event: t.event,
        }
    }
}

impl From<Event> for proto::Event {
    fn from(event: Event) -> Self {
        Self {
            event_id: event.event_id,
            timestamp: event.timestamp.map(datetime_to_timestamp),
            transition: Some(event.transition.into()),
            originator: event.originator,
            details: event.details,
        }
    }
}

impl TryFrom<proto::Event> for Event {
    type Error = CodecError;

    fn try_from(event: proto::Event) -> Result<Self, Self::Error> {
        Ok(Self {
            event_id: event.event_id,
            timestamp: event.timestamp.map(timestamp_to_datetime).transpose()?,
            transition: event.transition.map(Transition::from).unwrap_or_default(),
            originator: event.originator,
            details: event.details,
        })
    }
}

impl From<EventRequest> for proto::EventRequest {
    fn from(request: EventRequest) -> Self {
        Self {
            event: request.event.map(proto::Event::from),
            config: request.config,
            id: request.id,
        }
    }
}

impl TryFrom<proto::EventRequest> for EventRequest {
    type Error = CodecError;

    fn try_from(request: proto::EventRequest) -> Result<Self, Self::Error> {
        Ok(Self {
            event: request.event.map(Event::try_from).transpose()?,
            config: request.config,
            id: request.id,
        })
    }
}

// ============================================================================
// Configuration / FiniteStateMachine
// ============================================================================

impl From<Configuration> for proto::Configuration {
    fn from(config: Configuration) -> Self {
        Self {
            name: config.name,
            version: config.version,
            states: config.states,
            transitions: config.transitions.into_iter().map(Into::into).collect(),
            starting_state: config.starting_state,
        }
    }
}

impl From<proto::Configuration> for Configuration {
    fn from(config: proto::Configuration) -> Self {
        Self {
            name: config.name,
            version: config.version,
            states: config.states,
            transitions: config.transitions.into_iter().map(Into::into).collect(),
            starting_state: config.starting_state,
        }
    }
}

impl From<FiniteStateMachine> for proto::FiniteStateMachine {
    fn from(fsm: FiniteStateMachine) -> Self {
        Self {
            config_id: fsm.config_id,
            state: fsm.state,
            history: fsm.history.into_iter().map(Into::into).collect(),
        }
    }
}

impl TryFrom<proto::FiniteStateMachine> for FiniteStateMachine {
    type Error = CodecError;

    fn try_from(fsm: proto::FiniteStateMachine) -> Result<Self, Self::Error> {
        Ok(Self {
            config_id: fsm.config_id,
            state: fsm.state,
            history: fsm
                .history
                .into_iter()
                .map(Event::try_from)
                .collect::<Result<_, _>>()?,
        })
    }
}

// ============================================================================
// Outcome Conversions - Lossless 1:1 mapping
// ============================================================================

impl From<OutcomeCode> for proto::event_outcome::StatusCode {
    fn from(code: OutcomeCode) -> Self {
        match code {
            OutcomeCode::Ok => Self::Ok,
            OutcomeCode::MissingDestination => Self::MissingDestination,
            OutcomeCode::FsmNotFound => Self::FsmNotFound,
            OutcomeCode::ConfigNotFound => Self::ConfigNotFound,
            OutcomeCode::TransitionNotAllowed => Self::TransitionNotAllowed,
            OutcomeCode::InternalError => Self::InternalError,
        }
    }
}

impl From<proto::event_outcome::StatusCode> for OutcomeCode {
    fn from(code: proto::event_outcome::StatusCode) -> Self {
        use proto::event_outcome::StatusCode;
        match code {
            StatusCode::Ok => Self::Ok,
            StatusCode::MissingDestination => Self::MissingDestination,
            StatusCode::FsmNotFound => Self::FsmNotFound,
            StatusCode::ConfigNotFound => Self::ConfigNotFound,
            StatusCode::TransitionNotAllowed => Self::TransitionNotAllowed,
            StatusCode::InternalError => Self::InternalError,
        }
    }
}

impl From<EventOutcome> for proto::EventOutcome {
    fn from(outcome: EventOutcome) -> Self {
        Self {
            event_id: outcome.event_id,
            config: outcome.config,
            id: outcome.id,
            code: proto::event_outcome::StatusCode::from(outcome.code) as i32,
            details: outcome.details,
        }
    }
}

impl From<proto::EventOutcome> for EventOutcome {
    fn from(outcome: proto::EventOutcome) -> Self {
        // Codes added by newer writers read as internal errors
        let code = proto::event_outcome::StatusCode::try_from(outcome.code)
            .map(OutcomeCode::from)
            .unwrap_or(OutcomeCode::InternalError);
        Self {
            event_id: outcome.event_id,
            config: outcome.config,
            id: outcome.id,
            code,
            details: outcome.details,
        }
    }
}
