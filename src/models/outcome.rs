use serde::{Deserialize, Serialize};
use std::fmt;

/// Result classification of processing one event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeCode {
    #[default]
    Ok,
    MissingDestination,
    FsmNotFound,
    ConfigNotFound,
    TransitionNotAllowed,
    InternalError,
}

impl OutcomeCode {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::MissingDestination => "MISSING_DESTINATION",
            Self::FsmNotFound => "FSM_NOT_FOUND",
            Self::ConfigNotFound => "CONFIG_NOT_FOUND",
            Self::TransitionNotAllowed => "TRANSITION_NOT_ALLOWED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for OutcomeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of an event's processing, written once per attempt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventOutcome {
    #[serde(default)]
    pub event_id: String,
    /// Configuration name
    #[serde(default)]
    pub config: String,
    /// Instance id
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub code: OutcomeCode,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,
}

impl EventOutcome {
    pub fn new(
        event_id: impl Into<String>,
        config: impl Into<String>,
        id: impl Into<String>,
        code: OutcomeCode,
        details: impl Into<String>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            config: config.into(),
            id: id.into(),
            code,
            details: details.into(),
        }
    }
}
