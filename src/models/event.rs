use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Transition;

/// A single transition request against one instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub transition: Transition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub originator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl Event {
    /// New event requesting the transition named `event`
    pub fn named(event: impl Into<String>) -> Self {
        Self {
            transition: Transition::named(event),
            ..Self::default()
        }
    }

    pub fn with_originator(mut self, originator: impl Into<String>) -> Self {
        self.originator = Some(originator.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn event_name(&self) -> &str {
        &self.transition.event
    }

    /// Assign a UUID v4 `event_id` and a UTC `timestamp` where absent.
    ///
    /// Returns the (possibly freshly generated) event id.
    pub fn ensure_identity(&mut self) -> String {
        if self.timestamp.is_none() {
            self.timestamp = Some(Utc::now());
        }
        match &self.event_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => {
                let id = Uuid::new_v4().to_string();
                self.event_id = Some(id.clone());
                id
            }
        }
    }

    /// Event id, or the empty string before [`Event::ensure_identity`] ran
    pub fn id(&self) -> &str {
        self.event_id.as_deref().unwrap_or_default()
    }
}

/// An event addressed to an instance: `{event, config, id}`.
///
/// `config` is the configuration *name* and `id` the instance id. This is the
/// queue payload shape and the unit travelling on the event channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<Event>,
    #[serde(default)]
    pub config: String,
    #[serde(default)]
    pub id: String,
}

impl EventRequest {
    pub fn new(event: Event, config: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            event: Some(event),
            config: config.into(),
            id: id.into(),
        }
    }

    /// True when both the configuration name and the instance id are present
    pub fn has_destination(&self) -> bool {
        !self.config.is_empty() && !self.id.is_empty()
    }

    /// Fill in identity fields on the carried event, creating an empty one if absent
    pub fn ensure_identity(&mut self) -> String {
        self.event.get_or_insert_with(Event::default).ensure_identity()
    }
}
