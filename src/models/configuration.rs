use serde::{Deserialize, Serialize};

use crate::keyspace;

/// A `(from, to, event)` triple.
///
/// On a [`Configuration`] all three are set. On an [`crate::models::Event`]
/// only `event` is set at ingress; `from` and `to` are filled in when the
/// event is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transition {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub from: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub to: String,
    #[serde(default)]
    pub event: String,
}

impl Transition {
    pub fn new(from: impl Into<String>, to: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            event: event.into(),
        }
    }

    /// A transition request naming only the event
    pub fn named(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            ..Self::default()
        }
    }
}

/// Versioned FSM schema, immutable once stored
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub states: Vec<String>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    #[serde(default)]
    pub starting_state: String,
}

impl Configuration {
    /// Primary key, `<name>:<version>`
    pub fn version_id(&self) -> String {
        keyspace::version_id(&self.name, &self.version)
    }

    pub fn has_state(&self, state: &str) -> bool {
        self.states.iter().any(|s| s == state)
    }
}
