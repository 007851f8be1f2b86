//! # Keyspace
//!
//! Deterministic key derivation for every entity the store persists. The key
//! shapes are an external contract: other tools read the same Redis database.
//!
//! | Key | Holds |
//! |---|---|
//! | `configs#<name>:<version>` | Configuration record |
//! | `configs` | set of configuration names |
//! | `configs#<name>` | set of `version_id`s for `name` |
//! | `fsm:<cfg_name>#<id>` | FiniteStateMachine record |
//! | `fsm:<cfg_name>:state#<state>` | set of instance ids in `state` |
//! | `events:<cfg_name>#<event_id>` | Event record |
//! | `events:<cfg_name>:outcome#<event_id>` | EventOutcome record |

use crate::constants::keys::{
    COMPONENT_SEPARATOR, CONFIGS_PREFIX, EVENTS_PREFIX, FSM_PREFIX, ID_SEPARATOR,
    OUTCOME_SEGMENT, STATE_SEGMENT,
};

/// `<name>:<version>`, the primary key of a configuration
pub fn version_id(name: &str, version: &str) -> String {
    format!("{name}{COMPONENT_SEPARATOR}{version}")
}

/// Configuration name part of a `version_id`.
///
/// A string without a separator is treated as a bare name.
pub fn name_from_version_id(version_id: &str) -> &str {
    version_id
        .split_once(COMPONENT_SEPARATOR)
        .map(|(name, _)| name)
        .unwrap_or(version_id)
}

/// True when `id` is non-empty and free of the reserved separators
pub fn is_valid_identifier(id: &str) -> bool {
    !id.is_empty() && !id.contains(COMPONENT_SEPARATOR) && !id.contains(ID_SEPARATOR)
}

pub fn configs_set_key() -> String {
    CONFIGS_PREFIX.to_string()
}

pub fn config_key(version_id: &str) -> String {
    format!("{CONFIGS_PREFIX}{ID_SEPARATOR}{version_id}")
}

pub fn config_versions_key(name: &str) -> String {
    format!("{CONFIGS_PREFIX}{ID_SEPARATOR}{name}")
}

pub fn fsm_key(cfg_name: &str, id: &str) -> String {
    format!("{FSM_PREFIX}{COMPONENT_SEPARATOR}{cfg_name}{ID_SEPARATOR}{id}")
}

pub fn fsm_state_key(cfg_name: &str, state: &str) -> String {
    format!(
        "{FSM_PREFIX}{COMPONENT_SEPARATOR}{cfg_name}{COMPONENT_SEPARATOR}\
         {STATE_SEGMENT}{ID_SEPARATOR}{state}"
    )
}

pub fn event_key(cfg_name: &str, event_id: &str) -> String {
    format!("{EVENTS_PREFIX}{COMPONENT_SEPARATOR}{cfg_name}{ID_SEPARATOR}{event_id}")
}

pub fn outcome_key(cfg_name: &str, event_id: &str) -> String {
    format!(
        "{EVENTS_PREFIX}{COMPONENT_SEPARATOR}{cfg_name}{COMPONENT_SEPARATOR}\
         {OUTCOME_SEGMENT}{ID_SEPARATOR}{event_id}"
    )
}
