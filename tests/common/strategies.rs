#![allow(dead_code)]

use chrono::{DateTime, Utc};
use proptest::prelude::*;
use statemachine::models::{Configuration, Event, Transition};

/// Identifiers free of the key separators
pub fn identifier_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,15}"
}

/// A linear chain `s0 -e0-> s1 -e1-> ... -> sN` of 2..=8 states
pub fn chain_config_strategy() -> impl Strategy<Value = Configuration> {
    (identifier_strategy(), 2usize..=8).prop_map(|(name, len)| {
        let states: Vec<String> = (0..len).map(|i| format!("s{i}")).collect();
        let transitions = (0..len - 1)
            .map(|i| Transition::new(format!("s{i}"), format!("s{}", i + 1), format!("e{i}")))
            .collect();
        Configuration {
            name,
            version: "v1".to_string(),
            starting_state: states[0].clone(),
            states,
            transitions,
        }
    })
}

/// Event names drawn from a chain's events plus a few that never match
pub fn event_name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        (0usize..8).prop_map(|i| format!("e{i}")),
        Just("bogus".to_string()),
        Just(String::new()),
    ]
}

pub fn event_sequence_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(event_name_strategy(), 0..20)
}

/// Optional free-form text, `Some("")` included
pub fn optional_text_strategy() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some(String::new())),
        ".{0,24}".prop_map(Some),
    ]
}

/// Timestamps between 1970 and 2200 with nanosecond precision
pub fn timestamp_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..7_258_118_400, 0u32..1_000_000_000)
        .prop_filter_map("out of range", |(secs, nanos)| DateTime::from_timestamp(secs, nanos))
}

pub fn event_strategy() -> impl Strategy<Value = Event> {
    (
        optional_text_strategy(),
        prop::option::of(timestamp_strategy()),
        (identifier_strategy(), identifier_strategy(), identifier_strategy()),
        optional_text_strategy(),
        optional_text_strategy(),
    )
        .prop_map(|(event_id, timestamp, (from, to, name), originator, details)| Event {
            event_id,
            timestamp,
            transition: Transition::new(from, to, name),
            originator,
            details,
        })
}
