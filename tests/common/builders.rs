//! Test data builders for configurations, instances and event requests.

#![allow(dead_code)]

use std::sync::Arc;

use statemachine::models::{Configuration, Event, EventRequest, FiniteStateMachine, Transition};
use statemachine::state_machine;
use statemachine::storage::{InMemoryStore, StoreService};

/// Builder for test configurations; defaults to the `orders:v2` schema
pub struct ConfigurationBuilder {
    name: String,
    version: String,
    states: Vec<String>,
    transitions: Vec<Transition>,
    starting_state: String,
}

impl Default for ConfigurationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationBuilder {
    pub fn new() -> Self {
        Self {
            name: "orders".to_string(),
            version: "v2".to_string(),
            states: vec![
                "start".to_string(),
                "shipping".to_string(),
                "delivered".to_string(),
            ],
            transitions: vec![
                Transition::new("start", "shipping", "ship"),
                Transition::new("shipping", "delivered", "deliver"),
            ],
            starting_state: "start".to_string(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn with_states(mut self, states: &[&str]) -> Self {
        self.states = states.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_transition(mut self, from: &str, to: &str, event: &str) -> Self {
        self.transitions.push(Transition::new(from, to, event));
        self
    }

    pub fn clear_transitions(mut self) -> Self {
        self.transitions.clear();
        self
    }

    pub fn with_starting_state(mut self, state: &str) -> Self {
        self.starting_state = state.to_string();
        self
    }

    pub fn build(self) -> Configuration {
        Configuration {
            name: self.name,
            version: self.version,
            states: self.states,
            transitions: self.transitions,
            starting_state: self.starting_state,
        }
    }
}

/// The `orders:v2` schema: start -ship-> shipping -deliver-> delivered
pub fn orders_config() -> Configuration {
    ConfigurationBuilder::new().build()
}

/// Two states toggled by the same event, so concurrent events commute
pub fn switch_config() -> Configuration {
    ConfigurationBuilder::new()
        .with_name("switch")
        .with_version("v1")
        .with_states(&["off", "on"])
        .with_starting_state("off")
        .clear_transitions()
        .with_transition("off", "on", "toggle")
        .with_transition("on", "off", "toggle")
        .build()
}

pub fn event_request(event: &str, config: &str, id: &str) -> EventRequest {
    EventRequest::new(Event::named(event), config, id)
}

/// Store `config` and create instance `id` in its starting state, indexed
pub async fn create_instance(
    store: &dyn StoreService,
    config: &Configuration,
    id: &str,
) -> FiniteStateMachine {
    let fsm = state_machine::new_instance(config).expect("valid configuration");
    store
        .create_instance(id, &fsm)
        .await
        .expect("Failed to create instance");
    fsm
}

/// In-memory store holding `orders:v2` and instance `ord-1`
pub async fn seeded_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    let config = orders_config();
    store
        .put_config(&config)
        .await
        .expect("Failed to store configuration");
    create_instance(store.as_ref(), &config, "ord-1").await;
    store
}
