#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, gRPC in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Statemachine
//!
//! A networked finite-state-machine execution service. Clients register
//! versioned FSM configurations, create instances bound to a configuration
//! version and drive them with events. Every event is applied atomically:
//! the transition is validated, the instance state advances, the event is
//! appended to the instance history and an outcome is recorded for later
//! lookup.
//!
//! ## Architecture
//!
//! Events arrive over gRPC (`SendEvent`) or from an ingress queue and meet in
//! a single in-process channel. One listener drains it through the store's
//! atomic `process_event`; failure outcomes are optionally republished to a
//! dead-letter queue.
//!
//! ## Module Organization
//!
//! - [`keyspace`] - Key derivation for every stored entity
//! - [`codec`] - Binary (protobuf) records and JSON queue payloads
//! - [`models`] - Configurations, instances, events and outcomes
//! - [`state_machine`] - Validation and transition evaluation
//! - [`storage`] - Redis and in-memory stores with the atomic transition
//! - [`events`] - In-process channels
//! - [`messaging`] - pgmq and in-memory queues
//! - [`worker`] - Listener, queue subscriber and error publisher
//! - [`grpc`] - tonic server for `statemachine.v1.StatemachineService`
//! - [`bootstrap`] - Process wiring and ordered shutdown
//! - [`config`] / [`logging`] / [`error`] - Ambient concerns
//!
//! ## Quick Start
//!
//! ```rust
//! use statemachine::models::{Configuration, Event, Transition};
//! use statemachine::state_machine;
//!
//! let config = Configuration {
//!     name: "orders".to_string(),
//!     version: "v2".to_string(),
//!     states: vec!["start".to_string(), "shipping".to_string()],
//!     transitions: vec![Transition::new("start", "shipping", "ship")],
//!     starting_state: "start".to_string(),
//! };
//!
//! let mut fsm = state_machine::new_instance(&config).unwrap();
//! state_machine::apply(&mut fsm, &config, &Event::named("ship")).unwrap();
//! assert_eq!(fsm.state, "shipping");
//! ```

pub mod bootstrap;
pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod grpc;
pub mod keyspace;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod proto;
pub mod state_machine;
pub mod storage;
pub mod worker;

pub use bootstrap::{ServiceBootstrap, ServiceHandle};
pub use config::{ConfigLoader, ServiceConfig};
pub use error::{StatemachineError, StatemachineResult};
pub use models::{
    Configuration, Event, EventOutcome, EventRequest, FiniteStateMachine, OutcomeCode, Transition,
};
pub use storage::{StoreError, StoreService};
