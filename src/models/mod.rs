//! # Domain Models
//!
//! Records the service persists and passes between components:
//!
//! - [`Configuration`]: an immutable, versioned FSM schema
//! - [`FiniteStateMachine`]: a running instance bound to one configuration version
//! - [`Event`]: a transition request, appended to the instance history once applied
//! - [`EventRequest`]: the unit carried on the event channel
//! - [`EventOutcome`]: the durable result of processing one event
//!
//! All records derive serde for the JSON queue form; the binary store form
//! goes through [`crate::proto`] and [`crate::codec`].

pub mod configuration;
pub mod event;
pub mod finite_state_machine;
pub mod outcome;

pub use configuration::{Configuration, Transition};
pub use event::{Event, EventRequest};
pub use finite_state_machine::FiniteStateMachine;
pub use outcome::{EventOutcome, OutcomeCode};
