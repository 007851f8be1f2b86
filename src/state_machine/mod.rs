//! # FSM Engine
//!
//! Validation of versioned configurations, instance creation and transition
//! evaluation with an append-only history.

pub mod engine;
pub mod errors;

pub use engine::{apply, new_instance, reset, validate};
pub use errors::{StateMachineError, StateMachineResult};
