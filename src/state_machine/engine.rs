//! Configuration validation and transition evaluation.
//!
//! All functions are pure over in-memory records; persistence and
//! concurrency control live in [`crate::storage`].

use std::collections::HashSet;

use tracing::trace;

use super::errors::{StateMachineError, StateMachineResult};
use crate::keyspace;
use crate::models::{Configuration, Event, FiniteStateMachine};

/// Return the first invariant `config` violates.
///
/// Checked in order: name, version, reserved separators, non-empty states,
/// duplicate states, starting state present and declared, transitions over
/// declared states, every state used by some transition.
pub fn validate(config: &Configuration) -> StateMachineResult<()> {
    if config.name.is_empty() {
        return Err(StateMachineError::MissingName);
    }
    if config.version.is_empty() {
        return Err(StateMachineError::MissingVersion);
    }
    if !keyspace::is_valid_identifier(&config.name) {
        return Err(StateMachineError::ReservedCharacters {
            field: "name",
            value: config.name.clone(),
        });
    }
    if !keyspace::is_valid_identifier(&config.version) {
        return Err(StateMachineError::ReservedCharacters {
            field: "version",
            value: config.version.clone(),
        });
    }
    if config.states.is_empty() {
        return Err(StateMachineError::EmptyStates);
    }

    let mut declared = HashSet::with_capacity(config.states.len());
    for state in &config.states {
        if !keyspace::is_valid_identifier(state) {
            return Err(StateMachineError::ReservedCharacters {
                field: "state",
                value: state.clone(),
            });
        }
        if !declared.insert(state.as_str()) {
            return Err(StateMachineError::DuplicateState {
                state: state.clone(),
            });
        }
    }

    if config.starting_state.is_empty() {
        return Err(StateMachineError::MissingStartingState);
    }
    if !declared.contains(config.starting_state.as_str()) {
        return Err(StateMachineError::StartingStateNotFound {
            state: config.starting_state.clone(),
        });
    }

    let mut used = HashSet::with_capacity(config.states.len());
    for transition in &config.transitions {
        for endpoint in [&transition.from, &transition.to] {
            if !declared.contains(endpoint.as_str()) {
                return Err(StateMachineError::UnknownTransitionState {
                    event: transition.event.clone(),
                    state: endpoint.clone(),
                });
            }
            used.insert(endpoint.as_str());
        }
    }

    if let Some(state) = config.states.iter().find(|s| !used.contains(s.as_str())) {
        return Err(StateMachineError::UnreachableState {
            state: state.clone(),
        });
    }

    Ok(())
}

/// Create an instance bound to `config`, in its starting state with no history
pub fn new_instance(config: &Configuration) -> StateMachineResult<FiniteStateMachine> {
    if config.name.is_empty() {
        return Err(StateMachineError::MissingName);
    }
    if config.version.is_empty() {
        return Err(StateMachineError::MissingVersion);
    }

    Ok(FiniteStateMachine {
        config_id: config.version_id(),
        state: config.starting_state.clone(),
        history: Vec::new(),
    })
}

/// Apply `event` to `fsm`.
///
/// The first transition in declaration order leaving the current state on
/// `event.transition.event` wins. On success a copy of the event with `from`
/// and `to` filled in is appended to the history and returned; the caller's
/// event is left untouched. On failure `fsm` is not modified.
pub fn apply(
    fsm: &mut FiniteStateMachine,
    config: &Configuration,
    event: &Event,
) -> StateMachineResult<Event> {
    let name = event.event_name();
    let transition = config
        .transitions
        .iter()
        .find(|t| t.from == fsm.state && t.event == name)
        .ok_or_else(|| StateMachineError::transition_not_allowed(&fsm.state, name))?;

    let mut applied = event.clone();
    applied.transition.from = transition.from.clone();
    applied.transition.to = transition.to.clone();

    trace!(
        config_id = %fsm.config_id,
        event = %name,
        from = %transition.from,
        to = %transition.to,
        "Transition applied"
    );

    fsm.state = transition.to.clone();
    fsm.history.push(applied.clone());
    Ok(applied)
}

/// Return `fsm` to the configuration's starting state and clear its history
pub fn reset(fsm: &mut FiniteStateMachine, config: &Configuration) {
    fsm.state = config.starting_state.clone();
    fsm.history.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Transition;

    fn orders() -> Configuration {
        Configuration {
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

    #[test]
    fn test_valid_configuration() {
        assert_eq!(validate(&orders()), Ok(()));
    }

    #[test]
    fn test_validation_order() {
        let mut config = orders();
        config.name.clear();
        config.states.clear();
        assert_eq!(validate(&config), Err(StateMachineError::MissingName));

        let mut config = orders();
        config.version.clear();
        assert_eq!(validate(&config), Err(StateMachineError::MissingVersion));

        let mut config = orders();
        config.states.clear();
        config.starting_state.clear();
        assert_eq!(validate(&config), Err(StateMachineError::EmptyStates));
    }

    #[test]
    fn test_reserved_separators_rejected() {
        let mut config = orders();
        config.name = "orders:eu".to_string();
        assert!(matches!(
            validate(&config),
            Err(StateMachineError::ReservedCharacters { field: "name", .. })
        ));

        let mut config = orders();
        config.version = "v#2".to_string();
        assert!(matches!(
            validate(&config),
            Err(StateMachineError::ReservedCharacters { field: "version", .. })
        ));

        let mut config = orders();
        config.states[2] = "a#b".to_string();
        config.transitions[1].to = "a#b".to_string();
        assert_eq!(
            validate(&config),
            Err(StateMachineError::ReservedCharacters {
                field: "state",
                value: "a#b".to_string(),
            })
        );

        let mut config = orders();
        config.states.push(String::new());
        assert!(matches!(
            validate(&config),
            Err(StateMachineError::ReservedCharacters { field: "state", .. })
        ));
    }

    #[test]
    fn test_duplicate_state_rejected() {
        let mut config = orders();
        config.states.push("start".to_string());
        assert_eq!(
            validate(&config),
            Err(StateMachineError::DuplicateState {
                state: "start".to_string()
            })
        );
    }

    #[test]
    fn test_starting_state_checks() {
        let mut config = orders();
        config.starting_state.clear();
        assert_eq!(validate(&config), Err(StateMachineError::MissingStartingState));

        let mut config = orders();
        config.starting_state = "pending".to_string();
        assert!(matches!(
            validate(&config),
            Err(StateMachineError::StartingStateNotFound { .. })
        ));
    }

    #[test]
    fn test_transition_to_unknown_state_rejected() {
        let mut config = orders();
        config
            .transitions
            .push(Transition::new("delivered", "returned", "return"));
        assert_eq!(
            validate(&config),
            Err(StateMachineError::UnknownTransitionState {
                event: "return".to_string(),
                state: "returned".to_string()
            })
        );
    }

    #[test]
    fn test_unreachable_state_rejected() {
        let mut config = orders();
        config.states.push("lost".to_string());
        assert_eq!(
            validate(&config),
            Err(StateMachineError::UnreachableState {
                state: "lost".to_string()
            })
        );
    }

    #[test]
    fn test_new_instance() {
        let fsm = new_instance(&orders()).unwrap();
        assert_eq!(fsm.config_id, "orders:v2");
        assert_eq!(fsm.state, "start");
        assert!(fsm.history.is_empty());

        let mut unnamed = orders();
        unnamed.name.clear();
        assert_eq!(new_instance(&unnamed), Err(StateMachineError::MissingName));
    }

    #[test]
    fn test_apply_fills_endpoints_and_keeps_caller_event() {
        let config = orders();
        let mut fsm = new_instance(&config).unwrap();
        let event = Event::named("ship");

        let applied = apply(&mut fsm, &config, &event).unwrap();

        assert_eq!(fsm.state, "shipping");
        assert_eq!(applied.transition, Transition::new("start", "shipping", "ship"));
        assert_eq!(fsm.history, vec![applied]);
        assert!(event.transition.from.is_empty());
        assert!(event.transition.to.is_empty());
    }

    #[test]
    fn test_apply_disallowed_leaves_instance_untouched() {
        let config = orders();
        let mut fsm = new_instance(&config).unwrap();
        let before = fsm.clone();

        let err = apply(&mut fsm, &config, &Event::named("deliver")).unwrap_err();

        assert_eq!(
            err,
            StateMachineError::transition_not_allowed("start", "deliver")
        );
        assert!(!err.is_validation());
        assert_eq!(fsm, before);
    }

    #[test]
    fn test_first_declared_transition_wins() {
        let mut config = orders();
        config.states.push("cancelled".to_string());
        config
            .transitions
            .push(Transition::new("start", "cancelled", "ship"));
        let mut fsm = new_instance(&config).unwrap();

        let applied = apply(&mut fsm, &config, &Event::named("ship")).unwrap();
        assert_eq!(applied.transition.to, "shipping");
    }

    #[test]
    fn test_reset() {
        let config = orders();
        let mut fsm = new_instance(&config).unwrap();
        apply(&mut fsm, &config, &Event::named("ship")).unwrap();

        reset(&mut fsm, &config);
        assert_eq!(fsm.state, "start");
        assert!(fsm.history.is_empty());
    }
}
