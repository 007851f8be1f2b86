//! Property-based checks of the engine and the store's state index

mod common;

use common::strategies::{
    chain_config_strategy, event_sequence_strategy, event_strategy, identifier_strategy,
};
use proptest::prelude::*;
use statemachine::codec::BinaryRecord;
use statemachine::keyspace;
use statemachine::models::{Configuration, Event, FiniteStateMachine};
use statemachine::proto::v1 as proto;
use statemachine::state_machine;
use statemachine::storage::{InMemoryStore, StoreService};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn generated_chains_are_valid(config in chain_config_strategy()) {
        prop_assert!(state_machine::validate(&config).is_ok());
    }

    #[test]
    fn history_grows_only_on_accepted_events(
        config in chain_config_strategy(),
        events in event_sequence_strategy(),
    ) {
        let mut fsm = state_machine::new_instance(&config).unwrap();
        let mut accepted = 0usize;

        for name in &events {
            let before = fsm.clone();
            match state_machine::apply(&mut fsm, &config, &Event::named(name.as_str())) {
                Ok(applied) => {
                    accepted += 1;
                    prop_assert_eq!(&applied.transition.from, &before.state);
                    prop_assert_eq!(&applied.transition.to, &fsm.state);
                    prop_assert_eq!(&fsm.history[..before.history.len()], &before.history[..]);
                }
                Err(_) => prop_assert_eq!(&fsm, &before),
            }
            prop_assert!(config.has_state(&fsm.state));
        }

        prop_assert_eq!(fsm.history.len(), accepted);
    }

    #[test]
    fn history_replays_to_current_state(
        config in chain_config_strategy(),
        events in event_sequence_strategy(),
    ) {
        let mut fsm = state_machine::new_instance(&config).unwrap();
        for name in &events {
            let _ = state_machine::apply(&mut fsm, &config, &Event::named(name.as_str()));
        }

        let mut replay = state_machine::new_instance(&config).unwrap();
        for event in fsm.history.clone() {
            state_machine::apply(&mut replay, &config, &event).unwrap();
        }
        prop_assert_eq!(replay.state, fsm.state);
    }

    #[test]
    fn version_id_splits_back_to_name(
        name in identifier_strategy(),
        version in identifier_strategy(),
    ) {
        let version_id = keyspace::version_id(&name, &version);
        prop_assert_eq!(keyspace::name_from_version_id(&version_id), name.as_str());
    }

    #[test]
    fn binary_form_preserves_instances(
        config in chain_config_strategy(),
        events in event_sequence_strategy(),
    ) {
        let mut fsm = state_machine::new_instance(&config).unwrap();
        for name in &events {
            let _ = state_machine::apply(&mut fsm, &config, &Event::named(name.as_str()));
        }
        let decoded = FiniteStateMachine::decode_binary(&fsm.encode_binary()).unwrap();
        prop_assert_eq!(decoded, fsm);
    }

    #[test]
    fn events_survive_the_wire_form(event in event_strategy()) {
        let wire = proto::Event::from(event.clone());
        prop_assert_eq!(Event::try_from(wire).unwrap(), event.clone());

        let decoded = Event::decode_binary(&event.encode_binary()).unwrap();
        prop_assert_eq!(decoded, event);
    }

    #[test]
    fn instance_sits_in_exactly_one_state_set(
        config in chain_config_strategy(),
        events in event_sequence_strategy(),
    ) {
        let rt = runtime();
        let result: Result<(), TestCaseError> = rt.block_on(async {
            let store = InMemoryStore::new();
            store.put_config(&config).await.unwrap();
            let fsm = state_machine::new_instance(&config).unwrap();
            store.create_instance("i-1", &fsm).await.unwrap();

            for name in &events {
                let _ = store
                    .process_event("i-1", &config.name, &Event::named(name.as_str()))
                    .await;
            }

            let current = store.get_instance("i-1", &config.name).await.unwrap();
            for state in &config.states {
                let members = store.list_instances_in_state(&config.name, state).await.unwrap();
                let expected = usize::from(*state == current.state);
                prop_assert_eq!(members.len(), expected, "state {}", state);
            }
            Ok(())
        });
        result?;
    }
}

#[test]
fn chain_reaches_final_state_in_order() {
    let config = Configuration {
        name: "chain".to_string(),
        version: "v1".to_string(),
        states: vec!["s0".into(), "s1".into(), "s2".into()],
        transitions: vec![
            statemachine::models::Transition::new("s0", "s1", "e0"),
            statemachine::models::Transition::new("s1", "s2", "e1"),
        ],
        starting_state: "s0".to_string(),
    };
    let mut fsm = state_machine::new_instance(&config).unwrap();
    for name in ["e1", "e0", "e0", "e1"] {
        let _ = state_machine::apply(&mut fsm, &config, &Event::named(name));
    }
    assert_eq!(fsm.state, "s2");
    assert_eq!(fsm.history.len(), 2);
}
