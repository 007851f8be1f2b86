use serde::{Deserialize, Serialize};

use super::Event;
use crate::keyspace;

/// A running machine bound to one configuration version
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiniteStateMachine {
    /// `version_id` of the bound configuration
    #[serde(default)]
    pub config_id: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub history: Vec<Event>,
}

impl FiniteStateMachine {
    /// Configuration name this instance is indexed under
    pub fn config_name(&self) -> &str {
        keyspace::name_from_version_id(&self.config_id)
    }

    pub fn last_event(&self) -> Option<&Event> {
        self.history.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_name_from_config_id() {
        let fsm = FiniteStateMachine {
            config_id: "orders:v2".to_string(),
            state: "start".to_string(),
            history: vec![],
        };
        assert_eq!(fsm.config_name(), "orders");
        assert!(fsm.last_event().is_none());
    }
}
