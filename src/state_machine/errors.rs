use thiserror::Error;

/// Errors raised while validating a configuration or evaluating a transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateMachineError {
    #[error("configuration name is missing")]
    MissingName,

    #[error("configuration version is missing")]
    MissingVersion,

    #[error("{field} '{value}' contains a reserved separator (':' or '#')")]
    ReservedCharacters { field: &'static str, value: String },

    #[error("configuration declares no states")]
    EmptyStates,

    #[error("state '{state}' is declared more than once")]
    DuplicateState { state: String },

    #[error("starting state is missing")]
    MissingStartingState,

    #[error("starting state '{state}' is not one of the declared states")]
    StartingStateNotFound { state: String },

    #[error("transition '{event}' references unknown state '{state}'")]
    UnknownTransitionState { event: String, state: String },

    #[error("state '{state}' is not used by any transition")]
    UnreachableState { state: String },

    #[error("event '{event}' is not allowed in state '{state}'")]
    TransitionNotAllowed { state: String, event: String },
}

impl StateMachineError {
    pub fn transition_not_allowed(state: impl Into<String>, event: impl Into<String>) -> Self {
        Self::TransitionNotAllowed {
            state: state.into(),
            event: event.into(),
        }
    }

    /// True for schema violations, false for transition evaluation failures
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::TransitionNotAllowed { .. })
    }
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
