//! Error taxonomy for the orchestration core.
//!
//! Three classes of failure exist, and none of them is retryable:
//! - Protocol integrity failures: verification rejected an honestly produced
//!   answer. Fatal for the affected instance only.
//! - Initialization failures: the crypto provider or the engine module never
//!   became ready. Fatal for the whole session.
//! - Discovery anomalies: an empty or unstable parameter-set manifest.
//!
//! Every failure here is evidence of a defect, not a transient condition,
//! so no error in this module carries retry semantics.

use thiserror::Error;

/// Errors raised by a protocol engine instantiation at its call boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A handle did not resolve to live engine state
    #[error("unknown engine handle {0}")]
    UnknownHandle(u32),

    /// A question selector outside the valid range `0..=d`
    #[error("question {question} out of range (d = {d})")]
    QuestionOutOfRange {
        /// The rejected selector
        question: u32,
        /// The parameter set's round depth
        d: u32,
    },

    /// `get_answer` was called twice without an intervening `begin_round`
    #[error("round already answered; begin a new round first")]
    AlreadyAnswered,

    /// A round operation was invoked before `begin_round`
    #[error("no round in progress")]
    NoRoundInProgress,

    /// The module manifest does not contain the requested parameter set
    #[error("unknown parameter set '{0}'")]
    UnknownParameterSet(String),
}

/// Top-level error type for the orchestrator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    /// Verification rejected an honestly produced answer. This must never
    /// happen between honest parties; it indicates engine or memory
    /// corruption and terminates the affected instance.
    #[error("protocol integrity failure: instance '{instance}' rejected at round {round}")]
    Integrity {
        /// Display name of the affected parameter set
        instance: String,
        /// The round on which verification rejected
        round: u64,
    },

    /// The crypto provider or the engine module failed to become ready.
    /// Nothing can proceed without both.
    #[error("initialization failure: {0}")]
    Initialization(String),

    /// No parameter sets were discovered, or the discovery order is unstable.
    #[error("parameter set discovery anomaly: {0}")]
    Discovery(String),

    /// An engine call failed inside a round. Isolated to the instance that
    /// issued the call.
    #[error("engine fault: {0}")]
    Engine(#[from] EngineError),
}

impl OrchestratorError {
    /// Returns true if this error terminates the whole session rather than a
    /// single instance.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Initialization(_) | OrchestratorError::Discovery(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_failures_do_not_kill_the_session() {
        assert!(!OrchestratorError::Integrity { instance: "S41".to_string(), round: 7 }
            .is_session_fatal());
        assert!(!OrchestratorError::Engine(EngineError::AlreadyAnswered).is_session_fatal());
    }

    #[test]
    fn init_and_discovery_failures_are_session_fatal() {
        assert!(OrchestratorError::Initialization("provider self-test failed".to_string())
            .is_session_fatal());
        assert!(OrchestratorError::Discovery("empty manifest".to_string()).is_session_fatal());
    }

    #[test]
    fn integrity_error_names_the_instance_and_round() {
        let err = OrchestratorError::Integrity { instance: "3x3x3".to_string(), round: 12 };
        let msg = err.to_string();
        assert!(msg.contains("3x3x3"));
        assert!(msg.contains("12"));
    }
}
