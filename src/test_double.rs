//! Deterministic scripted engine used by unit tests.
//!
//! Drives the orchestration core without randomness: a fixed challenge, a
//! scripted probability schedule, and an optional verification failure on a
//! chosen round.

use crate::error::EngineError;
use crate::host::HashRole;
use crate::engine::{
    AnswerHandle, CommitmentHandle, ParameterSetDescriptor, PrivateKeyHandle, ProofHandle,
    ProtocolEngine, PublicKeyHandle, VerificationHandle,
};

pub(crate) struct ScriptedEngine {
    descriptor: ParameterSetDescriptor,
    probability: f64,
    decay: f64,
    fail_at_round: Option<u64>,
    rounds_attempted: u64,
    round_open: bool,
    answered: bool,
    memory: usize,
}

impl ScriptedEngine {
    /// Probability halves every round starting at 2^-1 after round one.
    pub(crate) fn halving() -> Self {
        Self::with_decay(0.5)
    }

    pub(crate) fn with_decay(decay: f64) -> Self {
        Self {
            descriptor: ParameterSetDescriptor {
                id: "scripted".to_string(),
                display_name: "Scripted".to_string(),
                key_space_log2: 20,
            },
            probability: 1.0,
            decay,
            fail_at_round: None,
            rounds_attempted: 0,
            round_open: false,
            answered: false,
            memory: 65_536,
        }
    }

    /// Injects a verification failure on the given 1-based round.
    pub(crate) fn failing_at_round(mut self, round: u64) -> Self {
        self.fail_at_round = Some(round);
        self
    }
}

impl ProtocolEngine for ScriptedEngine {
    fn descriptor(&self) -> &ParameterSetDescriptor {
        &self.descriptor
    }

    fn generate_private_key(&mut self) -> Result<PrivateKeyHandle, EngineError> {
        Ok(PrivateKeyHandle(0))
    }

    fn compute_public_key(
        &mut self,
        _private_key: PrivateKeyHandle,
    ) -> Result<PublicKeyHandle, EngineError> {
        Ok(PublicKeyHandle(0))
    }

    fn new_proof(&mut self, _private_key: PrivateKeyHandle) -> Result<ProofHandle, EngineError> {
        Ok(ProofHandle(0))
    }

    fn new_verification(
        &mut self,
        _public_key: PublicKeyHandle,
    ) -> Result<VerificationHandle, EngineError> {
        Ok(VerificationHandle(0))
    }

    fn begin_round(
        &mut self,
        _proof: ProofHandle,
        _role: HashRole,
    ) -> Result<CommitmentHandle, EngineError> {
        self.round_open = true;
        self.answered = false;
        Ok(CommitmentHandle(0))
    }

    fn commitment_size(&self) -> usize {
        448
    }

    fn choose_question(
        &mut self,
        _verification: VerificationHandle,
    ) -> Result<u32, EngineError> {
        Ok(1)
    }

    fn get_answer(
        &mut self,
        _proof: ProofHandle,
        _question: u32,
        _role: HashRole,
    ) -> Result<AnswerHandle, EngineError> {
        if !self.round_open {
            return Err(EngineError::NoRoundInProgress);
        }
        if self.answered {
            return Err(EngineError::AlreadyAnswered);
        }
        self.answered = true;
        Ok(AnswerHandle(0))
    }

    fn answer_size(&self, _question: u32) -> usize {
        260
    }

    fn verify(
        &mut self,
        _verification: VerificationHandle,
        _commitment: CommitmentHandle,
        _answer: AnswerHandle,
        _role: HashRole,
    ) -> Result<bool, EngineError> {
        self.rounds_attempted += 1;
        self.round_open = false;
        if self.fail_at_round == Some(self.rounds_attempted) {
            return Ok(false);
        }
        self.probability *= self.decay;
        Ok(true)
    }

    fn impersonation_probability(
        &self,
        _verification: VerificationHandle,
    ) -> Result<f64, EngineError> {
        Ok(self.probability)
    }

    fn memory_footprint(&self) -> usize {
        self.memory
    }
}
