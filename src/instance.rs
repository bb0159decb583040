//! Protocol instance: one parameter set, one engine instantiation, one
//! prover/verifier pair, and the round state machine that drives them.
//!
//! A round is the atomic unit of progress: commit, challenge, answer,
//! verify. Once begun it runs to completion without preemption. Convergence
//! is a one-way latch: when the impersonation probability reaches the
//! security threshold the instance deactivates itself and never reactivates.

use std::rc::Rc;

use crate::error::OrchestratorError;
use crate::host::HostBinding;
use crate::engine::{
    ParameterSetDescriptor, PrivateKeyHandle, ProofHandle, ProtocolEngine, PublicKeyHandle,
    VerificationHandle,
};
use crate::host::HashRole;
use crate::telemetry::TelemetryCounters;

/// Fixed security threshold: 2^-30.
///
/// An impersonator's chance of having passed every round must drop to or
/// below this bound before an instance is considered done.
pub const SECURITY_THRESHOLD: f64 = 1.0 / 1_073_741_824.0;

/// Observable state of the per-instance round machine.
///
/// The transient `RoundOk` state of the protocol loops straight back to
/// `Idle` and is reported through [`RoundOutcome::Ok`] instead of being
/// stored.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RoundState {
    Idle,
    RoundInProgress,
    /// Terminal: verification rejected an honest answer
    RoundFailed,
    /// Terminal: the impersonation probability reached the threshold
    Converged,
}

/// Tagged result of running one round, the scheduler's fault boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum RoundOutcome {
    /// The round verified; the instance keeps going
    Ok,
    /// The round verified and fired the convergence latch
    Converged,
    /// The round failed; terminal for this instance only
    Failed(OrchestratorError),
}

/// One protocol instance: engine, keys, live contexts, telemetry, lifecycle
/// flags. Created once per discovered parameter set, never destroyed during
/// a session.
pub struct Instance {
    descriptor: ParameterSetDescriptor,
    engine: Box<dyn ProtocolEngine>,
    binding: Rc<HostBinding>,
    #[allow(dead_code)]
    private_key: PrivateKeyHandle,
    #[allow(dead_code)]
    public_key: PublicKeyHandle,
    proof: ProofHandle,
    verification: VerificationHandle,
    telemetry: TelemetryCounters,
    round_count: u64,
    last_probability: f64,
    state: RoundState,
    active: bool,
    converged: bool,
}

impl Instance {
    /// Builds a ready-to-run instance: derives the key pair, seeds the proof
    /// and verification contexts, and zeroes telemetry.
    pub fn new(
        mut engine: Box<dyn ProtocolEngine>,
        binding: Rc<HostBinding>,
    ) -> Result<Self, OrchestratorError> {
        let descriptor = engine.descriptor().clone();
        let private_key = engine.generate_private_key()?;
        let public_key = engine.compute_public_key(private_key)?;
        let proof = engine.new_proof(private_key)?;
        let verification = engine.new_verification(public_key)?;

        Ok(Self {
            descriptor,
            engine,
            binding,
            private_key,
            public_key,
            proof,
            verification,
            telemetry: TelemetryCounters::zeroed(),
            round_count: 0,
            last_probability: 1.0,
            state: RoundState::Idle,
            active: true,
            converged: false,
        })
    }

    /// Executes exactly one round. Any failure is absorbed into
    /// [`RoundOutcome::Failed`] and terminates this instance without
    /// touching any other.
    pub fn run_round(&mut self) -> RoundOutcome {
        self.state = RoundState::RoundInProgress;

        if let Err(err) = self.execute_round() {
            self.state = RoundState::RoundFailed;
            self.active = false;
            self.refresh_telemetry();
            return RoundOutcome::Failed(err);
        }

        self.round_count += 1;

        let probability = match self.engine.impersonation_probability(self.verification) {
            Ok(p) => p,
            Err(err) => {
                self.state = RoundState::RoundFailed;
                self.active = false;
                return RoundOutcome::Failed(err.into());
            }
        };
        // The protocol guarantees a non-increasing bound.
        debug_assert!(probability <= self.last_probability);
        self.last_probability = probability;

        self.refresh_telemetry();

        if probability <= SECURITY_THRESHOLD && !self.converged {
            // One-way latch; fires exactly once.
            self.converged = true;
            self.active = false;
            self.state = RoundState::Converged;
            return RoundOutcome::Converged;
        }

        if self.converged {
            // A round was triggered after the latch fired; do not re-fire
            // convergence side effects.
            self.state = RoundState::Converged;
        } else {
            self.state = RoundState::Idle;
        }
        RoundOutcome::Ok
    }

    /// The commit → challenge → answer → verify cycle.
    fn execute_round(&mut self) -> Result<(), OrchestratorError> {
        let commitment = self.engine.begin_round(self.proof, HashRole::Prover)?;
        self.telemetry.add_prover_bytes(self.engine.commitment_size() as u64);

        let question = self.engine.choose_question(self.verification)?;
        // The challenge is a single selector value.
        self.telemetry.add_verifier_bytes(1);

        let answer = self.engine.get_answer(self.proof, question, HashRole::Prover)?;
        self.telemetry.add_prover_bytes(self.engine.answer_size(question) as u64);

        let verified =
            self.engine
                .verify(self.verification, commitment, answer, HashRole::Verifier)?;
        if !verified {
            return Err(OrchestratorError::Integrity {
                instance: self.descriptor.display_name.clone(),
                round: self.round_count + 1,
            });
        }
        Ok(())
    }

    fn refresh_telemetry(&mut self) {
        self.telemetry.set_hash_invocations(
            self.binding.hash_invocations(HashRole::Prover),
            self.binding.hash_invocations(HashRole::Verifier),
        );
    }

    pub fn descriptor(&self) -> &ParameterSetDescriptor {
        &self.descriptor
    }

    pub fn telemetry(&self) -> &TelemetryCounters {
        &self.telemetry
    }

    pub fn round_count(&self) -> u64 {
        self.round_count
    }

    /// The most recent impersonation-probability bound (1.0 before any
    /// round).
    pub fn impersonation_probability(&self) -> f64 {
        self.last_probability
    }

    pub fn memory_footprint(&self) -> usize {
        self.engine.memory_footprint()
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn failed(&self) -> bool {
        self.state == RoundState::RoundFailed
    }
}
