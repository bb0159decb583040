//! Abstract contract of a protocol engine instantiation.
//!
//! One engine instantiation exists per parameter set, each with its own
//! isolated memory region; engine state is never shared across sets. The
//! orchestration core drives the engine exclusively through this trait and
//! treats every handle as opaque.
//!
//! Calls that can invoke the keyed hash take an explicit [`HashRole`] so the
//! host can attribute the invocation to the correct telemetry bucket.

use serde::Serialize;

use crate::error::EngineError;
use crate::host::HashRole;

/// Immutable description of one parameter set, discovered once at startup.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParameterSetDescriptor {
    /// Stable identifier (manifest key, deterministic sort order)
    pub id: String,
    /// Human-readable display name
    pub display_name: String,
    /// Size of the key space in bits (log2)
    pub key_space_log2: u32,
}

impl ParameterSetDescriptor {
    /// Derived security exponent: `1 + bits / 2`.
    ///
    /// A key space of 2^k permits a birthday-style attack in roughly 2^(k/2)
    /// operations, so the exponent reflects the effective security level.
    pub fn security_exponent(&self) -> f64 {
        1.0 + self.key_space_log2 as f64 / 2.0
    }
}

/// Opaque private-key handle, owned exclusively by one instance.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PrivateKeyHandle(pub(crate) u32);

/// Opaque public-key handle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyHandle(pub(crate) u32);

/// Opaque prover-side protocol context.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ProofHandle(pub(crate) u32);

/// Opaque verifier-side protocol context.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VerificationHandle(pub(crate) u32);

/// Opaque commitment artifact produced by `begin_round`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CommitmentHandle(pub(crate) u32);

/// Opaque answer artifact produced by `get_answer`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AnswerHandle(pub(crate) u32);

/// The identification-protocol primitives exposed by one engine
/// instantiation.
pub trait ProtocolEngine {
    /// The parameter set this instantiation was built for.
    fn descriptor(&self) -> &ParameterSetDescriptor;

    /// Derives a fresh private key. Consumes host randomness.
    fn generate_private_key(&mut self) -> Result<PrivateKeyHandle, EngineError>;

    /// Computes the public key as a deterministic function of the private
    /// key.
    fn compute_public_key(
        &mut self,
        private_key: PrivateKeyHandle,
    ) -> Result<PublicKeyHandle, EngineError>;

    /// Creates a prover-side proof context seeded from the private key.
    fn new_proof(&mut self, private_key: PrivateKeyHandle) -> Result<ProofHandle, EngineError>;

    /// Creates a verifier-side verification context seeded from the public
    /// key.
    fn new_verification(
        &mut self,
        public_key: PublicKeyHandle,
    ) -> Result<VerificationHandle, EngineError>;

    /// Starts a new round, producing the commitment artifact.
    fn begin_round(
        &mut self,
        proof: ProofHandle,
        role: HashRole,
    ) -> Result<CommitmentHandle, EngineError>;

    /// Wire size of a commitment in bytes, for telemetry.
    fn commitment_size(&self) -> usize;

    /// Lets the verifier choose the round's challenge question.
    fn choose_question(
        &mut self,
        verification: VerificationHandle,
    ) -> Result<u32, EngineError>;

    /// Produces the answer to `question`. At most one answer per round.
    fn get_answer(
        &mut self,
        proof: ProofHandle,
        question: u32,
        role: HashRole,
    ) -> Result<AnswerHandle, EngineError>;

    /// Wire size of the answer to `question` in bytes. Varies by question.
    fn answer_size(&self, question: u32) -> usize;

    /// Verifies the commitment/answer pair. `Ok(false)` means the answer was
    /// rejected, which between honest parties indicates a protocol-integrity
    /// defect.
    fn verify(
        &mut self,
        verification: VerificationHandle,
        commitment: CommitmentHandle,
        answer: AnswerHandle,
        role: HashRole,
    ) -> Result<bool, EngineError>;

    /// Upper bound on the impersonation probability after the rounds
    /// verified so far. Guaranteed to be in (0, 1] and non-increasing round
    /// over round.
    fn impersonation_probability(
        &self,
        verification: VerificationHandle,
    ) -> Result<f64, EngineError>;

    /// Size of this instantiation's memory region in bytes.
    fn memory_footprint(&self) -> usize;
}
