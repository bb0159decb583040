//! Deterministic reference engine.
//!
//! The orchestration core treats the identification protocol as an external
//! collaborator behind [`ProtocolEngine`]. This module supplies that
//! collaborator: a compiled [`EngineModule`] carrying the parameter-set
//! manifest, and per-set [`ReferenceEngine`] instantiations that reproduce
//! the observable profile of the permutation-based construction (commitment
//! and answer wire sizes, keyed-hash invocation counts per round, memory
//! footprint growth, and the (d/(d+1))^n impersonation-probability schedule)
//! without the permutation algebra itself.
//!
//! Every draw of randomness and every keyed hash goes through the instance's
//! [`HostBinding`], so telemetry attribution is exercised exactly as it would
//! be against the real engine.

use std::rc::Rc;

use sha2::{Digest, Sha256};

use crate::error::{EngineError, OrchestratorError};
use crate::host::{EngineMemory, HashRole, HostBinding};
use crate::engine::{
    AnswerHandle, CommitmentHandle, ParameterSetDescriptor, PrivateKeyHandle, ProofHandle,
    ProtocolEngine, PublicKeyHandle, VerificationHandle,
};
use crate::provider::{DIGEST_SIZE, HASH_KEY_SIZE};

/// Internal constants of one parameter set, as baked into the module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ParameterSetProfile {
    pub id: &'static str,
    pub display_name: &'static str,
    /// Size of the permutation domain
    pub domain: u32,
    /// Number of public generator permutations |F|
    pub alpha: u32,
    /// Order of the conjugating subgroup |H|
    pub h_order: u32,
    /// Round depth: the private key is a word of d generators
    pub d: u32,
}

impl ParameterSetProfile {
    /// Key-space size in bits: the private key selects one of alpha^d words.
    fn key_space_log2(&self) -> u32 {
        (self.d as f64 * (self.alpha as f64).log2()).floor() as u32
    }

    fn descriptor(&self) -> ParameterSetDescriptor {
        ParameterSetDescriptor {
            id: self.id.to_string(),
            display_name: self.display_name.to_string(),
            key_space_log2: self.key_space_log2(),
        }
    }

    /// Commitment wire size: one 32-byte digest per blinded step, plus the
    /// conjugator commitment and the base commitment.
    fn commitment_size(&self) -> usize {
        DIGEST_SIZE * (self.d as usize + 2)
    }

    /// Answer wire size for a given question. Opening the base step (q = 0)
    /// reveals three commitment keys; any other step reveals two.
    fn answer_size(&self, question: u32) -> usize {
        let permutation = 4 * self.domain as usize;
        if question == 0 {
            4 + permutation + 3 * DIGEST_SIZE
        } else {
            4 + permutation + 2 * DIGEST_SIZE
        }
    }

    /// Interleaved generator tables held per instantiation (u16 entries).
    fn table_bytes(&self) -> usize {
        (self.alpha as usize + self.h_order as usize) * self.domain as usize * 2
    }
}

/// The compiled engine module: the manifest of parameter sets plus the
/// recipe for per-set instantiation.
///
/// Compiled once per session, concurrently with awaiting crypto-provider
/// readiness; instantiated once per discovered parameter set.
pub struct EngineModule {
    profiles: Vec<ParameterSetProfile>,
}

impl EngineModule {
    /// Compiles the module, yielding the built-in parameter sets in
    /// deterministic (sorted) manifest order.
    pub fn compile() -> Result<Self, OrchestratorError> {
        let mut profiles = vec![
            ParameterSetProfile {
                id: "3x3x3",
                display_name: "3x3x3",
                domain: 48,
                alpha: 6,
                h_order: 24,
                d: 24,
            },
            ParameterSetProfile {
                id: "s41",
                display_name: "S41",
                domain: 41,
                alpha: 9240,
                h_order: 9240,
                d: 12,
            },
            ParameterSetProfile {
                id: "s41ast",
                display_name: "S41*",
                domain: 41,
                alpha: 30030,
                h_order: 30030,
                d: 11,
            },
            ParameterSetProfile {
                id: "s43ast",
                display_name: "S43*",
                domain: 43,
                alpha: 60060,
                h_order: 60060,
                d: 10,
            },
            ParameterSetProfile {
                id: "s53ast",
                display_name: "S53*",
                domain: 53,
                alpha: 360360,
                h_order: 360360,
                d: 12,
            },
        ];
        profiles.sort_by(|a, b| a.id.cmp(b.id));

        for profile in &profiles {
            if profile.domain == 0 || profile.alpha < 2 || profile.d == 0 {
                return Err(OrchestratorError::Initialization(format!(
                    "parameter set '{}' has degenerate constants",
                    profile.id
                )));
            }
        }

        Ok(Self { profiles })
    }

    #[cfg(test)]
    pub(crate) fn from_profiles(profiles: Vec<ParameterSetProfile>) -> Self {
        Self { profiles }
    }

    /// The parameter-set manifest, in stable discovery order.
    pub fn manifest(&self) -> Vec<ParameterSetDescriptor> {
        self.profiles.iter().map(|p| p.descriptor()).collect()
    }

    /// Instantiates a dedicated engine for one parameter set against the
    /// given host binding.
    ///
    /// The binding's hash and randomness callbacks are live for the whole
    /// instantiation (the engine draws its module seed during construction);
    /// the memory region is attached as the final step.
    pub fn instantiate(
        &self,
        id: &str,
        binding: Rc<HostBinding>,
    ) -> Result<ReferenceEngine, OrchestratorError> {
        let profile = self
            .profiles
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownParameterSet(id.to_string()))?;

        let memory = EngineMemory::new();
        memory.grow(profile.table_bytes());

        // Construction-time host callback: the module seeds its internal
        // state before the memory region becomes visible to the host.
        let mut seed = [0u8; 32];
        binding.random_bytes(&mut seed);

        let descriptor = profile.descriptor();
        let engine = ReferenceEngine {
            profile,
            descriptor,
            module_seed: seed,
            binding: binding.clone(),
            memory: memory.clone(),
            private_keys: Vec::new(),
            public_keys: Vec::new(),
            proofs: Vec::new(),
            verifications: Vec::new(),
        };

        binding.attach_memory(memory)?;
        Ok(engine)
    }
}

/// Prover-side per-round secrets: the commitment keys and the blinded
/// payloads they commit to.
struct RoundSecrets {
    keys: Vec<[u8; HASH_KEY_SIZE]>,
    payloads: Vec<Vec<u8>>,
}

struct ProofContext {
    private_key: usize,
    secrets: Option<RoundSecrets>,
    commitments: Vec<[u8; DIGEST_SIZE]>,
    answered_question: Option<u32>,
}

struct VerificationContext {
    #[allow(dead_code)]
    public_key: usize,
    expected_question: Option<u32>,
    successful_rounds: u64,
}

/// One engine instantiation, bound to a single parameter set.
pub struct ReferenceEngine {
    profile: ParameterSetProfile,
    descriptor: ParameterSetDescriptor,
    module_seed: [u8; 32],
    binding: Rc<HostBinding>,
    memory: Rc<EngineMemory>,
    private_keys: Vec<Vec<u8>>,
    public_keys: Vec<Vec<u8>>,
    proofs: Vec<ProofContext>,
    verifications: Vec<VerificationContext>,
}

impl std::fmt::Debug for ReferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceEngine")
            .field("profile", &self.profile)
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl ReferenceEngine {
    fn proof(&self, handle: ProofHandle) -> Result<&ProofContext, EngineError> {
        self.proofs
            .get(handle.0 as usize)
            .ok_or(EngineError::UnknownHandle(handle.0))
    }

    fn proof_mut(&mut self, handle: ProofHandle) -> Result<&mut ProofContext, EngineError> {
        self.proofs
            .get_mut(handle.0 as usize)
            .ok_or(EngineError::UnknownHandle(handle.0))
    }

    fn verification(
        &self,
        handle: VerificationHandle,
    ) -> Result<&VerificationContext, EngineError> {
        self.verifications
            .get(handle.0 as usize)
            .ok_or(EngineError::UnknownHandle(handle.0))
    }

    fn verification_mut(
        &mut self,
        handle: VerificationHandle,
    ) -> Result<&mut VerificationContext, EngineError> {
        self.verifications
            .get_mut(handle.0 as usize)
            .ok_or(EngineError::UnknownHandle(handle.0))
    }
}

impl ProtocolEngine for ReferenceEngine {
    fn descriptor(&self) -> &ParameterSetDescriptor {
        &self.descriptor
    }

    fn generate_private_key(&mut self) -> Result<PrivateKeyHandle, EngineError> {
        let mut material = vec![0u8; 4 * self.profile.d as usize];
        self.binding.random_bytes(&mut material);
        self.memory.grow(material.len());
        self.private_keys.push(material);
        Ok(PrivateKeyHandle(self.private_keys.len() as u32 - 1))
    }

    fn compute_public_key(
        &mut self,
        private_key: PrivateKeyHandle,
    ) -> Result<PublicKeyHandle, EngineError> {
        let material = self
            .private_keys
            .get(private_key.0 as usize)
            .ok_or(EngineError::UnknownHandle(private_key.0))?;

        // Deterministic expansion of the private key into the public
        // permutation's wire form. Internal engine arithmetic, not a host
        // call.
        let mut public = Vec::with_capacity(4 * self.profile.domain as usize);
        let mut block: u32 = 0;
        while public.len() < 4 * self.profile.domain as usize {
            let mut hasher = Sha256::new();
            hasher.update(self.module_seed);
            hasher.update(material);
            hasher.update(block.to_le_bytes());
            public.extend_from_slice(&hasher.finalize());
            block += 1;
        }
        public.truncate(4 * self.profile.domain as usize);

        self.memory.grow(public.len());
        self.public_keys.push(public);
        Ok(PublicKeyHandle(self.public_keys.len() as u32 - 1))
    }

    fn new_proof(&mut self, private_key: PrivateKeyHandle) -> Result<ProofHandle, EngineError> {
        if private_key.0 as usize >= self.private_keys.len() {
            return Err(EngineError::UnknownHandle(private_key.0));
        }

        let d = self.profile.d as usize;
        let domain = self.profile.domain as usize;
        // Preallocations of the real construction: commitment keys, the
        // commitment buffer, d+1 blinded permutations, one answer buffer.
        self.memory.grow(DIGEST_SIZE * (d + 2) * 2 + (d + 1) * domain * 4 + domain * 4 + 104);

        self.proofs.push(ProofContext {
            private_key: private_key.0 as usize,
            secrets: None,
            commitments: Vec::new(),
            answered_question: None,
        });
        Ok(ProofHandle(self.proofs.len() as u32 - 1))
    }

    fn new_verification(
        &mut self,
        public_key: PublicKeyHandle,
    ) -> Result<VerificationHandle, EngineError> {
        if public_key.0 as usize >= self.public_keys.len() {
            return Err(EngineError::UnknownHandle(public_key.0));
        }
        self.memory.grow(24);
        self.verifications.push(VerificationContext {
            public_key: public_key.0 as usize,
            expected_question: None,
            successful_rounds: 0,
        });
        Ok(VerificationHandle(self.verifications.len() as u32 - 1))
    }

    fn begin_round(
        &mut self,
        proof: ProofHandle,
        role: HashRole,
    ) -> Result<CommitmentHandle, EngineError> {
        self.proof(proof)?;
        let d = self.profile.d as usize;
        let domain = self.profile.domain as usize;
        let h_order = self.profile.h_order;
        let binding = self.binding.clone();

        // Round secrets: the conjugator selector plus d+1 blinded steps,
        // each committed under a fresh 32-byte key.
        let tau = binding.random_below(h_order);
        let mut keys = Vec::with_capacity(d + 2);
        let mut payloads = Vec::with_capacity(d + 2);

        payloads.push(tau.to_le_bytes().to_vec());
        for _ in 0..=d {
            let mut blinded = vec![0u8; domain * 4];
            binding.random_bytes(&mut blinded);
            payloads.push(blinded);
        }
        for _ in 0..(d + 2) {
            let mut key = [0u8; HASH_KEY_SIZE];
            binding.random_bytes(&mut key);
            keys.push(key);
        }

        let commitments: Vec<[u8; DIGEST_SIZE]> = keys
            .iter()
            .zip(payloads.iter())
            .map(|(key, payload)| binding.keyed_hash(role, key, payload))
            .collect();

        let ctx = self.proof_mut(proof)?;
        ctx.secrets = Some(RoundSecrets { keys, payloads });
        ctx.commitments = commitments;
        ctx.answered_question = None;
        Ok(CommitmentHandle(proof.0))
    }

    fn commitment_size(&self) -> usize {
        self.profile.commitment_size()
    }

    fn choose_question(
        &mut self,
        verification: VerificationHandle,
    ) -> Result<u32, EngineError> {
        let d = self.profile.d;
        let question = self.binding.random_below(d + 1);
        self.verification_mut(verification)?.expected_question = Some(question);
        Ok(question)
    }

    fn get_answer(
        &mut self,
        proof: ProofHandle,
        question: u32,
        _role: HashRole,
    ) -> Result<AnswerHandle, EngineError> {
        let d = self.profile.d;
        if question > d {
            return Err(EngineError::QuestionOutOfRange { question, d });
        }
        let ctx = self.proof_mut(proof)?;
        if ctx.secrets.is_none() {
            return Err(EngineError::NoRoundInProgress);
        }
        if ctx.answered_question.is_some() {
            return Err(EngineError::AlreadyAnswered);
        }
        // Answer construction reveals already-computed material; it performs
        // no keyed hashing.
        ctx.answered_question = Some(question);
        Ok(AnswerHandle(proof.0))
    }

    fn answer_size(&self, question: u32) -> usize {
        self.profile.answer_size(question)
    }

    fn verify(
        &mut self,
        verification: VerificationHandle,
        commitment: CommitmentHandle,
        answer: AnswerHandle,
        role: HashRole,
    ) -> Result<bool, EngineError> {
        let d = self.profile.d as usize;
        let expected = self.verification(verification)?.expected_question;

        let proof_ctx = self.proof(ProofHandle(commitment.0))?;
        if answer.0 != commitment.0 {
            return Err(EngineError::UnknownHandle(answer.0));
        }
        let answered = proof_ctx.answered_question;
        let secrets = proof_ctx.secrets.as_ref().ok_or(EngineError::NoRoundInProgress)?;

        let question = match (answered, expected) {
            (Some(a), Some(e)) if a == e => a as usize,
            _ => return Ok(false),
        };

        // Recompute the opened commitments: the base question opens the
        // conjugator, the first and the last step (three digests); any other
        // question opens the two adjacent steps.
        let opened: Vec<usize> = if question == 0 {
            vec![0, 1, d + 1]
        } else {
            vec![question, question + 1]
        };

        let mut ok = true;
        for index in opened {
            let digest =
                self.binding
                    .keyed_hash(role, &secrets.keys[index], &secrets.payloads[index]);
            if digest != proof_ctx.commitments[index] {
                ok = false;
            }
        }

        let ctx = self.verification_mut(verification)?;
        ctx.expected_question = None;
        if ok {
            ctx.successful_rounds += 1;
        }
        Ok(ok)
    }

    fn impersonation_probability(
        &self,
        verification: VerificationHandle,
    ) -> Result<f64, EngineError> {
        let ctx = self.verification(verification)?;
        let d = self.profile.d as f64;
        let per_round = d / (d + 1.0);
        Ok(per_round.powi(ctx.successful_rounds as i32))
    }

    fn memory_footprint(&self) -> usize {
        self.memory.footprint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::HmacSha256Provider;
    use std::sync::Arc;

    fn module() -> EngineModule {
        EngineModule::compile().expect("built-in manifest compiles")
    }

    fn engine(id: &str) -> (ReferenceEngine, Rc<HostBinding>) {
        let binding = HostBinding::new(Arc::new(HmacSha256Provider::new()));
        let engine = module().instantiate(id, binding.clone()).expect("instantiate");
        (engine, binding)
    }

    /// Runs one honest round and returns (question, verification outcome).
    fn honest_round(
        engine: &mut ReferenceEngine,
        proof: ProofHandle,
        verification: VerificationHandle,
    ) -> (u32, bool) {
        let commitment = engine.begin_round(proof, HashRole::Prover).unwrap();
        let q = engine.choose_question(verification).unwrap();
        let answer = engine.get_answer(proof, q, HashRole::Prover).unwrap();
        let ok = engine
            .verify(verification, commitment, answer, HashRole::Verifier)
            .unwrap();
        (q, ok)
    }

    fn setup(engine: &mut ReferenceEngine) -> (ProofHandle, VerificationHandle) {
        let private = engine.generate_private_key().unwrap();
        let public = engine.compute_public_key(private).unwrap();
        let proof = engine.new_proof(private).unwrap();
        let verification = engine.new_verification(public).unwrap();
        (proof, verification)
    }

    #[test]
    fn manifest_is_sorted_and_complete() {
        let manifest = module().manifest();
        let ids: Vec<&str> = manifest.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["3x3x3", "s41", "s41ast", "s43ast", "s53ast"]);

        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn key_space_bits_match_the_constants() {
        let manifest = module().manifest();
        let bits: Vec<(String, u32)> = manifest
            .iter()
            .map(|d| (d.id.clone(), d.key_space_log2))
            .collect();
        // floor(d * log2(alpha)) for each built-in set
        assert_eq!(bits[0], ("3x3x3".to_string(), 62));
        assert_eq!(bits[1], ("s41".to_string(), 158));
    }

    #[test]
    fn unknown_parameter_set_is_rejected() {
        let binding = HostBinding::new(Arc::new(HmacSha256Provider::new()));
        let err = module().instantiate("5x5x5", binding).unwrap_err();
        assert_eq!(
            err,
            OrchestratorError::Engine(EngineError::UnknownParameterSet("5x5x5".to_string()))
        );
    }

    #[test]
    fn honest_rounds_always_verify() {
        let (mut engine, _) = engine("s41");
        let (proof, verification) = setup(&mut engine);
        for _ in 0..10 {
            let (_, ok) = honest_round(&mut engine, proof, verification);
            assert!(ok);
        }
    }

    #[test]
    fn probability_follows_the_d_over_d_plus_1_schedule() {
        let (mut engine, _) = engine("s43ast");
        let (proof, verification) = setup(&mut engine);

        assert_eq!(engine.impersonation_probability(verification).unwrap(), 1.0);

        let mut previous = 1.0;
        for round in 1..=20 {
            honest_round(&mut engine, proof, verification);
            let p = engine.impersonation_probability(verification).unwrap();
            let expected = (10.0f64 / 11.0).powi(round);
            assert!((p - expected).abs() < 1e-12);
            assert!(p <= previous);
            previous = p;
        }
    }

    #[test]
    fn hash_invocations_match_the_round_profile() {
        let (mut engine, binding) = engine("s41ast");
        let (proof, verification) = setup(&mut engine);
        let d = 11u64;

        let prover_before = binding.hash_invocations(HashRole::Prover);
        let verifier_before = binding.hash_invocations(HashRole::Verifier);

        let (q, ok) = honest_round(&mut engine, proof, verification);
        assert!(ok);

        // Commitment: d+2 prover-side hashes. Verification: 3 openings for
        // the base question, 2 otherwise.
        assert_eq!(binding.hash_invocations(HashRole::Prover) - prover_before, d + 2);
        let expected_verifier = if q == 0 { 3 } else { 2 };
        assert_eq!(
            binding.hash_invocations(HashRole::Verifier) - verifier_before,
            expected_verifier
        );
    }

    #[test]
    fn wire_sizes_follow_the_parameter_set() {
        let (engine, _) = engine("s41");
        // d = 12, domain = 41
        assert_eq!(engine.commitment_size(), 32 * 14);
        assert_eq!(engine.answer_size(0), 4 + 4 * 41 + 96);
        assert_eq!(engine.answer_size(5), 4 + 4 * 41 + 64);
    }

    #[test]
    fn answer_is_single_use_per_round() {
        let (mut engine, _) = engine("3x3x3");
        let (proof, verification) = setup(&mut engine);

        engine.begin_round(proof, HashRole::Prover).unwrap();
        let q = engine.choose_question(verification).unwrap();
        engine.get_answer(proof, q, HashRole::Prover).unwrap();

        let err = engine.get_answer(proof, q, HashRole::Prover).unwrap_err();
        assert_eq!(err, EngineError::AlreadyAnswered);
    }

    #[test]
    fn question_out_of_range_is_rejected() {
        let (mut engine, _) = engine("s53ast");
        let (proof, _) = setup(&mut engine);
        engine.begin_round(proof, HashRole::Prover).unwrap();
        let err = engine.get_answer(proof, 13, HashRole::Prover).unwrap_err();
        assert_eq!(err, EngineError::QuestionOutOfRange { question: 13, d: 12 });
    }

    #[test]
    fn answer_before_begin_round_is_rejected() {
        let (mut engine, _) = engine("s41");
        let (proof, _) = setup(&mut engine);
        let err = engine.get_answer(proof, 0, HashRole::Prover).unwrap_err();
        assert_eq!(err, EngineError::NoRoundInProgress);
    }

    #[test]
    fn memory_footprint_grows_with_allocations() {
        let (mut engine, binding) = engine("s41");
        let tables = (9240 + 9240) * 41 * 2;
        assert_eq!(engine.memory_footprint(), tables);
        assert_eq!(binding.memory_footprint(), tables);

        let private = engine.generate_private_key().unwrap();
        assert!(engine.memory_footprint() > tables);
        let before = engine.memory_footprint();
        let _ = engine.compute_public_key(private).unwrap();
        assert!(engine.memory_footprint() > before);
    }

    #[test]
    fn public_key_is_deterministic_in_the_private_key() {
        let (mut engine, _) = engine("s41");
        let private = engine.generate_private_key().unwrap();
        let pub_a = engine.compute_public_key(private).unwrap();
        let pub_b = engine.compute_public_key(private).unwrap();
        assert_eq!(
            engine.public_keys[pub_a.0 as usize],
            engine.public_keys[pub_b.0 as usize]
        );
    }
}
