//! Host-call binding between one engine instantiation and the shared
//! crypto provider.
//!
//! Each engine instantiation gets its own binding. The binding attributes
//! every keyed-hash invocation to the prover or verifier telemetry bucket
//! through an explicit [`HashRole`] parameter threaded through every engine
//! call that can hash. There is no shared mutable role tag that could go
//! stale between interleaved calls.
//!
//! The binding is built in two phases. Hash and randomness callbacks work
//! from the moment of construction, which covers an engine calling back into
//! the host during its own instantiation (key-material draws). The engine's
//! memory-region tracker is installed afterwards, and nothing reads it until
//! instantiation has completed.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use once_cell::unsync::OnceCell;

use crate::error::OrchestratorError;
use crate::provider::{CryptoProvider, DIGEST_SIZE, HASH_KEY_SIZE};

/// Which protocol party an engine call is executing on behalf of.
///
/// Threaded explicitly through every hashing call so the host can attribute
/// the invocation to the correct telemetry bucket.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HashRole {
    Prover,
    Verifier,
}

/// Tracks the size of one engine instantiation's isolated memory region.
///
/// Engines grow this as they allocate; the region is never shared across
/// parameter sets.
#[derive(Debug, Default)]
pub struct EngineMemory {
    bytes: Cell<usize>,
}

impl EngineMemory {
    pub fn new() -> Rc<Self> {
        Rc::new(Self { bytes: Cell::new(0) })
    }

    /// Records an allocation of `n` bytes inside the engine's region.
    pub fn grow(&self, n: usize) {
        self.bytes.set(self.bytes.get() + n);
    }

    /// Current size of the region in bytes.
    pub fn footprint(&self) -> usize {
        self.bytes.get()
    }
}

/// Per-instantiation handle through which an engine reaches host services.
pub struct HostBinding {
    provider: Arc<dyn CryptoProvider>,
    prover_hashes: Cell<u64>,
    verifier_hashes: Cell<u64>,
    // Filled once instantiation completes; no callback reads it before then.
    memory: OnceCell<Rc<EngineMemory>>,
}

impl HostBinding {
    pub fn new(provider: Arc<dyn CryptoProvider>) -> Rc<Self> {
        Rc::new(Self {
            provider,
            prover_hashes: Cell::new(0),
            verifier_hashes: Cell::new(0),
            memory: OnceCell::new(),
        })
    }

    /// Keyed-hash host call. Increments the counter for `role` at this
    /// boundary, so attribution is correct even if calls interleave.
    pub fn keyed_hash(
        &self,
        role: HashRole,
        key: &[u8; HASH_KEY_SIZE],
        data: &[u8],
    ) -> [u8; DIGEST_SIZE] {
        let counter = match role {
            HashRole::Prover => &self.prover_hashes,
            HashRole::Verifier => &self.verifier_hashes,
        };
        counter.set(counter.get() + 1);
        self.provider.keyed_hash(key, data)
    }

    /// Random-byte host call. Not attributed to a role; randomness is not
    /// part of the hash-invocation telemetry.
    pub fn random_bytes(&self, out: &mut [u8]) {
        self.provider.random_bytes(out);
    }

    /// Unbiased random draw in `0..excl_max`.
    pub fn random_below(&self, excl_max: u32) -> u32 {
        self.provider.random_below(excl_max)
    }

    /// Phase two of construction: installs the engine's memory tracker once
    /// the instantiation it belongs to has completed.
    pub fn attach_memory(&self, memory: Rc<EngineMemory>) -> Result<(), OrchestratorError> {
        self.memory.set(memory).map_err(|_| {
            OrchestratorError::Initialization(
                "engine memory region already attached to this binding".to_string(),
            )
        })
    }

    /// Size of the bound engine's memory region, or zero if instantiation has
    /// not completed yet.
    pub fn memory_footprint(&self) -> usize {
        self.memory.get().map_or(0, |m| m.footprint())
    }

    /// Cumulative keyed-hash invocations attributed to `role`.
    pub fn hash_invocations(&self, role: HashRole) -> u64 {
        match role {
            HashRole::Prover => self.prover_hashes.get(),
            HashRole::Verifier => self.verifier_hashes.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::HmacSha256Provider;

    fn binding() -> Rc<HostBinding> {
        HostBinding::new(Arc::new(HmacSha256Provider::new()))
    }

    #[test]
    fn hash_invocations_attribute_to_the_explicit_role() {
        let b = binding();
        let key = [0u8; HASH_KEY_SIZE];

        b.keyed_hash(HashRole::Prover, &key, b"commitment");
        b.keyed_hash(HashRole::Prover, &key, b"commitment");
        b.keyed_hash(HashRole::Verifier, &key, b"check");

        assert_eq!(b.hash_invocations(HashRole::Prover), 2);
        assert_eq!(b.hash_invocations(HashRole::Verifier), 1);
    }

    #[test]
    fn counters_never_decrease() {
        let b = binding();
        let key = [3u8; HASH_KEY_SIZE];
        let mut last = 0;
        for _ in 0..10 {
            b.keyed_hash(HashRole::Prover, &key, b"x");
            let now = b.hash_invocations(HashRole::Prover);
            assert!(now > last);
            last = now;
        }
    }

    #[test]
    fn callbacks_work_before_memory_is_attached() {
        let b = binding();
        let key = [5u8; HASH_KEY_SIZE];
        // This is the construction-time callback scenario: hashing and
        // randomness are available before phase two.
        let _ = b.keyed_hash(HashRole::Prover, &key, b"keygen");
        let mut buf = [0u8; 8];
        b.random_bytes(&mut buf);
        assert_eq!(b.memory_footprint(), 0);
    }

    #[test]
    fn memory_attaches_exactly_once() {
        let b = binding();
        let mem = EngineMemory::new();
        mem.grow(4096);
        assert!(b.attach_memory(mem.clone()).is_ok());
        assert_eq!(b.memory_footprint(), 4096);

        assert!(b.attach_memory(EngineMemory::new()).is_err());
        // The original region remains in place.
        mem.grow(100);
        assert_eq!(b.memory_footprint(), 4196);
    }
}
