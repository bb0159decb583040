//! Crypto Provider: the stateless keyed-hash and random-byte services.
//!
//! The provider is shared across all engine instantiations and must be safe
//! to invoke repeatedly and interleaved, even though the scheduler only ever
//! calls it sequentially. It is the only source of randomness and keyed
//! hashing in the system; engines reach it exclusively through their
//! [`crate::host::HostBinding`].
//!
//! Readiness is awaited exactly once per provider. The default provider runs
//! a structural self-test (determinism and input sensitivity of the keyed
//! hash) and latches the result.

use hmac::{Hmac, Mac};
use once_cell::sync::OnceCell;
use rand::RngCore;
use sha2::Sha256;

use crate::error::OrchestratorError;

/// Size of a keyed-hash digest in bytes (HMAC-SHA256).
pub const DIGEST_SIZE: usize = 32;

/// Size of a keyed-hash key in bytes.
pub const HASH_KEY_SIZE: usize = 32;

/// Stateless keyed-hash and random-byte services.
///
/// Implementations must be reentrant-safe: no shared mutable state is
/// permitted at this boundary.
pub trait CryptoProvider: Send + Sync {
    /// Computes a keyed hash over `data` under a 32-byte key.
    fn keyed_hash(&self, key: &[u8; HASH_KEY_SIZE], data: &[u8]) -> [u8; DIGEST_SIZE];

    /// Fills `out` with random bytes.
    fn random_bytes(&self, out: &mut [u8]);

    /// Awaits provider readiness. Must succeed before any engine is
    /// instantiated; the result is latched so repeated calls are cheap.
    fn ready(&self) -> Result<(), OrchestratorError>;

    /// Draws an unbiased random value in `0..excl_max` by rejection sampling.
    fn random_below(&self, excl_max: u32) -> u32 {
        debug_assert!(excl_max > 0);
        // Reject the tail of the u32 range that would bias the modulus.
        let limit = u32::MAX - (u32::MAX % excl_max);
        loop {
            let mut buf = [0u8; 4];
            self.random_bytes(&mut buf);
            let value = u32::from_le_bytes(buf);
            if value < limit {
                return value % excl_max;
            }
        }
    }
}

/// Default provider: HMAC-SHA256 keyed hashing and OS-seeded randomness.
pub struct HmacSha256Provider {
    readiness: OnceCell<Result<(), String>>,
}

impl HmacSha256Provider {
    pub fn new() -> Self {
        Self { readiness: OnceCell::new() }
    }

    /// Structural self-test: the keyed hash must be deterministic, sensitive
    /// to both key and data, and must not produce an all-zero digest.
    fn self_test(&self) -> Result<(), String> {
        let key_a = [0x0bu8; HASH_KEY_SIZE];
        let key_b = [0x0cu8; HASH_KEY_SIZE];
        let data = b"zkident provider self-test";

        let d1 = self.keyed_hash(&key_a, data);
        let d2 = self.keyed_hash(&key_a, data);
        if d1 != d2 {
            return Err("keyed hash is not deterministic".to_string());
        }
        if d1 == self.keyed_hash(&key_b, data) {
            return Err("keyed hash ignores the key".to_string());
        }
        if d1 == self.keyed_hash(&key_a, b"different data") {
            return Err("keyed hash ignores the data".to_string());
        }
        if d1 == [0u8; DIGEST_SIZE] {
            return Err("keyed hash produced an all-zero digest".to_string());
        }
        Ok(())
    }
}

impl Default for HmacSha256Provider {
    fn default() -> Self {
        Self::new()
    }
}

impl CryptoProvider for HmacSha256Provider {
    fn keyed_hash(&self, key: &[u8; HASH_KEY_SIZE], data: &[u8]) -> [u8; DIGEST_SIZE] {
        // HMAC accepts keys of any length, so this cannot fail for a
        // fixed-size key.
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key)
            .unwrap_or_else(|_| unreachable!("HMAC accepts 32-byte keys"));
        mac.update(data);
        let digest = mac.finalize().into_bytes();
        let mut out = [0u8; DIGEST_SIZE];
        out.copy_from_slice(&digest);
        out
    }

    fn random_bytes(&self, out: &mut [u8]) {
        rand::thread_rng().fill_bytes(out);
    }

    fn ready(&self) -> Result<(), OrchestratorError> {
        self.readiness
            .get_or_init(|| self.self_test())
            .clone()
            .map_err(OrchestratorError::Initialization)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyed_hash_is_deterministic() {
        let provider = HmacSha256Provider::new();
        let key = [7u8; HASH_KEY_SIZE];
        let a = provider.keyed_hash(&key, b"commitment payload");
        let b = provider.keyed_hash(&key, b"commitment payload");
        assert_eq!(a, b);
    }

    #[test]
    fn keyed_hash_depends_on_key_and_data() {
        let provider = HmacSha256Provider::new();
        let key_a = [1u8; HASH_KEY_SIZE];
        let key_b = [2u8; HASH_KEY_SIZE];
        let base = provider.keyed_hash(&key_a, b"payload");
        assert_ne!(base, provider.keyed_hash(&key_b, b"payload"));
        assert_ne!(base, provider.keyed_hash(&key_a, b"other payload"));
    }

    #[test]
    fn readiness_is_latched_and_ok() {
        let provider = HmacSha256Provider::new();
        assert!(provider.ready().is_ok());
        // Second await hits the latched result.
        assert!(provider.ready().is_ok());
    }

    #[test]
    fn random_below_respects_the_bound() {
        let provider = HmacSha256Provider::new();
        for bound in [1u32, 2, 7, 25, 30031] {
            for _ in 0..64 {
                assert!(provider.random_below(bound) < bound);
            }
        }
    }

    #[test]
    fn random_bytes_fills_the_buffer() {
        let provider = HmacSha256Provider::new();
        let mut buf = [0u8; 64];
        provider.random_bytes(&mut buf);
        // 64 zero bytes from a working RNG is a 2^-512 event.
        assert_ne!(buf, [0u8; 64]);
    }
}
