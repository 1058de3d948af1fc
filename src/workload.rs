//! Simulated security handshake workload
//!
//! These routines are cost models, not cryptography. Each one burns CPU
//! time and touches a fixed amount of memory so the per-flight
//! instrumentation has something realistic to measure. They are kept as
//! named seams so real primitives can be dropped in without changing the
//! node that calls them.
//!
//! Cost profile with the default parameters:
//! - hash generation: one pass over a 1024-byte buffer
//! - encryption/decryption: one hash pass
//! - signature verification: two hash passes
//! - key generation: 65300 x 65300 inner iterations, which dominates
//!   everything else by several orders of magnitude

use std::hint::black_box;

use crate::contracts::Role;

/// Handshake steps invoked once per flight, synchronously
pub trait SecurityOps {
    /// Hash a certificate-sized buffer
    fn hash_generation(&mut self);

    /// Key generation with a roughly quadratic cost
    fn key_generation(&mut self);

    fn encryption_decryption(&mut self) {
        self.hash_generation();
    }

    fn signature_verification(&mut self) {
        self.hash_generation();
        self.encryption_decryption();
    }

    /// Full per-flight handshake for `role`
    ///
    /// The initiator re-hashes its certificate after deriving the key; the
    /// responder stops after key generation.
    fn perform_handshake(&mut self, role: Role) {
        self.signature_verification();
        self.key_generation();
        if role == Role::Initiator {
            self.hash_generation();
        }
    }
}

/// CPU-bound placeholder for the handshake primitives
#[derive(Debug, Clone)]
pub struct SimulatedWorkload {
    buffer: Vec<u8>,
    keygen_bound: u64,
    digest: u8,
    key: u64,
}

impl SimulatedWorkload {
    pub fn new(hash_buffer_len: usize, fill_byte: u8, keygen_bound: u64) -> Self {
        Self {
            buffer: vec![fill_byte; hash_buffer_len],
            keygen_bound,
            digest: 1,
            key: 0,
        }
    }

    /// Running XOR accumulator left by the last hash pass
    pub fn digest(&self) -> u8 {
        self.digest
    }

    /// Running sum left by the last key generation
    pub fn key(&self) -> u64 {
        self.key
    }
}

impl Default for SimulatedWorkload {
    fn default() -> Self {
        Self::new(crate::HASH_BUFFER_LEN, crate::FILL_BYTE, crate::KEYGEN_BOUND)
    }
}

impl SecurityOps for SimulatedWorkload {
    fn hash_generation(&mut self) {
        let mut acc: u8 = 1;
        for byte in black_box(&self.buffer).iter() {
            acc ^= *byte;
        }
        self.digest = black_box(acc);
    }

    fn key_generation(&mut self) {
        let bound = black_box(self.keygen_bound);
        let mut key: u64 = 0;
        for _ in 0..bound {
            for _ in 0..bound {
                key = black_box(key.wrapping_add(bound));
            }
        }
        self.key = key;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Tally {
        hashes: u32,
        keygens: u32,
    }

    impl SecurityOps for Tally {
        fn hash_generation(&mut self) {
            self.hashes += 1;
        }

        fn key_generation(&mut self) {
            self.keygens += 1;
        }
    }

    #[test]
    fn test_initiator_handshake_sequence() {
        let mut tally = Tally::default();
        tally.perform_handshake(Role::Initiator);

        // signature (hash + enc/dec) then the trailing hash
        assert_eq!(tally.hashes, 3);
        assert_eq!(tally.keygens, 1);
    }

    #[test]
    fn test_responder_handshake_sequence() {
        let mut tally = Tally::default();
        tally.perform_handshake(Role::Responder);

        assert_eq!(tally.hashes, 2);
        assert_eq!(tally.keygens, 1);
    }

    #[test]
    fn test_hash_is_deterministic() {
        let mut workload = SimulatedWorkload::new(1024, b'A', 0);
        workload.hash_generation();
        let first = workload.digest();
        workload.hash_generation();

        // even number of identical bytes cancels out
        assert_eq!(first, 1);
        assert_eq!(workload.digest(), first);

        let mut odd = SimulatedWorkload::new(3, b'A', 0);
        odd.hash_generation();
        assert_eq!(odd.digest(), 1 ^ b'A');
    }

    #[test]
    fn test_key_generation_sum() {
        let mut workload = SimulatedWorkload::new(16, b'A', 300);
        workload.key_generation();
        assert_eq!(workload.key(), 300 * 300 * 300);

        let mut idle = SimulatedWorkload::new(16, b'A', 0);
        idle.key_generation();
        assert_eq!(idle.key(), 0);
    }
}
