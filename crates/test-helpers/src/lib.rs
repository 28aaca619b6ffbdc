//! Properly-signed fixtures for pulsar tests.
//!
//! Everything is derived from seeds, so two calls with the same arguments
//! produce identical keys, entropy and envelopes.

use pulsar_messages::{
    EntropyPayload, EntropySignaturePayload, Envelope, GetLastPulsePayload, HandshakePayload,
    PayloadBody, PulsePayload,
};
use pulsar_types::{
    entropy_commit_message, pulse_message, BftCell, Entropy, KeyPair, KeyType, PublicKey,
    Pulse, PulsarSigner, PulseNumber, PulsarId, PulsarInfo, Roster, Signature, SignerError,
    Vector,
};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A roster together with the signing keys of every member.
///
/// `keys[i]` belongs to `PulsarId(i)`.
pub struct TestPulsars {
    pub keys: Vec<KeyPair>,
    pub roster: Arc<Roster>,
}

impl TestPulsars {
    /// `n` Ed25519 pulsars with keys derived from `seed`.
    pub fn new(n: usize, seed: u64) -> Self {
        let keys = test_keys(n, seed);
        let roster = Arc::new(test_roster(&keys));
        Self { keys, roster }
    }

    /// Signing key of a pulsar.
    pub fn key(&self, pulsar: PulsarId) -> &KeyPair {
        &self.keys[pulsar.0 as usize]
    }

    /// Commitment envelope from `pulsar`.
    pub fn commit(&self, pulsar: PulsarId, pulse_number: PulseNumber, entropy: &Entropy) -> Envelope {
        commit_envelope(self.key(pulsar), pulse_number, entropy)
    }

    /// Reveal envelope from `pulsar`.
    pub fn reveal(&self, pulsar: PulsarId, pulse_number: PulseNumber, entropy: &Entropy) -> Envelope {
        reveal_envelope(self.key(pulsar), pulse_number, entropy)
    }

    /// A verified cell for `pulsar`.
    pub fn cell(&self, pulsar: PulsarId, pulse_number: PulseNumber, entropy: &Entropy) -> BftCell {
        signed_cell(self.key(pulsar), pulse_number, entropy)
    }

    /// A pulse endorsed by each listed pulsar.
    pub fn endorsed_pulse(
        &self,
        pulse_number: PulseNumber,
        entropy: Entropy,
        endorsers: &[PulsarId],
    ) -> Pulse {
        Pulse {
            number: pulse_number,
            entropy,
            signatures: endorsers
                .iter()
                .map(|&id| (id, endorsement(self.key(id), pulse_number, &entropy)))
                .collect(),
        }
    }

    /// Announcement from `pulsar` carrying only its own endorsement.
    pub fn endorse(&self, pulsar: PulsarId, pulse_number: PulseNumber, entropy: &Entropy) -> Envelope {
        announce_envelope(
            self.key(pulsar),
            self.endorsed_pulse(pulse_number, *entropy, &[pulsar]),
        )
    }

    /// A vector where each listed pulsar contributed `test_entropy(id)`.
    pub fn vector(&self, pulse_number: PulseNumber, pulsars: &[PulsarId]) -> Vector {
        pulsars
            .iter()
            .map(|&id| {
                let entropy = test_entropy(id.0);
                (id, self.cell(id, pulse_number, &entropy))
            })
            .collect()
    }
}

/// Generate `n` deterministic Ed25519 key pairs.
pub fn test_keys(n: usize, seed: u64) -> Vec<KeyPair> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let mut key_seed = [0u8; 32];
            rng.fill_bytes(&mut key_seed);
            KeyPair::from_seed(KeyType::Ed25519, &key_seed)
        })
        .collect()
}

/// Build a roster where `keys[i]` is `PulsarId(i)`.
pub fn test_roster(keys: &[KeyPair]) -> Roster {
    let pulsars = keys
        .iter()
        .enumerate()
        .map(|(i, k)| PulsarInfo {
            pulsar_id: PulsarId(i as u64),
            public_key: k.public_key(),
        })
        .collect();
    Roster::new(pulsars).expect("generated keys are distinct")
}

/// Deterministic entropy for a seed.
pub fn test_entropy(seed: u64) -> Entropy {
    let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(0xe47));
    let mut bytes = [0u8; 64];
    rng.fill_bytes(&mut bytes);
    Entropy::from_bytes(bytes)
}

/// Commit-phase signature over `(pulse_number, entropy)`.
pub fn commit_signature(key: &KeyPair, pulse_number: PulseNumber, entropy: &Entropy) -> Signature {
    key.sign(&entropy_commit_message(pulse_number, entropy))
}

/// Endorsement over `(pulse_number, entropy)`.
pub fn endorsement(key: &KeyPair, pulse_number: PulseNumber, entropy: &Entropy) -> Signature {
    key.sign(&pulse_message(pulse_number, entropy))
}

/// A cell whose signature verifies against `entropy`.
pub fn signed_cell(key: &KeyPair, pulse_number: PulseNumber, entropy: &Entropy) -> BftCell {
    BftCell {
        signature: commit_signature(key, pulse_number, entropy),
        entropy: *entropy,
    }
}

/// Wrap a body, panicking on failure.
pub fn envelope(key: &KeyPair, body: PayloadBody) -> Envelope {
    Envelope::wrap(&body, key).expect("test envelope wraps")
}

/// Signed `EntropySignature` envelope.
pub fn commit_envelope(key: &KeyPair, pulse_number: PulseNumber, entropy: &Entropy) -> Envelope {
    let signature = commit_signature(key, pulse_number, entropy);
    envelope(
        key,
        PayloadBody::EntropySignature(EntropySignaturePayload::new(pulse_number, signature)),
    )
}

/// Signed `Entropy` envelope.
pub fn reveal_envelope(key: &KeyPair, pulse_number: PulseNumber, entropy: &Entropy) -> Envelope {
    envelope(
        key,
        PayloadBody::Entropy(EntropyPayload::new(pulse_number, *entropy)),
    )
}

/// Signed `GetLastPulse` request.
pub fn last_pulse_request(key: &KeyPair) -> Envelope {
    envelope(key, PayloadBody::GetLastPulse(GetLastPulsePayload::request()))
}

/// Signed `Handshake`.
pub fn handshake_envelope(key: &KeyPair, entropy: Entropy) -> Envelope {
    envelope(key, PayloadBody::Handshake(HandshakePayload::new(entropy)))
}

/// Signed `PulseAnnounce`.
pub fn announce_envelope(key: &KeyPair, pulse: Pulse) -> Envelope {
    envelope(key, PayloadBody::PulseAnnounce(PulsePayload::new(pulse)))
}

/// A pulse with the given number and entropy and no contributors.
pub fn bare_pulse(number: u64, entropy: Entropy) -> Pulse {
    Pulse {
        number: PulseNumber(number),
        entropy,
        signatures: BTreeMap::new(),
    }
}

/// A signer that can be switched off mid-test.
///
/// Clones share the switch, so a test can keep one handle and hand the
/// other to a coordinator.
#[derive(Clone)]
pub struct RevocableSigner {
    key: KeyPair,
    revoked: Arc<AtomicBool>,
}

impl RevocableSigner {
    pub fn new(key: KeyPair) -> Self {
        Self {
            key,
            revoked: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every later signing attempt fail.
    pub fn revoke(&self) {
        self.revoked.store(true, Ordering::SeqCst);
    }
}

impl PulsarSigner for RevocableSigner {
    fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }

    fn try_sign(&self, message: &[u8]) -> Result<Signature, SignerError> {
        if self.revoked.load(Ordering::SeqCst) {
            return Err(SignerError("key revoked".into()));
        }
        Ok(self.key.sign(message))
    }
}
