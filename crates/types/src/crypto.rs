//! Cryptographic key pairs and signatures.
//!
//! Pulsars may run either key type:
//! - ED25519: Fast signing for general use
//! - BLS12-381: For deployments that share keys with BLS-based validators
//!
//! A pulsar signs through [`PulsarSigner`], which may fail when the key
//! material goes away (revoked HSM session, unmounted key file).

use sbor::prelude::*;
use std::fmt;
use thiserror::Error;

/// Supported key types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BasicSbor)]
pub enum KeyType {
    /// ED25519 - Fast, widely supported.
    Ed25519,
    /// BLS12-381.
    Bls12381,
}

/// A cryptographic key pair for signing.
#[derive(Clone)]
pub enum KeyPair {
    /// ED25519 key pair.
    Ed25519(ed25519_dalek::SigningKey),
    /// BLS12-381 key pair.
    Bls12381(blst::min_pk::SecretKey),
}

impl KeyPair {
    /// Generate a keypair from a seed (for key files, testing and simulation).
    pub fn from_seed(key_type: KeyType, seed: &[u8; 32]) -> Self {
        match key_type {
            KeyType::Ed25519 => {
                let signing_key = ed25519_dalek::SigningKey::from_bytes(seed);
                KeyPair::Ed25519(signing_key)
            }
            KeyType::Bls12381 => {
                // key_gen only rejects input keying material shorter than 32 bytes.
                let sk = blst::min_pk::SecretKey::key_gen(seed, &[])
                    .expect("32-byte ikm is always accepted");
                KeyPair::Bls12381(sk)
            }
        }
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        match self {
            KeyPair::Ed25519(signing_key) => {
                use ed25519_dalek::Signer;
                let sig = signing_key.sign(message);
                Signature::Ed25519(sig.to_bytes().to_vec())
            }
            KeyPair::Bls12381(sk) => {
                let sig = sk.sign(message, &[], &[]);
                Signature::Bls12381(sig.to_bytes().to_vec())
            }
        }
    }

    /// Get the public key.
    pub fn public_key(&self) -> PublicKey {
        match self {
            KeyPair::Ed25519(signing_key) => {
                PublicKey::Ed25519(signing_key.verifying_key().to_bytes())
            }
            KeyPair::Bls12381(sk) => PublicKey::Bls12381(sk.sk_to_pk().to_bytes().to_vec()),
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({:?})", self.public_key())
    }
}

/// The local signing key became unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("signing key unavailable: {0}")]
pub struct SignerError(pub String);

/// Source of this pulsar's signatures.
///
/// An in-memory [`KeyPair`] never fails. Other signers may, and a pulsar
/// that cannot sign must stop rather than emit unsigned material.
pub trait PulsarSigner: Send {
    /// Key that verifies this signer's signatures.
    fn public_key(&self) -> PublicKey;

    /// Sign a message.
    fn try_sign(&self, message: &[u8]) -> Result<Signature, SignerError>;
}

impl PulsarSigner for KeyPair {
    fn public_key(&self) -> PublicKey {
        KeyPair::public_key(self)
    }

    fn try_sign(&self, message: &[u8]) -> Result<Signature, SignerError> {
        Ok(self.sign(message))
    }
}

impl<S: PulsarSigner + ?Sized> PulsarSigner for Box<S> {
    fn public_key(&self) -> PublicKey {
        (**self).public_key()
    }

    fn try_sign(&self, message: &[u8]) -> Result<Signature, SignerError> {
        (**self).try_sign(message)
    }
}

/// A public key for signature verification.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, BasicSbor)]
pub enum PublicKey {
    /// ED25519 public key (32 bytes).
    Ed25519([u8; 32]),
    /// BLS12-381 public key (48 bytes compressed).
    Bls12381(Vec<u8>),
}

impl PublicKey {
    /// Verify a signature.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        match (self, signature) {
            (PublicKey::Ed25519(pk_bytes), Signature::Ed25519(sig_bytes)) => {
                use ed25519_dalek::Verifier;
                let pk = match ed25519_dalek::VerifyingKey::from_bytes(pk_bytes) {
                    Ok(pk) => pk,
                    Err(_) => return false,
                };
                let sig_array: [u8; 64] = match sig_bytes.as_slice().try_into() {
                    Ok(arr) => arr,
                    Err(_) => return false,
                };
                let sig = ed25519_dalek::Signature::from_bytes(&sig_array);
                pk.verify(message, &sig).is_ok()
            }
            (PublicKey::Bls12381(pk_bytes), Signature::Bls12381(sig_bytes)) => {
                let pk = match blst::min_pk::PublicKey::from_bytes(pk_bytes) {
                    Ok(pk) => pk,
                    Err(_) => return false,
                };
                let sig = match blst::min_pk::Signature::from_bytes(sig_bytes) {
                    Ok(sig) => sig,
                    Err(_) => return false,
                };
                sig.verify(true, message, &[], &[], &pk, true) == blst::BLST_ERROR::BLST_SUCCESS
            }
            _ => false, // Mismatched types
        }
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            PublicKey::Ed25519(bytes) => bytes.as_slice(),
            PublicKey::Bls12381(bytes) => bytes.as_slice(),
        }
    }

    /// Hex encoding of the raw key bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        let short = if hex.len() > 16 {
            format!("{}..{}", &hex[..8], &hex[hex.len() - 8..])
        } else {
            hex
        };
        match self {
            PublicKey::Ed25519(_) => write!(f, "PublicKey::Ed25519({})", short),
            PublicKey::Bls12381(_) => write!(f, "PublicKey::Bls12381({})", short),
        }
    }
}

/// A cryptographic signature.
#[derive(Clone, PartialEq, Eq, BasicSbor)]
pub enum Signature {
    /// ED25519 signature (64 bytes).
    Ed25519(Vec<u8>),
    /// BLS12-381 signature (96 bytes compressed).
    Bls12381(Vec<u8>),
}

impl Signature {
    /// Create a zero/placeholder signature for testing.
    pub fn zero() -> Self {
        Signature::Ed25519(vec![0u8; 64])
    }

    /// Get signature as byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Signature::Ed25519(bytes) => bytes.as_slice(),
            Signature::Bls12381(bytes) => bytes.as_slice(),
        }
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = hex::encode(self.as_bytes());
        let short = &hex[..hex.len().min(16)];
        match self {
            Signature::Ed25519(_) => write!(f, "Signature::Ed25519({}..)", short),
            Signature::Bls12381(_) => write!(f, "Signature::Bls12381({}..)", short),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ed25519_sign_verify() {
        let keypair = KeyPair::from_seed(KeyType::Ed25519, &[5u8; 32]);
        let message = b"entropy";

        let signature = keypair.sign(message);
        let pubkey = keypair.public_key();

        assert!(pubkey.verify(message, &signature));
        assert!(!pubkey.verify(b"other entropy", &signature));
    }

    #[test]
    fn test_bls_sign_verify() {
        let keypair = KeyPair::from_seed(KeyType::Bls12381, &[5u8; 32]);
        let message = b"entropy";

        let signature = keypair.sign(message);
        let pubkey = keypair.public_key();

        assert!(pubkey.verify(message, &signature));
        assert!(!pubkey.verify(b"other entropy", &signature));
    }

    #[test]
    fn test_mismatched_key_types_never_verify() {
        let ed = KeyPair::from_seed(KeyType::Ed25519, &[1u8; 32]);
        let bls = KeyPair::from_seed(KeyType::Bls12381, &[1u8; 32]);

        let sig = bls.sign(b"msg");
        assert!(!ed.public_key().verify(b"msg", &sig));
        assert!(!ed.public_key().verify(b"msg", &Signature::zero()));
    }

    #[test]
    fn test_keypair_from_seed_is_deterministic() {
        let seed = [42u8; 32];

        let kp1 = KeyPair::from_seed(KeyType::Ed25519, &seed);
        let kp2 = KeyPair::from_seed(KeyType::Ed25519, &seed);

        assert_eq!(kp1.sign(b"test"), kp2.sign(b"test"));
        assert_eq!(kp1.public_key(), kp2.public_key());
        assert!(matches!(kp1, KeyPair::Ed25519(_)));
    }

    #[test]
    fn test_keypair_signer_never_fails() {
        let kp = KeyPair::from_seed(KeyType::Bls12381, &[9u8; 32]);
        let signer: &dyn PulsarSigner = &kp;

        let signature = signer.try_sign(b"pulse").unwrap();
        assert_eq!(signer.public_key(), kp.public_key());
        assert!(kp.public_key().verify(b"pulse", &signature));
    }
}
