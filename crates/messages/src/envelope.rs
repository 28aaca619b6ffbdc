//! Signed envelope wrapping every protocol message.
//!
//! The body travels as the exact SBOR bytes that were signed, so verification
//! never depends on re-encoding. Nothing inside the body is looked at until
//! the signature has been checked against the embedded public key.

use crate::PayloadBody;
use pulsar_types::{envelope_message, PublicKey, PulsarSigner, Signature, SignerError};
use sbor::prelude::BasicSbor;
use thiserror::Error;

/// Errors produced while wrapping or unwrapping an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The signature does not verify against the embedded public key.
    #[error("envelope signature does not verify")]
    InvalidSignature,

    /// The signed body does not decode into any known payload.
    #[error("malformed payload body: {0}")]
    MalformedBody(String),

    /// The body could not be encoded.
    #[error("payload encode error: {0}")]
    Encode(String),

    /// The signer refused to produce a signature.
    #[error(transparent)]
    Signing(#[from] SignerError),
}

/// `{PublicKey, Signature over Body, Body}`.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct Envelope {
    /// Key of the claimed sender.
    pub public_key: PublicKey,
    /// Signature over `envelope_message(body)`.
    pub signature: Signature,
    /// SBOR-encoded [`PayloadBody`].
    pub body: Vec<u8>,
}

impl Envelope {
    /// Encode and sign a body.
    pub fn wrap<S: PulsarSigner + ?Sized>(
        body: &PayloadBody,
        signer: &S,
    ) -> Result<Self, CodecError> {
        let bytes = sbor::basic_encode(body).map_err(|e| CodecError::Encode(format!("{:?}", e)))?;
        let signature = signer.try_sign(&envelope_message(&bytes))?;
        Ok(Self {
            public_key: signer.public_key(),
            signature,
            body: bytes,
        })
    }

    /// Verify the signature, then decode the body.
    pub fn unwrap(&self) -> Result<PayloadBody, CodecError> {
        if !self.verify() {
            return Err(CodecError::InvalidSignature);
        }
        sbor::basic_decode(&self.body).map_err(|e| CodecError::MalformedBody(format!("{:?}", e)))
    }

    /// Check the signature against the embedded public key.
    pub fn verify(&self) -> bool {
        self.public_key
            .verify(&envelope_message(&self.body), &self.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EntropyPayload, GetLastPulsePayload};
    use pulsar_types::{Entropy, KeyPair, KeyType, PulseNumber};

    fn key(byte: u8) -> KeyPair {
        KeyPair::from_seed(KeyType::Ed25519, &[byte; 32])
    }

    fn reveal() -> PayloadBody {
        PayloadBody::Entropy(EntropyPayload::new(
            PulseNumber(3),
            Entropy::from_bytes([9u8; 64]),
        ))
    }

    #[test]
    fn test_wrap_unwrap() {
        let envelope = Envelope::wrap(&reveal(), &key(1)).unwrap();

        assert_eq!(envelope.public_key, key(1).public_key());
        assert_eq!(envelope.unwrap(), Ok(reveal()));
    }

    #[test]
    fn test_tampered_body_is_invalid_signature() {
        let mut envelope = Envelope::wrap(&reveal(), &key(1)).unwrap();
        let last = envelope.body.len() - 1;
        envelope.body[last] ^= 0xFF;

        assert_eq!(envelope.unwrap(), Err(CodecError::InvalidSignature));
    }

    #[test]
    fn test_substituted_public_key_is_invalid_signature() {
        let mut envelope = Envelope::wrap(&reveal(), &key(1)).unwrap();
        envelope.public_key = key(2).public_key();

        assert_eq!(envelope.unwrap(), Err(CodecError::InvalidSignature));
    }

    #[test]
    fn test_signed_garbage_is_malformed_body() {
        let signer = key(1);
        let body = vec![0xde, 0xad, 0xbe, 0xef];
        let envelope = Envelope {
            public_key: signer.public_key(),
            signature: signer.sign(&envelope_message(&body)),
            body,
        };

        assert!(matches!(
            envelope.unwrap(),
            Err(CodecError::MalformedBody(_))
        ));
    }

    #[test]
    fn test_bls_signed_envelope() {
        let signer = KeyPair::from_seed(KeyType::Bls12381, &[4u8; 32]);
        let body = PayloadBody::GetLastPulse(GetLastPulsePayload::request());
        let envelope = Envelope::wrap(&body, &signer).unwrap();

        assert_eq!(envelope.unwrap(), Ok(body));
    }

    struct Refusing(KeyPair);

    impl PulsarSigner for Refusing {
        fn public_key(&self) -> PublicKey {
            self.0.public_key()
        }

        fn try_sign(&self, _message: &[u8]) -> Result<Signature, SignerError> {
            Err(SignerError("hsm offline".into()))
        }
    }

    #[test]
    fn test_refused_signature_is_signing_error() {
        let result = Envelope::wrap(&reveal(), &Refusing(key(1)));

        assert_eq!(
            result,
            Err(CodecError::Signing(SignerError("hsm offline".into())))
        );
    }
}
