//! Transport framing for envelopes.
//!
//! # Wire Format
//!
//! Every frame handed to the transport is an SBOR-encoded [`Envelope`],
//! LZ4-compressed with the uncompressed size prepended:
//!
//! ```text
//! [u32 uncompressed size][LZ4 compressed SBOR envelope]
//! ```

use crate::Envelope;
use thiserror::Error;

/// Largest decompressed frame accepted, bounding memory per inbound frame.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("Frame too short")]
    FrameTooShort,

    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("SBOR decode error: {0}")]
    SborDecode(String),

    #[error("SBOR encode error: {0}")]
    SborEncode(String),

    #[error("Decompression error: {0}")]
    Decompress(String),
}

/// Encode an envelope to wire format.
pub fn encode_frame(envelope: &Envelope) -> Result<Vec<u8>, WireError> {
    let sbor_bytes =
        sbor::basic_encode(envelope).map_err(|e| WireError::SborEncode(format!("{:?}", e)))?;
    Ok(lz4_flex::compress_prepend_size(&sbor_bytes))
}

/// Decode an envelope from wire format.
///
/// Only the framing is checked here; the envelope signature is verified by
/// [`Envelope::unwrap`].
pub fn decode_frame(data: &[u8]) -> Result<Envelope, WireError> {
    if data.len() < 4 {
        return Err(WireError::FrameTooShort);
    }

    let declared = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if declared > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge(declared));
    }

    let payload = lz4_flex::decompress_size_prepended(data)
        .map_err(|e| WireError::Decompress(e.to_string()))?;

    sbor::basic_decode(&payload).map_err(|e| WireError::SborDecode(format!("{:?}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HandshakePayload, PayloadBody};
    use pulsar_types::{Entropy, KeyPair, KeyType};

    #[test]
    fn test_frame_preserves_signature() {
        let key = KeyPair::from_seed(KeyType::Ed25519, &[5u8; 32]);
        let body = PayloadBody::Handshake(HandshakePayload::new(Entropy::from_bytes([1; 64])));
        let envelope = Envelope::wrap(&body, &key).unwrap();

        let frame = encode_frame(&envelope).unwrap();
        let decoded = decode_frame(&frame).unwrap();

        assert_eq!(decoded, envelope);
        assert_eq!(decoded.unwrap(), Ok(body));
    }

    #[test]
    fn test_short_frame() {
        assert!(matches!(decode_frame(&[1, 2]), Err(WireError::FrameTooShort)));
    }

    #[test]
    fn test_oversized_frame_rejected_before_decompression() {
        let mut frame = (MAX_FRAME_SIZE as u32 + 1).to_le_bytes().to_vec();
        frame.extend_from_slice(&[0u8; 8]);
        assert!(matches!(
            decode_frame(&frame),
            Err(WireError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn test_invalid_compressed_data() {
        let frame = vec![16, 0, 0, 0, 99, 1, 2, 3];
        assert!(matches!(decode_frame(&frame), Err(WireError::Decompress(_))));
    }
}
