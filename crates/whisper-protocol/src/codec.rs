use crate::envelope::Envelope;
use crate::error::ProtocolError;

/// Default upper bound on a serialized envelope: 16 MiB.
pub const MAX_ENVELOPE_SIZE: usize = 16 * 1024 * 1024;

/// Serialize an envelope for reliable delivery to one peer.
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, ProtocolError> {
    Ok(postcard::to_allocvec(envelope)?)
}

/// Deserialize an envelope received from a peer.
///
/// Frames above `max_size` are refused before any parsing happens.
pub fn decode_envelope(bytes: &[u8], max_size: usize) -> Result<Envelope, ProtocolError> {
    if bytes.len() > max_size {
        return Err(ProtocolError::EnvelopeTooLarge {
            size: bytes.len(),
            max: max_size,
        });
    }
    Ok(postcard::from_bytes(bytes)?)
}
