use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use std::fs::read_to_string;
use std::path::Path;

use crate::error::{KeyError, ParseError};
use crate::keys::{keypair_from_string, public_key_from_string, CellKeyPair, CellPublicKey};

/// Encode binary data as one segment of a token string
///
/// Segments use unpadded URL-safe base64 so tokens can travel in headers,
/// query strings and form bodies without further escaping.
pub fn encode_segment(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode one segment of a token string back to binary
///
/// # Arguments
///
/// * `segment` - Unpadded URL-safe base64 text
///
/// # Returns
///
/// Binary data or a `Malformed` error if the segment is not valid base64
pub fn decode_segment(segment: &str) -> Result<Vec<u8>, ParseError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| ParseError::malformed(format!("invalid base64 segment: {e}")))
}

pub fn public_key_from_file(path: impl AsRef<Path>) -> Result<CellPublicKey, KeyError> {
    let key_string = read_to_string(path).map_err(|e| KeyError::Io(e.to_string()))?;
    public_key_from_string(key_string.trim())
}

pub fn keypair_from_file(path: impl AsRef<Path>) -> Result<CellKeyPair, KeyError> {
    let key_string = read_to_string(path).map_err(|e| KeyError::Io(e.to_string()))?;
    keypair_from_string(key_string.trim())
}
