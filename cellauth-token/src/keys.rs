use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};

use crate::error::KeyError;

/// Produces the seal appended to every encoded token.
///
/// Implementations must be deterministic for a given key only in the sense
/// that the matching [`TokenVerifier`] accepts what they produce; the codec
/// makes no other assumption about the algorithm.
pub trait TokenSigner: Send + Sync {
    fn sign(&self, message: &[u8]) -> Vec<u8>;
}

/// Checks a seal produced by the matching [`TokenSigner`].
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, message: &[u8], seal: &[u8]) -> bool;
}

/// Public half of a cell's signing key, as published to other cells.
///
/// The string form is `"<algorithm>/<hex>"`, e.g. `ed25519/3b6a27bc...`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellPublicKey {
    Ed25519(VerifyingKey),
}

impl CellPublicKey {
    pub fn algorithm(&self) -> &'static str {
        match self {
            CellPublicKey::Ed25519(_) => "ed25519",
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            CellPublicKey::Ed25519(key) => key.to_bytes().to_vec(),
        }
    }
}

impl TokenVerifier for CellPublicKey {
    fn verify(&self, message: &[u8], seal: &[u8]) -> bool {
        match self {
            CellPublicKey::Ed25519(key) => {
                let Ok(bytes) = <[u8; 64]>::try_from(seal) else {
                    return false;
                };
                let signature = Signature::from_bytes(&bytes);
                key.verify_strict(message, &signature).is_ok()
            }
        }
    }
}

impl fmt::Display for CellPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.algorithm(), hex::encode(self.to_bytes()))
    }
}

impl FromStr for CellPublicKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        public_key_from_string(s)
    }
}

/// A cell's signing key pair.
#[derive(Clone)]
pub struct CellKeyPair {
    signing_key: SigningKey,
}

impl CellKeyPair {
    /// Generate a fresh Ed25519 key pair from the thread-local CSPRNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut rand::thread_rng()),
        }
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    pub fn public(&self) -> CellPublicKey {
        CellPublicKey::Ed25519(self.signing_key.verifying_key())
    }

    /// Private key in `"ed25519/<hex seed>"` form, the format `CellConfig` stores.
    pub fn to_key_string(&self) -> String {
        format!("ed25519/{}", hex::encode(self.signing_key.to_bytes()))
    }
}

impl TokenSigner for CellKeyPair {
    fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }
}

impl fmt::Debug for CellKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellKeyPair")
            .field("public", &self.public().to_string())
            .finish_non_exhaustive()
    }
}

fn split_key_string(key: &str) -> Result<(&str, Vec<u8>), KeyError> {
    // first split the string on the /
    let parts = key.split('/').collect::<Vec<&str>>();
    if parts.len() != 2 {
        return Err(KeyError::invalid_format(
            "Key must be in format 'algorithm/hexkey'",
        ));
    }
    let bytes = hex::decode(parts[1])?;
    Ok((parts[0], bytes))
}

fn ed25519_bytes(bytes: Vec<u8>) -> Result<[u8; 32], KeyError> {
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| KeyError::invalid_format("Ed25519 keys must be 32 bytes"))
}

/// Takes a public key encoded as a string in the format "ed25519/..."
/// and returns a CellPublicKey.
pub fn public_key_from_string(key: &str) -> Result<CellPublicKey, KeyError> {
    let (algorithm, bytes) = split_key_string(key)?;
    match algorithm {
        "ed25519" => {
            let bytes = ed25519_bytes(bytes)?;
            let key = VerifyingKey::from_bytes(&bytes)
                .map_err(|e| KeyError::invalid_format(e.to_string()))?;
            Ok(CellPublicKey::Ed25519(key))
        }
        other => Err(KeyError::UnsupportedAlgorithm(other.to_string())),
    }
}

/// Takes a private key in the format "ed25519/<hex seed>" and returns a CellKeyPair.
pub fn keypair_from_string(key: &str) -> Result<CellKeyPair, KeyError> {
    let (algorithm, bytes) = split_key_string(key)?;
    match algorithm {
        "ed25519" => Ok(CellKeyPair::from_seed(ed25519_bytes(bytes)?)),
        other => Err(KeyError::UnsupportedAlgorithm(other.to_string())),
    }
}
