// crates/tessera-core/src/crypto.rs
//
// Ed25519 signing over SHA-256 digests. Peer score messages are signed by
// the sending validator's hotkey and verified against the registry.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::error::TesseraError;

/// A validator hotkey.
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Fresh keypair from the OS random source.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Rebuild a keypair from its 32-byte secret.
    pub fn from_secret(secret: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
        }
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Sign the SHA-256 digest of `data`.
    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        self.signing_key.sign(&digest(data)).to_bytes().to_vec()
    }
}

/// SHA-256 of `data`.
pub fn digest(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Check a signature produced by [`Keypair::sign`].
pub fn verify(public_key: &[u8; 32], data: &[u8], signature: &[u8]) -> Result<(), TesseraError> {
    let key = VerifyingKey::from_bytes(public_key)
        .map_err(|e| TesseraError::Crypto(format!("invalid public key: {}", e)))?;
    let bytes: [u8; 64] = signature
        .try_into()
        .map_err(|_| TesseraError::Crypto(format!("signature is {} bytes, expected 64", signature.len())))?;
    key.verify(&digest(data), &Signature::from_bytes(&bytes))
        .map_err(|e| TesseraError::Crypto(format!("signature rejected: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let keypair = Keypair::generate();
        let sig = keypair.sign(b"slot 12 scores");
        assert!(verify(&keypair.public_key(), b"slot 12 scores", &sig).is_ok());
        assert!(verify(&keypair.public_key(), b"slot 13 scores", &sig).is_err());
    }

    #[test]
    fn test_secret_round_trip_keeps_identity() {
        let keypair = Keypair::generate();
        let restored = Keypair::from_secret(&keypair.secret_bytes());
        assert_eq!(keypair.public_key(), restored.public_key());
    }

    #[test]
    fn test_short_signature_rejected() {
        let keypair = Keypair::generate();
        let err = verify(&keypair.public_key(), b"x", &[0u8; 10]).unwrap_err();
        assert!(matches!(err, TesseraError::Crypto(_)));
    }

    #[test]
    fn test_digest_is_stable() {
        assert_eq!(digest(b"tessera"), digest(b"tessera"));
        assert_ne!(digest(b"tessera"), digest(b"tesserae"));
    }
}
