//! Signing capability.
//!
//! The client never touches curve arithmetic; it asks a [`Signer`] for the
//! public key and for signatures over serialized messages. [`Keypair`] is
//! the bundled in-memory implementation.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use ed25519_dalek::Signer as _;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;

use crate::error::{Error, Result};
use crate::identifiers::{Address, Signature};

// ============================================================================
// Signer
// ============================================================================

/// Produces signatures for one public key.
pub trait Signer: Send + Sync {
    /// Public key the signatures verify against.
    fn pubkey(&self) -> Address;

    /// Signs a serialized transaction message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Signing`] if the backend refuses.
    fn sign_message(&self, message: &[u8]) -> Result<Signature>;
}

// ============================================================================
// Keypair
// ============================================================================

/// In-memory ed25519 keypair.
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generates a fresh keypair from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Builds a keypair from a 32-byte secret seed.
    #[must_use]
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Parses the 64-byte `secret || public` layout used by keypair files.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Signing`] on wrong length or a mismatched public half.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: &[u8; 64] = bytes
            .try_into()
            .map_err(|_| Error::signing(format!("keypair must be 64 bytes, got {}", bytes.len())))?;
        let signing_key = SigningKey::from_keypair_bytes(bytes)
            .map_err(|e| Error::signing(format!("invalid keypair: {e}")))?;
        Ok(Self { signing_key })
    }

    /// Parses a JSON array of 64 integers, as written by `solana-keygen`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Signing`] if the text is not such an array.
    pub fn from_json(text: &str) -> Result<Self> {
        let bytes: Vec<u8> = serde_json::from_str(text)
            .map_err(|e| Error::signing(format!("keypair JSON: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Returns the 64-byte `secret || public` form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 64] {
        self.signing_key.to_keypair_bytes()
    }
}

impl Signer for Keypair {
    fn pubkey(&self) -> Address {
        Address::new(self.signing_key.verifying_key().to_bytes())
    }

    fn sign_message(&self, message: &[u8]) -> Result<Signature> {
        let signature = self.signing_key.sign(message);
        Ok(Signature::from(signature.to_bytes()))
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("pubkey", &self.pubkey())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use ed25519_dalek::{Verifier, VerifyingKey};

    #[test]
    fn test_signature_verifies() {
        let keypair = Keypair::generate();
        let signature = keypair.sign_message(b"message").unwrap();

        let verifying = VerifyingKey::from_bytes(keypair.pubkey().as_bytes()).unwrap();
        let signature = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
        assert!(verifying.verify(b"message", &signature).is_ok());
    }

    #[test]
    fn test_seed_is_deterministic() {
        let a = Keypair::from_seed(&[7u8; 32]);
        let b = Keypair::from_seed(&[7u8; 32]);
        assert_eq!(a.pubkey(), b.pubkey());
        assert_eq!(a.sign_message(b"x").unwrap(), b.sign_message(b"x").unwrap());
    }

    #[test]
    fn test_bytes_round_trip() {
        let keypair = Keypair::generate();
        let restored = Keypair::from_bytes(&keypair.to_bytes()).unwrap();
        assert_eq!(restored.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_from_json_rejects_short_input() {
        let err = Keypair::from_json("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, Error::Signing { .. }));
    }

    #[test]
    fn test_debug_hides_secret() {
        let keypair = Keypair::from_seed(&[1u8; 32]);
        let debug = format!("{keypair:?}");
        assert!(debug.contains("pubkey"));
        assert!(!debug.contains("signing_key"));
    }
}
