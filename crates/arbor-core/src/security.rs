//! # Signing Capability
//!
//! The engine never implements cryptography. `hash` props are signed and
//! verified through an injected [`Signer`]; key arguments are opaque
//! references the signer knows how to resolve.

use crate::types::GraphError;

/// Sign/verify capability injected into the engine.
pub trait Signer: Send + Sync {
    /// Sign `plaintext` with the private key behind `private_key`.
    fn sign(&self, private_key: &str, plaintext: &str) -> Result<String, GraphError>;

    /// Check `signature` over `plaintext` against the public key behind `public_key`.
    ///
    /// Any failure to verify must return `false`.
    fn verify(&self, public_key: &str, plaintext: &str, signature: &str) -> bool;
}
