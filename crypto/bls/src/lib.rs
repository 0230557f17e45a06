//! BLS types for an agent that consumes signatures from external signers and
//! verifies signatures from builder relays.
//!
//! Signing is deliberately absent: every signature handled by this workspace
//! is produced elsewhere and treated as opaque bytes until verification is
//! required, at which point it is decompressed into a `blst` point.

mod public_key;
mod public_key_bytes;
mod signature;
mod signature_bytes;

pub use public_key::PublicKey;
pub use public_key_bytes::PublicKeyBytes;
pub use signature::Signature;
pub use signature_bytes::SignatureBytes;

/// The byte-size of a compressed BLS public key.
pub const PUBLIC_KEY_BYTES_LEN: usize = 48;

/// The byte-size of a compressed BLS signature.
pub const SIGNATURE_BYTES_LEN: usize = 96;

/// Domain separation tag for BLS12-381 G2 signatures.
pub const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

#[derive(Debug, PartialEq, Clone)]
pub enum Error {
    /// An error was raised from the `blst` library.
    BlstError(blst::BLST_ERROR),
    /// The provided bytes were an incorrect length.
    InvalidByteLength { got: usize, expected: usize },
}

impl From<blst::BLST_ERROR> for Error {
    fn from(e: blst::BLST_ERROR) -> Error {
        Error::BlstError(e)
    }
}
