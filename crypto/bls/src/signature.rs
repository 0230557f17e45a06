use crate::{Error, PublicKey, DST, SIGNATURE_BYTES_LEN};
use std::fmt;

/// A BLS signature that has been decompressed into a G2 point, ready for
/// verification.
#[derive(Clone)]
pub struct Signature {
    point: blst::min_pk::Signature,
}

impl Signature {
    /// Deserializes a compressed signature.
    ///
    /// Subgroup checks are deferred to `verify`.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != SIGNATURE_BYTES_LEN {
            return Err(Error::InvalidByteLength {
                got: bytes.len(),
                expected: SIGNATURE_BYTES_LEN,
            });
        }

        let point = blst::min_pk::Signature::uncompress(bytes)?;
        Ok(Self { point })
    }

    pub fn serialize(&self) -> [u8; SIGNATURE_BYTES_LEN] {
        self.point.compress()
    }

    /// Verifies `self` against `msg` under `public_key`.
    pub fn verify(&self, public_key: &PublicKey, msg: &[u8]) -> bool {
        self.point
            .verify(true, msg, DST, &[], public_key.point(), true)
            == blst::BLST_ERROR::BLST_SUCCESS
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.serialize()))
    }
}
