use crate::{Error, PUBLIC_KEY_BYTES_LEN};
use std::fmt;

/// A BLS public key that is known to represent a valid, non-infinity point in
/// the G1 group.
#[derive(Clone)]
pub struct PublicKey {
    point: blst::min_pk::PublicKey,
}

impl PublicKey {
    /// Deserializes and validates a compressed public key.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != PUBLIC_KEY_BYTES_LEN {
            return Err(Error::InvalidByteLength {
                got: bytes.len(),
                expected: PUBLIC_KEY_BYTES_LEN,
            });
        }

        let point = blst::min_pk::PublicKey::key_validate(bytes)?;
        Ok(Self { point })
    }

    pub fn serialize(&self) -> [u8; PUBLIC_KEY_BYTES_LEN] {
        self.point.compress()
    }

    pub(crate) fn point(&self) -> &blst::min_pk::PublicKey {
        &self.point
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.serialize() == other.serialize()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.serialize()))
    }
}
