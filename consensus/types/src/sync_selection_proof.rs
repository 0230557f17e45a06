use crate::SignatureBytes;
use eth2_hashing::hash;
use safe_arith::{ArithError, SafeArith};
use ssz::Encode;
use std::cmp;
use std::convert::TryInto;

/// A signature over `(slot, subcommittee_index)` that doubles as a verifiable
/// random draw deciding whether its signer aggregates for that subcommittee.
#[derive(PartialEq, Debug, Clone)]
pub struct SyncSelectionProof(SignatureBytes);

impl SyncSelectionProof {
    /// Returns the modulo used for determining if a `SyncSelectionProof`
    /// elects an aggregator.
    pub fn modulo(
        sync_committee_size: u64,
        sync_committee_subnet_count: u64,
        target_aggregators_per_sync_subcommittee: u64,
    ) -> Result<u64, ArithError> {
        Ok(cmp::max(
            1,
            sync_committee_size
                .safe_div(sync_committee_subnet_count)?
                .safe_div(target_aggregators_per_sync_subcommittee)?,
        ))
    }

    pub fn is_aggregator(&self, modulo: u64) -> Result<bool, ArithError> {
        let signature_hash = hash(&self.0.as_ssz_bytes());
        let signature_hash_int = u64::from_le_bytes(
            signature_hash
                .get(0..8)
                .expect("hash is 32 bytes")
                .try_into()
                .expect("first 8 bytes of signature should always convert to fixed array"),
        );

        signature_hash_int.safe_rem(modulo).map(|rem| rem == 0)
    }
}

impl From<SyncSelectionProof> for SignatureBytes {
    fn from(proof: SyncSelectionProof) -> Self {
        proof.0
    }
}

impl From<SignatureBytes> for SyncSelectionProof {
    fn from(sig: SignatureBytes) -> Self {
        Self(sig)
    }
}
