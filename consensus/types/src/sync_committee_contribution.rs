use crate::{Hash256, SignatureBytes, Slot};
use serde_derive::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::{typenum, BitVector};
use tree_hash_derive::TreeHash;

/// Aggregation bits for one sync subcommittee (mainnet preset: 512 / 4).
pub type SyncSubcommitteeBits = BitVector<typenum::U128>;

/// An aggregate of sync committee signatures scoped to a single subcommittee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct SyncCommitteeContribution {
    pub slot: Slot,
    pub beacon_block_root: Hash256,
    #[serde(with = "eth2_serde_utils::quoted_u64")]
    pub subcommittee_index: u64,
    pub aggregation_bits: SyncSubcommitteeBits,
    pub signature: SignatureBytes,
}

impl SyncCommitteeContribution {
    /// The fraction of the subcommittee that contributed, in `[0, 1]`.
    pub fn coverage(&self) -> f64 {
        self.aggregation_bits.num_set_bits() as f64 / self.aggregation_bits.len() as f64
    }
}

/// A contribution paired with the proof that its signer won the aggregator
/// draw for the subcommittee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct ContributionAndProof {
    #[serde(with = "eth2_serde_utils::quoted_u64")]
    pub aggregator_index: u64,
    pub contribution: SyncCommitteeContribution,
    pub selection_proof: SignatureBytes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct SignedContributionAndProof {
    pub message: ContributionAndProof,
    pub signature: SignatureBytes,
}
