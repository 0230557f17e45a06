use crate::{Attestation, AttesterSlashing, Hash256, ProposerSlashing, Slot};
use serde_derive::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::{typenum, VariableList};
use tree_hash_derive::TreeHash;

/// The subset of a phase0 block body that proposal scoring inspects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct BeaconBlockBody {
    pub proposer_slashings: VariableList<ProposerSlashing, typenum::U16>,
    pub attester_slashings: VariableList<AttesterSlashing, typenum::U2>,
    pub attestations: VariableList<Attestation, typenum::U128>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct BeaconBlock {
    pub slot: Slot,
    #[serde(with = "eth2_serde_utils::quoted_u64")]
    pub proposer_index: u64,
    pub parent_root: Hash256,
    pub state_root: Hash256,
    pub body: BeaconBlockBody,
}
