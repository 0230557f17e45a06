//! Consensus container types used by the duty agent.
//!
//! Only the containers the agent actually produces, submits or inspects are
//! defined here. Mainnet-preset lengths are fixed at compile time as typenum
//! aliases on the container definitions; chain-variable constants travel at
//! runtime via the beacon node's spec.

mod attestation;
mod beacon_block;
mod builder_bid;
mod execution_payload_header;
mod signing_data;
mod slashings;
mod slot_epoch;
mod sync_committee_contribution;
mod sync_committee_message;
mod sync_selection_proof;

pub use attestation::{AggregationBits, Attestation, AttestationData, Checkpoint};
pub use beacon_block::{BeaconBlock, BeaconBlockBody};
pub use builder_bid::{
    BuilderBidBellatrix, BuilderBidCapella, SignedBuilderBidBellatrix, SignedBuilderBidCapella,
    VersionedSignedBuilderBid,
};
pub use execution_payload_header::{
    ExecutionPayloadHeaderBellatrix, ExecutionPayloadHeaderCapella, ExtraData, LogsBloom,
};
pub use signing_data::SigningData;
pub use slashings::{
    AttesterSlashing, AttestingIndices, BeaconBlockHeader, IndexedAttestation, ProposerSlashing,
    SignedBeaconBlockHeader,
};
pub use slot_epoch::{Epoch, Slot};
pub use sync_committee_contribution::{
    ContributionAndProof, SignedContributionAndProof, SyncCommitteeContribution,
    SyncSubcommitteeBits,
};
pub use sync_committee_message::SyncCommitteeMessage;
pub use sync_selection_proof::SyncSelectionProof;

pub use bls::{PublicKey, PublicKeyBytes, Signature, SignatureBytes};

pub use ssz_types::{typenum, BitList, BitVector, FixedVector, VariableList};

/// A 32-byte hash or root.
pub type Hash256 = ethereum_types::H256;

/// A 20-byte execution-layer address.
pub type Address = ethereum_types::H160;

/// A 256-bit unsigned integer, used for bid values.
pub type Uint256 = ethereum_types::U256;
