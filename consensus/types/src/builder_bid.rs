use crate::{
    Address, ExecutionPayloadHeaderBellatrix, ExecutionPayloadHeaderCapella, Hash256,
    PublicKeyBytes, SignatureBytes, Uint256,
};
use serde_derive::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

/// A builder's offer of an execution payload header in exchange for `value`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct BuilderBidBellatrix {
    pub header: ExecutionPayloadHeaderBellatrix,
    #[serde(with = "eth2_serde_utils::quoted_u256")]
    pub value: Uint256,
    pub pubkey: PublicKeyBytes,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct BuilderBidCapella {
    pub header: ExecutionPayloadHeaderCapella,
    #[serde(with = "eth2_serde_utils::quoted_u256")]
    pub value: Uint256,
    pub pubkey: PublicKeyBytes,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct SignedBuilderBidBellatrix {
    pub message: BuilderBidBellatrix,
    pub signature: SignatureBytes,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct SignedBuilderBidCapella {
    pub message: BuilderBidCapella,
    pub signature: SignatureBytes,
}

/// A signed builder bid from any supported fork, exposing the accessors the
/// auction needs without the caller matching on the version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VersionedSignedBuilderBid {
    Bellatrix(SignedBuilderBidBellatrix),
    Capella(SignedBuilderBidCapella),
}

impl VersionedSignedBuilderBid {
    /// The amount offered to the proposer, in wei.
    pub fn value(&self) -> Uint256 {
        match self {
            Self::Bellatrix(bid) => bid.message.value,
            Self::Capella(bid) => bid.message.value,
        }
    }

    /// The execution-layer address receiving priority fees.
    pub fn fee_recipient(&self) -> Address {
        match self {
            Self::Bellatrix(bid) => bid.message.header.fee_recipient,
            Self::Capella(bid) => bid.message.header.fee_recipient,
        }
    }

    /// The execution timestamp of the offered payload, in unix seconds.
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::Bellatrix(bid) => bid.message.header.timestamp,
            Self::Capella(bid) => bid.message.header.timestamp,
        }
    }

    pub fn signature(&self) -> &SignatureBytes {
        match self {
            Self::Bellatrix(bid) => &bid.signature,
            Self::Capella(bid) => &bid.signature,
        }
    }

    /// Hash tree root of the unsigned bid message, as covered by the builder's
    /// signature.
    pub fn message_tree_hash_root(&self) -> Hash256 {
        match self {
            Self::Bellatrix(bid) => bid.message.tree_hash_root(),
            Self::Capella(bid) => bid.message.tree_hash_root(),
        }
    }

    /// Hash tree root of the execution payload header alone.
    ///
    /// Two bids with equal header roots offer the same underlying block,
    /// regardless of which relay carried them.
    pub fn header_tree_hash_root(&self) -> Hash256 {
        match self {
            Self::Bellatrix(bid) => bid.message.header.tree_hash_root(),
            Self::Capella(bid) => bid.message.header.tree_hash_root(),
        }
    }

    /// Returns `true` for a structurally-present but all-default bid.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Bellatrix(bid) => *bid == SignedBuilderBidBellatrix::default(),
            Self::Capella(bid) => *bid == SignedBuilderBidCapella::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bid_with(value: u64, block_hash: Hash256) -> VersionedSignedBuilderBid {
        VersionedSignedBuilderBid::Bellatrix(SignedBuilderBidBellatrix {
            message: BuilderBidBellatrix {
                header: ExecutionPayloadHeaderBellatrix {
                    fee_recipient: Address::repeat_byte(9),
                    timestamp: 12,
                    block_hash,
                    ..Default::default()
                },
                value: Uint256::from(value),
                pubkey: PublicKeyBytes::empty(),
            },
            signature: SignatureBytes::empty(),
        })
    }

    #[test]
    fn accessors() {
        let bid = bid_with(1_000, Hash256::repeat_byte(1));
        assert_eq!(bid.value(), Uint256::from(1_000));
        assert_eq!(bid.fee_recipient(), Address::repeat_byte(9));
        assert_eq!(bid.timestamp(), 12);
        assert!(!bid.is_empty());
    }

    #[test]
    fn default_bid_is_empty() {
        let bid = VersionedSignedBuilderBid::Bellatrix(SignedBuilderBidBellatrix::default());
        assert!(bid.is_empty());
    }

    #[test]
    fn header_roots_identify_the_underlying_block() {
        let a = bid_with(1_000, Hash256::repeat_byte(1));
        let b = bid_with(2_000, Hash256::repeat_byte(1));
        let c = bid_with(1_000, Hash256::repeat_byte(2));

        // Value is not part of the header.
        assert_eq!(a.header_tree_hash_root(), b.header_tree_hash_root());
        assert_ne!(a.header_tree_hash_root(), c.header_tree_hash_root());
        // But it is part of the signed message.
        assert_ne!(a.message_tree_hash_root(), b.message_tree_hash_root());
    }
}
