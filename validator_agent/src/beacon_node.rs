//! Traits describing the beacon node operations the agent consumes, plus
//! parsing of the spec constants the sync committee services require.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use types::{Hash256, SignedContributionAndProof, Slot, SyncCommitteeContribution,
    SyncCommitteeMessage};

pub type Result<T> = std::result::Result<T, Error>;

/// A failure reported by a beacon node collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct Error(pub String);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Provides the root of the beacon block identified by a block ID tag such as
/// `"head"`.
#[async_trait]
pub trait BeaconBlockRootProvider: Send + Sync {
    async fn beacon_block_root(&self, block_id: &str) -> Result<Option<Hash256>>;
}

#[async_trait]
pub trait SyncCommitteeContributionProvider: Send + Sync {
    async fn sync_committee_contribution(
        &self,
        slot: Slot,
        subcommittee_index: u64,
        beacon_block_root: Hash256,
    ) -> Result<Option<SyncCommitteeContribution>>;
}

#[async_trait]
pub trait SyncCommitteeMessagesSubmitter: Send + Sync {
    async fn submit_sync_committee_messages(
        &self,
        messages: &[SyncCommitteeMessage],
    ) -> Result<()>;
}

#[async_trait]
pub trait SyncCommitteeContributionsSubmitter: Send + Sync {
    async fn submit_sync_committee_contributions(
        &self,
        contributions: &[SignedContributionAndProof],
    ) -> Result<()>;
}

/// Provides the chain spec as the loosely-typed map returned by the node's
/// config endpoint.
#[async_trait]
pub trait SpecProvider: Send + Sync {
    async fn spec(&self) -> Result<HashMap<String, Value>>;
}

/// The spec constants the sync committee services depend upon.
///
/// Construction fails if any constant is missing or not an unsigned integer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpecConstants {
    pub slots_per_epoch: u64,
    pub sync_committee_size: u64,
    pub sync_committee_subnet_count: u64,
    pub target_aggregators_per_sync_subcommittee: u64,
}

impl SpecConstants {
    pub fn from_spec(spec: &HashMap<String, Value>) -> Result<Self> {
        Ok(Self {
            slots_per_epoch: spec_u64(spec, "SLOTS_PER_EPOCH")?,
            sync_committee_size: spec_u64(spec, "SYNC_COMMITTEE_SIZE")?,
            sync_committee_subnet_count: spec_u64(spec, "SYNC_COMMITTEE_SUBNET_COUNT")?,
            target_aggregators_per_sync_subcommittee: spec_u64(
                spec,
                "TARGET_AGGREGATORS_PER_SYNC_SUBCOMMITTEE",
            )?,
        })
    }
}

fn spec_u64(spec: &HashMap<String, Value>, item: &str) -> Result<u64> {
    spec.get(item)
        .ok_or_else(|| Error(format!("{} not found in spec", item)))?
        .as_u64()
        .ok_or_else(|| Error(format!("{} of unexpected type", item)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_spec() -> HashMap<String, Value> {
        HashMap::from([
            ("SLOTS_PER_EPOCH".to_string(), json!(32)),
            ("SYNC_COMMITTEE_SIZE".to_string(), json!(512)),
            ("SYNC_COMMITTEE_SUBNET_COUNT".to_string(), json!(4)),
            (
                "TARGET_AGGREGATORS_PER_SYNC_SUBCOMMITTEE".to_string(),
                json!(16),
            ),
        ])
    }

    #[test]
    fn parses_a_full_spec() {
        let constants = SpecConstants::from_spec(&full_spec()).unwrap();
        assert_eq!(constants.slots_per_epoch, 32);
        assert_eq!(constants.sync_committee_size, 512);
        assert_eq!(constants.sync_committee_subnet_count, 4);
        assert_eq!(constants.target_aggregators_per_sync_subcommittee, 16);
    }

    #[test]
    fn missing_constant_is_fatal() {
        let mut spec = full_spec();
        spec.remove("SYNC_COMMITTEE_SIZE");
        assert_eq!(
            SpecConstants::from_spec(&spec),
            Err(Error("SYNC_COMMITTEE_SIZE not found in spec".to_string()))
        );
    }

    #[test]
    fn mistyped_constant_is_fatal() {
        let mut spec = full_spec();
        spec.insert("SLOTS_PER_EPOCH".to_string(), json!("thirty-two"));
        assert_eq!(
            SpecConstants::from_spec(&spec),
            Err(Error("SLOTS_PER_EPOCH of unexpected type".to_string()))
        );
    }
}
