//! Traits describing the signing operations the agent consumes.
//!
//! Signers own the keys and the domain computation; the agent hands over an
//! account and the message parts and receives opaque signature bytes.

use crate::wallet::ValidatorAccount;
use async_trait::async_trait;
use std::fmt;
use types::{ContributionAndProof, Epoch, Hash256, SignatureBytes, Slot};

pub type Result<T> = std::result::Result<T, Error>;

/// A failure reported by a signer collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct Error(pub String);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signs the `(slot, subcommittee_index)` pair used as the aggregator draw.
#[async_trait]
pub trait SyncCommitteeSelectionSigner: Send + Sync {
    async fn sign_sync_committee_selection(
        &self,
        account: &dyn ValidatorAccount,
        slot: Slot,
        subcommittee_index: u64,
    ) -> Result<SignatureBytes>;
}

/// Signs the head beacon block root under the sync committee domain of the
/// given epoch.
#[async_trait]
pub trait SyncCommitteeRootSigner: Send + Sync {
    async fn sign_sync_committee_root(
        &self,
        account: &dyn ValidatorAccount,
        epoch: Epoch,
        root: Hash256,
    ) -> Result<SignatureBytes>;
}

#[async_trait]
pub trait ContributionAndProofSigner: Send + Sync {
    async fn sign_contribution_and_proof(
        &self,
        account: &dyn ValidatorAccount,
        contribution_and_proof: &ContributionAndProof,
    ) -> Result<SignatureBytes>;
}
