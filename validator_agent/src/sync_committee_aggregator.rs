//! Per-slot production of sync committee contribution-and-proofs.
//!
//! The aggregator runs for the validators the messenger elected during
//! preparation. In contrast with message production, aggregation is
//! all-or-nothing: the slot's batch is submitted in full or not at all, so an
//! inconsistent set of aggregates is never broadcast.

use crate::beacon_node::{
    self, BeaconBlockRootProvider, SpecConstants, SpecProvider,
    SyncCommitteeContributionProvider, SyncCommitteeContributionsSubmitter,
};
use crate::block_root_cache::BlockRootCache;
use crate::duty::SyncCommitteeDuty;
use crate::metrics;
use crate::signer::{self, ContributionAndProofSigner};
use slog::{debug, Logger};
use std::sync::Arc;
use std::time::Instant;
use types::{ContributionAndProof, SignedContributionAndProof};

#[derive(Debug)]
pub enum Error {
    BeaconNode(beacon_node::Error),
    Signer(signer::Error),
    /// No root in the cache and the beacon node returned none for "head".
    EmptyBeaconBlockRoot,
    /// The beacon node had no contribution for the subcommittee.
    EmptyContribution {
        subcommittee_index: u64,
    },
    /// A duty carried a validator with no account handle.
    MissingAccount(u64),
    /// The submitter rejected the signed contributions.
    SubmissionFailed(beacon_node::Error),
}

pub struct SyncCommitteeAggregator {
    log: Logger,
    beacon_block_root_provider: Arc<dyn BeaconBlockRootProvider>,
    contribution_provider: Arc<dyn SyncCommitteeContributionProvider>,
    contributions_submitter: Arc<dyn SyncCommitteeContributionsSubmitter>,
    contribution_and_proof_signer: Arc<dyn ContributionAndProofSigner>,
    block_root_cache: Arc<BlockRootCache>,
}

impl SyncCommitteeAggregator {
    pub async fn new(
        log: Logger,
        spec_provider: &dyn SpecProvider,
        beacon_block_root_provider: Arc<dyn BeaconBlockRootProvider>,
        contribution_provider: Arc<dyn SyncCommitteeContributionProvider>,
        contributions_submitter: Arc<dyn SyncCommitteeContributionsSubmitter>,
        contribution_and_proof_signer: Arc<dyn ContributionAndProofSigner>,
        block_root_cache: Arc<BlockRootCache>,
    ) -> Result<Self, Error> {
        // A node whose spec is missing the sync committee constants cannot
        // perform sync committee duties at all; fail construction early.
        let spec = spec_provider.spec().await.map_err(Error::BeaconNode)?;
        SpecConstants::from_spec(&spec).map_err(Error::BeaconNode)?;

        Ok(Self {
            log,
            beacon_block_root_provider,
            contribution_provider,
            contributions_submitter,
            contribution_and_proof_signer,
            block_root_cache,
        })
    }

    /// Produces, signs and submits the contribution-and-proofs for every
    /// aggregator selection recorded on the duty.
    pub async fn aggregate(&self, duty: &SyncCommitteeDuty) -> Result<(), Error> {
        let started = Instant::now();

        match self.aggregate_for_duty(duty).await {
            Ok(count) => {
                metrics::sync_committee_aggregations_completed(started, count, "succeeded");
                Ok(())
            }
            Err(e) => {
                metrics::sync_committee_aggregations_completed(
                    started,
                    duty.validator_indices().len(),
                    "failed",
                );
                Err(e)
            }
        }
    }

    async fn aggregate_for_duty(&self, duty: &SyncCommitteeDuty) -> Result<usize, Error> {
        let beacon_block_root = match self.block_root_cache.take(duty.slot()) {
            Some(root) => {
                debug!(self.log, "Obtained beacon block root from cache"; "slot" => %duty.slot());
                root
            }
            None => {
                debug!(self.log, "Beacon block root not cached; using head"; "slot" => %duty.slot());
                self.beacon_block_root_provider
                    .beacon_block_root("head")
                    .await
                    .map_err(Error::BeaconNode)?
                    .ok_or(Error::EmptyBeaconBlockRoot)?
            }
        };

        let mut signed_contribution_and_proofs = Vec::new();
        for &validator_index in duty.validator_indices() {
            for (subcommittee_index, selection_proof) in
                duty.aggregator_subcommittees(validator_index)
            {
                let contribution = self
                    .contribution_provider
                    .sync_committee_contribution(duty.slot(), subcommittee_index, beacon_block_root)
                    .await
                    .map_err(Error::BeaconNode)?
                    .ok_or(Error::EmptyContribution { subcommittee_index })?;

                let contribution_and_proof = ContributionAndProof {
                    aggregator_index: validator_index,
                    contribution,
                    selection_proof: selection_proof.clone(),
                };

                let account = duty
                    .account(validator_index)
                    .ok_or(Error::MissingAccount(validator_index))?;
                let signature = self
                    .contribution_and_proof_signer
                    .sign_contribution_and_proof(account.as_ref(), &contribution_and_proof)
                    .await
                    .map_err(Error::Signer)?;

                signed_contribution_and_proofs.push(SignedContributionAndProof {
                    message: contribution_and_proof,
                    signature,
                });
            }
        }

        self.contributions_submitter
            .submit_sync_committee_contributions(&signed_contribution_and_proofs)
            .await
            .map_err(Error::SubmissionFailed)?;

        for signed in &signed_contribution_and_proofs {
            metrics::sync_committee_aggregation_coverage(signed.message.contribution.coverage());
        }
        debug!(self.log, "Submitted signed contribution and proofs";
            "count" => signed_contribution_and_proofs.len(),
            "slot" => %duty.slot(),
        );

        Ok(signed_contribution_and_proofs.len())
    }
}
