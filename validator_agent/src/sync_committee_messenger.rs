//! Per-slot production of sync committee messages.
//!
//! Preparation decides, per validator and subcommittee, whether the validator
//! aggregates this slot; message production fetches the head root, hands it
//! to the aggregator via the root cache, signs one message per validator in
//! parallel and submits the batch.

use crate::beacon_node::{
    self, BeaconBlockRootProvider, SpecConstants, SpecProvider, SyncCommitteeMessagesSubmitter,
};
use crate::block_root_cache::BlockRootCache;
use crate::chain_time::ChainTime;
use crate::duty::SyncCommitteeDuty;
use crate::metrics;
use crate::signer::{self, SyncCommitteeRootSigner, SyncCommitteeSelectionSigner};
use crate::wallet::ValidatorAccount;
use futures::future::join_all;
use safe_arith::{ArithError, SafeArith};
use slog::{debug, error, Logger};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use types::{SignatureBytes, Slot, SyncCommitteeMessage, SyncSelectionProof};

#[derive(Debug)]
pub enum Error {
    BeaconNode(beacon_node::Error),
    Signer(signer::Error),
    /// The beacon node returned no root for "head".
    EmptyBeaconBlockRoot,
    /// A duty carried a committee position outside the sync committee.
    ContributionIndexOutOfRange {
        validator_index: u64,
        contribution_index: u64,
    },
    /// A duty carried a validator with no account handle.
    MissingAccount(u64),
    Arith(ArithError),
    /// The submitter rejected the signed messages.
    SubmissionFailed(beacon_node::Error),
}

impl From<ArithError> for Error {
    fn from(e: ArithError) -> Self {
        Self::Arith(e)
    }
}

pub struct SyncCommitteeMessenger {
    log: Logger,
    chain_time: Arc<dyn ChainTime>,
    beacon_block_root_provider: Arc<dyn BeaconBlockRootProvider>,
    messages_submitter: Arc<dyn SyncCommitteeMessagesSubmitter>,
    selection_signer: Arc<dyn SyncCommitteeSelectionSigner>,
    root_signer: Arc<dyn SyncCommitteeRootSigner>,
    block_root_cache: Arc<BlockRootCache>,
    constants: SpecConstants,
}

impl SyncCommitteeMessenger {
    pub async fn new(
        log: Logger,
        spec_provider: &dyn SpecProvider,
        chain_time: Arc<dyn ChainTime>,
        beacon_block_root_provider: Arc<dyn BeaconBlockRootProvider>,
        messages_submitter: Arc<dyn SyncCommitteeMessagesSubmitter>,
        selection_signer: Arc<dyn SyncCommitteeSelectionSigner>,
        root_signer: Arc<dyn SyncCommitteeRootSigner>,
        block_root_cache: Arc<BlockRootCache>,
    ) -> Result<Self, Error> {
        let spec = spec_provider.spec().await.map_err(Error::BeaconNode)?;
        let constants = SpecConstants::from_spec(&spec).map_err(Error::BeaconNode)?;

        Ok(Self {
            log,
            chain_time,
            beacon_block_root_provider,
            messages_submitter,
            selection_signer,
            root_signer,
            block_root_cache,
            constants,
        })
    }

    /// Decides which of the duty's validators aggregate this slot, recording
    /// a selection proof for each winning `(validator, subcommittee)` pair.
    ///
    /// Selection proofs are deterministic, so re-running preparation yields
    /// the same assignments.
    pub async fn prepare(&self, duty: &mut SyncCommitteeDuty) -> Result<(), Error> {
        let modulo = SyncSelectionProof::modulo(
            self.constants.sync_committee_size,
            self.constants.sync_committee_subnet_count,
            self.constants.target_aggregators_per_sync_subcommittee,
        )?;
        let subcommittee_size = self
            .constants
            .sync_committee_size
            .safe_div(self.constants.sync_committee_subnet_count)?;

        for validator_index in duty.validator_indices().to_vec() {
            let account = duty
                .account(validator_index)
                .ok_or(Error::MissingAccount(validator_index))?
                .clone();

            let mut subcommittees = BTreeSet::new();
            for &contribution_index in
                duty.contribution_indices(validator_index).unwrap_or(&[])
            {
                if contribution_index >= self.constants.sync_committee_size {
                    return Err(Error::ContributionIndexOutOfRange {
                        validator_index,
                        contribution_index,
                    });
                }
                subcommittees.insert(contribution_index / subcommittee_size);
            }

            for subcommittee_index in subcommittees {
                let (is_aggregator, selection_proof) = self
                    .is_aggregator(account.as_ref(), duty.slot(), subcommittee_index, modulo)
                    .await?;
                if is_aggregator {
                    debug!(self.log, "Validator is a sync aggregator";
                        "validator_index" => validator_index,
                        "subcommittee_index" => subcommittee_index,
                        "slot" => %duty.slot(),
                    );
                    duty.set_aggregator_selection(
                        validator_index,
                        subcommittee_index,
                        selection_proof,
                    );
                }
            }
        }

        Ok(())
    }

    /// Generates and broadcasts sync committee messages for the duty's slot,
    /// returning the messages made.
    ///
    /// Individual signing failures are logged and dropped; a submission
    /// failure is returned to the caller.
    pub async fn message(
        &self,
        duty: &SyncCommitteeDuty,
    ) -> Result<Vec<SyncCommitteeMessage>, Error> {
        let started = Instant::now();

        let beacon_block_root = match self.beacon_block_root_provider.beacon_block_root("head").await
        {
            Ok(Some(root)) => root,
            Ok(None) => {
                metrics::sync_committee_messages_completed(
                    started,
                    duty.validator_indices().len(),
                    "failed",
                );
                return Err(Error::EmptyBeaconBlockRoot);
            }
            Err(e) => {
                metrics::sync_committee_messages_completed(
                    started,
                    duty.validator_indices().len(),
                    "failed",
                );
                return Err(Error::BeaconNode(e));
            }
        };
        self.block_root_cache.set(duty.slot(), beacon_block_root);

        // Messages for the last slot of an epoch are signed under the next
        // epoch's domain.
        let epoch = self.chain_time.slot_to_epoch(duty.slot() + 1);

        let signature_futures = duty.validator_indices().iter().map(|&validator_index| {
            let log = &self.log;
            async move {
                let account = match duty.account(validator_index) {
                    Some(account) => account,
                    None => {
                        error!(log, "No account for validator with sync committee duty";
                            "validator_index" => validator_index,
                            "slot" => %duty.slot(),
                        );
                        return None;
                    }
                };
                match self
                    .root_signer
                    .sign_sync_committee_root(account.as_ref(), epoch, beacon_block_root)
                    .await
                {
                    Ok(signature) => Some(SyncCommitteeMessage {
                        slot: duty.slot(),
                        beacon_block_root,
                        validator_index,
                        signature,
                    }),
                    Err(e) => {
                        error!(log, "Failed to sign sync committee message";
                            "validator_index" => validator_index,
                            "slot" => %duty.slot(),
                            "error" => %e,
                        );
                        None
                    }
                }
            }
        });

        let messages = join_all(signature_futures)
            .await
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();

        if let Err(e) = self
            .messages_submitter
            .submit_sync_committee_messages(&messages)
            .await
        {
            metrics::sync_committee_messages_completed(started, messages.len(), "failed");
            return Err(Error::SubmissionFailed(e));
        }

        debug!(self.log, "Submitted sync committee messages";
            "count" => messages.len(),
            "head_block" => ?beacon_block_root,
            "slot" => %duty.slot(),
        );
        metrics::sync_committee_messages_completed(started, messages.len(), "succeeded");

        Ok(messages)
    }

    async fn is_aggregator(
        &self,
        account: &dyn ValidatorAccount,
        slot: Slot,
        subcommittee_index: u64,
        modulo: u64,
    ) -> Result<(bool, SignatureBytes), Error> {
        // The signature is needed for the aggregate even when the draw is a
        // foregone conclusion, so it is always requested.
        let signature = self
            .selection_signer
            .sign_sync_committee_selection(account, slot, subcommittee_index)
            .await
            .map_err(Error::Signer)?;

        let is_aggregator =
            SyncSelectionProof::from(signature.clone()).is_aggregator(modulo)?;
        Ok((is_aggregator, signature))
    }
}
