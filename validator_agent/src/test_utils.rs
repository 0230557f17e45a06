//! Deterministic doubles for the collaborators the services consume.

use crate::beacon_node::{
    BeaconBlockRootProvider, Error as BeaconNodeError, SpecProvider,
    SyncCommitteeContributionProvider, SyncCommitteeContributionsSubmitter,
    SyncCommitteeMessagesSubmitter,
};
use crate::chain_time::ManualChainTime;
use crate::signer::{
    ContributionAndProofSigner, Error as SignerError, SyncCommitteeRootSigner,
    SyncCommitteeSelectionSigner,
};
use crate::wallet::{Error as WalletError, ValidatorAccount, Wallet};
use async_trait::async_trait;
use eth2_hashing::hash;
use parking_lot::Mutex;
use serde_json::{json, Value};
use slog::Logger;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use types::{
    ContributionAndProof, Epoch, Hash256, PublicKeyBytes, SignatureBytes,
    SignedContributionAndProof, Slot, SyncCommitteeContribution, SyncCommitteeMessage,
    SyncSubcommitteeBits,
};

pub fn null_log() -> Logger {
    Logger::root(slog::Discard, slog::o!())
}

/// Genesis at 1.6e9, 12-second slots, 32 slots per epoch, current slot 100.
pub fn manual_chain_time() -> ManualChainTime {
    ManualChainTime::new(
        Duration::from_secs(1_600_000_000),
        Duration::from_secs(12),
        32,
        Slot::new(100),
    )
}

/// Stretches seed bytes into a deterministic 96-byte signature.
pub fn deterministic_signature(parts: &[&[u8]]) -> SignatureBytes {
    let mut seed = Vec::new();
    for part in parts {
        seed.extend_from_slice(part);
    }
    let mut bytes = Vec::with_capacity(96);
    let mut chunk = hash(&seed);
    while bytes.len() < 96 {
        bytes.extend_from_slice(&chunk);
        chunk = hash(&chunk);
    }
    SignatureBytes::deserialize(&bytes[0..96]).expect("expanded to 96 bytes")
}

pub struct TestAccount {
    name: String,
    pubkey: PublicKeyBytes,
    passphrase: Vec<u8>,
}

impl TestAccount {
    pub fn new(name: &str, seed: u8, passphrase: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            pubkey: Self::pubkey_for(seed),
            passphrase: passphrase.to_vec(),
        }
    }

    pub fn arc(seed: u8) -> Arc<dyn ValidatorAccount> {
        Arc::new(Self::new(&format!("validator-{}", seed), seed, b"test"))
    }

    pub fn pubkey_for(seed: u8) -> PublicKeyBytes {
        PublicKeyBytes::deserialize(&[seed; 48]).expect("48 bytes")
    }
}

impl ValidatorAccount for TestAccount {
    fn name(&self) -> &str {
        &self.name
    }

    fn public_key(&self) -> PublicKeyBytes {
        self.pubkey
    }

    fn unlock(&self, passphrase: &[u8]) -> Result<(), WalletError> {
        if passphrase == self.passphrase.as_slice() {
            Ok(())
        } else {
            Err(WalletError::IncorrectPassphrase)
        }
    }
}

/// An account that cannot be unlocked, akin to a watch-only key.
pub struct WatchOnlyAccount {
    name: String,
    pubkey: PublicKeyBytes,
}

impl WatchOnlyAccount {
    pub fn new(name: &str, seed: u8) -> Self {
        Self {
            name: name.to_string(),
            pubkey: TestAccount::pubkey_for(seed),
        }
    }
}

impl ValidatorAccount for WatchOnlyAccount {
    fn name(&self) -> &str {
        &self.name
    }

    fn public_key(&self) -> PublicKeyBytes {
        self.pubkey
    }

    fn unlock(&self, _passphrase: &[u8]) -> Result<(), WalletError> {
        Err(WalletError::NotUnlockable)
    }
}

pub struct TestWallet {
    name: String,
    accounts: Vec<Arc<dyn ValidatorAccount>>,
}

impl TestWallet {
    pub fn new(name: &str, accounts: Vec<Arc<dyn ValidatorAccount>>) -> Self {
        Self {
            name: name.to_string(),
            accounts,
        }
    }
}

impl Wallet for TestWallet {
    fn name(&self) -> &str {
        &self.name
    }

    fn accounts(&self) -> Vec<Arc<dyn ValidatorAccount>> {
        self.accounts.clone()
    }
}

/// A beacon node double with scriptable failures.
pub struct MockBeaconNode {
    spec: Mutex<HashMap<String, Value>>,
    block_root: Mutex<Option<Hash256>>,
    block_root_requests: Mutex<usize>,
    failing_contribution_subcommittees: Mutex<HashSet<u64>>,
    empty_contribution_subcommittees: Mutex<HashSet<u64>>,
    submitted_messages: Mutex<Vec<Vec<SyncCommitteeMessage>>>,
    submitted_contributions: Mutex<Vec<Vec<SignedContributionAndProof>>>,
    fail_message_submission: Mutex<bool>,
    fail_contributions_submission: Mutex<bool>,
}

impl MockBeaconNode {
    pub fn new() -> Self {
        Self {
            spec: Mutex::new(HashMap::from([
                ("SLOTS_PER_EPOCH".to_string(), json!(32)),
                ("SYNC_COMMITTEE_SIZE".to_string(), json!(512)),
                ("SYNC_COMMITTEE_SUBNET_COUNT".to_string(), json!(4)),
                (
                    "TARGET_AGGREGATORS_PER_SYNC_SUBCOMMITTEE".to_string(),
                    json!(16),
                ),
            ])),
            block_root: Mutex::new(Some(Hash256::repeat_byte(1))),
            block_root_requests: Mutex::new(0),
            failing_contribution_subcommittees: Mutex::new(HashSet::new()),
            empty_contribution_subcommittees: Mutex::new(HashSet::new()),
            submitted_messages: Mutex::new(Vec::new()),
            submitted_contributions: Mutex::new(Vec::new()),
            fail_message_submission: Mutex::new(false),
            fail_contributions_submission: Mutex::new(false),
        }
    }

    pub fn set_spec_constant(&self, name: &str, value: u64) {
        self.spec.lock().insert(name.to_string(), json!(value));
    }

    pub fn remove_spec_constant(&self, name: &str) {
        self.spec.lock().remove(name);
    }

    pub fn set_block_root(&self, root: Hash256) {
        *self.block_root.lock() = Some(root);
    }

    pub fn clear_block_root(&self) {
        *self.block_root.lock() = None;
    }

    pub fn block_root_requests(&self) -> usize {
        *self.block_root_requests.lock()
    }

    pub fn fail_contribution_for_subcommittee(&self, subcommittee_index: u64) {
        self.failing_contribution_subcommittees
            .lock()
            .insert(subcommittee_index);
    }

    pub fn empty_contribution_for_subcommittee(&self, subcommittee_index: u64) {
        self.empty_contribution_subcommittees
            .lock()
            .insert(subcommittee_index);
    }

    pub fn fail_message_submission(&self) {
        *self.fail_message_submission.lock() = true;
    }

    pub fn fail_contributions_submission(&self) {
        *self.fail_contributions_submission.lock() = true;
    }

    pub fn submitted_messages(&self) -> Vec<Vec<SyncCommitteeMessage>> {
        self.submitted_messages.lock().clone()
    }

    pub fn submitted_contributions(&self) -> Vec<Vec<SignedContributionAndProof>> {
        self.submitted_contributions.lock().clone()
    }
}

#[async_trait]
impl SpecProvider for MockBeaconNode {
    async fn spec(&self) -> Result<HashMap<String, Value>, BeaconNodeError> {
        Ok(self.spec.lock().clone())
    }
}

#[async_trait]
impl BeaconBlockRootProvider for MockBeaconNode {
    async fn beacon_block_root(
        &self,
        _block_id: &str,
    ) -> Result<Option<Hash256>, BeaconNodeError> {
        *self.block_root_requests.lock() += 1;
        Ok(*self.block_root.lock())
    }
}

#[async_trait]
impl SyncCommitteeContributionProvider for MockBeaconNode {
    async fn sync_committee_contribution(
        &self,
        slot: Slot,
        subcommittee_index: u64,
        beacon_block_root: Hash256,
    ) -> Result<Option<SyncCommitteeContribution>, BeaconNodeError> {
        if self
            .failing_contribution_subcommittees
            .lock()
            .contains(&subcommittee_index)
        {
            return Err(BeaconNodeError("contribution unavailable".to_string()));
        }
        if self
            .empty_contribution_subcommittees
            .lock()
            .contains(&subcommittee_index)
        {
            return Ok(None);
        }

        let mut aggregation_bits = SyncSubcommitteeBits::new();
        for i in 0..100 {
            aggregation_bits
                .set(i, true)
                .expect("bit index within subcommittee");
        }
        Ok(Some(SyncCommitteeContribution {
            slot,
            beacon_block_root,
            subcommittee_index,
            aggregation_bits,
            signature: SignatureBytes::empty(),
        }))
    }
}

#[async_trait]
impl SyncCommitteeMessagesSubmitter for MockBeaconNode {
    async fn submit_sync_committee_messages(
        &self,
        messages: &[SyncCommitteeMessage],
    ) -> Result<(), BeaconNodeError> {
        if *self.fail_message_submission.lock() {
            return Err(BeaconNodeError("submission refused".to_string()));
        }
        self.submitted_messages.lock().push(messages.to_vec());
        Ok(())
    }
}

#[async_trait]
impl SyncCommitteeContributionsSubmitter for MockBeaconNode {
    async fn submit_sync_committee_contributions(
        &self,
        contributions: &[SignedContributionAndProof],
    ) -> Result<(), BeaconNodeError> {
        if *self.fail_contributions_submission.lock() {
            return Err(BeaconNodeError("submission refused".to_string()));
        }
        self.submitted_contributions
            .lock()
            .push(contributions.to_vec());
        Ok(())
    }
}

/// A signer double producing deterministic signatures.
pub struct MockSigner {
    failing_selection_accounts: Mutex<HashSet<PublicKeyBytes>>,
    failing_root_accounts: Mutex<HashSet<PublicKeyBytes>>,
    root_signing_epochs: Mutex<Vec<Epoch>>,
}

impl MockSigner {
    pub fn new() -> Self {
        Self {
            failing_selection_accounts: Mutex::new(HashSet::new()),
            failing_root_accounts: Mutex::new(HashSet::new()),
            root_signing_epochs: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_selection_for(&self, seed: u8) {
        self.failing_selection_accounts
            .lock()
            .insert(TestAccount::pubkey_for(seed));
    }

    pub fn fail_root_for(&self, seed: u8) {
        self.failing_root_accounts
            .lock()
            .insert(TestAccount::pubkey_for(seed));
    }

    /// The epochs under which root signatures were requested, in call order.
    pub fn root_signing_epochs(&self) -> Vec<Epoch> {
        self.root_signing_epochs.lock().clone()
    }

    /// The signature this signer produces for a selection request.
    pub fn selection_signature(
        &self,
        pubkey: &PublicKeyBytes,
        slot: Slot,
        subcommittee_index: u64,
    ) -> SignatureBytes {
        deterministic_signature(&[
            b"selection",
            &pubkey.serialize(),
            &slot.as_u64().to_le_bytes(),
            &subcommittee_index.to_le_bytes(),
        ])
    }
}

#[async_trait]
impl SyncCommitteeSelectionSigner for MockSigner {
    async fn sign_sync_committee_selection(
        &self,
        account: &dyn ValidatorAccount,
        slot: Slot,
        subcommittee_index: u64,
    ) -> Result<SignatureBytes, SignerError> {
        let pubkey = account.public_key();
        if self.failing_selection_accounts.lock().contains(&pubkey) {
            return Err(SignerError("signer unavailable".to_string()));
        }
        Ok(self.selection_signature(&pubkey, slot, subcommittee_index))
    }
}

#[async_trait]
impl SyncCommitteeRootSigner for MockSigner {
    async fn sign_sync_committee_root(
        &self,
        account: &dyn ValidatorAccount,
        epoch: Epoch,
        root: Hash256,
    ) -> Result<SignatureBytes, SignerError> {
        let pubkey = account.public_key();
        if self.failing_root_accounts.lock().contains(&pubkey) {
            return Err(SignerError("signer unavailable".to_string()));
        }
        self.root_signing_epochs.lock().push(epoch);
        Ok(deterministic_signature(&[
            b"root",
            &pubkey.serialize(),
            &epoch.as_u64().to_le_bytes(),
            root.as_bytes(),
        ]))
    }
}

#[async_trait]
impl ContributionAndProofSigner for MockSigner {
    async fn sign_contribution_and_proof(
        &self,
        account: &dyn ValidatorAccount,
        contribution_and_proof: &ContributionAndProof,
    ) -> Result<SignatureBytes, SignerError> {
        Ok(deterministic_signature(&[
            b"contribution",
            &account.public_key().serialize(),
            &contribution_and_proof.aggregator_index.to_le_bytes(),
            &contribution_and_proof
                .contribution
                .subcommittee_index
                .to_le_bytes(),
        ]))
    }
}
