//! The block-space auction.
//!
//! For a proposal slot the auction solicits bids from every relay in the
//! validator's proposer configuration, validates each bid, and selects the
//! highest-value header. Two deadlines bound the wait: a soft deadline after
//! which the auction settles for the responses in hand, and a hard deadline
//! after which it stops unconditionally.

use crate::chain_time::ChainTime;
use crate::metrics;
use crate::wallet::{AccountProvider, ValidatorAccount};
use async_trait::async_trait;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use serde_derive::{Deserialize, Serialize};
use slog::{debug, error, trace, warn, Logger};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tree_hash::TreeHash;
use types::{
    Address, Hash256, PublicKey, PublicKeyBytes, SigningData, Slot, Uint256,
    VersionedSignedBuilderBid,
};

lazy_static! {
    /// Parsed relay public keys, keyed by their compressed bytes.
    ///
    /// Relay identities are long-lived, so parsed keys are memoized for the
    /// life of the process. Double-insertion under a write race is benign.
    static ref RELAY_PUBKEYS: RwLock<HashMap<PublicKeyBytes, PublicKey>> =
        RwLock::new(HashMap::new());
}

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// No managed account validates under the proposing public key.
    AccountNotFound,
    /// The proposer configuration could not be resolved.
    ProposerConfig(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AccountNotFound => write!(f, "no account found for public key"),
            Error::ProposerConfig(e) => write!(f, "failed to obtain proposer configuration: {}", e),
        }
    }
}

/// A failure reported by (or about) a single relay.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayError(pub String);

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Configuration for a single relay within a proposer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    pub address: String,
    /// The relay's BLS public key, when pinned by configuration.
    #[serde(default)]
    pub public_key: Option<PublicKeyBytes>,
    /// Bids below this value (in wei) are ignored rather than rejected.
    #[serde(default, with = "eth2_serde_utils::quoted_u256")]
    pub min_value: Uint256,
    /// Delay before soliciting this relay, giving it time to collect
    /// transactions.
    #[serde(default)]
    pub grace_ms: u64,
}

impl RelayConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

/// Per-validator proposal configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposerConfig {
    pub fee_recipient: Address,
    #[serde(with = "eth2_serde_utils::quoted_u64")]
    pub gas_limit: u64,
    #[serde(default)]
    pub relays: Vec<RelayConfig>,
}

/// Resolves a validator's proposer configuration.
#[async_trait]
pub trait ProposerConfigProvider: Send + Sync {
    async fn proposer_config(
        &self,
        account: &dyn ValidatorAccount,
        pubkey: PublicKeyBytes,
    ) -> Result<ProposerConfig, String>;
}

/// A relay capable of returning builder bids.
#[async_trait]
pub trait BuilderBidProvider: Send + Sync {
    /// Case-insensitive identity of the relay.
    fn address(&self) -> &str;

    /// The relay's advertised BLS public key, if any.
    fn pubkey(&self) -> Option<PublicKeyBytes>;

    /// Returns the relay's bid for the given proposal, or `None` when the
    /// relay declines to bid.
    async fn builder_bid(
        &self,
        slot: Slot,
        parent_hash: Hash256,
        pubkey: PublicKeyBytes,
    ) -> Result<Option<VersionedSignedBuilderBid>, RelayError>;
}

/// Resolves a relay address to a bid provider.
///
/// An address that cannot be resolved, or whose client cannot supply builder
/// bids, returns an error.
pub trait BuilderClientProvider: Send + Sync {
    fn builder_bid_provider(&self, address: &str)
        -> Result<Arc<dyn BuilderBidProvider>, RelayError>;
}

/// A validated response from a single relay.
pub struct BuilderBidResponse {
    pub provider: Arc<dyn BuilderBidProvider>,
    /// `None` for an ineligible bid, for example one below the relay's
    /// minimum value.
    pub bid: Option<VersionedSignedBuilderBid>,
    pub score: Uint256,
}

/// The outcome of an auction.
pub struct AuctionResults {
    /// The winning bid.
    pub bid: Option<VersionedSignedBuilderBid>,
    /// Every provider that returned the winning bid, in arrival order.
    pub providers: Vec<Arc<dyn BuilderBidProvider>>,
    /// The score of every valid bid received, keyed by provider address.
    pub values: HashMap<String, Uint256>,
}

pub struct BlockAuctionService {
    log: Logger,
    timeout: Duration,
    chain_time: Arc<dyn ChainTime>,
    accounts_provider: Arc<dyn AccountProvider>,
    proposer_config_provider: Arc<dyn ProposerConfigProvider>,
    builder_clients: Arc<dyn BuilderClientProvider>,
    application_builder_domain: Hash256,
    /// Winning bids, keyed by slot and then by `parentHash:pubkey`.
    best_bids: RwLock<HashMap<String, HashMap<String, VersionedSignedBuilderBid>>>,
}

impl BlockAuctionService {
    pub fn new(
        log: Logger,
        timeout: Duration,
        chain_time: Arc<dyn ChainTime>,
        accounts_provider: Arc<dyn AccountProvider>,
        proposer_config_provider: Arc<dyn ProposerConfigProvider>,
        builder_clients: Arc<dyn BuilderClientProvider>,
        application_builder_domain: Hash256,
    ) -> Self {
        if timeout.is_zero() {
            panic!("BlockAuctionService cannot have a zero timeout.");
        }

        Self {
            log,
            timeout,
            chain_time,
            accounts_provider,
            proposer_config_provider,
            builder_clients,
            application_builder_domain,
            best_bids: RwLock::new(HashMap::new()),
        }
    }

    /// Obtains the best available use of the block space for the proposal.
    ///
    /// Returns `None` when no relay is configured or no usable bid arrives;
    /// the caller then falls back to a locally-built block.
    pub async fn auction_block(
        &self,
        slot: Slot,
        parent_hash: Hash256,
        pubkey: PublicKeyBytes,
    ) -> Result<Option<AuctionResults>, Error> {
        let account = self
            .accounts_provider
            .account_by_public_key(&pubkey)
            .ok_or(Error::AccountNotFound)?;
        let proposer_config = self
            .proposer_config_provider
            .proposer_config(account.as_ref(), pubkey)
            .await
            .map_err(Error::ProposerConfig)?;

        if proposer_config.relays.is_empty() {
            trace!(self.log, "No relays in proposer configuration"; "slot" => %slot);
            return Ok(None);
        }

        let results = match self
            .best_builder_bid(slot, parent_hash, pubkey, &proposer_config)
            .await
        {
            Some(results) => results,
            None => return Ok(None),
        };

        if let Some(bid) = &results.bid {
            let key = format!("{}", slot);
            let subkey = format!("{:x}:{:x}", parent_hash, pubkey);
            self.best_bids
                .write()
                .entry(key)
                .or_default()
                .insert(subkey, bid.clone());

            let selected_providers: HashSet<String> = results
                .providers
                .iter()
                .map(|provider| provider.address().to_lowercase())
                .collect();
            let winning_value = bid.value();
            for (provider, value) in &results.values {
                let delta = winning_value.saturating_sub(*value);
                let is_selected = selected_providers.contains(&provider.to_lowercase());
                if !is_selected {
                    metrics::builder_bid_delta(provider, &delta);
                }
                debug!(self.log, "Auction participant";
                    "slot" => %slot,
                    "provider" => provider,
                    "value" => %value,
                    "delta" => %delta,
                    "selected" => is_selected,
                );
            }
        }

        Ok(Some(results))
    }

    /// Returns the winning bid previously cached for the proposal, leaving it
    /// in place.
    pub fn cached_bid(
        &self,
        slot: Slot,
        parent_hash: Hash256,
        pubkey: PublicKeyBytes,
    ) -> Option<VersionedSignedBuilderBid> {
        self.best_bids
            .read()
            .get(&format!("{}", slot))
            .and_then(|bids| bids.get(&format!("{:x}:{:x}", parent_hash, pubkey)))
            .cloned()
    }

    /// Drops cached bids for slots before the given slot.
    pub fn remove_bids_before(&self, slot: Slot) {
        self.best_bids
            .write()
            .retain(|key, _| key.parse::<u64>().map_or(false, |s| s >= slot.as_u64()));
    }

    /// Runs the fan-out across the configured relays and selects the best
    /// bid.
    async fn best_builder_bid(
        &self,
        slot: Slot,
        parent_hash: Hash256,
        pubkey: PublicKeyBytes,
        proposer_config: &ProposerConfig,
    ) -> Option<AuctionResults> {
        let started = Instant::now();

        let mut results = AuctionResults {
            bid: None,
            providers: Vec::new(),
            values: HashMap::new(),
        };

        let capacity = proposer_config.relays.len();
        let (resp_tx, mut resp_rx) = mpsc::channel::<BuilderBidResponse>(capacity);
        let (err_tx, mut err_rx) = mpsc::channel::<RelayError>(capacity);

        // Kick off the requests. A relay without a usable builder client
        // never signals on the channels, so it is excluded from the expected
        // responder count here.
        let mut requests = 0_usize;
        let mut handles = Vec::with_capacity(capacity);
        for relay in &proposer_config.relays {
            let provider = match self.builder_clients.builder_bid_provider(&relay.address) {
                Ok(provider) => provider,
                Err(e) => {
                    error!(self.log, "Failed to obtain builder client for block auction";
                        "relay" => &relay.address,
                        "error" => %e,
                    );
                    continue;
                }
            };
            requests += 1;
            handles.push(tokio::spawn(builder_bid(
                self.log.clone(),
                self.chain_time.clone(),
                self.application_builder_domain,
                provider,
                relay.clone(),
                slot,
                parent_hash,
                pubkey,
                resp_tx.clone(),
                err_tx.clone(),
            )));
        }
        drop(resp_tx);
        drop(err_tx);

        if requests == 0 {
            debug!(self.log, "No relays could be solicited"; "slot" => %slot);
            return None;
        }

        // Two deadlines: at the soft deadline the auction settles for the
        // responses received so far, if there are any; the hard deadline
        // bounds the total wait.
        let soft_deadline = tokio::time::sleep(self.timeout / 2);
        let hard_deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(soft_deadline);
        tokio::pin!(hard_deadline);

        let mut responded = 0_usize;
        let mut errored = 0_usize;
        let mut timed_out = 0_usize;
        let mut soft_timed_out = 0_usize;
        let mut best_score = Uint256::zero();

        // Loop 1: prior to the soft deadline.
        while responded + errored + timed_out + soft_timed_out != requests {
            tokio::select! {
                maybe_response = resp_rx.recv() => match maybe_response {
                    Some(response) => {
                        responded += 1;
                        trace!(self.log, "Response received";
                            "elapsed_ms" => started.elapsed().as_millis() as u64,
                            "responded" => responded,
                            "errored" => errored,
                        );
                        self.consider_bid(&mut results, &mut best_score, response);
                    }
                    None => break,
                },
                maybe_error = err_rx.recv() => match maybe_error {
                    Some(e) => {
                        errored += 1;
                        debug!(self.log, "Error received";
                            "elapsed_ms" => started.elapsed().as_millis() as u64,
                            "responded" => responded,
                            "errored" => errored,
                            "error" => %e,
                        );
                    }
                    None => break,
                },
                _ = &mut soft_deadline => {
                    // With any response in hand the auction settles now; the
                    // laggards are counted out. With none it keeps waiting
                    // for the hard deadline.
                    if responded > 0 {
                        timed_out = requests - responded - errored;
                        debug!(self.log, "Soft timeout reached with responses";
                            "responded" => responded,
                            "errored" => errored,
                            "timed_out" => timed_out,
                        );
                    } else {
                        debug!(self.log, "Soft timeout reached with no responses";
                            "errored" => errored,
                        );
                    }
                    soft_timed_out = requests - responded - errored - timed_out;
                }
            }
        }

        // Loop 2: after the soft deadline.
        while responded + errored + timed_out != requests {
            tokio::select! {
                maybe_response = resp_rx.recv() => match maybe_response {
                    Some(response) => {
                        responded += 1;
                        trace!(self.log, "Response received";
                            "elapsed_ms" => started.elapsed().as_millis() as u64,
                            "responded" => responded,
                            "errored" => errored,
                        );
                        self.consider_bid(&mut results, &mut best_score, response);
                    }
                    None => break,
                },
                maybe_error = err_rx.recv() => match maybe_error {
                    Some(e) => {
                        errored += 1;
                        debug!(self.log, "Error received";
                            "elapsed_ms" => started.elapsed().as_millis() as u64,
                            "responded" => responded,
                            "errored" => errored,
                            "error" => %e,
                        );
                    }
                    None => break,
                },
                _ = &mut hard_deadline => {
                    timed_out = requests - responded - errored;
                    debug!(self.log, "Hard timeout reached";
                        "responded" => responded,
                        "errored" => errored,
                        "timed_out" => timed_out,
                    );
                }
            }
        }
        debug!(self.log, "Auction results";
            "elapsed_ms" => started.elapsed().as_millis() as u64,
            "responded" => responded,
            "errored" => errored,
            "timed_out" => timed_out,
        );

        // Workers that have not signalled are no longer wanted.
        for handle in &handles {
            handle.abort();
        }

        if results.bid.is_none() {
            debug!(self.log, "No useful bids received"; "slot" => %slot);
            metrics::auction_block("", false, started.elapsed());
            return None;
        }

        for provider in &results.providers {
            metrics::auction_block(provider.address(), true, started.elapsed());
        }

        Some(results)
    }

    /// Applies a relay response to the running result set.
    fn consider_bid(
        &self,
        results: &mut AuctionResults,
        best_score: &mut Uint256,
        response: BuilderBidResponse,
    ) {
        // An ineligible bid, for example one below the relay's minimum value.
        let bid = match response.bid {
            Some(bid) => bid,
            None => return,
        };

        if response.score > *best_score {
            trace!(self.log, "New winning bid";
                "provider" => response.provider.address(),
                "score" => %response.score,
            );
            results.bid = Some(bid);
            *best_score = response.score;
            results.providers = vec![response.provider.clone()];
        } else if response.score == *best_score
            && results
                .bid
                .as_ref()
                .map_or(false, |current| bids_equal(current, &bid))
        {
            trace!(self.log, "Matching bid from different relay";
                "provider" => response.provider.address(),
            );
            results.providers.push(response.provider.clone());
        } else {
            trace!(self.log, "Low or slow bid";
                "provider" => response.provider.address(),
                "score" => %response.score,
            );
        }
        results
            .values
            .insert(response.provider.address().to_string(), response.score);
    }
}

/// Solicits and validates a bid from a single relay, reporting the outcome on
/// exactly one of the two channels.
#[allow(clippy::too_many_arguments)]
async fn builder_bid(
    log: Logger,
    chain_time: Arc<dyn ChainTime>,
    application_builder_domain: Hash256,
    provider: Arc<dyn BuilderBidProvider>,
    relay: RelayConfig,
    slot: Slot,
    parent_hash: Hash256,
    pubkey: PublicKeyBytes,
    resp_tx: mpsc::Sender<BuilderBidResponse>,
    err_tx: mpsc::Sender<RelayError>,
) {
    if !relay.grace().is_zero() {
        tokio::time::sleep(relay.grace()).await;
    }

    let address = provider.address().to_string();
    let bid = match provider.builder_bid(slot, parent_hash, pubkey).await {
        Ok(bid) => bid,
        Err(e) => {
            let _ = err_tx.send(RelayError(format!("{}: {}", address, e))).await;
            return;
        }
    };
    let bid = match bid {
        Some(bid) => bid,
        None => {
            // The relay declined to bid.
            let _ = resp_tx
                .send(BuilderBidResponse {
                    provider,
                    bid: None,
                    score: Uint256::zero(),
                })
                .await;
            return;
        }
    };
    if bid.is_empty() {
        let _ = err_tx
            .send(RelayError(format!("{}: builder bid empty", address)))
            .await;
        return;
    }

    let value = bid.value();
    if value.is_zero() {
        let _ = err_tx
            .send(RelayError(format!("{}: zero value", address)))
            .await;
        return;
    }
    if value < relay.min_value {
        debug!(log, "Value below minimum; ignoring";
            "provider" => &address,
            "value" => %value,
            "min_value" => %relay.min_value,
        );
        let _ = resp_tx
            .send(BuilderBidResponse {
                provider,
                bid: None,
                score: Uint256::zero(),
            })
            .await;
        return;
    }

    if bid.fee_recipient() == Address::zero() {
        let _ = err_tx
            .send(RelayError(format!("{}: zero fee recipient", address)))
            .await;
        return;
    }

    let expected_timestamp = chain_time.start_of_slot(slot).as_secs();
    if bid.timestamp() != expected_timestamp {
        let _ = err_tx
            .send(RelayError(format!(
                "{}: provided timestamp {} for slot {} not expected value of {}",
                address,
                bid.timestamp(),
                slot,
                expected_timestamp
            )))
            .await;
        return;
    }

    match verify_bid_signature(&log, &relay, &bid, provider.as_ref(), application_builder_domain)
    {
        Ok(true) => {}
        Ok(false) => {
            warn!(log, "Failed to verify bid signature"; "provider" => &address);
            let _ = err_tx
                .send(RelayError(format!("{}: invalid signature", address)))
                .await;
            return;
        }
        Err(e) => {
            let _ = err_tx
                .send(RelayError(format!("{}: {}", address, e)))
                .await;
            return;
        }
    }

    let _ = resp_tx
        .send(BuilderBidResponse {
            provider,
            bid: Some(bid),
            score: value,
        })
        .await;
}

/// Verifies the signature of a bid to ensure it comes from the expected
/// source.
///
/// The relay's key comes from configuration when pinned, otherwise from the
/// provider itself. With neither available, verification is skipped and the
/// bid is accepted as verified; this permissive default is deliberate.
fn verify_bid_signature(
    log: &Logger,
    relay: &RelayConfig,
    bid: &VersionedSignedBuilderBid,
    provider: &dyn BuilderBidProvider,
    application_builder_domain: Hash256,
) -> Result<bool, RelayError> {
    let relay_pubkey = match relay.public_key.or_else(|| provider.pubkey()) {
        Some(pubkey) => pubkey,
        None => {
            trace!(log, "Relay has no public key; skipping bid verification";
                "provider" => provider.address(),
            );
            return Ok(true);
        }
    };

    let cached = RELAY_PUBKEYS.read().get(&relay_pubkey).cloned();
    let pubkey = match cached {
        Some(pubkey) => pubkey,
        None => {
            let pubkey = relay_pubkey
                .decompress()
                .map_err(|e| RelayError(format!("invalid public key supplied with bid: {:?}", e)))?;
            RELAY_PUBKEYS.write().insert(relay_pubkey, pubkey.clone());
            pubkey
        }
    };

    let signing_data = SigningData {
        object_root: bid.message_tree_hash_root(),
        domain: application_builder_domain,
    };
    let signing_root = signing_data.tree_hash_root();

    let signature = bid
        .signature()
        .decompress()
        .map_err(|e| RelayError(format!("invalid signature: {:?}", e)))?;

    Ok(signature.verify(&pubkey, signing_root.as_bytes()))
}

/// Two bids are equal iff they carry the same header; value equality alone is
/// insufficient.
fn bids_equal(bid_1: &VersionedSignedBuilderBid, bid_2: &VersionedSignedBuilderBid) -> bool {
    bid_1.header_tree_hash_root() == bid_2.header_tree_hash_root()
}
