//! Core services for a validator duty agent.
//!
//! Three subsystems cooperate around each slot:
//!
//! - the sync committee messenger signs and submits head-root votes for every
//!   managed validator with a duty, deciding during preparation which of them
//!   aggregate;
//! - the sync committee aggregator collects, signs and submits
//!   contribution-and-proofs for the validators elected above, receiving the
//!   head root from the messenger through a single-consumer cache;
//! - the block auction solicits bids from external builder relays for
//!   proposal slots and selects the most valuable validated header.
//!
//! Wallets, signers, beacon nodes and relays are collaborators consumed
//! through traits; the scheduler that invokes the per-slot entry points lives
//! outside this crate.

pub mod beacon_node;
pub mod block_auction;
pub mod block_root_cache;
pub mod chain_time;
pub mod duty;
pub mod metrics;
pub mod proposal_score;
pub mod signer;
pub mod sync_committee_aggregator;
pub mod sync_committee_messenger;
pub mod wallet;

#[cfg(test)]
mod test_utils;
