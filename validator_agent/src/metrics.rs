use lazy_static::lazy_static;
use std::time::{Duration, Instant};
use types::Uint256;

pub use lighthouse_metrics::*;

lazy_static! {
    /*
     * Sync committee duties
     */
    pub static ref SYNC_COMMITTEE_MESSAGES_TOTAL: Result<IntCounterVec> =
        try_create_int_counter_vec(
            "sync_committee_messages_total",
            "Count of sync committee messages produced, by result",
            &["result"]
        );
    pub static ref SYNC_COMMITTEE_MESSAGES_TIMES: Result<Histogram> = try_create_histogram(
        "sync_committee_messages_seconds",
        "Time taken to produce and submit a slot's sync committee messages"
    );
    pub static ref SYNC_COMMITTEE_AGGREGATIONS_TOTAL: Result<IntCounterVec> =
        try_create_int_counter_vec(
            "sync_committee_aggregations_total",
            "Count of sync committee aggregations produced, by result",
            &["result"]
        );
    pub static ref SYNC_COMMITTEE_AGGREGATIONS_TIMES: Result<Histogram> = try_create_histogram(
        "sync_committee_aggregations_seconds",
        "Time taken to produce and submit a slot's contribution and proofs"
    );
    pub static ref SYNC_COMMITTEE_AGGREGATION_COVERAGE: Result<Histogram> = try_create_histogram(
        "sync_committee_aggregation_coverage",
        "Fraction of subcommittee bits set in submitted contributions"
    );

    /*
     * Block auction
     */
    pub static ref AUCTION_BLOCKS_TOTAL: Result<IntCounterVec> = try_create_int_counter_vec(
        "auction_blocks_total",
        "Count of block auctions, by provider and result",
        &["provider", "result"]
    );
    pub static ref AUCTION_BLOCK_TIMES: Result<Histogram> = try_create_histogram(
        "auction_block_seconds",
        "Time taken to run a block auction"
    );
    pub static ref BUILDER_BID_DELTA: Result<GaugeVec> = try_create_float_gauge_vec(
        "builder_bid_delta_wei",
        "Difference between the winning bid and an unselected provider's bid",
        &["provider"]
    );

    /*
     * Accounts
     */
    pub static ref WALLET_ACCOUNTS: Result<IntGaugeVec> = try_create_int_gauge_vec(
        "wallet_accounts",
        "Count of wallet accounts, by state",
        &["state"]
    );
}

pub fn sync_committee_messages_completed(started: Instant, count: usize, result: &str) {
    if let Ok(counter) = SYNC_COMMITTEE_MESSAGES_TOTAL.as_ref() {
        counter.with_label_values(&[result]).inc_by(count as u64);
    }
    observe(&SYNC_COMMITTEE_MESSAGES_TIMES, started.elapsed().as_secs_f64());
}

pub fn sync_committee_aggregations_completed(started: Instant, count: usize, result: &str) {
    if let Ok(counter) = SYNC_COMMITTEE_AGGREGATIONS_TOTAL.as_ref() {
        counter.with_label_values(&[result]).inc_by(count as u64);
    }
    observe(
        &SYNC_COMMITTEE_AGGREGATIONS_TIMES,
        started.elapsed().as_secs_f64(),
    );
}

pub fn sync_committee_aggregation_coverage(fraction: f64) {
    observe(&SYNC_COMMITTEE_AGGREGATION_COVERAGE, fraction);
}

pub fn auction_block(provider: &str, selected: bool, elapsed: Duration) {
    let result = if selected { "selected" } else { "unselected" };
    inc_counter_vec(&AUCTION_BLOCKS_TOTAL, &[provider, result]);
    observe(&AUCTION_BLOCK_TIMES, elapsed.as_secs_f64());
}

pub fn builder_bid_delta(provider: &str, delta: &Uint256) {
    if let Ok(gauge) = BUILDER_BID_DELTA.as_ref() {
        gauge
            .with_label_values(&[provider])
            .set(uint256_to_f64(delta));
    }
}

pub fn wallet_accounts(state: &str, count: usize) {
    if let Ok(gauge) = WALLET_ACCOUNTS.as_ref() {
        gauge.with_label_values(&[state]).set(count as i64);
    }
}

/// Lossy conversion for gauge display; wei deltas far exceed `u64`.
fn uint256_to_f64(value: &Uint256) -> f64 {
    value
        .to_string()
        .parse::<f64>()
        .expect("decimal digits always parse as f64")
}
