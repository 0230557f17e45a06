//! Scoring of locally-built block proposals.
//!
//! When the auction yields no usable builder bid the agent falls back to a
//! locally-built block; with several candidate proposals available it takes
//! the highest-scoring one.

use std::collections::{HashMap, HashSet};
use types::{BeaconBlock, Slot};

/// Reward weighting for a slashing report, per offending validator.
const SLASHING_SCORE: f64 = 700.0;

/// Scores a block proposal against the slot of its parent.
///
/// Attestations score by the number of not-yet-counted attesting positions,
/// discounted by inclusion distance; slashing reports are rare and score
/// highly. Building on an old parent divides the whole score by the parent
/// distance.
pub fn score_beacon_block_proposal(parent_slot: Slot, block: Option<&BeaconBlock>) -> f64 {
    let block = match block {
        Some(block) => block,
        None => return 0.0,
    };
    if block.slot <= parent_slot {
        return 0.0;
    }
    let parent_distance = (block.slot - parent_slot).as_u64();

    let mut score = 0.0;

    // Attesting positions already counted, per attestation data.
    let mut votes: HashMap<(Slot, u64), HashSet<usize>> = HashMap::new();
    for attestation in block.body.attestations.iter() {
        let data = &attestation.data;
        if data.slot >= block.slot {
            continue;
        }
        let inclusion_distance = (block.slot - data.slot).as_u64();

        let seen = votes.entry((data.slot, data.index)).or_default();
        let mut new_votes = 0_u64;
        for (position, bit) in attestation.aggregation_bits.iter().enumerate() {
            if bit && seen.insert(position) {
                new_votes += 1;
            }
        }
        score += new_votes as f64 * (0.75 + 0.25 / inclusion_distance as f64);
    }

    for slashing in block.body.attester_slashings.iter() {
        let indices_1: HashSet<u64> = slashing
            .attestation_1
            .attesting_indices
            .iter()
            .copied()
            .collect();
        let slashed = slashing
            .attestation_2
            .attesting_indices
            .iter()
            .filter(|index| indices_1.contains(index))
            .collect::<HashSet<_>>()
            .len();
        score += SLASHING_SCORE * slashed as f64;
    }

    score += SLASHING_SCORE * block.body.proposer_slashings.len() as f64;

    score / parent_distance as f64
}

/// Returns the index of the highest-scoring candidate, if any.
///
/// The first candidate seen wins ties.
pub fn best_proposal(parent_slot: Slot, candidates: &[BeaconBlock]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, block) in candidates.iter().enumerate() {
        let score = score_beacon_block_proposal(parent_slot, Some(block));
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((index, score)),
        }
    }
    best.map(|(index, _)| index)
}
