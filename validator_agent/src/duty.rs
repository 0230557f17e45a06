use crate::wallet::ValidatorAccount;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use types::{SignatureBytes, Slot};

/// The sync committee duty for one slot, covering every managed validator in
/// the current committee.
///
/// Prepared once per slot: the messenger records an aggregator selection per
/// `(validator, subcommittee)` pair that wins the draw, and each such cell is
/// written at most once. Everything else is immutable after construction.
pub struct SyncCommitteeDuty {
    slot: Slot,
    validator_indices: Vec<u64>,
    contribution_indices: HashMap<u64, Vec<u64>>,
    accounts: HashMap<u64, Arc<dyn ValidatorAccount>>,
    aggregator_selections: HashMap<(u64, u64), SignatureBytes>,
}

impl SyncCommitteeDuty {
    /// Creates a duty from `(validator index, account, committee positions)`
    /// triples, preserving the validator order given.
    pub fn new(
        slot: Slot,
        validators: Vec<(u64, Arc<dyn ValidatorAccount>, Vec<u64>)>,
    ) -> Self {
        let mut validator_indices = Vec::with_capacity(validators.len());
        let mut contribution_indices = HashMap::with_capacity(validators.len());
        let mut accounts = HashMap::with_capacity(validators.len());
        for (validator_index, account, positions) in validators {
            validator_indices.push(validator_index);
            contribution_indices.insert(validator_index, positions);
            accounts.insert(validator_index, account);
        }

        Self {
            slot,
            validator_indices,
            contribution_indices,
            accounts,
            aggregator_selections: HashMap::new(),
        }
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn validator_indices(&self) -> &[u64] {
        &self.validator_indices
    }

    /// The committee positions of the given validator.
    pub fn contribution_indices(&self, validator_index: u64) -> Option<&[u64]> {
        self.contribution_indices
            .get(&validator_index)
            .map(|indices| indices.as_slice())
    }

    pub fn account(&self, validator_index: u64) -> Option<&Arc<dyn ValidatorAccount>> {
        self.accounts.get(&validator_index)
    }

    /// Records that the validator aggregates for the subcommittee, keeping the
    /// selection proof for the eventual contribution-and-proof.
    ///
    /// Later writes to an already-populated cell are ignored; the proof is
    /// deterministic, so a re-run of preparation supplies the same bytes.
    pub fn set_aggregator_selection(
        &mut self,
        validator_index: u64,
        subcommittee_index: u64,
        selection_proof: SignatureBytes,
    ) {
        self.aggregator_selections
            .entry((validator_index, subcommittee_index))
            .or_insert(selection_proof);
    }

    pub fn aggregator_selection(
        &self,
        validator_index: u64,
        subcommittee_index: u64,
    ) -> Option<&SignatureBytes> {
        self.aggregator_selections
            .get(&(validator_index, subcommittee_index))
    }

    /// The subcommittees the validator aggregates for, with their selection
    /// proofs, ordered by subcommittee index.
    pub fn aggregator_subcommittees(
        &self,
        validator_index: u64,
    ) -> Vec<(u64, &SignatureBytes)> {
        let mut subcommittees: Vec<_> = self
            .aggregator_selections
            .iter()
            .filter(|((v, _), _)| *v == validator_index)
            .map(|((_, subcommittee), proof)| (*subcommittee, proof))
            .collect();
        subcommittees.sort_by_key(|(subcommittee, _)| *subcommittee);
        subcommittees
    }

    pub fn aggregator_selection_count(&self) -> usize {
        self.aggregator_selections.len()
    }
}

impl fmt::Debug for SyncCommitteeDuty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncCommitteeDuty")
            .field("slot", &self.slot)
            .field("validators", &self.validator_indices.len())
            .field("aggregator_selections", &self.aggregator_selections.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestAccount;

    fn duty() -> SyncCommitteeDuty {
        SyncCommitteeDuty::new(
            Slot::new(100),
            vec![
                (7, TestAccount::arc(7), vec![0, 1, 200]),
                (11, TestAccount::arc(11), vec![300]),
            ],
        )
    }

    fn proof(byte: u8) -> SignatureBytes {
        SignatureBytes::deserialize(&[byte; 96]).unwrap()
    }

    #[test]
    fn accessors() {
        let duty = duty();
        assert_eq!(duty.slot(), Slot::new(100));
        assert_eq!(duty.validator_indices(), &[7, 11]);
        assert_eq!(duty.contribution_indices(7), Some(&[0, 1, 200][..]));
        assert_eq!(duty.contribution_indices(12), None);
        assert!(duty.account(11).is_some());
        assert!(duty.account(12).is_none());
    }

    #[test]
    fn selections_are_write_once() {
        let mut duty = duty();
        duty.set_aggregator_selection(7, 1, proof(1));
        duty.set_aggregator_selection(7, 1, proof(2));

        assert_eq!(duty.aggregator_selection(7, 1), Some(&proof(1)));
        assert_eq!(duty.aggregator_selection_count(), 1);
    }

    #[test]
    fn aggregator_subcommittees_are_ordered() {
        let mut duty = duty();
        duty.set_aggregator_selection(7, 2, proof(2));
        duty.set_aggregator_selection(7, 0, proof(0));
        duty.set_aggregator_selection(11, 1, proof(1));

        let subcommittees = duty.aggregator_subcommittees(7);
        assert_eq!(
            subcommittees,
            vec![(0, &proof(0)), (2, &proof(2))]
        );
        assert_eq!(duty.aggregator_subcommittees(11), vec![(1, &proof(1))]);
        assert!(duty.aggregator_subcommittees(12).is_empty());
    }
}
