use parking_lot::RwLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use types::{Epoch, Slot};

/// A clock that maps wall time onto the chain's slots and epochs.
///
/// The clock is not required to be monotonically increasing and may go
/// backwards.
pub trait ChainTime: Send + Sync {
    /// Returns the duration between the UNIX epoch and genesis.
    fn genesis_time(&self) -> Duration;

    /// Returns the duration between consecutive slots.
    fn slot_duration(&self) -> Duration;

    fn slots_per_epoch(&self) -> u64;

    /// Returns the slot at this present time, or `None` before genesis.
    fn current_slot(&self) -> Option<Slot>;

    /// Returns the wall-clock start of the given slot, as a duration since
    /// the UNIX epoch.
    ///
    /// Saturates for slots too distant to represent.
    fn start_of_slot(&self, slot: Slot) -> Duration {
        let since_genesis = slot
            .as_u64()
            .try_into()
            .ok()
            .and_then(|slot: u32| self.slot_duration().checked_mul(slot))
            .unwrap_or(Duration::MAX);
        self.genesis_time().saturating_add(since_genesis)
    }

    fn slot_to_epoch(&self, slot: Slot) -> Epoch {
        slot.epoch(self.slots_per_epoch())
    }

    fn current_epoch(&self) -> Option<Epoch> {
        self.current_slot().map(|slot| self.slot_to_epoch(slot))
    }
}

/// Determines the present slot based upon the present system time.
#[derive(Clone)]
pub struct SystemChainTime {
    genesis_time: Duration,
    slot_duration: Duration,
    slots_per_epoch: u64,
}

impl SystemChainTime {
    pub fn new(genesis_time: Duration, slot_duration: Duration, slots_per_epoch: u64) -> Self {
        if slot_duration.as_millis() == 0 {
            panic!("SystemChainTime cannot have a < 1ms slot duration.");
        }
        if slots_per_epoch == 0 {
            panic!("SystemChainTime cannot have zero slots per epoch.");
        }

        Self {
            genesis_time,
            slot_duration,
            slots_per_epoch,
        }
    }
}

impl ChainTime for SystemChainTime {
    fn genesis_time(&self) -> Duration {
        self.genesis_time
    }

    fn slot_duration(&self) -> Duration {
        self.slot_duration
    }

    fn slots_per_epoch(&self) -> u64 {
        self.slots_per_epoch
    }

    fn current_slot(&self) -> Option<Slot> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
        if now < self.genesis_time {
            return None;
        }
        let since_genesis = now - self.genesis_time;
        Some(Slot::new(
            (since_genesis.as_millis() / self.slot_duration.as_millis()) as u64,
        ))
    }
}

/// A chain time whose current slot is set manually. Used for testing.
pub struct ManualChainTime {
    genesis_time: Duration,
    slot_duration: Duration,
    slots_per_epoch: u64,
    slot: RwLock<Slot>,
}

impl ManualChainTime {
    pub fn new(
        genesis_time: Duration,
        slot_duration: Duration,
        slots_per_epoch: u64,
        slot: Slot,
    ) -> Self {
        Self {
            genesis_time,
            slot_duration,
            slots_per_epoch,
            slot: RwLock::new(slot),
        }
    }

    pub fn set_slot(&self, slot: Slot) {
        *self.slot.write() = slot;
    }

    pub fn advance_slot(&self) {
        let mut slot = self.slot.write();
        *slot = *slot + 1;
    }
}

impl ChainTime for ManualChainTime {
    fn genesis_time(&self) -> Duration {
        self.genesis_time
    }

    fn slot_duration(&self) -> Duration {
        self.slot_duration
    }

    fn slots_per_epoch(&self) -> u64 {
        self.slots_per_epoch
    }

    fn current_slot(&self) -> Option<Slot> {
        Some(*self.slot.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual() -> ManualChainTime {
        ManualChainTime::new(
            Duration::from_secs(1_606_824_023),
            Duration::from_secs(12),
            32,
            Slot::new(100),
        )
    }

    #[test]
    fn start_of_slot() {
        let chain_time = manual();
        assert_eq!(
            chain_time.start_of_slot(Slot::new(0)),
            Duration::from_secs(1_606_824_023)
        );
        assert_eq!(
            chain_time.start_of_slot(Slot::new(10)),
            Duration::from_secs(1_606_824_023 + 120)
        );
    }

    #[test]
    fn start_of_slot_saturates_for_distant_slots() {
        let chain_time = manual();
        // The largest representable slot still multiplies out.
        assert_eq!(
            chain_time.start_of_slot(Slot::new(u64::from(u32::MAX))),
            Duration::from_secs(1_606_824_023) + Duration::from_secs(12) * u32::MAX
        );
        // Beyond that the result saturates rather than wrapping.
        assert_eq!(
            chain_time.start_of_slot(Slot::new(u64::from(u32::MAX) + 1)),
            Duration::MAX
        );
        assert_eq!(chain_time.start_of_slot(Slot::new(u64::MAX)), Duration::MAX);
    }

    #[test]
    fn epoch_math() {
        let chain_time = manual();
        assert_eq!(chain_time.slot_to_epoch(Slot::new(0)), Epoch::new(0));
        assert_eq!(chain_time.slot_to_epoch(Slot::new(63)), Epoch::new(1));
        assert_eq!(chain_time.current_epoch(), Some(Epoch::new(3)));
    }

    #[test]
    fn manual_slot_control() {
        let chain_time = manual();
        assert_eq!(chain_time.current_slot(), Some(Slot::new(100)));
        chain_time.advance_slot();
        assert_eq!(chain_time.current_slot(), Some(Slot::new(101)));
        chain_time.set_slot(Slot::new(7));
        assert_eq!(chain_time.current_slot(), Some(Slot::new(7)));
    }
}
