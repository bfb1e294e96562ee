use super::SlotClock;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use types::Slot;

/// A slot clock where the current slot is set manually.
///
/// Useful for testing scenarios which require fine-grained control over the present slot.
#[derive(Clone)]
pub struct ManualSlotClock {
    genesis_slot: Slot,
    /// Duration from UNIX epoch to genesis.
    genesis_duration: Duration,
    /// Duration from UNIX epoch to right now.
    current_time: Arc<RwLock<Duration>>,
    /// The length of each slot.
    slot_duration: Duration,
}

impl ManualSlotClock {
    pub fn set_slot(&self, slot: u64) {
        let slots_since_genesis = slot
            .checked_sub(self.genesis_slot.as_u64())
            .expect("slot must be post-genesis")
            .try_into()
            .expect("slot must fit within a u32");
        *self.current_time.write() =
            self.genesis_duration + self.slot_duration * slots_since_genesis;
    }

    pub fn advance_slot(&self) {
        self.set_slot(self.now().expect("clock should read").as_u64() + 1)
    }

    pub fn set_current_time(&self, duration: Duration) {
        *self.current_time.write() = duration;
    }

    /// Returns the slot corresponding to `now`, or `None` if `now` is prior to genesis.
    pub fn slot_of_duration(&self, now: Duration) -> Option<Slot> {
        let genesis = self.genesis_duration;

        if now >= genesis {
            let since_genesis = now
                .checked_sub(genesis)
                .expect("should not fail as now is larger than genesis");
            let slots_since_genesis = since_genesis.as_secs() / self.slot_duration.as_secs();
            Some(self.genesis_slot + slots_since_genesis)
        } else {
            None
        }
    }
}

impl SlotClock for ManualSlotClock {
    fn new(genesis_slot: Slot, genesis_duration: Duration, slot_duration: Duration) -> Self {
        if slot_duration.as_millis() == 0 {
            panic!("ManualSlotClock cannot have a < 1ms slot duration");
        }

        Self {
            genesis_slot,
            current_time: Arc::new(RwLock::new(genesis_duration)),
            genesis_duration,
            slot_duration,
        }
    }

    fn now(&self) -> Option<Slot> {
        self.slot_of(*self.current_time.read())
    }

    fn is_prior_to_genesis(&self) -> Option<bool> {
        Some(*self.current_time.read() < self.genesis_duration)
    }

    fn now_duration(&self) -> Option<Duration> {
        Some(*self.current_time.read())
    }

    fn slot_of(&self, now: Duration) -> Option<Slot> {
        self.slot_of_duration(now)
    }

    fn slot_duration(&self) -> Duration {
        self.slot_duration
    }

    fn duration_to_next_slot(&self) -> Option<Duration> {
        let now = self.now_duration()?;
        let next_slot = self.now()? + 1;
        self.start_of(next_slot)?.checked_sub(now)
    }

    fn start_of(&self, slot: Slot) -> Option<Duration> {
        let slot = slot
            .as_u64()
            .checked_sub(self.genesis_slot.as_u64())?
            .try_into()
            .ok()?;
        self.genesis_duration
            .checked_add(self.slot_duration.checked_mul(slot)?)
    }

    fn genesis_slot(&self) -> Slot {
        self.genesis_slot
    }
}
