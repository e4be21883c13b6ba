use std::sync::{Arc, Mutex};

use super::types::ResourceId;

/// Outcome of a resource operation. `Ok` is the success code; the other
/// variants are the steady-state shortage/overflow conditions that units
/// report upward as events rather than errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStatus {
    Ok,
    /// The stock held nothing at all.
    Empty,
    /// The stock held something, but less than the requested amount.
    Insufficient,
    /// The stock could not absorb the full stored amount.
    CapacityFull,
}

/// Result of a [`Resource::try_store`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOutcome {
    /// Amount actually absorbed by the stock.
    pub stored: u64,
    /// Amount that did not fit and remains with the caller.
    pub remainder: u64,
    /// `CapacityFull` iff `remainder > 0`.
    pub status: ResourceStatus,
}

/// A capacity-bounded stock of some quantity, shared between unit threads.
///
/// The amount is guarded by a single mutex; each consume or store call holds
/// the lock only for the duration of that call, so other units may contend
/// for the same resource between a unit's consume and its later store.
/// Outside the critical section the amount always satisfies
/// `0 <= amount <= max_capacity`.
#[derive(Debug)]
pub struct Resource {
    name: ResourceId,
    max_capacity: u64,
    amount: Mutex<u64>,
}

impl Resource {
    /// Create a new resource stock.
    ///
    /// Caller contract: `initial_amount <= max_capacity`. The constructor
    /// does not validate this; builders wiring a scenario are expected to
    /// check before constructing (see `Simulation::add_resource`).
    pub fn new(name: impl Into<ResourceId>, initial_amount: u64, max_capacity: u64) -> Self {
        debug_assert!(initial_amount <= max_capacity);
        Self {
            name: name.into(),
            max_capacity,
            amount: Mutex::new(initial_amount),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> u64 {
        self.max_capacity
    }

    /// Current amount held. Takes the lock; the value may be stale by the
    /// time the caller acts on it.
    pub fn amount(&self) -> u64 {
        *self.amount.lock().unwrap()
    }

    /// Attempt to withdraw `amount` from the stock.
    ///
    /// Returns `Empty` if the stock holds nothing, `Insufficient` if it
    /// holds less than requested. The amount is mutated only on `Ok`.
    pub fn try_consume(&self, amount: u64) -> ResourceStatus {
        let mut held = self.amount.lock().unwrap();
        if *held == 0 {
            ResourceStatus::Empty
        } else if *held < amount {
            ResourceStatus::Insufficient
        } else {
            *held -= amount;
            ResourceStatus::Ok
        }
    }

    /// Attempt to deposit `amount` into the stock, storing as much as the
    /// remaining capacity allows and returning the rest as `remainder`.
    pub fn try_store(&self, amount: u64) -> StoreOutcome {
        let mut held = self.amount.lock().unwrap();
        let available = self.max_capacity - *held;
        let stored = amount.min(available);
        *held += stored;
        let remainder = amount - stored;
        StoreOutcome {
            stored,
            remainder,
            status: if remainder > 0 {
                ResourceStatus::CapacityFull
            } else {
                ResourceStatus::Ok
            },
        }
    }
}

/// Binding of a shared resource to the per-cycle quantity a unit consumes
/// or produces. Immutable after construction.
#[derive(Clone)]
pub struct ResourceAmount {
    resource: Arc<Resource>,
    amount: u64,
}

impl ResourceAmount {
    pub fn new(resource: Arc<Resource>, amount: u64) -> Self {
        Self { resource, amount }
    }

    pub fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_distinguishes_empty_from_insufficient() {
        let fuel = Resource::new("Fuel", 3, 10);
        assert_eq!(fuel.try_consume(5), ResourceStatus::Insufficient);
        assert_eq!(fuel.amount(), 3);

        assert_eq!(fuel.try_consume(3), ResourceStatus::Ok);
        assert_eq!(fuel.amount(), 0);

        assert_eq!(fuel.try_consume(5), ResourceStatus::Empty);
        assert_eq!(fuel.amount(), 0);
    }

    #[test]
    fn oxygen_runs_out_after_twenty_cycles() {
        let oxygen = Resource::new("Oxygen", 20, 50);
        for cycle in 0..20 {
            assert_eq!(oxygen.try_consume(1), ResourceStatus::Ok, "cycle {}", cycle);
        }
        assert_eq!(oxygen.amount(), 0);
        assert_eq!(oxygen.try_consume(1), ResourceStatus::Empty);
    }

    #[test]
    fn distance_fills_to_exact_capacity() {
        let distance = Resource::new("Distance", 0, 5000);
        for store in 0..199 {
            let outcome = distance.try_store(25);
            assert_eq!(outcome.status, ResourceStatus::Ok, "store {}", store);
            assert_eq!(outcome.remainder, 0);
        }
        assert_eq!(distance.amount(), 4975);

        let outcome = distance.try_store(25);
        assert_eq!(outcome.status, ResourceStatus::Ok);
        assert_eq!(outcome.stored, 25);
        assert_eq!(distance.amount(), 5000);

        let outcome = distance.try_store(25);
        assert_eq!(outcome.status, ResourceStatus::CapacityFull);
        assert_eq!(outcome.stored, 0);
        assert_eq!(outcome.remainder, 25);
        assert_eq!(distance.amount(), 5000);
    }

    #[test]
    fn partial_store_reports_remainder() {
        let tank = Resource::new("Water", 45, 50);
        let outcome = tank.try_store(12);
        assert_eq!(outcome.stored, 5);
        assert_eq!(outcome.remainder, 7);
        assert_eq!(outcome.status, ResourceStatus::CapacityFull);
        assert_eq!(tank.amount(), 50);
    }

    #[test]
    fn amount_stays_within_bounds_across_mixed_calls() {
        let stock = Resource::new("Stock", 5, 20);
        let _ = stock.try_store(30);
        let _ = stock.try_consume(7);
        let _ = stock.try_store(3);
        let _ = stock.try_consume(100);
        assert!(stock.amount() <= stock.capacity());

        // drain completely, then over-consume
        while stock.try_consume(1) == ResourceStatus::Ok {}
        assert_eq!(stock.amount(), 0);
    }
}
