//! Connection id allocation
//!
//! Ids come from a monotonic counter. A failed allocation still advances the
//! counter, so once the space is exhausted every later attempt fails too. With
//! recycling enabled, released ids are handed out again in release order
//! before the counter is consulted.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use super::error::RegistryError;
use super::types::ConnectionId;

/// Bounded connection id allocator
#[derive(Debug)]
pub struct IdAllocator {
    /// Next never-used id
    next: AtomicU32,
    /// Number of ids in the space
    capacity: u32,
    /// Released ids awaiting reuse (`None` when recycling is off)
    released: Option<Mutex<VecDeque<ConnectionId>>>,
}

impl IdAllocator {
    /// Create an allocator for `capacity` ids
    pub fn new(capacity: u32, recycle: bool) -> Self {
        Self {
            next: AtomicU32::new(0),
            capacity,
            released: recycle.then(|| Mutex::new(VecDeque::new())),
        }
    }

    /// Take the next id
    pub fn allocate(&self) -> Result<ConnectionId, RegistryError> {
        if let Some(released) = &self.released {
            let reused = released
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            if let Some(id) = reused {
                return Ok(id);
            }
        }

        // Saturate instead of wrapping so repeated failures never re-open the space
        let (Ok(n) | Err(n)) = self
            .next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_add(1))
            });

        if n >= self.capacity {
            return Err(RegistryError::Exhausted);
        }

        u16::try_from(n)
            .map(ConnectionId::new)
            .map_err(|_| RegistryError::Exhausted)
    }

    /// Return an id to the pool (no-op unless recycling is on)
    pub fn release(&self, id: ConnectionId) {
        if let Some(released) = &self.released {
            released
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_back(id);
        }
    }

    /// Number of ids ever handed out from the counter
    pub fn allocated(&self) -> u32 {
        self.next.load(Ordering::Acquire).min(self.capacity)
    }

    /// Size of the id space
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic() {
        let ids = IdAllocator::new(16, false);

        for expected in 0..16u16 {
            assert_eq!(ids.allocate().unwrap(), ConnectionId::new(expected));
        }
        assert_eq!(ids.allocated(), 16);
    }

    #[test]
    fn test_exhausted_stays_exhausted() {
        let ids = IdAllocator::new(2, false);
        ids.allocate().unwrap();
        ids.allocate().unwrap();

        for _ in 0..3 {
            assert_eq!(ids.allocate(), Err(RegistryError::Exhausted));
        }
        // Releasing does nothing without recycling
        ids.release(ConnectionId::new(0));
        assert_eq!(ids.allocate(), Err(RegistryError::Exhausted));
        assert_eq!(ids.allocated(), 2);
    }

    #[test]
    fn test_full_u16_space() {
        let ids = IdAllocator::new(1 << 16, false);
        let mut last = None;

        for _ in 0..(1u32 << 16) {
            last = Some(ids.allocate().unwrap());
        }
        assert_eq!(last, Some(ConnectionId::new(u16::MAX)));
        assert_eq!(ids.allocate(), Err(RegistryError::Exhausted));
    }

    #[test]
    fn test_recycling_fifo() {
        let ids = IdAllocator::new(3, true);
        let a = ids.allocate().unwrap();
        let b = ids.allocate().unwrap();
        let c = ids.allocate().unwrap();
        assert_eq!(ids.allocate(), Err(RegistryError::Exhausted));

        ids.release(b);
        ids.release(a);

        assert_eq!(ids.allocate().unwrap(), b);
        assert_eq!(ids.allocate().unwrap(), a);
        assert_eq!(ids.allocate(), Err(RegistryError::Exhausted));

        ids.release(c);
        assert_eq!(ids.allocate().unwrap(), c);
    }
}
