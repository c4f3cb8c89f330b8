//! Fixed pool of upsampler states for device sinks.

/// Handle to an allocated upsampler state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UpsamplerId(usize);

impl UpsamplerId {
    /// Slot index inside the pool.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Preallocated upsampler slots.
#[derive(Clone, Debug, Default)]
pub struct UpsamplerPool {
    in_use: Vec<bool>,
}

impl UpsamplerPool {
    /// Creates a pool with `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            in_use: vec![false; capacity],
        }
    }

    /// Claims a free slot.
    pub fn allocate(&mut self) -> Option<UpsamplerId> {
        let slot = self.in_use.iter().position(|&used| !used)?;
        self.in_use[slot] = true;
        Some(UpsamplerId(slot))
    }

    /// Returns a slot to the pool.
    pub fn release(&mut self, id: UpsamplerId) {
        if let Some(slot) = self.in_use.get_mut(id.0) {
            *slot = false;
        }
    }

    /// Slots currently claimed.
    pub fn in_use(&self) -> usize {
        self.in_use.iter().filter(|&&used| used).count()
    }

    /// Total slots.
    pub fn capacity(&self) -> usize {
        self.in_use.len()
    }
}
