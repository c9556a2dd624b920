/// Fixed-size set of dispatch slots.
///
/// Each slot is either free or occupied by exactly one request that has been
/// handed to the transport and has not settled yet.
#[derive(Debug)]
pub(crate) struct SlotPool {
    occupied: Vec<bool>,
}

impl SlotPool {
    /// Create a pool with `capacity` free slots
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            occupied: vec![false; capacity],
        }
    }

    /// Occupy the lowest free slot and return its index
    pub(crate) fn claim(&mut self) -> Option<usize> {
        let index = self.occupied.iter().position(|occupied| !occupied)?;
        self.occupied[index] = true;
        Some(index)
    }

    /// Mark the slot at `index` as free. Releasing a free slot is a no-op.
    pub(crate) fn release(&mut self, index: usize) {
        if let Some(slot) = self.occupied.get_mut(index) {
            *slot = false;
        }
    }

    pub(crate) fn occupied(&self) -> usize {
        self.occupied.iter().filter(|occupied| **occupied).count()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.occupied.len()
    }
}
