use crate::physics::handles::BodyHandle;

/// Bitset of the body handles referenced by the constraints of one batch.
///
/// Batches hold body-disjoint constraints, so a constraint fits a batch exactly when none of its bodies'
/// handles are set here.
#[derive(Clone, Debug, Default)]
pub struct BatchReferencedHandles {
    /// Packed bitfields representing handle containment.
    flags: Vec<u64>,
}

impl BatchReferencedHandles {
    const SHIFT: i32 = 6;
    const MASK: i32 = 63;

    /// Gets the bundle capacity needed for the given handle count.
    #[inline(always)]
    pub fn get_bundle_capacity(count: i32) -> usize {
        ((count + Self::MASK) >> Self::SHIFT) as usize
    }

    pub fn new(initial_handle_capacity: i32) -> Self {
        Self {
            flags: vec![0; Self::get_bundle_capacity(initial_handle_capacity)],
        }
    }

    #[inline(always)]
    pub fn contains(&self, handle: BodyHandle) -> bool {
        let packed_index = (handle.0 >> Self::SHIFT) as usize;
        packed_index < self.flags.len()
            && (self.flags[packed_index] & (1u64 << (handle.0 & Self::MASK))) != 0
    }

    /// Gets whether none of the given handles are referenced by this batch.
    #[inline(always)]
    pub fn can_fit(&self, handles: &[BodyHandle]) -> bool {
        handles.iter().all(|&handle| !self.contains(handle))
    }

    /// Adds a handle, growing the set to the next power of two bundles if needed.
    #[inline(always)]
    pub fn add(&mut self, handle: BodyHandle) {
        debug_assert!(handle.0 >= 0);
        let bundle_index = (handle.0 >> Self::SHIFT) as usize;
        if bundle_index >= self.flags.len() {
            self.flags.resize((bundle_index + 1).next_power_of_two(), 0);
        }
        debug_assert!(
            (self.flags[bundle_index] & (1u64 << (handle.0 & Self::MASK))) == 0,
            "Cannot add if it's already present!"
        );
        self.flags[bundle_index] |= 1u64 << (handle.0 & Self::MASK);
    }

    #[inline(always)]
    pub fn remove(&mut self, handle: BodyHandle) {
        debug_assert!(
            self.contains(handle),
            "If you try to remove a handle, it should be present."
        );
        self.flags[(handle.0 >> Self::SHIFT) as usize] &= !(1u64 << (handle.0 & Self::MASK));
    }

    /// Number of handles in the set.
    pub fn count(&self) -> usize {
        self.flags.iter().map(|bundle| bundle.count_ones() as usize).sum()
    }

    /// Number of handles the set can hold without growing.
    #[inline(always)]
    pub fn handle_capacity(&self) -> usize {
        self.flags.len() << Self::SHIFT
    }

    /// Ensures the set can hold handles up to `handle_capacity` without growing.
    pub fn ensure_capacity(&mut self, handle_capacity: i32) {
        let bundle_count = Self::get_bundle_capacity(handle_capacity);
        if self.flags.len() < bundle_count {
            self.flags.resize(bundle_count, 0);
        }
    }

    /// Shrinks the set to the minimum size holding `handle_capacity` handles. Never drops set bits.
    pub fn compact(&mut self, handle_capacity: i32) {
        let highest_set = self.flags.iter().rposition(|&bundle| bundle != 0).map_or(0, |i| i + 1);
        let bundle_count = Self::get_bundle_capacity(handle_capacity).max(highest_set);
        if self.flags.len() > bundle_count {
            self.flags.truncate(bundle_count);
            self.flags.shrink_to_fit();
        }
    }
}
