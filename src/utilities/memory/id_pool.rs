/// Manages a pool of identifier values. Grabbing an id from the pool picks a number that has been
/// picked and returned before, or if none of those are available, the minimum value greater
/// than any existing id.
#[derive(Clone, Debug, Default)]
pub struct IdPool {
    next_index: i32,
    available_ids: Vec<i32>,
}

impl IdPool {
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            next_index: 0,
            available_ids: Vec::with_capacity(initial_capacity),
        }
    }

    /// Gets the highest value which any index claimed thus far could possibly have.
    /// -1 if nothing has ever been claimed.
    #[inline(always)]
    pub fn highest_possibly_claimed_id(&self) -> i32 {
        self.next_index - 1
    }

    /// Gets the number of previously returned ids waiting in the pool.
    #[inline(always)]
    pub fn available_id_count(&self) -> usize {
        self.available_ids.len()
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.available_ids.capacity()
    }

    #[inline(always)]
    pub fn take(&mut self) -> i32 {
        match self.available_ids.pop() {
            Some(id) => id,
            None => {
                let id = self.next_index;
                self.next_index += 1;
                id
            }
        }
    }

    /// Returns an id to the pool. The most recently returned id is the next one `take` reuses.
    #[inline(always)]
    pub fn return_id(&mut self, id: i32) {
        debug_assert!(id >= 0 && id < self.next_index, "Returned id was never taken.");
        debug_assert!(
            !self.available_ids.contains(&id),
            "Id was already returned to the pool."
        );
        self.available_ids.push(id);
    }

    pub fn clear(&mut self) {
        self.next_index = 0;
        self.available_ids.clear();
    }

    /// Ensures that the underlying id queue can hold at least a certain number of ids.
    pub fn ensure_capacity(&mut self, count: usize) {
        if self.available_ids.capacity() < count {
            self.available_ids
                .reserve_exact(count - self.available_ids.len());
        }
    }

    /// Shrinks the available ids queue to the smallest size that can fit the given count.
    pub fn compact(&mut self, minimum_count: usize) {
        let target = minimum_count.max(self.available_ids.len());
        if self.available_ids.capacity() > target {
            self.available_ids.shrink_to(target);
        }
    }

    /// Grows or shrinks the available ids queue to fit the given count.
    pub fn resize(&mut self, count: usize) {
        let target = count.max(self.available_ids.len());
        if self.available_ids.capacity() < target {
            self.ensure_capacity(target);
        } else {
            self.compact(target);
        }
    }
}
