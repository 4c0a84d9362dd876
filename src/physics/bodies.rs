use glam::Vec3;

use crate::physics::body_description::BodyDescription;
use crate::physics::body_properties::{BodyInertia, BodyVelocity};
use crate::physics::error::SolverError;
use crate::physics::handles::BodyHandle;
use crate::utilities::memory::buffer::Buffer;
use crate::utilities::memory::id_pool::IdPool;

/// Result of removing a body from the packed body arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyRemoval {
    /// Handle of the removed body. Already returned to the handle pool.
    pub handle: BodyHandle,
    /// Memory index the body occupied. If another body was moved, it now lives here.
    pub removed_index: usize,
    /// Original memory index of the last body if it was moved into the removed slot.
    pub moved_body_original_index: Option<usize>,
}

/// Collection of all allocated bodies in packed memory order.
///
/// Velocities live in a [`Buffer`] so the solver's workers can scatter disjoint bodies through a shared reference.
pub struct Bodies {
    /// Remaps a body handle integer value to the actual array index of the body. -1 for unused handles.
    handle_to_index: Vec<i32>,
    /// Remaps a body index to its handle.
    index_to_handle: Vec<BodyHandle>,
    /// Pool from which handles are pulled for new bodies.
    handle_pool: IdPool,
    pub(crate) velocities: Buffer<BodyVelocity>,
    inertias: Vec<BodyInertia>,
    count: usize,
}

impl Bodies {
    pub fn new(initial_capacity: usize) -> Self {
        let initial_capacity = initial_capacity.max(1);
        Self {
            handle_to_index: Vec::with_capacity(initial_capacity),
            index_to_handle: Vec::with_capacity(initial_capacity),
            handle_pool: IdPool::new(initial_capacity),
            velocities: Buffer::new(initial_capacity),
            inertias: Vec::with_capacity(initial_capacity),
            count: 0,
        }
    }

    /// Number of bodies in the set.
    #[inline(always)]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.velocities.len()
    }

    /// Checks whether a body handle is currently registered.
    #[inline(always)]
    pub fn body_exists(&self, handle: BodyHandle) -> bool {
        handle.0 >= 0
            && (handle.0 as usize) < self.handle_to_index.len()
            && self.handle_to_index[handle.0 as usize] >= 0
    }

    pub fn validate_existing_handle(&self, handle: BodyHandle) -> Result<(), SolverError> {
        if self.body_exists(handle) {
            Ok(())
        } else {
            Err(SolverError::InvalidBodyHandle(handle))
        }
    }

    /// Gets the current memory index of a body.
    #[inline(always)]
    pub fn index_of(&self, handle: BodyHandle) -> Result<usize, SolverError> {
        self.validate_existing_handle(handle)?;
        Ok(self.handle_to_index[handle.0 as usize] as usize)
    }

    /// Gets the handle of the body at a memory index.
    #[inline(always)]
    pub fn handle_of(&self, index: usize) -> BodyHandle {
        debug_assert!(index < self.count);
        self.index_to_handle[index]
    }

    #[inline(always)]
    pub fn index_to_handle(&self) -> &[BodyHandle] {
        &self.index_to_handle
    }

    /// Raw handle to index table. Unused handle slots hold -1.
    #[inline(always)]
    pub fn handle_to_index(&self) -> &[i32] {
        &self.handle_to_index
    }

    pub fn add(&mut self, description: &BodyDescription) -> BodyHandle {
        let handle_index = self.handle_pool.take();
        if handle_index as usize >= self.handle_to_index.len() {
            self.handle_to_index.resize(handle_index as usize + 1, -1);
        }
        let index = self.count;
        if index == self.velocities.len() {
            self.velocities.resize((index * 2).max(1));
        }
        let handle = BodyHandle(handle_index);
        self.handle_to_index[handle_index as usize] = index as i32;
        self.index_to_handle.push(handle);
        *self.velocities.get_mut(index) = description.velocity;
        self.inertias.push(description.local_inertia);
        self.count += 1;
        handle
    }

    /// Removes the body at a memory index, moving the last body into its slot.
    ///
    /// The caller is responsible for any structure indexed by body memory location, such as constraint body
    /// references and the connectivity graph.
    pub fn remove_at(&mut self, index: usize) -> BodyRemoval {
        debug_assert!(index < self.count);
        let handle = self.index_to_handle[index];
        let last_index = self.count - 1;
        let moved_body_original_index = if index < last_index {
            let moved_handle = self.index_to_handle[last_index];
            *self.velocities.get_mut(index) = *self.velocities.get(last_index);
            self.handle_to_index[moved_handle.0 as usize] = index as i32;
            Some(last_index)
        } else {
            None
        };
        self.index_to_handle.swap_remove(index);
        self.inertias.swap_remove(index);
        *self.velocities.get_mut(last_index) = BodyVelocity::default();
        self.count -= 1;
        self.handle_to_index[handle.0 as usize] = -1;
        self.handle_pool.return_id(handle.0);
        BodyRemoval {
            handle,
            removed_index: index,
            moved_body_original_index,
        }
    }

    /// Removes a body by handle. See [`Bodies::remove_at`].
    pub fn remove(&mut self, handle: BodyHandle) -> Result<BodyRemoval, SolverError> {
        let index = self.index_of(handle)?;
        Ok(self.remove_at(index))
    }

    /// Swaps the memory slots of two bodies, keeping the handle tables bijective.
    pub fn swap(&mut self, a: usize, b: usize) {
        debug_assert!(a < self.count && b < self.count);
        if a == b {
            return;
        }
        let handle_a = self.index_to_handle[a];
        let handle_b = self.index_to_handle[b];
        self.handle_to_index[handle_a.0 as usize] = b as i32;
        self.handle_to_index[handle_b.0 as usize] = a as i32;
        self.index_to_handle.swap(a, b);
        self.inertias.swap(a, b);
        self.velocities.as_mut_slice().swap(a, b);
    }

    pub fn velocity(&self, handle: BodyHandle) -> Result<BodyVelocity, SolverError> {
        Ok(*self.velocities.get(self.index_of(handle)?))
    }

    pub fn set_velocity(&mut self, handle: BodyHandle, velocity: BodyVelocity) -> Result<(), SolverError> {
        let index = self.index_of(handle)?;
        *self.velocities.get_mut(index) = velocity;
        Ok(())
    }

    pub fn local_inertia(&self, handle: BodyHandle) -> Result<BodyInertia, SolverError> {
        Ok(self.inertias[self.index_of(handle)?])
    }

    pub fn set_local_inertia(&mut self, handle: BodyHandle, inertia: BodyInertia) -> Result<(), SolverError> {
        let index = self.index_of(handle)?;
        self.inertias[index] = inertia;
        Ok(())
    }

    /// Velocities of all bodies in memory order.
    #[inline(always)]
    pub fn velocities(&self) -> &[BodyVelocity] {
        &self.velocities.as_slice()[..self.count]
    }

    /// Inertias of all bodies in memory order.
    #[inline(always)]
    pub fn inertias(&self) -> &[BodyInertia] {
        &self.inertias
    }

    pub fn apply_description(&mut self, handle: BodyHandle, description: &BodyDescription) -> Result<(), SolverError> {
        let index = self.index_of(handle)?;
        *self.velocities.get_mut(index) = description.velocity;
        self.inertias[index] = description.local_inertia;
        Ok(())
    }

    pub fn get_description(&self, handle: BodyHandle) -> Result<BodyDescription, SolverError> {
        let index = self.index_of(handle)?;
        Ok(BodyDescription {
            velocity: *self.velocities.get(index),
            local_inertia: self.inertias[index],
        })
    }

    /// Adds `gravity * dt` to the linear velocity of every body with a nonzero inverse mass.
    pub fn integrate_velocities(&mut self, gravity: Vec3, dt: f32) {
        let velocity_change = gravity * dt;
        let inertias = &self.inertias;
        for (velocity, inertia) in self.velocities.as_mut_slice()[..self.count]
            .iter_mut()
            .zip(inertias.iter())
        {
            if inertia.inverse_mass > 0.0 {
                velocity.linear += velocity_change;
            }
        }
    }

    /// Ensures the body arrays can hold at least `capacity` bodies without resizing.
    pub fn ensure_capacity(&mut self, capacity: usize) {
        if self.velocities.len() < capacity {
            self.resize(capacity);
        }
    }

    /// Resizes the body arrays to the given capacity, never dropping below the current body count.
    pub fn resize(&mut self, capacity: usize) {
        let target = capacity.max(self.count).max(1);
        if target != self.velocities.len() {
            self.velocities.resize(target);
        }
        if target > self.inertias.capacity() {
            self.inertias.reserve_exact(target - self.inertias.len());
            self.index_to_handle.reserve_exact(target - self.index_to_handle.len());
        } else {
            self.inertias.shrink_to(target);
            self.index_to_handle.shrink_to(target);
        }
        self.handle_pool.resize(target);
    }

    pub fn clear(&mut self) {
        self.handle_to_index.clear();
        self.index_to_handle.clear();
        self.handle_pool.clear();
        self.velocities.clear(0, self.velocities.len());
        self.inertias.clear();
        self.count = 0;
    }
}
