use std::any::{type_name, TypeId};
use std::collections::HashMap;

use crate::physics::constraints::constraint_description::ConstraintDescription;
use crate::physics::constraints::type_batch::TypeBatch;
use crate::physics::constraints::type_processor::{ConstraintKernel, ConstraintTypeBatch};
use crate::physics::error::SolverError;

struct RegisteredType {
    bodies_per_constraint: usize,
    factory: fn(i32, usize) -> Box<dyn TypeBatch>,
}

fn create_type_batch<K: ConstraintKernel>(type_id: i32, initial_capacity: usize) -> Box<dyn TypeBatch> {
    Box::new(ConstraintTypeBatch::<K>::new(type_id, initial_capacity))
}

/// Maps constraint description types to dense type ids and creates type batches for them.
///
/// Ids are assigned in registration order starting at zero.
#[derive(Default)]
pub struct ConstraintTypeRegistry {
    ids: HashMap<TypeId, i32>,
    types: Vec<RegisteredType>,
}

impl ConstraintTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a description type, returning its type id. Registering the same type again returns the existing id.
    pub fn register<D: ConstraintDescription>(&mut self) -> i32 {
        let key = TypeId::of::<D::Kernel>();
        if let Some(&type_id) = self.ids.get(&key) {
            return type_id;
        }
        let type_id = self.types.len() as i32;
        self.types.push(RegisteredType {
            bodies_per_constraint: <D::Kernel as ConstraintKernel>::BODY_COUNT,
            factory: create_type_batch::<D::Kernel>,
        });
        self.ids.insert(key, type_id);
        log::debug!("Registered constraint type {} as {}.", type_name::<D>(), type_id);
        type_id
    }

    pub fn type_id_of<D: ConstraintDescription>(&self) -> Result<i32, SolverError> {
        self.ids
            .get(&TypeId::of::<D::Kernel>())
            .copied()
            .ok_or(SolverError::UnregisteredConstraintType(type_name::<D>()))
    }

    #[inline(always)]
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn bodies_per_constraint(&self, type_id: i32) -> usize {
        self.types[type_id as usize].bodies_per_constraint
    }

    pub fn create_type_batch(&self, type_id: i32, initial_capacity: usize) -> Box<dyn TypeBatch> {
        (self.types[type_id as usize].factory)(type_id, initial_capacity)
    }
}
