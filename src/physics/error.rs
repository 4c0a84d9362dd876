use crate::physics::handles::{BodyHandle, ConstraintHandle};

/// Contract violations reported by the solver and the simulation facade.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    #[error("{0} does not refer to an allocated constraint")]
    InvalidConstraintHandle(ConstraintHandle),
    #[error("{0} does not refer to an existing body")]
    InvalidBodyHandle(BodyHandle),
    #[error("Constraint type `{0}` has not been registered with the solver")]
    UnregisteredConstraintType(&'static str),
    #[error("No constraint type is registered with id {0}")]
    UnknownTypeId(i32),
    #[error("Description of type `{description}` does not match the constraint's type id {type_id}")]
    DescriptionTypeMismatch {
        description: &'static str,
        type_id: i32,
    },
    #[error("Constraint type expects {expected} bodies, got {actual}")]
    BodyCountMismatch { expected: usize, actual: usize },
    #[error("A constraint cannot reference the same body more than once")]
    DuplicateBodyReference,
    #[error("Iteration count must be positive, got {0}")]
    InvalidIterationCount(i32),
    #[error("Layout optimizer region size must be even and positive, got {0}")]
    InvalidRegionSize(usize),
}
