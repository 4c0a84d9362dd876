use std::hash::Hash;

/// Stable identifier of a body. Survives memory moves of the body it names.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BodyHandle(pub i32);

/// Stable identifier of a constraint. Survives batch and type batch moves of the constraint it names.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ConstraintHandle(pub i32);

impl std::fmt::Display for BodyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "BodyHandle<{}>", self.0)
    }
}

impl std::fmt::Display for ConstraintHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "ConstraintHandle<{}>", self.0)
    }
}
