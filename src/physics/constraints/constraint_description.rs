use crate::physics::constraints::type_processor::ConstraintKernel;

/// Marks a type as the scalar description of a constraint, linking it to the kernel storing and solving it.
///
/// One kernel has exactly one description type. The description is what users add, apply and read back;
/// the kernel decides how it is laid out in bundles.
pub trait ConstraintDescription: Clone + Send + Sync + 'static {
    type Kernel: ConstraintKernel<Description = Self>;
}
