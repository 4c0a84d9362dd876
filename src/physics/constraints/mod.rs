pub mod constraint_description;
pub mod constraint_type_registry;
pub mod contact;
pub mod spring_settings;
pub mod type_batch;
pub mod type_processor;

pub use constraint_description::ConstraintDescription;
pub use constraint_type_registry::ConstraintTypeRegistry;
pub use spring_settings::SpringSettings;
pub use type_batch::TypeBatch;
pub use type_processor::{ConstraintKernel, ConstraintTypeBatch};
