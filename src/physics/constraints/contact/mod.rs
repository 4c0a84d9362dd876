pub mod penetration_limit;

pub use penetration_limit::{PenetrationLimit, PenetrationLimitKernel};
