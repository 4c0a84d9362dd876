pub mod bundle_indexing;
pub mod collections;
pub mod gather_scatter;
pub mod memory;
pub mod symmetric3x3_wide;
pub mod thread_dispatcher;
pub mod vector;
pub mod vector3_wide;

pub use self::bundle_indexing::BundleIndexing;
pub use self::gather_scatter::{Bundle, GatherScatter};
pub use self::thread_dispatcher::{SimpleThreadDispatcher, ThreadDispatcher};
pub use self::vector::{Vector, LANES};
