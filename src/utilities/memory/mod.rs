//! Memory primitives for the solver's bundle storage and handle tables.

pub mod buffer;
pub mod id_pool;

pub use buffer::Buffer;
pub use id_pool::IdPool;
