pub mod lsb_radix_sort;

pub use lsb_radix_sort::LsbRadixSort;
