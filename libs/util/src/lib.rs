mod cache_padded;
mod memory_range;

pub use cache_padded::CachePadded;
pub use memory_range::MemoryRange;
