pub mod alloc;
pub mod cfg;

mod error;

pub use alloc::{allocate, Allocation, AllocatorSession, Constraints};
pub use error::AllocError;
