pub mod aws;
pub mod local;
pub mod memory;

pub use aws::{S3Options, S3Provider};
pub use local::LocalProvider;
pub use memory::MemoryProvider;
