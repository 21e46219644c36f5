pub mod fs_store;
pub mod memory;
pub mod traits;

pub use fs_store::*;
pub use memory::*;
pub use traits::*;
