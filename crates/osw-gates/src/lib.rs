pub mod parse;
pub mod runner;
pub mod types;

pub use parse::*;
pub use runner::*;
pub use types::*;
