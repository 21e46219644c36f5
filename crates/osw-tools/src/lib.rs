pub mod gh;
pub mod git;
pub mod runner;
pub mod scripted;

pub use gh::*;
pub use git::*;
pub use runner::*;
pub use scripted::*;
