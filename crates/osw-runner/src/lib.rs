pub mod band;
pub mod config;
pub mod context;
pub mod orchestrator;
pub mod stages;

pub use band::*;
pub use config::*;
pub use context::*;
pub use orchestrator::*;
pub use stages::*;
